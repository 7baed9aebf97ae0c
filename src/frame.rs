//! The tabular value type moved through table adapters.
//!
//! [`DataFrame`] wraps a single Arrow [`RecordBatch`]. Rows carry an implicit
//! default index `0..num_rows`; no index column is stored, which is why formats
//! that could persist an index (CSV, JSON) never write one unless asked to.
//!
//! Typed rows convert through Serde the same way the Parquet helpers do:
//! the Arrow schema is traced from `T` with `serde_arrow`, so conversion works for
//! empty inputs too.

use anyhow::{Context, Result};
use arrow::array::{new_null_array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::compute::concat_batches;
use arrow::datatypes::{DataType, Field, FieldRef, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_arrow::schema::{SchemaLike, TracingOptions};
use serde_arrow::{from_record_batch, to_record_batch};
use std::sync::Arc;

/// An in-memory table.
#[derive(Clone, Debug, PartialEq)]
pub struct DataFrame {
    batch: RecordBatch,
}

impl DataFrame {
    #[must_use]
    pub fn new(batch: RecordBatch) -> Self {
        Self { batch }
    }

    /// A zero-row frame with the given schema.
    #[must_use]
    pub fn empty(schema: SchemaRef) -> Self {
        Self {
            batch: RecordBatch::new_empty(schema),
        }
    }

    /// Concatenate `batches` (all sharing `schema`) into one frame.
    ///
    /// # Errors
    /// Returns an error if a batch does not match `schema`.
    pub fn from_batches(schema: SchemaRef, batches: &[RecordBatch]) -> Result<Self> {
        let batch = concat_batches(&schema, batches).context("concatenate record batches")?;
        Ok(Self { batch })
    }

    /// Build a frame from typed rows.
    ///
    /// The schema is inferred from `T`, so an empty slice still yields the right columns.
    ///
    /// # Errors
    /// Returns an error if `T` cannot be traced into an Arrow schema or a row fails to
    /// serialize.
    pub fn from_rows<T: Serialize + Deserialize<'static>>(rows: &[T]) -> Result<Self> {
        let fields: Vec<FieldRef> = Vec::<FieldRef>::from_type::<T>(TracingOptions::default())
            .context("infer Arrow schema from row type")?;
        let batch = to_record_batch(&fields, &rows).context("convert rows to RecordBatch")?;
        Ok(Self { batch })
    }

    /// Deserialize every row into `T`.
    ///
    /// # Errors
    /// Returns an error if a column cannot be mapped onto `T`.
    pub fn to_rows<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        from_record_batch(&self.batch).context("deserialize RecordBatch rows")
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    #[must_use]
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    #[must_use]
    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }

    /// Look up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ArrayRef> {
        self.batch.column_by_name(name)
    }

    /// Return a frame where `name` holds `value` on every row.
    ///
    /// An existing column of that name is replaced in place; otherwise the column is
    /// appended at the end.
    ///
    /// # Errors
    /// Returns an error if the resulting batch cannot be assembled.
    pub fn with_scalar_column(&self, name: &str, value: &ScalarValue) -> Result<Self> {
        let rows = self.num_rows();
        let array = value.to_array(rows);
        let field = Arc::new(Field::new(name, array.data_type().clone(), true));

        let schema = self.batch.schema();
        let mut fields: Vec<FieldRef> = schema.fields().iter().cloned().collect();
        let mut columns: Vec<ArrayRef> = self.batch.columns().to_vec();
        match schema.index_of(name) {
            Ok(idx) => {
                fields[idx] = field;
                columns[idx] = array;
            }
            Err(_) => {
                fields.push(field);
                columns.push(array);
            }
        }

        let schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
        let batch = RecordBatch::try_new(schema, columns)
            .with_context(|| format!("fill column {name} with a scalar"))?;
        Ok(Self { batch })
    }
}

impl From<RecordBatch> for DataFrame {
    fn from(batch: RecordBatch) -> Self {
        Self::new(batch)
    }
}

/// A single value repeated down a column by [`DataFrame::with_scalar_column`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
}

impl ScalarValue {
    fn to_array(&self, rows: usize) -> ArrayRef {
        match self {
            Self::Null => new_null_array(&DataType::Null, rows),
            Self::Boolean(v) => Arc::new(BooleanArray::from(vec![*v; rows])),
            Self::Int64(v) => Arc::new(Int64Array::from(vec![*v; rows])),
            Self::Float64(v) => Arc::new(Float64Array::from(vec![*v; rows])),
            Self::Utf8(v) => Arc::new(StringArray::from(vec![v.as_str(); rows])),
        }
    }
}
