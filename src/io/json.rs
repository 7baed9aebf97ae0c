//! JSON tables.
//!
//! A frame is laid out in one of five *orients*:
//!
//! | orient    | shape                                                       |
//! |-----------|-------------------------------------------------------------|
//! | `split`   | `{"columns": [..], "index": [..], "data": [[..], ..]}`      |
//! | `records` | `[{column: value, ..}, ..]`                                 |
//! | `index`   | `{label: {column: value, ..}, ..}`                          |
//! | `columns` | `{column: {label: value, ..}, ..}` (the default)            |
//! | `values`  | `[[..], ..]`                                                |
//!
//! With `lines` set, one record per line (newline-delimited JSON).
//!
//! Row labels are written as `0..n` and dropped on read, since frames carry an
//! implicit index. Column types come from Arrow's JSON schema inference unless
//! `dtype` says otherwise; date-like columns are converted to timestamps.

use crate::error::AdapterError;
use crate::frame::DataFrame;
use crate::io::compression::{reader_for, writer_for, Compression, FinishWrite};
use crate::io::create_parent_dirs;
use anyhow::{anyhow, bail, Context, Result};
use arrow::array::ArrayRef;
use arrow::compute::{cast, cast_with_options, CastOptions};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::error::ArrowError;
use arrow::json::reader::{infer_json_schema, infer_json_schema_from_iterator};
use arrow::json::{ArrayWriter, ReaderBuilder};
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::Arc;

const DEFAULT_BATCH_SIZE: usize = 1024;
const MAX_DOUBLE_PRECISION: u8 = 15;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orient {
    Split,
    Records,
    Index,
    Columns,
    Values,
}

impl fmt::Display for Orient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Split => "split",
            Self::Records => "records",
            Self::Index => "index",
            Self::Columns => "columns",
            Self::Values => "values",
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateUnit {
    S,
    #[default]
    Ms,
    Us,
    Ns,
}

impl DateUnit {
    fn time_unit(self) -> TimeUnit {
        match self {
            Self::S => TimeUnit::Second,
            Self::Ms => TimeUnit::Millisecond,
            Self::Us => TimeUnit::Microsecond,
            Self::Ns => TimeUnit::Nanosecond,
        }
    }
}

/// `true`, `false`, or an explicit list of columns to parse as dates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConvertDates {
    Flag(bool),
    Columns(Vec<String>),
}

impl Default for ConvertDates {
    fn default() -> Self {
        Self::Flag(true)
    }
}

/// Target type for a column named in `dtype`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[serde(alias = "int")]
    Int64,
    Int32,
    #[serde(alias = "float")]
    Float64,
    Float32,
    #[serde(alias = "boolean")]
    Bool,
    #[serde(alias = "str", alias = "utf8", alias = "object")]
    String,
    #[serde(alias = "datetime")]
    Timestamp,
}

impl ColumnType {
    fn data_type(self, unit: DateUnit) -> DataType {
        match self {
            Self::Int64 => DataType::Int64,
            Self::Int32 => DataType::Int32,
            Self::Float64 => DataType::Float64,
            Self::Float32 => DataType::Float32,
            Self::Bool => DataType::Boolean,
            Self::String => DataType::Utf8,
            Self::Timestamp => DataType::Timestamp(unit.time_unit(), None),
        }
    }
}

/// `false` keeps every column as text; `true` infers; a map casts named columns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DtypeSpec {
    Infer(bool),
    Columns(BTreeMap<String, ColumnType>),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8", alias = "UTF-8")]
    Utf8,
    #[serde(rename = "latin-1", alias = "latin1", alias = "iso-8859-1")]
    Latin1,
    #[serde(rename = "ascii")]
    Ascii,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingErrors {
    #[default]
    Strict,
    Replace,
    Ignore,
}

/// Parser used for newline-delimited input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonEngine {
    /// Parse documents with serde_json, then decode rows into Arrow.
    #[default]
    Serde,
    /// Stream newline-delimited input straight through Arrow's JSON reader.
    Arrow,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateFormat {
    #[default]
    Epoch,
    Iso,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteMode {
    #[default]
    #[serde(rename = "w")]
    Write,
    #[serde(rename = "a")]
    Append,
}

/// Options understood by [`read_json`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JsonReadOptions {
    /// Rows per decoded batch. Requires `lines`.
    pub chunksize: Option<usize>,
    pub compression: Compression,
    /// Accepted for compatibility: row labels are never materialized.
    pub convert_axes: bool,
    pub convert_dates: ConvertDates,
    pub date_unit: Option<DateUnit>,
    pub dtype: Option<DtypeSpec>,
    pub encoding: Encoding,
    pub encoding_errors: EncodingErrors,
    pub engine: JsonEngine,
    /// Also parse columns whose names look like dates.
    pub keep_default_dates: bool,
    pub lines: bool,
    /// Read at most this many lines. Requires `lines`.
    pub nrows: Option<usize>,
    pub orient: Option<Orient>,
    /// Accepted for compatibility: floats are always parsed with correct rounding.
    pub precise_float: bool,
    pub storage_options: Option<BTreeMap<String, Value>>,
}

impl Default for JsonReadOptions {
    fn default() -> Self {
        Self {
            chunksize: None,
            compression: Compression::Infer,
            convert_axes: true,
            convert_dates: ConvertDates::default(),
            date_unit: None,
            dtype: None,
            encoding: Encoding::Utf8,
            encoding_errors: EncodingErrors::Strict,
            engine: JsonEngine::Serde,
            keep_default_dates: true,
            lines: false,
            nrows: None,
            orient: None,
            precise_float: false,
            storage_options: None,
        }
    }
}

impl JsonReadOptions {
    /// Check combinations that no input could satisfy.
    ///
    /// # Errors
    /// Fails with [`ErrorKind::InvalidParameter`](crate::ErrorKind::InvalidParameter).
    pub fn validate(&self) -> Result<(), AdapterError> {
        if self.chunksize.is_some() && !self.lines {
            return Err(AdapterError::invalid("chunksize can only be passed if lines=true"));
        }
        if self.chunksize == Some(0) {
            return Err(AdapterError::invalid("chunksize must be an integer >= 1"));
        }
        if self.nrows.is_some() && !self.lines {
            return Err(AdapterError::invalid("nrows can only be passed if lines=true"));
        }
        if self.engine == JsonEngine::Arrow && !self.lines {
            return Err(AdapterError::invalid("the arrow engine requires lines=true"));
        }
        if self.lines && !matches!(self.orient, None | Some(Orient::Records)) {
            return Err(AdapterError::invalid(
                "lines=true is only valid with orient 'records'",
            ));
        }
        Ok(())
    }

    fn orient(&self) -> Orient {
        if self.lines {
            Orient::Records
        } else {
            self.orient.unwrap_or(Orient::Columns)
        }
    }

    fn date_columns(&self, columns: &[String]) -> Vec<String> {
        let by_name = |c: &String| self.keep_default_dates && is_datelike(c);
        columns
            .iter()
            .filter(|c| match &self.convert_dates {
                ConvertDates::Flag(false) => false,
                ConvertDates::Flag(true) => by_name(c),
                ConvertDates::Columns(list) => list.contains(c) || by_name(c),
            })
            .cloned()
            .collect()
    }
}

/// Options understood by [`write_json`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JsonWriteOptions {
    pub compression: Compression,
    pub date_format: DateFormat,
    pub date_unit: DateUnit,
    /// Decimal places kept for floats, at most 15.
    pub double_precision: u8,
    /// Escape every non-ASCII character as `\uXXXX`.
    pub force_ascii: bool,
    /// Whether row labels are written. Only `split` can omit them.
    pub index: Option<bool>,
    /// Spaces per nesting level; 0 writes compact output.
    pub indent: usize,
    pub lines: bool,
    pub mode: WriteMode,
    pub orient: Option<Orient>,
    pub storage_options: Option<BTreeMap<String, Value>>,
}

impl Default for JsonWriteOptions {
    fn default() -> Self {
        Self {
            compression: Compression::Infer,
            date_format: DateFormat::Epoch,
            date_unit: DateUnit::Ms,
            double_precision: 10,
            force_ascii: true,
            index: None,
            indent: 0,
            lines: false,
            mode: WriteMode::Write,
            orient: None,
            storage_options: None,
        }
    }
}

impl JsonWriteOptions {
    /// # Errors
    /// Fails with [`ErrorKind::InvalidParameter`](crate::ErrorKind::InvalidParameter)
    /// for option combinations the writer cannot honor.
    pub fn validate(&self) -> Result<(), AdapterError> {
        if self.double_precision > MAX_DOUBLE_PRECISION {
            return Err(AdapterError::invalid(format!(
                "double_precision must be at most {MAX_DOUBLE_PRECISION}"
            )));
        }
        let orient = self.orient();
        if self.lines && orient != Orient::Records {
            return Err(AdapterError::invalid(
                "lines=true is only valid with orient 'records'",
            ));
        }
        if self.mode == WriteMode::Append && !self.lines {
            return Err(AdapterError::invalid(
                "mode 'a' is only supported with lines=true and orient 'records'",
            ));
        }
        match (self.index, orient) {
            (Some(false), o) if o != Orient::Split => Err(AdapterError::invalid(
                "index=false is only valid with orient 'split'",
            )),
            (Some(true), Orient::Records | Orient::Values) => Err(AdapterError::invalid(format!(
                "index=true is not valid with orient '{orient}'"
            ))),
            _ => Ok(()),
        }
    }

    fn orient(&self) -> Orient {
        match self.orient {
            Some(o) => o,
            None if self.lines => Orient::Records,
            None => Orient::Columns,
        }
    }
}

/// Read a JSON table.
///
/// # Errors
/// Fails with [`ErrorKind::InvalidParameter`](crate::ErrorKind::InvalidParameter) for
/// an invalid option combination, or with the underlying error if the file cannot
/// be read, decoded, or does not have the shape `orient` describes.
pub fn read_json(path: &Path, options: &JsonReadOptions) -> Result<DataFrame> {
    options.validate()?;

    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut bytes = Vec::new();
    reader_for(file, path, &options.compression)?
        .read_to_end(&mut bytes)
        .with_context(|| format!("read {}", path.display()))?;
    let text = decode_text(&bytes, options.encoding, options.encoding_errors)
        .with_context(|| format!("decode {}", path.display()))?;
    let text = match options.nrows {
        Some(n) => text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .take(n)
            .collect::<Vec<_>>()
            .join("\n"),
        None => text,
    };

    let batch_size = options.chunksize.unwrap_or(DEFAULT_BATCH_SIZE);
    let mut batch = match options.engine {
        JsonEngine::Arrow => decode_lines_with_arrow(&text, batch_size)?,
        JsonEngine::Serde => {
            let (columns, rows) = if options.lines {
                parse_lines(&text)?
            } else {
                let doc: Value = serde_json::from_str(&text).context("parse JSON document")?;
                rows_from_document(doc, options.orient())?
            };
            let as_text = options.dtype == Some(DtypeSpec::Infer(false));
            decode_rows(&columns, &rows, batch_size, as_text)?
        }
    };

    let unit = options.date_unit.unwrap_or_default();
    if let Some(DtypeSpec::Columns(types)) = &options.dtype {
        for (column, ty) in types {
            batch = cast_column(&batch, column, &ty.data_type(unit))?;
        }
    }
    let columns: Vec<String> = batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    for column in options.date_columns(&columns) {
        batch = convert_dates(batch, &column, unit);
    }
    Ok(DataFrame::new(batch))
}

/// Write `frame` as JSON.
///
/// # Errors
/// Fails with [`ErrorKind::InvalidParameter`](crate::ErrorKind::InvalidParameter) for
/// an invalid option combination, or with the underlying I/O error.
pub fn write_json(frame: &DataFrame, path: &Path, options: &JsonWriteOptions) -> Result<()> {
    options.validate()?;

    let batch = prepare_dates(frame.batch(), options.date_format, options.date_unit)?;
    let columns = frame.column_names();
    let mut rows = encode_rows(&batch, &columns)?;
    for row in &mut rows {
        for value in row.iter_mut() {
            round_floats(value, options.double_precision);
        }
    }

    let mut text = if options.lines {
        rows.into_iter()
            .map(|row| serde_json::to_string(&record(&columns, row)))
            .map(|line| line.map(|l| l + "\n"))
            .collect::<Result<String, _>>()
            .context("encode JSON lines")?
    } else {
        let doc = layout(&columns, rows, options.orient(), options.index);
        to_text(&doc, options.indent)?
    };
    if options.force_ascii {
        text = escape_non_ascii(&text);
    }

    create_parent_dirs(path)?;
    let file = match options.mode {
        WriteMode::Write => File::create(path),
        WriteMode::Append => OpenOptions::new().create(true).append(true).open(path),
    }
    .with_context(|| format!("open {} for writing", path.display()))?;
    let mut sink = writer_for(file, path, &options.compression)?;
    sink.write_all(text.as_bytes())
        .with_context(|| format!("write {}", path.display()))?;
    sink.finish()
        .with_context(|| format!("finish {}", path.display()))?;
    Ok(())
}

// ============================================================================
// Reading
// ============================================================================

fn is_datelike(column: &str) -> bool {
    let lower = column.to_ascii_lowercase();
    lower.ends_with("_at")
        || lower.ends_with("_time")
        || lower.starts_with("timestamp")
        || matches!(lower.as_str(), "modified" | "date" | "datetime")
}

fn decode_text(bytes: &[u8], encoding: Encoding, errors: EncodingErrors) -> Result<String> {
    let replacement = match errors {
        EncodingErrors::Strict => None,
        EncodingErrors::Replace => Some(char::REPLACEMENT_CHARACTER),
        EncodingErrors::Ignore => None,
    };
    match encoding {
        Encoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        Encoding::Ascii => {
            let mut out = String::with_capacity(bytes.len());
            for (offset, &b) in bytes.iter().enumerate() {
                if b.is_ascii() {
                    out.push(char::from(b));
                } else if errors == EncodingErrors::Strict {
                    bail!("byte 0x{b:02x} at offset {offset} is not ASCII");
                } else {
                    out.extend(replacement);
                }
            }
            Ok(out)
        }
        Encoding::Utf8 if errors == EncodingErrors::Strict => {
            String::from_utf8(bytes.to_vec()).context("input is not valid UTF-8")
        }
        Encoding::Utf8 => {
            let mut out = String::with_capacity(bytes.len());
            let mut rest = bytes;
            loop {
                match std::str::from_utf8(rest) {
                    Ok(valid) => {
                        out.push_str(valid);
                        return Ok(out);
                    }
                    Err(e) => {
                        let (valid, after) = rest.split_at(e.valid_up_to());
                        out.push_str(std::str::from_utf8(valid)?);
                        out.extend(replacement);
                        rest = &after[e.error_len().unwrap_or(after.len())..];
                    }
                }
            }
        }
    }
}

fn label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn push_column(columns: &mut Vec<String>, name: &str) {
    if !columns.iter().any(|c| c == name) {
        columns.push(name.to_string());
    }
}

fn expect_object(value: Value, what: &str) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(anyhow!("expected an object for {what}, found {other}")),
    }
}

fn expect_array(value: Value, what: &str) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(anyhow!("expected an array for {what}, found {other}")),
    }
}

fn parse_lines(text: &str) -> Result<(Vec<String>, Vec<Value>)> {
    let mut columns = Vec::new();
    let mut rows = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line)
            .with_context(|| format!("parse JSON line {}", idx + 1))?;
        let row = expect_object(value, "a JSON line")?;
        row.keys().for_each(|k| push_column(&mut columns, k));
        rows.push(Value::Object(row));
    }
    Ok((columns, rows))
}

/// Turn a document in `orient` layout into column names and row objects.
fn rows_from_document(doc: Value, orient: Orient) -> Result<(Vec<String>, Vec<Value>)> {
    let mut columns = Vec::new();
    let mut rows = Vec::new();
    match orient {
        Orient::Records => {
            for item in expect_array(doc, "orient 'records'")? {
                let row = expect_object(item, "a record")?;
                row.keys().for_each(|k| push_column(&mut columns, k));
                rows.push(Value::Object(row));
            }
        }
        Orient::Values => {
            for item in expect_array(doc, "orient 'values'")? {
                let values = expect_array(item, "a row of values")?;
                while columns.len() < values.len() {
                    columns.push(columns.len().to_string());
                }
                let row: Map<String, Value> = columns.iter().cloned().zip(values).collect();
                rows.push(Value::Object(row));
            }
        }
        Orient::Split => {
            let mut doc = expect_object(doc, "orient 'split'")?;
            if let Some(key) = doc
                .keys()
                .find(|k| !matches!(k.as_str(), "columns" | "index" | "data"))
            {
                bail!("JSON data had unexpected key '{key}' for orient 'split'");
            }
            columns = match doc.remove("columns") {
                Some(names) => expect_array(names, "split columns")?
                    .iter()
                    .map(label)
                    .collect(),
                None => Vec::new(),
            };
            let data = doc.remove("data").unwrap_or(Value::Array(Vec::new()));
            for item in expect_array(data, "split data")? {
                let values = expect_array(item, "a row of split data")?;
                if values.len() != columns.len() {
                    bail!(
                        "split row has {} values but {} columns were declared",
                        values.len(),
                        columns.len()
                    );
                }
                let row: Map<String, Value> = columns.iter().cloned().zip(values).collect();
                rows.push(Value::Object(row));
            }
        }
        Orient::Index => {
            for (_, item) in expect_object(doc, "orient 'index'")? {
                let row = expect_object(item, "an index entry")?;
                row.keys().for_each(|k| push_column(&mut columns, k));
                rows.push(Value::Object(row));
            }
        }
        Orient::Columns => {
            let mut labels: Vec<String> = Vec::new();
            let mut by_label: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
            for (column, cells) in expect_object(doc, "orient 'columns'")? {
                push_column(&mut columns, &column);
                for (row_label, value) in expect_object(cells, "a column")? {
                    if !by_label.contains_key(&row_label) {
                        labels.push(row_label.clone());
                    }
                    by_label
                        .entry(row_label)
                        .or_default()
                        .insert(column.clone(), value);
                }
            }
            for row_label in labels {
                if let Some(row) = by_label.remove(&row_label) {
                    rows.push(Value::Object(row));
                }
            }
        }
    }
    Ok((columns, rows))
}

/// Decode row objects into one batch whose columns follow `columns`.
fn decode_rows(
    columns: &[String],
    rows: &[Value],
    batch_size: usize,
    as_text: bool,
) -> Result<RecordBatch> {
    let inferred = infer_json_schema_from_iterator(rows.iter().map(Ok::<&Value, ArrowError>))
        .context("infer JSON schema")?;
    let fields: Vec<Field> = columns
        .iter()
        .map(|name| {
            let data_type = if as_text {
                DataType::Utf8
            } else {
                inferred
                    .field_with_name(name)
                    .map_or(DataType::Null, |f| f.data_type().clone())
            };
            Field::new(name, data_type, true)
        })
        .collect();
    let schema: SchemaRef = Arc::new(Schema::new(fields));

    let mut decoder = ReaderBuilder::new(schema.clone())
        .with_batch_size(batch_size)
        // Mixed scalar columns infer as Utf8; keep their numbers and booleans as text.
        .with_coerce_primitive(true)
        .build_decoder()
        .context("build JSON decoder")?;
    let mut batches = Vec::new();
    for chunk in rows.chunks(batch_size) {
        decoder.serialize(chunk).context("decode JSON rows")?;
        if let Some(batch) = decoder.flush().context("flush JSON decoder")? {
            batches.push(batch);
        }
    }
    Ok(DataFrame::from_batches(schema, &batches)?.into_batch())
}

fn decode_lines_with_arrow(text: &str, batch_size: usize) -> Result<RecordBatch> {
    let (schema, _) =
        infer_json_schema(Cursor::new(text.as_bytes()), None).context("infer JSON schema")?;
    let schema = Arc::new(schema);
    let reader = ReaderBuilder::new(schema.clone())
        .with_batch_size(batch_size)
        .with_coerce_primitive(true)
        .build(Cursor::new(text.as_bytes()))
        .context("build JSON reader")?;
    let batches = reader
        .collect::<Result<Vec<RecordBatch>, _>>()
        .context("read JSON lines")?;
    Ok(DataFrame::from_batches(schema, &batches)?.into_batch())
}

fn replace_column(batch: &RecordBatch, idx: usize, array: ArrayRef) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    let name = fields[idx].name().clone();
    fields[idx] = Field::new(name, array.data_type().clone(), true);
    let mut columns = batch.columns().to_vec();
    columns[idx] = array;
    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).context("rebuild batch")
}

fn cast_column(batch: &RecordBatch, column: &str, to: &DataType) -> Result<RecordBatch> {
    let idx = batch
        .schema()
        .index_of(column)
        .map_err(|_| AdapterError::invalid(format!("dtype names unknown column '{column}'")))?;
    let array = cast(batch.column(idx), to)
        .with_context(|| format!("cast column '{column}' to {to}"))?;
    replace_column(batch, idx, array)
}

/// Parse `column` as timestamps; a column that does not parse is left unchanged.
fn convert_dates(batch: RecordBatch, column: &str, unit: DateUnit) -> RecordBatch {
    let Ok(idx) = batch.schema().index_of(column) else {
        return batch;
    };
    let source = batch.column(idx);
    if !matches!(
        source.data_type(),
        DataType::Int64 | DataType::Int32 | DataType::Utf8 | DataType::LargeUtf8
    ) {
        return batch;
    }
    let strict = CastOptions {
        safe: false,
        ..CastOptions::default()
    };
    let target = DataType::Timestamp(unit.time_unit(), None);
    match cast_with_options(source, &target, &strict)
        .map_err(anyhow::Error::from)
        .and_then(|array| replace_column(&batch, idx, array))
    {
        Ok(converted) => converted,
        Err(err) => {
            tracing::debug!(column, error = %err, "column is not date-like; left as is");
            batch
        }
    }
}

// ============================================================================
// Writing
// ============================================================================

fn prepare_dates(batch: &RecordBatch, format: DateFormat, unit: DateUnit) -> Result<RecordBatch> {
    let target = DataType::Timestamp(unit.time_unit(), None);
    let mut out = batch.clone();
    for (idx, field) in batch.schema().fields().iter().enumerate() {
        if !matches!(
            field.data_type(),
            DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64
        ) {
            continue;
        }
        let mut array = cast(batch.column(idx), &target)
            .with_context(|| format!("cast column '{}' to {target}", field.name()))?;
        if format == DateFormat::Epoch {
            array = cast(&array, &DataType::Int64)
                .with_context(|| format!("convert column '{}' to epoch", field.name()))?;
        }
        out = replace_column(&out, idx, array)?;
    }
    Ok(out)
}

/// Encode every row as values aligned with `columns`.
fn encode_rows(batch: &RecordBatch, columns: &[String]) -> Result<Vec<Vec<Value>>> {
    if batch.num_rows() == 0 {
        return Ok(Vec::new());
    }
    let mut writer = ArrayWriter::new(Vec::new());
    writer.write(batch).context("encode rows as JSON")?;
    writer.finish().context("finish JSON encoding")?;
    let objects: Vec<Map<String, Value>> =
        serde_json::from_slice(&writer.into_inner()).context("re-read encoded rows")?;
    Ok(objects
        .into_iter()
        .map(|mut obj| {
            columns
                .iter()
                .map(|c| obj.remove(c).unwrap_or(Value::Null))
                .collect()
        })
        .collect())
}

fn round_floats(value: &mut Value, precision: u8) {
    let Value::Number(n) = value else {
        return;
    };
    if n.is_i64() || n.is_u64() {
        return;
    }
    let Some(x) = n.as_f64() else {
        return;
    };
    let factor = 10f64.powi(i32::from(precision));
    let scaled = (x * factor).round();
    if scaled.is_finite() {
        if let Some(rounded) = serde_json::Number::from_f64(scaled / factor) {
            *n = rounded;
        }
    }
}

fn record(columns: &[String], row: Vec<Value>) -> Value {
    Value::Object(columns.iter().cloned().zip(row).collect())
}

fn layout(columns: &[String], rows: Vec<Vec<Value>>, orient: Orient, index: Option<bool>) -> Value {
    match orient {
        Orient::Records => Value::Array(rows.into_iter().map(|r| record(columns, r)).collect()),
        Orient::Values => Value::Array(rows.into_iter().map(Value::Array).collect()),
        Orient::Index => Value::Object(
            rows.into_iter()
                .enumerate()
                .map(|(i, r)| (i.to_string(), record(columns, r)))
                .collect(),
        ),
        Orient::Columns => {
            let mut by_column: Vec<Map<String, Value>> = vec![Map::new(); columns.len()];
            for (i, row) in rows.into_iter().enumerate() {
                for (cells, value) in by_column.iter_mut().zip(row) {
                    cells.insert(i.to_string(), value);
                }
            }
            Value::Object(
                columns
                    .iter()
                    .cloned()
                    .zip(by_column.into_iter().map(Value::Object))
                    .collect(),
            )
        }
        Orient::Split => {
            let mut doc = Map::new();
            doc.insert(
                "columns".into(),
                Value::Array(columns.iter().cloned().map(Value::String).collect()),
            );
            if index != Some(false) {
                doc.insert(
                    "index".into(),
                    Value::Array((0..rows.len()).map(Value::from).collect()),
                );
            }
            doc.insert(
                "data".into(),
                Value::Array(rows.into_iter().map(Value::Array).collect()),
            );
            Value::Object(doc)
        }
    }
}

fn to_text(doc: &Value, indent: usize) -> Result<String> {
    if indent == 0 {
        return serde_json::to_string(doc).context("encode JSON document");
    }
    let pad = " ".repeat(indent);
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(pad.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    doc.serialize(&mut serializer)
        .context("encode JSON document")?;
    String::from_utf8(buf).context("encoded JSON is not UTF-8")
}

fn escape_non_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut units = [0u16; 2];
    for c in text.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    out
}
