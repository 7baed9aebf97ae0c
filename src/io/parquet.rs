//! Parquet reading and writing.
//!
//! Frames are written with `parquet::arrow::ArrowWriter` as a single row group per
//! batch and read back with `ParquetRecordBatchReaderBuilder`. The Arrow schema is
//! embedded in the file, so column types round-trip exactly.

use crate::frame::DataFrame;
use crate::io::create_parent_dirs;
use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

/// Page compression applied by [`write_parquet`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    #[default]
    Snappy,
    Gzip,
    Zstd,
    Uncompressed,
}

impl ParquetCompression {
    fn codec(self) -> Compression {
        match self {
            Self::Snappy => Compression::SNAPPY,
            Self::Gzip => Compression::GZIP(Default::default()),
            Self::Zstd => Compression::ZSTD(Default::default()),
            Self::Uncompressed => Compression::UNCOMPRESSED,
        }
    }
}

/// Options understood by [`read_parquet`] and [`write_parquet`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParquetOptions {
    /// Rows per decoded batch on read.
    pub batch_size: usize,
    /// Page compression on write.
    pub compression: ParquetCompression,
    pub storage_options: Option<BTreeMap<String, serde_json::Value>>,
}

impl Default for ParquetOptions {
    fn default() -> Self {
        Self {
            batch_size: 64 * 1024,
            compression: ParquetCompression::default(),
            storage_options: None,
        }
    }
}

/// Read a whole Parquet file into a [`DataFrame`].
///
/// # Errors
/// Returns an error if the file cannot be opened, the reader cannot be built,
/// or batch iteration fails.
pub fn read_parquet(path: &Path, options: &ParquetOptions) -> Result<DataFrame> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;

    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("open ParquetRecordBatchReader")?;
    let schema = builder.schema().clone();
    let reader = builder
        .with_batch_size(options.batch_size.max(1))
        .build()
        .context("build ParquetRecordBatchReader")?;

    let batches = reader
        .collect::<Result<Vec<RecordBatch>, _>>()
        .context("read parquet batches")?;
    DataFrame::from_batches(schema, &batches)
}

/// Write `frame` to a Parquet file, creating parent directories as needed.
///
/// A zero-row frame produces a valid file carrying only the schema.
///
/// # Errors
/// Returns an error if file creation or writing fails.
pub fn write_parquet(frame: &DataFrame, path: &Path, options: &ParquetOptions) -> Result<()> {
    create_parent_dirs(path)?;
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(options.compression.codec())
        .build();
    let mut writer =
        ArrowWriter::try_new(file, frame.schema(), Some(props)).context("create ArrowWriter")?;

    writer.write(frame.batch()).context("write batch to parquet")?;
    writer.close().context("close ArrowWriter")?;
    Ok(())
}
