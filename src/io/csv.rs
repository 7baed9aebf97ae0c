//! CSV reading and writing.
//!
//! Files always carry a header row. On read the schema is inferred from every row
//! and empty fields become nulls; on write the frame's columns are emitted in order
//! and no row index is ever written, so a round trip yields the same values and
//! columns with a fresh default index.
//!
//! CSV stores no types, so a file holding only the header reads back with every
//! column typed [`DataType::Null`](arrow::datatypes::DataType::Null); the names
//! survive, the original types do not.

use crate::error::AdapterError;
use crate::frame::DataFrame;
use crate::io::create_parent_dirs;
use anyhow::{Context, Result};
use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

/// A single-byte field delimiter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Separator(u8);

impl Separator {
    /// # Errors
    /// Fails unless `sep` is one printable ASCII character other than a quote, or a tab.
    pub fn new(sep: char) -> Result<Self, AdapterError> {
        let ok = sep.is_ascii()
            && (sep == '\t' || sep.is_ascii_graphic() || sep == ' ')
            && sep != '"';
        if ok {
            Ok(Self(sep as u8))
        } else {
            Err(AdapterError::invalid(format!("invalid CSV separator {sep:?}")))
        }
    }

    #[must_use]
    pub fn byte(self) -> u8 {
        self.0
    }
}

impl Default for Separator {
    fn default() -> Self {
        Self(b',')
    }
}

impl TryFrom<String> for Separator {
    type Error = AdapterError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        let mut chars = raw.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::new(c),
            _ => Err(AdapterError::invalid(format!(
                "CSV separator must be exactly one character, got {raw:?}"
            ))),
        }
    }
}

impl From<Separator> for String {
    fn from(sep: Separator) -> Self {
        sep.to_string()
    }
}

impl fmt::Display for Separator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0 as char)
    }
}

/// Options understood by [`read_csv`] and [`write_csv`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CsvOptions {
    /// Field delimiter (`,`).
    pub sep: Separator,
    /// Only meaningful for remote locations.
    pub storage_options: Option<BTreeMap<String, serde_json::Value>>,
}

/// Read a CSV file with a header row into a [`DataFrame`].
///
/// # Errors
/// Returns an error if the file cannot be opened, the schema cannot be inferred,
/// or a row fails to parse against it.
pub fn read_csv(path: &Path, options: &CsvOptions) -> Result<DataFrame> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;

    let format = Format::default()
        .with_header(true)
        .with_delimiter(options.sep.byte());
    let (schema, _) = format
        .infer_schema(&mut file, None)
        .with_context(|| format!("infer CSV schema of {}", path.display()))?;
    file.seek(SeekFrom::Start(0))
        .with_context(|| format!("rewind {}", path.display()))?;

    let schema = Arc::new(schema);
    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_delimiter(options.sep.byte())
        .build(file)
        .context("build CSV reader")?;
    let batches = reader
        .collect::<Result<Vec<RecordBatch>, _>>()
        .with_context(|| format!("parse CSV records in {}", path.display()))?;
    DataFrame::from_batches(schema, &batches)
}

/// Write `frame` as CSV with a header row. The row index is never written.
///
/// Creates parent directories if they don't exist.
///
/// # Errors
/// Returns an error if the file/dirs cannot be created or a value fails to format.
pub fn write_csv(frame: &DataFrame, path: &Path, options: &CsvOptions) -> Result<()> {
    create_parent_dirs(path)?;
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut writer = WriterBuilder::new()
        .with_header(true)
        .with_delimiter(options.sep.byte())
        .build(file);
    writer
        .write(frame.batch())
        .with_context(|| format!("write CSV rows to {}", path.display()))?;
    Ok(())
}
