//! Plain JSON documents.
//!
//! Registered under the same `json` name as the table reader and writer but for
//! `serde_json::Value`, so the value type picks the adapter.

use super::take_location;
use crate::adapter::{deserialize_params, Adapter, DataLoader, DataSaver, IoContext, Params};
use crate::error::AdapterError;
use crate::io::compression::{reader_for, writer_for, Compression, FinishWrite};
use crate::io::create_parent_dirs;
use crate::metadata::{file_metadata, Location, Metadata};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::path::Path;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DocumentOptions {
    pub compression: Compression,
    /// Spaces per nesting level; 0 writes compact output.
    pub indent: usize,
}

/// Reads and writes one JSON value per file.
#[derive(Clone, Debug, PartialEq)]
pub struct JsonDocumentAdapter {
    pub location: Location,
    pub options: DocumentOptions,
}

impl JsonDocumentAdapter {
    fn local_path(&self) -> Result<&Path> {
        self.location.as_path().ok_or_else(|| {
            AdapterError::invalid(format!(
                "JSON documents are only supported on local paths, got {}",
                self.location
            ))
            .into()
        })
    }
}

impl Adapter for JsonDocumentAdapter {
    fn name() -> &'static str {
        "json"
    }

    fn from_params(params: &Params) -> Result<Self> {
        let mut params = params.clone();
        let location = take_location(&mut params, &["path", "filepath_or_buffer"])?;
        if location.is_remote() {
            return Err(AdapterError::invalid(format!(
                "JSON documents are only supported on local paths, got {location}"
            ))
            .into());
        }
        Ok(Self {
            location,
            options: deserialize_params(&params)?,
        })
    }
}

impl DataLoader for JsonDocumentAdapter {
    type Value = Value;

    fn load_data(&self, _ctx: &IoContext) -> Result<(Value, Metadata)> {
        let path = self.local_path()?;
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let reader = reader_for(file, path, &self.options.compression)?;
        let doc: Value = serde_json::from_reader(reader)
            .with_context(|| format!("parse JSON document {}", path.display()))?;
        Ok((doc, file_metadata(&self.location)))
    }
}

impl DataSaver for JsonDocumentAdapter {
    type Value = Value;

    fn save_data(&self, doc: &Value, _ctx: &IoContext) -> Result<Metadata> {
        let path = self.local_path()?;
        create_parent_dirs(path)?;
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let mut sink = writer_for(file, path, &self.options.compression)?;
        if self.options.indent == 0 {
            serde_json::to_writer(&mut sink, doc)
        } else {
            let pad = " ".repeat(self.options.indent);
            let formatter = serde_json::ser::PrettyFormatter::with_indent(pad.as_bytes());
            doc.serialize(&mut serde_json::Serializer::with_formatter(&mut sink, formatter))
        }
        .with_context(|| format!("write JSON document {}", path.display()))?;
        sink.finish()
            .with_context(|| format!("finish {}", path.display()))?;
        Ok(file_metadata(&self.location))
    }
}
