//! Binary snapshots of a frame.
//!
//! A snapshot is the Arrow IPC *stream* format, optionally wrapped in a
//! compression codec (see [`crate::io::compression`]). The protocol number selects
//! the IPC metadata version; 5 is the newest stable one and the default.

use crate::error::AdapterError;
use crate::frame::DataFrame;
use crate::io::compression::{reader_for, writer_for, Compression, FinishWrite};
use crate::io::create_parent_dirs;
use anyhow::{Context, Result};
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::{IpcWriteOptions, StreamWriter};
use arrow::ipc::MetadataVersion;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

pub const HIGHEST_PROTOCOL: u8 = 5;

/// Snapshot protocol: 4 or 5.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Protocol(u8);

impl Protocol {
    fn metadata_version(self) -> MetadataVersion {
        if self.0 == 4 {
            MetadataVersion::V4
        } else {
            MetadataVersion::V5
        }
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self(HIGHEST_PROTOCOL)
    }
}

impl TryFrom<u8> for Protocol {
    type Error = AdapterError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        if (4..=HIGHEST_PROTOCOL).contains(&n) {
            Ok(Self(n))
        } else {
            Err(AdapterError::invalid(format!(
                "unsupported snapshot protocol {n}; expected 4 or {HIGHEST_PROTOCOL}"
            )))
        }
    }
}

impl From<Protocol> for u8 {
    fn from(p: Protocol) -> Self {
        p.0
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PickleReadOptions {
    pub compression: Compression,
    pub storage_options: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PickleWriteOptions {
    pub compression: Compression,
    pub protocol: Protocol,
    pub storage_options: Option<BTreeMap<String, serde_json::Value>>,
}

/// Read a snapshot written by [`write_pickle`].
///
/// # Errors
/// Returns an error if the file cannot be opened, decompressed, or decoded.
pub fn read_pickle(path: &Path, options: &PickleReadOptions) -> Result<DataFrame> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = reader_for(file, path, &options.compression)?;
    let reader = StreamReader::try_new(reader, None)
        .with_context(|| format!("open IPC stream {}", path.display()))?;
    let schema = reader.schema();
    let batches = reader
        .collect::<Result<Vec<RecordBatch>, _>>()
        .context("read IPC stream batches")?;
    DataFrame::from_batches(schema, &batches)
}

/// Write `frame` as a (possibly compressed) snapshot.
///
/// # Errors
/// Returns an error if the file cannot be created or encoding fails.
pub fn write_pickle(frame: &DataFrame, path: &Path, options: &PickleWriteOptions) -> Result<()> {
    create_parent_dirs(path)?;
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let sink = writer_for(file, path, &options.compression)?;

    let ipc_options = IpcWriteOptions::try_new(8, false, options.protocol.metadata_version())
        .context("configure IPC stream")?;
    let mut writer = StreamWriter::try_new_with_options(sink, &frame.schema(), ipc_options)
        .context("create IPC StreamWriter")?;
    writer.write(frame.batch()).context("write IPC batch")?;
    writer.finish().context("finish IPC stream")?;
    writer
        .into_inner()
        .context("release snapshot writer")?
        .finish()
        .context("finish snapshot")?;
    Ok(())
}
