//! Feather files, i.e. the Arrow IPC file format.

use crate::frame::DataFrame;
use crate::io::create_parent_dirs;
use anyhow::{Context, Result};
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::{FileWriter, IpcWriteOptions};
use arrow::ipc::CompressionType;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Buffer compression inside the IPC file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatherCompression {
    #[default]
    Uncompressed,
    Lz4,
    Zstd,
}

/// Options understood by [`read_feather`] and [`write_feather`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeatherOptions {
    pub compression: FeatherCompression,
    pub storage_options: Option<BTreeMap<String, serde_json::Value>>,
}

/// Read an Arrow IPC file.
///
/// # Errors
/// Returns an error if the file cannot be opened or is not a valid IPC file.
pub fn read_feather(path: &Path, _options: &FeatherOptions) -> Result<DataFrame> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = FileReader::try_new(file, None)
        .with_context(|| format!("open Arrow IPC file {}", path.display()))?;
    let schema = reader.schema();
    let batches = reader
        .collect::<Result<Vec<RecordBatch>, _>>()
        .context("read IPC batches")?;
    DataFrame::from_batches(schema, &batches)
}

/// Write `frame` as an Arrow IPC file.
///
/// # Errors
/// Returns an error if the file cannot be created or the writer fails.
pub fn write_feather(frame: &DataFrame, path: &Path, options: &FeatherOptions) -> Result<()> {
    create_parent_dirs(path)?;
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let codec = match options.compression {
        FeatherCompression::Uncompressed => None,
        FeatherCompression::Lz4 => Some(CompressionType::LZ4_FRAME),
        FeatherCompression::Zstd => Some(CompressionType::ZSTD),
    };
    let ipc_options = IpcWriteOptions::default()
        .try_with_compression(codec)
        .context("configure IPC compression")?;

    let mut writer =
        FileWriter::try_new_with_options(BufWriter::new(file), &frame.schema(), ipc_options)
            .context("create IPC FileWriter")?;
    writer.write(frame.batch()).context("write IPC batch")?;
    writer.finish().context("finish IPC file")?;
    Ok(())
}
