//! Adapters moving [`DataFrame`]s through the table backend.
//!
//! Each adapter is a location plus a typed options record. On load/save the
//! record is compacted with [`sparse_options`], so only options that differ from
//! their defaults reach the backend.

use super::{take_location, DESTINATION_KEYS, SOURCE_KEYS};
use crate::adapter::{deserialize_params, Adapter, DataLoader, DataSaver, IoContext, Params};
use crate::frame::DataFrame;
use crate::io::csv::CsvOptions;
use crate::io::feather::FeatherOptions;
use crate::io::json::{JsonReadOptions, JsonWriteOptions};
#[cfg(feature = "io-parquet")]
use crate::io::parquet::ParquetOptions;
use crate::io::pickle::{PickleReadOptions, PickleWriteOptions};
use crate::io::{check_storage_options, TableFormat};
use crate::metadata::{file_metadata, Location, Metadata};
use crate::options::sparse_options;
use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;

/// Location keys for adapters serving both directions.
const PATH_KEYS: &[&str] = &["path", "filepath_or_buffer"];

fn table_params<O: DeserializeOwned>(params: &Params, keys: &[&str]) -> Result<(Location, O)> {
    let mut params = params.clone();
    let location = take_location(&mut params, keys)?;
    check_storage_options(&location, &params)?;
    let options = deserialize_params(&params)?;
    Ok((location, options))
}

fn frame_metadata(location: &Location, frame: &DataFrame) -> Metadata {
    let mut meta = file_metadata(location);
    meta.insert("rows".into(), json!(frame.num_rows()));
    meta.insert("columns".into(), json!(frame.num_columns()));
    meta
}

fn load_table<O: Serialize + Default>(
    ctx: &IoContext,
    format: TableFormat,
    location: &Location,
    options: &O,
) -> Result<(DataFrame, Metadata)> {
    let options = sparse_options(options)?;
    tracing::debug!(
        %format,
        %location,
        options = ?options.keys().collect::<Vec<_>>(),
        "loading table"
    );
    let frame = ctx.table_io().read(format, location, &options)?;
    let meta = frame_metadata(location, &frame);
    Ok((frame, meta))
}

fn save_table<O: Serialize + Default>(
    ctx: &IoContext,
    format: TableFormat,
    frame: &DataFrame,
    location: &Location,
    options: &O,
) -> Result<Metadata> {
    let options = sparse_options(options)?;
    tracing::debug!(
        %format,
        %location,
        options = ?options.keys().collect::<Vec<_>>(),
        "saving table"
    );
    ctx.table_io().write(format, frame, location, &options)?;
    Ok(frame_metadata(location, frame))
}

/// CSV files with a header row.
#[derive(Clone, Debug, PartialEq)]
pub struct CsvAdapter {
    pub location: Location,
    pub options: CsvOptions,
}

impl Adapter for CsvAdapter {
    fn name() -> &'static str {
        "csv"
    }

    fn from_params(params: &Params) -> Result<Self> {
        let (location, options) = table_params(params, PATH_KEYS)?;
        Ok(Self { location, options })
    }
}

impl DataLoader for CsvAdapter {
    type Value = DataFrame;

    fn load_data(&self, ctx: &IoContext) -> Result<(DataFrame, Metadata)> {
        load_table(ctx, TableFormat::Csv, &self.location, &self.options)
    }
}

impl DataSaver for CsvAdapter {
    type Value = DataFrame;

    fn save_data(&self, frame: &DataFrame, ctx: &IoContext) -> Result<Metadata> {
        save_table(ctx, TableFormat::Csv, frame, &self.location, &self.options)
    }
}

/// Arrow IPC files.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatherAdapter {
    pub location: Location,
    pub options: FeatherOptions,
}

impl Adapter for FeatherAdapter {
    fn name() -> &'static str {
        "feather"
    }

    fn from_params(params: &Params) -> Result<Self> {
        let (location, options) = table_params(params, PATH_KEYS)?;
        Ok(Self { location, options })
    }
}

impl DataLoader for FeatherAdapter {
    type Value = DataFrame;

    fn load_data(&self, ctx: &IoContext) -> Result<(DataFrame, Metadata)> {
        load_table(ctx, TableFormat::Feather, &self.location, &self.options)
    }
}

impl DataSaver for FeatherAdapter {
    type Value = DataFrame;

    fn save_data(&self, frame: &DataFrame, ctx: &IoContext) -> Result<Metadata> {
        save_table(ctx, TableFormat::Feather, frame, &self.location, &self.options)
    }
}

#[cfg(feature = "io-parquet")]
#[derive(Clone, Debug, PartialEq)]
pub struct ParquetAdapter {
    pub location: Location,
    pub options: ParquetOptions,
}

#[cfg(feature = "io-parquet")]
impl Adapter for ParquetAdapter {
    fn name() -> &'static str {
        "parquet"
    }

    fn from_params(params: &Params) -> Result<Self> {
        let (location, options) = table_params(params, PATH_KEYS)?;
        Ok(Self { location, options })
    }
}

#[cfg(feature = "io-parquet")]
impl DataLoader for ParquetAdapter {
    type Value = DataFrame;

    fn load_data(&self, ctx: &IoContext) -> Result<(DataFrame, Metadata)> {
        load_table(ctx, TableFormat::Parquet, &self.location, &self.options)
    }
}

#[cfg(feature = "io-parquet")]
impl DataSaver for ParquetAdapter {
    type Value = DataFrame;

    fn save_data(&self, frame: &DataFrame, ctx: &IoContext) -> Result<Metadata> {
        save_table(ctx, TableFormat::Parquet, frame, &self.location, &self.options)
    }
}

/// Reads binary frame snapshots.
#[derive(Clone, Debug, PartialEq)]
pub struct PickleReader {
    pub location: Location,
    pub options: PickleReadOptions,
}

impl Adapter for PickleReader {
    fn name() -> &'static str {
        "pickle"
    }

    fn from_params(params: &Params) -> Result<Self> {
        let (location, options) = table_params(params, SOURCE_KEYS)?;
        Ok(Self { location, options })
    }
}

impl DataLoader for PickleReader {
    type Value = DataFrame;

    fn load_data(&self, ctx: &IoContext) -> Result<(DataFrame, Metadata)> {
        load_table(ctx, TableFormat::Pickle, &self.location, &self.options)
    }
}

/// Writes binary frame snapshots.
#[derive(Clone, Debug, PartialEq)]
pub struct PickleWriter {
    pub location: Location,
    pub options: PickleWriteOptions,
}

impl Adapter for PickleWriter {
    fn name() -> &'static str {
        "pickle"
    }

    fn from_params(params: &Params) -> Result<Self> {
        let (location, options) = table_params(params, DESTINATION_KEYS)?;
        Ok(Self { location, options })
    }
}

impl DataSaver for PickleWriter {
    type Value = DataFrame;

    fn save_data(&self, frame: &DataFrame, ctx: &IoContext) -> Result<Metadata> {
        save_table(ctx, TableFormat::Pickle, frame, &self.location, &self.options)
    }
}

/// Reads JSON tables in any orient.
#[derive(Clone, Debug, PartialEq)]
pub struct JsonReader {
    pub location: Location,
    pub options: JsonReadOptions,
}

impl Adapter for JsonReader {
    fn name() -> &'static str {
        "json"
    }

    fn from_params(params: &Params) -> Result<Self> {
        let (location, options): (Location, JsonReadOptions) = table_params(params, SOURCE_KEYS)?;
        options.validate()?;
        Ok(Self { location, options })
    }
}

impl DataLoader for JsonReader {
    type Value = DataFrame;

    fn load_data(&self, ctx: &IoContext) -> Result<(DataFrame, Metadata)> {
        load_table(ctx, TableFormat::Json, &self.location, &self.options)
    }
}

/// Writes JSON tables in any orient.
#[derive(Clone, Debug, PartialEq)]
pub struct JsonWriter {
    pub location: Location,
    pub options: JsonWriteOptions,
}

impl Adapter for JsonWriter {
    fn name() -> &'static str {
        "json"
    }

    fn from_params(params: &Params) -> Result<Self> {
        let (location, options): (Location, JsonWriteOptions) =
            table_params(params, DESTINATION_KEYS)?;
        options.validate()?;
        Ok(Self { location, options })
    }
}

impl DataSaver for JsonWriter {
    type Value = DataFrame;

    fn save_data(&self, frame: &DataFrame, ctx: &IoContext) -> Result<Metadata> {
        save_table(ctx, TableFormat::Json, frame, &self.location, &self.options)
    }
}
