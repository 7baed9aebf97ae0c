//! The table library seen by adapters.
//!
//! Adapters never touch files directly. They hand a [`TableFormat`], a
//! [`Location`] and a sparse [`OptionSet`] to a [`TableIo`] implementation, which
//! owns the actual reading and writing. [`ArrowTableIo`] is the Arrow-backed
//! implementation; each format lives in its own submodule with a typed options
//! record that the sparse set is turned back into.
//!
//! Remote locations are served through an [`ObjectIO`] store: objects are spooled
//! into a temporary file, read or written with the local routine, and uploaded
//! again after a write.

use crate::error::AdapterError;
use crate::frame::DataFrame;
use crate::metadata::Location;
use crate::options::{from_option_set, OptionSet};
use anyhow::{Context, Result};
use std::fmt;
use std::fs::create_dir_all;
use std::path::Path;
use std::sync::Arc;

pub mod compression;
pub mod csv;
pub mod feather;
pub mod json;
pub mod object;
#[cfg_attr(docsrs, doc(cfg(feature = "io-parquet")))]
#[cfg(feature = "io-parquet")]
pub mod parquet;
pub mod pickle;

use object::ObjectIO;

/// Table formats understood by a [`TableIo`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TableFormat {
    Csv,
    Feather,
    Parquet,
    Pickle,
    Json,
}

impl TableFormat {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Feather => "feather",
            Self::Parquet => "parquet",
            Self::Pickle => "pickle",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reads and writes frames.
///
/// `options` only contains keys the caller set to a non-default value; the
/// implementation applies its own defaults for everything else.
pub trait TableIo: Send + Sync {
    /// # Errors
    /// Misconfigured options fail before any I/O; storage and decoding errors are
    /// returned as produced by the underlying library.
    fn read(&self, format: TableFormat, location: &Location, options: &OptionSet)
        -> Result<DataFrame>;

    /// # Errors
    /// Misconfigured options fail before any I/O; storage and encoding errors are
    /// returned as produced by the underlying library.
    fn write(
        &self,
        format: TableFormat,
        frame: &DataFrame,
        location: &Location,
        options: &OptionSet,
    ) -> Result<()>;
}

/// Arrow-backed [`TableIo`].
#[derive(Clone, Default)]
pub struct ArrowTableIo {
    objects: Option<Arc<dyn ObjectIO>>,
}

impl ArrowTableIo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve remote locations from `store`.
    #[must_use]
    pub fn with_object_store(mut self, store: Arc<dyn ObjectIO>) -> Self {
        self.objects = Some(store);
        self
    }

    fn store(&self, location: &Location) -> Result<&dyn ObjectIO> {
        self.objects.as_deref().ok_or_else(|| {
            AdapterError::missing(format!(
                "no object store configured for remote location {location}"
            ))
            .into()
        })
    }
}

impl TableIo for ArrowTableIo {
    fn read(
        &self,
        format: TableFormat,
        location: &Location,
        options: &OptionSet,
    ) -> Result<DataFrame> {
        check_options(format, Direction::Read, location, options)?;
        match location {
            Location::Local(path) => read_local(format, path, options),
            Location::Remote { bucket, key, .. } => {
                let store = self.store(location)?;
                let bytes = store
                    .get_object(bucket, key)
                    .with_context(|| format!("download {location}"))?;
                let spool = spool_file(key)?;
                std::fs::write(spool.path(), bytes)
                    .with_context(|| format!("spool {location}"))?;
                tracing::debug!(%location, format = %format, "reading spooled remote object");
                read_local(format, spool.path(), options)
            }
        }
    }

    fn write(
        &self,
        format: TableFormat,
        frame: &DataFrame,
        location: &Location,
        options: &OptionSet,
    ) -> Result<()> {
        check_options(format, Direction::Write, location, options)?;
        match location {
            Location::Local(path) => write_local(format, frame, path, options),
            Location::Remote { bucket, key, .. } => {
                let store = self.store(location)?;
                let spool = spool_file(key)?;
                let appending = options.get("mode").and_then(|m| m.as_str()) == Some("a");
                if appending && store.object_exists(bucket, key)? {
                    let existing = store.get_object(bucket, key)?;
                    std::fs::write(spool.path(), existing)
                        .with_context(|| format!("spool {location}"))?;
                }
                write_local(format, frame, spool.path(), options)?;
                let bytes = std::fs::read(spool.path())
                    .with_context(|| format!("read spooled {location}"))?;
                tracing::debug!(
                    %location,
                    format = %format,
                    bytes = bytes.len(),
                    "uploading spooled object"
                );
                store
                    .put_object(bucket, key, &bytes)
                    .with_context(|| format!("upload {location}"))
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Read,
    Write,
}

/// `storage_options` only apply to remote URLs.
///
/// # Errors
/// Fails with [`ErrorKind::InvalidParameter`](crate::ErrorKind::InvalidParameter)
/// when a local location carries a non-null `storage_options` entry.
pub(crate) fn check_storage_options(
    location: &Location,
    options: &OptionSet,
) -> Result<(), AdapterError> {
    let given = options
        .get("storage_options")
        .is_some_and(|v| !v.is_null());
    if given && !location.is_remote() {
        return Err(AdapterError::invalid(format!(
            "storage_options passed with a local path ({location}); only remote URLs accept them"
        )));
    }
    Ok(())
}

/// Reject options that can never work, before any storage is touched.
fn check_options(
    format: TableFormat,
    direction: Direction,
    location: &Location,
    options: &OptionSet,
) -> Result<()> {
    check_storage_options(location, options)?;
    match (format, direction) {
        (TableFormat::Csv, _) => from_option_set::<csv::CsvOptions>(options).map(drop),
        (TableFormat::Feather, _) => from_option_set::<feather::FeatherOptions>(options).map(drop),
        #[cfg(feature = "io-parquet")]
        (TableFormat::Parquet, _) => from_option_set::<parquet::ParquetOptions>(options).map(drop),
        #[cfg(not(feature = "io-parquet"))]
        (TableFormat::Parquet, _) => Err(AdapterError::invalid(
            "parquet support requires the `io-parquet` feature",
        )
        .into()),
        (TableFormat::Pickle, Direction::Read) => {
            from_option_set::<pickle::PickleReadOptions>(options).map(drop)
        }
        (TableFormat::Pickle, Direction::Write) => {
            from_option_set::<pickle::PickleWriteOptions>(options).map(drop)
        }
        (TableFormat::Json, Direction::Read) => {
            Ok(from_option_set::<json::JsonReadOptions>(options)?.validate()?)
        }
        (TableFormat::Json, Direction::Write) => {
            Ok(from_option_set::<json::JsonWriteOptions>(options)?.validate()?)
        }
    }
}

fn read_local(format: TableFormat, path: &Path, options: &OptionSet) -> Result<DataFrame> {
    match format {
        TableFormat::Csv => csv::read_csv(path, &from_option_set(options)?),
        TableFormat::Feather => feather::read_feather(path, &from_option_set(options)?),
        #[cfg(feature = "io-parquet")]
        TableFormat::Parquet => parquet::read_parquet(path, &from_option_set(options)?),
        #[cfg(not(feature = "io-parquet"))]
        TableFormat::Parquet => Err(AdapterError::invalid(
            "parquet support requires the `io-parquet` feature",
        )
        .into()),
        TableFormat::Pickle => pickle::read_pickle(path, &from_option_set(options)?),
        TableFormat::Json => json::read_json(path, &from_option_set(options)?),
    }
}

fn write_local(
    format: TableFormat,
    frame: &DataFrame,
    path: &Path,
    options: &OptionSet,
) -> Result<()> {
    match format {
        TableFormat::Csv => csv::write_csv(frame, path, &from_option_set(options)?),
        TableFormat::Feather => feather::write_feather(frame, path, &from_option_set(options)?),
        #[cfg(feature = "io-parquet")]
        TableFormat::Parquet => parquet::write_parquet(frame, path, &from_option_set(options)?),
        #[cfg(not(feature = "io-parquet"))]
        TableFormat::Parquet => Err(AdapterError::invalid(
            "parquet support requires the `io-parquet` feature",
        )
        .into()),
        TableFormat::Pickle => pickle::write_pickle(frame, path, &from_option_set(options)?),
        TableFormat::Json => json::write_json(frame, path, &from_option_set(options)?),
    }
}

/// A temporary file whose suffix matches the object key, so extension-based
/// codec detection still works on the spooled copy.
fn spool_file(key: &str) -> Result<tempfile::NamedTempFile> {
    let name = key.rsplit('/').next().unwrap_or(key);
    let suffix = name.find('.').map_or("", |i| &name[i..]);
    tempfile::Builder::new()
        .prefix("ironadapt-")
        .suffix(suffix)
        .tempfile()
        .context("create spool file")
}

/// Create the parent directory of `path` if it has one.
pub(crate) fn create_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    }
    Ok(())
}
