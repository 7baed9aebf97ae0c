//! Temporary directories and a recording table backend.

use crate::frame::DataFrame;
use crate::io::{ArrowTableIo, TableFormat, TableIo};
use crate::metadata::Location;
use crate::options::OptionSet;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::TempDir;

/// A temporary directory that is automatically deleted when dropped.
pub struct TempDirPath {
    #[allow(dead_code)]
    temp_dir: TempDir,
    path: PathBuf,
}

impl TempDirPath {
    /// Create a new temporary directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().to_path_buf();
        Ok(Self { temp_dir, path })
    }

    /// Get the path to the temporary directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A path inside the directory, as a string suitable for adapter parameters.
    #[must_use]
    pub fn file(&self, name: &str) -> String {
        self.path.join(name).to_string_lossy().into_owned()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableOp {
    Read,
    Write,
}

/// One call observed by [`RecordingTableIo`].
#[derive(Clone, Debug, PartialEq)]
pub struct TableCall {
    pub op: TableOp,
    pub format: TableFormat,
    pub location: Location,
    pub options: OptionSet,
}

/// A [`TableIo`] that records every call before delegating to an
/// [`ArrowTableIo`].
///
/// Use it to check which options an adapter actually passes on.
#[derive(Default)]
pub struct RecordingTableIo {
    inner: ArrowTableIo,
    calls: Mutex<Vec<TableCall>>,
}

impl RecordingTableIo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delegate to `inner`, e.g. one with an object store attached.
    #[must_use]
    pub fn with_inner(inner: ArrowTableIo) -> Self {
        Self {
            inner,
            calls: Mutex::default(),
        }
    }

    /// All calls so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<TableCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn last_call(&self) -> Option<TableCall> {
        self.calls().pop()
    }

    fn record(&self, op: TableOp, format: TableFormat, location: &Location, options: &OptionSet) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(TableCall {
                op,
                format,
                location: location.clone(),
                options: options.clone(),
            });
    }
}

impl TableIo for RecordingTableIo {
    fn read(
        &self,
        format: TableFormat,
        location: &Location,
        options: &OptionSet,
    ) -> Result<DataFrame> {
        self.record(TableOp::Read, format, location, options);
        self.inner.read(format, location, options)
    }

    fn write(
        &self,
        format: TableFormat,
        frame: &DataFrame,
        location: &Location,
        options: &OptionSet,
    ) -> Result<()> {
        self.record(TableOp::Write, format, location, options);
        self.inner.write(format, frame, location, options)
    }
}
