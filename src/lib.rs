//! # Ironadapt
//!
//! **Pluggable load/save adapters** for the nodes of a dataflow. A node asks for a
//! value by format name and value type; an [`AdapterRegistry`] finds the adapter
//! registered under that pair, builds it from a JSON parameter object and runs it
//! against the collaborators bundled in an [`IoContext`].
//!
//! ## Key Features
//!
//! - **Registry keyed by (format, type)** - `"json"` loads a [`DataFrame`] or a
//!   `serde_json::Value` depending on what the caller asks for
//! - **Separate loader and saver contracts** - [`DataLoader`] and [`DataSaver`]
//! - **Table formats** - CSV, Feather, Parquet, pickle-style snapshots and JSON,
//!   backed by Arrow
//! - **Sparse options** - only parameters that differ from their defaults reach the
//!   table library ([`options::sparse_options`])
//! - **Tracked models** - save and load models through a [`tracking::TrackingClient`]
//!   with runs, a model registry and aliases
//! - **Metadata** - every load and save reports file facts about its location
//!
//! ## Quick Start
//!
//! ```no_run
//! use ironadapt::*;
//! use serde_json::json;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let registry = AdapterRegistry::new();
//! register_all_builtins(&registry)?;
//! let ctx = IoContext::default();
//!
//! let source = params(json!({ "path": "data/scores.csv" }))?;
//! let (frame, metadata) = registry.load::<DataFrame>("csv", &source, &ctx)?;
//! println!("{} rows, {} bytes", frame.num_rows(), metadata["size_bytes"]);
//!
//! let out = params(json!({ "path": "out/scores.json", "orient": "records" }))?;
//! registry.save("json", &out, &frame, &ctx)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! Misconfiguration (an unregistered pair, malformed parameters, ambiguous model
//! resolution, a run conflict) is reported as an [`AdapterError`] inside the
//! `anyhow::Error`, before any I/O happens. Use [`error_kind`] to tell the kinds
//! apart. Library and storage errors pass through untouched.
//!
//! ## Module Overview
//!
//! - [`registry`] - The (format, type) registry
//! - [`adapter`] - Loader and saver contracts, parameters and [`IoContext`]
//! - [`adapters`] - Built-in adapters and [`register_all_builtins`]
//! - [`io`] - The Arrow table backend, compression codecs and object storage
//! - [`tracking`] - Runs, model artifacts and the model registry
//! - [`materialize`] - Load and save requests described as JSON
//! - [`testing`] - Fixtures, assertions and a recording backend for tests

pub mod adapter;
pub mod adapters;
pub mod error;
pub mod frame;
pub mod io;
pub mod materialize;
pub mod metadata;
pub mod models;
pub mod options;
pub mod registry;
pub mod testing;
pub mod tracking;
pub mod type_token;

pub use adapter::{Adapter, DataLoader, DataSaver, IoContext, Params};
pub use adapters::register_all_builtins;
pub use error::{error_kind, is_misconfiguration, AdapterError, ErrorKind};
pub use frame::{DataFrame, ScalarValue};
pub use io::{ArrowTableIo, TableFormat, TableIo};
pub use materialize::{LoadSpec, SaveSpec};
pub use metadata::{file_metadata, Location, Metadata};
pub use models::{Flavor, LinearModel, Model};
pub use registry::AdapterRegistry;
pub use tracking::{FileTracking, ModelUri, TrackingClient};
pub use type_token::{Partition, TypeTag};

/// Turn a JSON object literal into adapter [`Params`].
///
/// # Errors
/// Fails with [`ErrorKind::InvalidParameter`] if `value` is not an object.
pub fn params(value: serde_json::Value) -> anyhow::Result<Params> {
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(AdapterError::invalid(format!(
            "adapter parameters must be a JSON object, got {other}"
        ))
        .into()),
    }
}
