//! Built-in adapters.
//!
//! | adapter                 | format    | slots       | value                 |
//! |-------------------------|-----------|-------------|-----------------------|
//! | [`CsvAdapter`]          | `csv`     | load + save | [`DataFrame`]         |
//! | [`FeatherAdapter`]      | `feather` | load + save | [`DataFrame`]         |
//! | [`ParquetAdapter`]      | `parquet` | load + save | [`DataFrame`]         |
//! | [`PickleReader`]        | `pickle`  | load        | [`DataFrame`]         |
//! | [`PickleWriter`]        | `pickle`  | save        | [`DataFrame`]         |
//! | [`JsonReader`]          | `json`    | load        | [`DataFrame`]         |
//! | [`JsonWriter`]          | `json`    | save        | [`DataFrame`]         |
//! | [`JsonDocumentAdapter`] | `json`    | load + save | `serde_json::Value`   |
//! | [`ModelLoader`]         | `model`   | load        | any [`Model`]         |
//! | [`ModelSaver`]          | `model`   | save        | any [`Model`]         |
//!
//! [`DataFrame`]: crate::DataFrame
//! [`Model`]: crate::models::Model

use crate::adapter::Params;
use crate::error::AdapterError;
use crate::frame::DataFrame;
use crate::metadata::Location;
use crate::models::LinearModel;
use crate::registry::AdapterRegistry;
use crate::type_token::TypeTag;
use anyhow::Result;
use serde_json::Value;

mod document;
mod model;
mod table;

pub use document::{DocumentOptions, JsonDocumentAdapter};
pub use model::{LoadMode, ModelLoader, ModelSaver};
#[cfg(feature = "io-parquet")]
pub use table::ParquetAdapter;
pub use table::{
    CsvAdapter, FeatherAdapter, JsonReader, JsonWriter, PickleReader, PickleWriter,
};

/// Library name used when registering the built-in value types.
pub const BUILTIN_LIBRARY: &str = "ironadapt";

/// Location keys accepted by loaders.
pub(crate) const SOURCE_KEYS: &[&str] = &["path", "source", "filepath_or_buffer"];
/// Location keys accepted by savers.
pub(crate) const DESTINATION_KEYS: &[&str] = &["path", "destination", "filepath_or_buffer"];

/// Remove the location parameter from `params`, accepting any one of `keys`.
pub(crate) fn take_location(params: &mut Params, keys: &[&str]) -> Result<Location, AdapterError> {
    let present: Vec<&str> = keys
        .iter()
        .copied()
        .filter(|k| params.contains_key(*k))
        .collect();
    let key = match present.as_slice() {
        [key] => *key,
        [] => {
            return Err(AdapterError::invalid(format!(
                "missing required location parameter (one of: {})",
                keys.join(", ")
            )));
        }
        several => {
            return Err(AdapterError::invalid(format!(
                "location given more than once: {}",
                several.join(", ")
            )));
        }
    };
    match params.remove(key) {
        Some(Value::String(raw)) if !raw.trim().is_empty() => Ok(Location::parse(&raw)),
        Some(other) => Err(AdapterError::invalid(format!(
            "'{key}' must be a non-empty string, got {other}"
        ))),
        None => Err(AdapterError::invalid(format!("missing '{key}'"))),
    }
}

/// Register every built-in value type and adapter.
///
/// Safe to call more than once on the same registry.
///
/// # Errors
/// Fails with [`ErrorKind::Duplicate`](crate::ErrorKind::Duplicate) if a different
/// adapter already occupies one of the built-in keys.
pub fn register_all_builtins(registry: &AdapterRegistry) -> Result<()> {
    registry.register_types(
        BUILTIN_LIBRARY,
        &[
            ("dataframe", TypeTag::of::<DataFrame>()),
            ("json", TypeTag::of::<Value>()),
            ("linear_model", TypeTag::of::<LinearModel>()),
        ],
    )?;

    registry.register_adapter::<CsvAdapter>()?;
    registry.register_adapter::<FeatherAdapter>()?;
    #[cfg(feature = "io-parquet")]
    registry.register_adapter::<ParquetAdapter>()?;
    registry.register_loader::<PickleReader>()?;
    registry.register_saver::<PickleWriter>()?;
    registry.register_loader::<JsonReader>()?;
    registry.register_saver::<JsonWriter>()?;
    registry.register_adapter::<JsonDocumentAdapter>()?;
    registry.register_loader::<ModelLoader<LinearModel>>()?;
    registry.register_saver::<ModelSaver<LinearModel>>()?;
    tracing::debug!("built-in adapters registered");
    Ok(())
}
