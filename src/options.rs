//! Sparse option sets.
//!
//! Adapters hold their optional parameters in a typed record with declared defaults.
//! Before calling into the table library, the record is compacted with
//! [`sparse_options`]: only fields that are set *and* differ from the declared
//! default survive. An adapter left at its defaults therefore passes no options at
//! all, and the library's own defaults apply.
//!
//! The library side turns the sparse set back into a typed record with
//! [`from_option_set`]; absent keys take their defaults again and unknown keys are
//! rejected.

use crate::error::AdapterError;
use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

/// Keyword options passed to a library routine.
pub type OptionSet = Map<String, Value>;

/// Compact `record` into the fields that differ from `O::default()`.
///
/// Null fields (unset `Option`s) are dropped as well.
///
/// # Errors
/// Returns an error if `O` does not serialize to a JSON object.
pub fn sparse_options<O: Serialize + Default>(record: &O) -> Result<OptionSet> {
    let current = as_object(record).context("serialize option record")?;
    let defaults = as_object(&O::default()).context("serialize option defaults")?;

    Ok(current
        .into_iter()
        .filter(|(key, value)| !value.is_null() && defaults.get(key) != Some(value))
        .collect())
}

/// Rebuild a typed record from a sparse option set.
///
/// # Errors
/// Fails with [`ErrorKind::InvalidParameter`](crate::ErrorKind::InvalidParameter) if
/// a key is unknown or a value has the wrong shape.
pub fn from_option_set<O: DeserializeOwned>(options: &OptionSet) -> Result<O> {
    serde_json::from_value(Value::Object(options.clone()))
        .map_err(|e| AdapterError::invalid(format!("invalid options: {e}")).into())
}

fn as_object<O: Serialize>(record: &O) -> Result<OptionSet> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("option record serialized to {other}, expected an object"),
    }
}
