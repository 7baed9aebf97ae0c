//! Declarative load and save requests.
//!
//! A [`LoadSpec`] or [`SaveSpec`] names a format, a registered value type and the
//! adapter parameters, so a request can live in a config file:
//!
//! ```json
//! { "format": "csv", "value_type": "dataframe", "params": { "path": "out/scores.csv" } }
//! ```
//!
//! Specs are executed against a registry; the value type name is looked up with
//! [`AdapterRegistry::resolve_type`].

use crate::adapter::{IoContext, Params};
use crate::error::{AdapterError, ErrorKind};
use crate::metadata::Metadata;
use crate::registry::AdapterRegistry;
use crate::type_token::{Partition, TypeTag};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::any::Any;

fn parse<T: for<'de> Deserialize<'de>>(text: &str, what: &str) -> Result<T> {
    serde_json::from_str(text)
        .map_err(|e| AdapterError::invalid(format!("invalid {what}: {e}")).into())
}

fn expect_type<T: 'static>(registry: &AdapterRegistry, value_type: &str) -> Result<TypeTag> {
    let ty = registry.resolve_type(value_type)?;
    if ty != TypeTag::of::<T>() {
        return Err(AdapterError::new(
            ErrorKind::TypeMismatch,
            format!(
                "value type '{value_type}' is {ty}, not {}",
                TypeTag::of::<T>()
            ),
        )
        .into());
    }
    Ok(ty)
}

/// A request to load a value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadSpec {
    pub format: String,
    pub value_type: String,
    #[serde(default)]
    pub params: Params,
}

impl LoadSpec {
    /// # Errors
    /// Fails with [`ErrorKind::InvalidParameter`] on malformed JSON.
    pub fn from_json(text: &str) -> Result<Self> {
        parse(text, "load spec")
    }

    /// Load as `T`, which must be the type registered as `value_type`.
    ///
    /// # Errors
    /// Fails with [`ErrorKind::TypeMismatch`] if `T` is not that type, or as
    /// [`AdapterRegistry::load`].
    pub fn load<T: Send + Sync + 'static>(
        &self,
        registry: &AdapterRegistry,
        ctx: &IoContext,
    ) -> Result<(T, Metadata)> {
        expect_type::<T>(registry, &self.value_type)?;
        registry.load::<T>(&self.format, &self.params, ctx)
    }

    /// Load without knowing the value type statically.
    ///
    /// # Errors
    /// Fails with [`ErrorKind::NotFound`] for an unknown type name or format.
    pub fn load_erased(
        &self,
        registry: &AdapterRegistry,
        ctx: &IoContext,
    ) -> Result<(Partition, Metadata)> {
        let ty = registry.resolve_type(&self.value_type)?;
        let loader = registry.resolve_loader(&self.format, ty)?.build(&self.params)?;
        loader.load_erased(ctx)
    }
}

/// A request to save a value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SaveSpec {
    pub format: String,
    pub value_type: String,
    #[serde(default)]
    pub params: Params,
}

impl SaveSpec {
    /// # Errors
    /// Fails with [`ErrorKind::InvalidParameter`] on malformed JSON.
    pub fn from_json(text: &str) -> Result<Self> {
        parse(text, "save spec")
    }

    /// # Errors
    /// Fails with [`ErrorKind::TypeMismatch`] if `T` is not the type registered as
    /// `value_type`, or as [`AdapterRegistry::save`].
    pub fn save<T: Send + Sync + 'static>(
        &self,
        value: &T,
        registry: &AdapterRegistry,
        ctx: &IoContext,
    ) -> Result<Metadata> {
        expect_type::<T>(registry, &self.value_type)?;
        registry.save(&self.format, &self.params, value, ctx)
    }

    /// Save a value whose type is only known at runtime.
    ///
    /// # Errors
    /// Fails with [`ErrorKind::TypeMismatch`] if `value` is not of `value_type`.
    pub fn save_erased(
        &self,
        value: &dyn Any,
        registry: &AdapterRegistry,
        ctx: &IoContext,
    ) -> Result<Metadata> {
        let ty = registry.resolve_type(&self.value_type)?;
        let saver = registry.resolve_saver(&self.format, ty)?.build(&self.params)?;
        saver.save_erased(value, ctx)
    }
}
