//! Loader and saver contracts.
//!
//! A format is a type implementing [`Adapter`] plus one or both of [`DataLoader`]
//! and [`DataSaver`]. Adapters are plain data: they are built from a JSON
//! parameter object with [`Adapter::from_params`] and perform I/O only when
//! `load_data`/`save_data` is called, using the collaborators in an [`IoContext`].
//!
//! The registry stores adapters behind the object-safe [`ErasedLoader`] and
//! [`ErasedSaver`] traits, which are implemented for every loader and saver.

use crate::error::{AdapterError, ErrorKind};
use crate::io::{ArrowTableIo, TableIo};
use crate::metadata::Metadata;
use crate::tracking::TrackingClient;
use crate::type_token::{Partition, TypeTag};
use anyhow::Result;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;

/// Parameters an adapter is built from.
pub type Params = serde_json::Map<String, Value>;

/// Deserialize `params` into `T`, reporting failures as
/// [`ErrorKind::InvalidParameter`].
///
/// # Errors
/// Fails on unknown keys (when `T` denies them) or malformed values.
pub fn deserialize_params<T: DeserializeOwned>(params: &Params) -> Result<T> {
    serde_json::from_value(Value::Object(params.clone()))
        .map_err(|e| AdapterError::invalid(format!("invalid parameters: {e}")).into())
}

/// A named format.
pub trait Adapter: Sized + Send + Sync + 'static {
    /// The format name the adapter is registered under (`"csv"`, `"model"`, ...).
    fn name() -> &'static str;

    /// Build the adapter from its parameters. No I/O happens here.
    ///
    /// # Errors
    /// Fails with an [`AdapterError`] when the parameters are malformed.
    fn from_params(params: &Params) -> Result<Self>;
}

/// An adapter that can produce a value.
pub trait DataLoader: Adapter {
    type Value: Send + Sync + 'static;

    /// Types this loader is registered for.
    #[must_use]
    fn applicable_types() -> Vec<TypeTag> {
        vec![TypeTag::of::<Self::Value>()]
    }

    /// # Errors
    /// Returns the storage or library error unchanged.
    fn load_data(&self, ctx: &IoContext) -> Result<(Self::Value, Metadata)>;
}

/// An adapter that can persist a value.
pub trait DataSaver: Adapter {
    type Value: Send + Sync + 'static;

    /// Types this saver is registered for.
    #[must_use]
    fn applicable_types() -> Vec<TypeTag> {
        vec![TypeTag::of::<Self::Value>()]
    }

    /// # Errors
    /// Returns the storage or library error unchanged.
    fn save_data(&self, value: &Self::Value, ctx: &IoContext) -> Result<Metadata>;
}

/// Object-safe view of a [`DataLoader`].
pub trait ErasedLoader: Send + Sync {
    fn format_name(&self) -> &'static str;
    fn value_type(&self) -> TypeTag;

    /// # Errors
    /// Same as [`DataLoader::load_data`].
    fn load_erased(&self, ctx: &IoContext) -> Result<(Partition, Metadata)>;
}

impl<A: DataLoader> ErasedLoader for A {
    fn format_name(&self) -> &'static str {
        <A as Adapter>::name()
    }

    fn value_type(&self) -> TypeTag {
        TypeTag::of::<A::Value>()
    }

    fn load_erased(&self, ctx: &IoContext) -> Result<(Partition, Metadata)> {
        let (value, meta) = self.load_data(ctx)?;
        Ok((Box::new(value), meta))
    }
}

/// Object-safe view of a [`DataSaver`].
pub trait ErasedSaver: Send + Sync {
    fn format_name(&self) -> &'static str;
    fn value_type(&self) -> TypeTag;

    /// # Errors
    /// Fails with [`ErrorKind::TypeMismatch`] if `value` is not the saver's value type,
    /// otherwise as [`DataSaver::save_data`].
    fn save_erased(&self, value: &dyn Any, ctx: &IoContext) -> Result<Metadata>;
}

impl<A: DataSaver> ErasedSaver for A {
    fn format_name(&self) -> &'static str {
        <A as Adapter>::name()
    }

    fn value_type(&self) -> TypeTag {
        TypeTag::of::<A::Value>()
    }

    fn save_erased(&self, value: &dyn Any, ctx: &IoContext) -> Result<Metadata> {
        let value = value.downcast_ref::<A::Value>().ok_or_else(|| {
            AdapterError::new(
                ErrorKind::TypeMismatch,
                format!(
                    "{} saver expects a {}",
                    <A as Adapter>::name(),
                    TypeTag::of::<A::Value>()
                ),
            )
        })?;
        self.save_data(value, ctx)
    }
}

/// Collaborators available to adapters during a load or save.
#[derive(Clone)]
pub struct IoContext {
    table_io: Arc<dyn TableIo>,
    tracking: Option<Arc<dyn TrackingClient>>,
}

impl Default for IoContext {
    fn default() -> Self {
        Self {
            table_io: Arc::new(ArrowTableIo::new()),
            tracking: None,
        }
    }
}

impl IoContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_table_io(mut self, table_io: Arc<dyn TableIo>) -> Self {
        self.table_io = table_io;
        self
    }

    #[must_use]
    pub fn with_tracking(mut self, tracking: Arc<dyn TrackingClient>) -> Self {
        self.tracking = Some(tracking);
        self
    }

    #[must_use]
    pub fn table_io(&self) -> &dyn TableIo {
        self.table_io.as_ref()
    }

    /// The tracking client.
    ///
    /// # Errors
    /// Fails with [`ErrorKind::MissingCollaborator`] if none was configured.
    pub fn tracking(&self) -> Result<&dyn TrackingClient> {
        self.tracking.as_deref().ok_or_else(|| {
            AdapterError::missing("this adapter needs a tracking client; see IoContext::with_tracking")
                .into()
        })
    }
}
