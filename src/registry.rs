//! Format registry keyed by `(format name, value type)`.
//!
//! The registry is an ordinary value: construct one with [`AdapterRegistry::new`],
//! fill it with [`register_all_builtins`](crate::register_all_builtins) and/or
//! your own adapters, and share it by reference. All tables sit behind one
//! `RwLock`, so registration and lookup can happen from any thread.
//!
//! Loaders and savers live in separate slots. A format that supports both
//! directions registers under both with [`AdapterRegistry::register_adapter`].
//!
//! Registering the same adapter type twice under a key is a no-op, which keeps
//! repeated initialization harmless. Registering a *different* adapter under an
//! occupied key fails with [`ErrorKind::Duplicate`] and changes nothing.

use crate::adapter::{DataLoader, DataSaver, ErasedLoader, ErasedSaver, IoContext, Params};
use crate::error::{AdapterError, ErrorKind};
use crate::metadata::Metadata;
use crate::type_token::TypeTag;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

type Key = (String, TypeTag);

fn build_loader<A: DataLoader>(params: &Params) -> Result<Box<dyn ErasedLoader>> {
    Ok(Box::new(A::from_params(params)?))
}

fn build_saver<A: DataSaver>(params: &Params) -> Result<Box<dyn ErasedSaver>> {
    Ok(Box::new(A::from_params(params)?))
}

/// A registered loader.
#[derive(Clone, Debug)]
pub struct LoaderEntry {
    name: &'static str,
    value_type: TypeTag,
    adapter: TypeTag,
    build: fn(&Params) -> Result<Box<dyn ErasedLoader>>,
}

impl LoaderEntry {
    fn of<A: DataLoader>(value_type: TypeTag) -> Self {
        Self {
            name: A::name(),
            value_type,
            adapter: TypeTag::of::<A>(),
            build: build_loader::<A>,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn value_type(&self) -> TypeTag {
        self.value_type
    }

    /// The concrete adapter type.
    #[must_use]
    pub fn adapter(&self) -> TypeTag {
        self.adapter
    }

    /// Construct the loader from `params`.
    ///
    /// # Errors
    /// Fails with an [`AdapterError`] if the parameters are malformed.
    pub fn build(&self, params: &Params) -> Result<Box<dyn ErasedLoader>> {
        (self.build)(params)
    }
}

/// A registered saver.
#[derive(Clone, Debug)]
pub struct SaverEntry {
    name: &'static str,
    value_type: TypeTag,
    adapter: TypeTag,
    build: fn(&Params) -> Result<Box<dyn ErasedSaver>>,
}

impl SaverEntry {
    fn of<A: DataSaver>(value_type: TypeTag) -> Self {
        Self {
            name: A::name(),
            value_type,
            adapter: TypeTag::of::<A>(),
            build: build_saver::<A>,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn value_type(&self) -> TypeTag {
        self.value_type
    }

    /// The concrete adapter type.
    #[must_use]
    pub fn adapter(&self) -> TypeTag {
        self.adapter
    }

    /// Construct the saver from `params`.
    ///
    /// # Errors
    /// Fails with an [`AdapterError`] if the parameters are malformed.
    pub fn build(&self, params: &Params) -> Result<Box<dyn ErasedSaver>> {
        (self.build)(params)
    }
}

#[derive(Default)]
struct Tables {
    loaders: HashMap<Key, LoaderEntry>,
    savers: HashMap<Key, SaverEntry>,
    /// type name -> (library, tag)
    types: HashMap<String, (String, TypeTag)>,
}

impl Tables {
    fn check_loader(&self, name: &str, ty: TypeTag, adapter: TypeTag) -> Result<(), AdapterError> {
        match self.loaders.get(&(name.to_string(), ty)) {
            Some(existing) if existing.adapter != adapter => {
                Err(duplicate("loader", name, ty, existing.adapter))
            }
            _ => Ok(()),
        }
    }

    fn check_saver(&self, name: &str, ty: TypeTag, adapter: TypeTag) -> Result<(), AdapterError> {
        match self.savers.get(&(name.to_string(), ty)) {
            Some(existing) if existing.adapter != adapter => {
                Err(duplicate("saver", name, ty, existing.adapter))
            }
            _ => Ok(()),
        }
    }

    fn insert_loader(&mut self, entry: LoaderEntry) {
        let key = (entry.name.to_string(), entry.value_type);
        if self.loaders.contains_key(&key) {
            tracing::debug!(
                format = entry.name,
                value_type = %entry.value_type,
                "loader already registered"
            );
            return;
        }
        tracing::debug!(
            format = entry.name,
            value_type = %entry.value_type,
            adapter = %entry.adapter,
            "registered loader"
        );
        self.loaders.insert(key, entry);
    }

    fn insert_saver(&mut self, entry: SaverEntry) {
        let key = (entry.name.to_string(), entry.value_type);
        if self.savers.contains_key(&key) {
            tracing::debug!(
                format = entry.name,
                value_type = %entry.value_type,
                "saver already registered"
            );
            return;
        }
        tracing::debug!(
            format = entry.name,
            value_type = %entry.value_type,
            adapter = %entry.adapter,
            "registered saver"
        );
        self.savers.insert(key, entry);
    }
}

fn duplicate(slot: &str, name: &str, ty: TypeTag, existing: TypeTag) -> AdapterError {
    AdapterError::new(
        ErrorKind::Duplicate,
        format!("a different {slot} ({existing}) is already registered for ('{name}', {ty})"),
    )
}

/// Registry of loaders, savers and named value types.
#[derive(Default)]
pub struct AdapterRegistry {
    tables: RwLock<Tables>,
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| anyhow!("adapter registry lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| anyhow!("adapter registry lock poisoned"))
    }

    /// Register `A` in the load slot for each of its applicable types.
    ///
    /// # Errors
    /// Fails with [`ErrorKind::Duplicate`] if another loader holds one of the keys.
    pub fn register_loader<A: DataLoader>(&self) -> Result<()> {
        let types = A::applicable_types();
        let adapter = TypeTag::of::<A>();
        let mut tables = self.write()?;
        for ty in &types {
            tables.check_loader(A::name(), *ty, adapter)?;
        }
        for ty in types {
            tables.insert_loader(LoaderEntry::of::<A>(ty));
        }
        Ok(())
    }

    /// Register `A` in the save slot for each of its applicable types.
    ///
    /// # Errors
    /// Fails with [`ErrorKind::Duplicate`] if another saver holds one of the keys.
    pub fn register_saver<A: DataSaver>(&self) -> Result<()> {
        let types = A::applicable_types();
        let adapter = TypeTag::of::<A>();
        let mut tables = self.write()?;
        for ty in &types {
            tables.check_saver(A::name(), *ty, adapter)?;
        }
        for ty in types {
            tables.insert_saver(SaverEntry::of::<A>(ty));
        }
        Ok(())
    }

    /// Register `A` in both slots. Either both registrations happen or neither does.
    ///
    /// # Errors
    /// Fails with [`ErrorKind::Duplicate`] if another adapter holds one of the keys.
    pub fn register_adapter<A: DataLoader + DataSaver>(&self) -> Result<()> {
        let load_types = <A as DataLoader>::applicable_types();
        let save_types = <A as DataSaver>::applicable_types();
        let adapter = TypeTag::of::<A>();
        let mut tables = self.write()?;
        for ty in &load_types {
            tables.check_loader(A::name(), *ty, adapter)?;
        }
        for ty in &save_types {
            tables.check_saver(A::name(), *ty, adapter)?;
        }
        for ty in load_types {
            tables.insert_loader(LoaderEntry::of::<A>(ty));
        }
        for ty in save_types {
            tables.insert_saver(SaverEntry::of::<A>(ty));
        }
        Ok(())
    }

    /// Exact lookup of the loader for `(name, ty)`.
    ///
    /// # Errors
    /// Fails with [`ErrorKind::NotFound`] if nothing is registered for the pair.
    pub fn resolve_loader(&self, name: &str, ty: TypeTag) -> Result<LoaderEntry> {
        self.read()?
            .loaders
            .get(&(name.to_string(), ty))
            .cloned()
            .ok_or_else(|| {
                AdapterError::not_found(format!("no loader registered for ('{name}', {ty})")).into()
            })
    }

    /// Exact lookup of the saver for `(name, ty)`.
    ///
    /// # Errors
    /// Fails with [`ErrorKind::NotFound`] if nothing is registered for the pair.
    pub fn resolve_saver(&self, name: &str, ty: TypeTag) -> Result<SaverEntry> {
        self.read()?
            .savers
            .get(&(name.to_string(), ty))
            .cloned()
            .ok_or_else(|| {
                AdapterError::not_found(format!("no saver registered for ('{name}', {ty})")).into()
            })
    }

    /// All loaders applicable to `ty`, sorted by format name.
    ///
    /// # Errors
    /// Only if the registry lock is poisoned.
    pub fn loaders_for_type(&self, ty: TypeTag) -> Result<Vec<LoaderEntry>> {
        let mut found: Vec<LoaderEntry> = self
            .read()?
            .loaders
            .values()
            .filter(|e| e.value_type == ty)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.name);
        Ok(found)
    }

    /// All savers applicable to `ty`, sorted by format name.
    ///
    /// # Errors
    /// Only if the registry lock is poisoned.
    pub fn savers_for_type(&self, ty: TypeTag) -> Result<Vec<SaverEntry>> {
        let mut found: Vec<SaverEntry> = self
            .read()?
            .savers
            .values()
            .filter(|e| e.value_type == ty)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.name);
        Ok(found)
    }

    /// Value types with a loader or saver registered under `name`.
    ///
    /// # Errors
    /// Only if the registry lock is poisoned.
    pub fn formats_for_name(&self, name: &str) -> Result<Vec<TypeTag>> {
        let tables = self.read()?;
        let mut found: Vec<TypeTag> = Vec::new();
        let keys = tables.loaders.keys().chain(tables.savers.keys());
        for (format, ty) in keys {
            if format == name && !found.contains(ty) {
                found.push(*ty);
            }
        }
        found.sort_by_key(|t| t.name);
        Ok(found)
    }

    /// Every `(format, value type)` with a loader, sorted.
    ///
    /// # Errors
    /// Only if the registry lock is poisoned.
    pub fn loader_keys(&self) -> Result<Vec<(String, TypeTag)>> {
        let mut keys: Vec<Key> = self.read()?.loaders.keys().cloned().collect();
        keys.sort_by(|a, b| (&a.0, a.1.name).cmp(&(&b.0, b.1.name)));
        Ok(keys)
    }

    /// Every `(format, value type)` with a saver, sorted.
    ///
    /// # Errors
    /// Only if the registry lock is poisoned.
    pub fn saver_keys(&self) -> Result<Vec<(String, TypeTag)>> {
        let mut keys: Vec<Key> = self.read()?.savers.keys().cloned().collect();
        keys.sort_by(|a, b| (&a.0, a.1.name).cmp(&(&b.0, b.1.name)));
        Ok(keys)
    }

    /// Make value types addressable by name, e.g. from a
    /// [`LoadSpec`](crate::materialize::LoadSpec).
    ///
    /// # Errors
    /// Fails with [`ErrorKind::Duplicate`] if a name is already bound to another type.
    pub fn register_types(&self, library: &str, types: &[(&str, TypeTag)]) -> Result<()> {
        let mut tables = self.write()?;
        for (name, tag) in types {
            if let Some((owner, existing)) = tables.types.get(*name) {
                if existing != tag {
                    return Err(AdapterError::new(
                        ErrorKind::Duplicate,
                        format!("type name '{name}' is already bound to {existing} by {owner}"),
                    )
                    .into());
                }
            }
        }
        for (name, tag) in types {
            tracing::debug!(library, type_name = *name, value_type = %tag, "registered type");
            tables
                .types
                .entry((*name).to_string())
                .or_insert_with(|| (library.to_string(), *tag));
        }
        Ok(())
    }

    /// # Errors
    /// Fails with [`ErrorKind::NotFound`] for an unregistered type name.
    pub fn resolve_type(&self, name: &str) -> Result<TypeTag> {
        self.read()?
            .types
            .get(name)
            .map(|(_, tag)| *tag)
            .ok_or_else(|| AdapterError::not_found(format!("unknown value type '{name}'")).into())
    }

    /// Type names registered by `library`, sorted.
    ///
    /// # Errors
    /// Only if the registry lock is poisoned.
    pub fn types_for(&self, library: &str) -> Result<Vec<(String, TypeTag)>> {
        let mut found: Vec<(String, TypeTag)> = self
            .read()?
            .types
            .iter()
            .filter(|(_, (owner, _))| owner == library)
            .map(|(name, (_, tag))| (name.clone(), *tag))
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found)
    }

    /// Resolve, build and run the loader for `(format, T)`.
    ///
    /// # Errors
    /// Fails with [`ErrorKind::NotFound`] for an unregistered pair, with the
    /// adapter's configuration error, or with the load error.
    pub fn load<T: Send + Sync + 'static>(
        &self,
        format: &str,
        params: &Params,
        ctx: &IoContext,
    ) -> Result<(T, Metadata)> {
        let entry = self.resolve_loader(format, TypeTag::of::<T>())?;
        let loader = entry.build(params)?;
        tracing::debug!(format, value_type = %entry.value_type, "dispatching load");
        let (value, meta) = loader.load_erased(ctx)?;
        let value = value.downcast::<T>().map_err(|_| {
            AdapterError::new(
                ErrorKind::TypeMismatch,
                format!(
                    "loader '{format}' produced a {} instead of a {}",
                    loader.value_type(),
                    TypeTag::of::<T>()
                ),
            )
        })?;
        Ok((*value, meta))
    }

    /// Resolve, build and run the saver for `(format, T)`.
    ///
    /// # Errors
    /// Fails with [`ErrorKind::NotFound`] for an unregistered pair, with the
    /// adapter's configuration error, or with the save error.
    pub fn save<T: Send + Sync + 'static>(
        &self,
        format: &str,
        params: &Params,
        value: &T,
        ctx: &IoContext,
    ) -> Result<Metadata> {
        let entry = self.resolve_saver(format, TypeTag::of::<T>())?;
        let saver = entry.build(params)?;
        tracing::debug!(format, value_type = %entry.value_type, "dispatching save");
        saver.save_erased(value, ctx)
    }
}
