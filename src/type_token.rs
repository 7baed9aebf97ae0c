//! Type tags and type-erased values.
//!
//! This module provides:
//! - [`TypeTag`]: a lightweight runtime type identifier. The registry keys every
//!   adapter by `(format name, TypeTag)` and records the `TypeTag` of the concrete
//!   adapter type so lookups can be checked against what was registered.
//! - [`Partition`]: the boxed, type-erased value an erased loader hands back when
//!   the caller resolved the adapter at runtime rather than through generics.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A type-erased value produced by a loader.
///
/// Callers downcast this to the value type they resolved the loader for
/// (e.g. [`DataFrame`](crate::DataFrame)).
pub type Partition = Box<dyn Any + Send + Sync>;

/// A lightweight runtime type tag.
///
/// `TypeTag` carries the `TypeId` and a readable type name. Equality and hashing
/// only consider the `TypeId`; the name is for messages and listings.
///
/// ```
/// use ironadapt::type_token::TypeTag;
/// let tag = TypeTag::of::<u32>();
/// assert_eq!(tag.name, "u32");
/// assert_eq!(tag, TypeTag::of::<u32>());
/// ```
#[derive(Clone, Copy, Debug)]
pub struct TypeTag {
    /// Stable Rust type identifier.
    pub id: TypeId,
    /// Human-readable type name (best-effort).
    pub name: &'static str,
}

impl TypeTag {
    /// Construct a tag for `T`.
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Whether this tag describes `T`.
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    /// The last path segment of the type name (`DataFrame` for `ironadapt::frame::DataFrame`).
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        match base.rfind("::") {
            Some(idx) => &self.name[idx + 2..],
            None => self.name,
        }
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}
