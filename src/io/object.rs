//! Object storage for remote locations.
//!
//! [`ArrowTableIo`](crate::io::ArrowTableIo) reads and writes local files directly.
//! For a [`Location::Remote`](crate::Location::Remote) it needs an [`ObjectIO`]
//! implementation: the object is downloaded into a temporary file before reading and
//! uploaded from one after writing.
//!
//! The trait is synchronous; an implementation backed by an async SDK is expected to
//! block internally. Errors are plain `std::io::Error`s so that a missing object
//! looks the same to callers as a missing local file.
//!
//! [`InMemoryObjectIO`] keeps objects in a map and is meant for tests.

use std::collections::HashMap;
use std::io::{Error, ErrorKind};
use std::sync::{Arc, Mutex, MutexGuard};

/// Metadata for an object in storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub bucket: String,
    pub key: String,
    pub size: u64,
}

/// Object storage operations
pub trait ObjectIO: Send + Sync {
    /// Upload data, replacing any existing object under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket is not writable or the upload fails
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> std::io::Result<()>;

    /// Download an object.
    ///
    /// # Errors
    ///
    /// Returns an error of kind `NotFound` if the object doesn't exist
    fn get_object(&self, bucket: &str, key: &str) -> std::io::Result<Vec<u8>>;

    /// Check if an object exists
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried
    fn object_exists(&self, bucket: &str, key: &str) -> std::io::Result<bool>;

    /// Get object metadata without downloading content
    ///
    /// # Errors
    ///
    /// Returns an error of kind `NotFound` if the object doesn't exist
    fn get_metadata(&self, bucket: &str, key: &str) -> std::io::Result<ObjectMetadata>;
}

type Buckets = HashMap<String, HashMap<String, Vec<u8>>>;
type BucketStorage = Arc<Mutex<Buckets>>;

/// In-memory object store.
///
/// Clones share the same storage, so a test can keep a handle while the table
/// backend owns another.
#[derive(Clone, Default)]
pub struct InMemoryObjectIO {
    storage: BucketStorage,
}

impl InMemoryObjectIO {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::io::Result<MutexGuard<'_, Buckets>> {
        self.storage
            .lock()
            .map_err(|_| Error::other("object storage mutex poisoned"))
    }

    fn not_found(bucket: &str, key: &str) -> Error {
        Error::new(ErrorKind::NotFound, format!("object {bucket}/{key} not found"))
    }
}

impl ObjectIO for InMemoryObjectIO {
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> std::io::Result<()> {
        self.lock()?
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> std::io::Result<Vec<u8>> {
        self.lock()?
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
            .ok_or_else(|| Self::not_found(bucket, key))
    }

    fn object_exists(&self, bucket: &str, key: &str) -> std::io::Result<bool> {
        Ok(self
            .lock()?
            .get(bucket)
            .is_some_and(|objects| objects.contains_key(key)))
    }

    fn get_metadata(&self, bucket: &str, key: &str) -> std::io::Result<ObjectMetadata> {
        let storage = self.lock()?;
        let data = storage
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .ok_or_else(|| Self::not_found(bucket, key))?;
        Ok(ObjectMetadata {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: data.len() as u64,
        })
    }
}
