//! Storage locations and the metadata extractor shared by every adapter.
//!
//! Adapters describe where their data lives with a [`Location`] and finish every
//! load or save by calling [`file_metadata`] on it, then layering their own facts
//! (row counts, model URIs, ...) on top of the returned [`Metadata`].
//!
//! Extraction is best-effort. A local path is stat'ed for its size and modification
//! time; anything the extractor cannot stat (a remote URI, or a local path that has
//! vanished) degrades to just the location instead of failing the surrounding call.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Open-ended key/value facts describing a load or save.
pub type Metadata = BTreeMap<String, Value>;

/// Schemes served by an object store rather than the local filesystem.
const REMOTE_SCHEMES: &[&str] = &["s3", "gs", "gcs", "az", "abfs", "http", "https"];

/// Where an adapter reads from or writes to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Location {
    /// A path on the local filesystem (`file://` URIs are normalized to this).
    Local(PathBuf),
    /// An object addressed by URI, e.g. `s3://bucket/path/to/key`.
    ///
    /// For `http(s)` URIs the host plays the role of the bucket.
    Remote {
        scheme: String,
        bucket: String,
        key: String,
        uri: String,
    },
}

impl Location {
    /// Parse a location string.
    ///
    /// Strings with a known remote scheme become [`Location::Remote`]; `file://` URIs
    /// and plain paths become [`Location::Local`].
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if let Some(path) = raw.strip_prefix("file://") {
            return Self::Local(PathBuf::from(path));
        }
        if let Some((scheme, rest)) = raw.split_once("://") {
            let scheme_lc = scheme.to_ascii_lowercase();
            if REMOTE_SCHEMES.contains(&scheme_lc.as_str()) {
                let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
                return Self::Remote {
                    scheme: scheme_lc,
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    uri: raw.to_string(),
                };
            }
        }
        Self::Local(PathBuf::from(raw))
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        match self {
            Self::Local(_) => "file",
            Self::Remote { scheme, .. } => scheme,
        }
    }

    /// The local path, if this location is local.
    #[must_use]
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Local(p) => Some(p),
            Self::Remote { .. } => None,
        }
    }

    /// A string usable as a path hint for extension-based detection.
    #[must_use]
    pub fn hint(&self) -> String {
        match self {
            Self::Local(p) => p.to_string_lossy().into_owned(),
            Self::Remote { key, .. } => key.clone(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(p) => write!(f, "{}", p.display()),
            Self::Remote { uri, .. } => f.write_str(uri),
        }
    }
}

impl From<&str> for Location {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<String> for Location {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<PathBuf> for Location {
    fn from(path: PathBuf) -> Self {
        Self::Local(path)
    }
}

impl From<&Path> for Location {
    fn from(path: &Path) -> Self {
        Self::Local(path.to_path_buf())
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.trim().is_empty() {
            return Err(serde::de::Error::custom("location must not be empty"));
        }
        Ok(Self::parse(&raw))
    }
}

fn unix_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}

/// Extract descriptive facts about `location`.
///
/// Always contains `path` and `scheme`. Local, stat-able locations additionally get
/// `size_bytes`, `last_modified` (unix seconds) and `timestamp` (unix seconds at
/// extraction time). This function never fails.
#[must_use]
pub fn file_metadata(location: &Location) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("path".into(), json!(location.to_string()));
    meta.insert("scheme".into(), json!(location.scheme()));

    let Location::Local(path) = location else {
        return meta;
    };

    match fs::metadata(path) {
        Ok(stat) => {
            meta.insert("size_bytes".into(), json!(stat.len()));
            if let Ok(modified) = stat.modified() {
                meta.insert("last_modified".into(), json!(unix_secs(modified)));
            }
            meta.insert("timestamp".into(), json!(unix_secs(SystemTime::now())));
        }
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "cannot stat location; metadata limited to path"
            );
            meta.insert("notes".into(), json!(format!("stat failed: {err}")));
        }
    }
    meta
}
