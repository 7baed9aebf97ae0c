//! The ML tracking collaborator used by the model adapters.
//!
//! A tracking service records *runs*; models are logged as artifacts of a run and
//! can be promoted into a *registry* of named, numbered versions, optionally with
//! aliases (`models:/churn@champion`). [`TrackingClient`] is the capability the
//! adapters need from such a service. [`FileTracking`] implements it on the local
//! filesystem.

use crate::error::AdapterError;
use crate::metadata::Metadata;
use crate::models::Flavor;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

mod file_store;

pub use file_store::FileTracking;

/// Name of the descriptor written next to every logged model.
pub const MODEL_DESCRIPTOR: &str = "MLmodel";

/// Where a model lives.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModelUri {
    /// `runs:/<run_id>/<artifact path>`
    Run { run_id: String, path: String },
    /// `models:/<name>/<version>`
    Version { name: String, version: u32 },
    /// `models:/<name>@<alias>`
    Alias { name: String, alias: String },
    /// An artifact directory on disk.
    Local(PathBuf),
}

impl ModelUri {
    /// # Errors
    /// Fails with [`ErrorKind::InvalidParameter`](crate::ErrorKind::InvalidParameter)
    /// for a malformed `runs:/` or `models:/` URI.
    pub fn parse(raw: &str) -> Result<Self, AdapterError> {
        let malformed =
            |why: &str| AdapterError::invalid(format!("malformed model URI '{raw}': {why}"));

        if let Some(rest) = raw.strip_prefix("runs:/") {
            let (run_id, path) = rest
                .trim_start_matches('/')
                .split_once('/')
                .ok_or_else(|| malformed("expected runs:/<run_id>/<path>"))?;
            if run_id.is_empty() || path.is_empty() {
                return Err(malformed("expected runs:/<run_id>/<path>"));
            }
            return Ok(Self::Run {
                run_id: run_id.to_string(),
                path: path.trim_end_matches('/').to_string(),
            });
        }
        if let Some(rest) = raw.strip_prefix("models:/") {
            if let Some((name, alias)) = rest.split_once('@') {
                if name.is_empty() || alias.is_empty() {
                    return Err(malformed("expected models:/<name>@<alias>"));
                }
                return Ok(Self::Alias {
                    name: name.to_string(),
                    alias: alias.to_string(),
                });
            }
            let (name, version) = rest
                .split_once('/')
                .ok_or_else(|| malformed("expected models:/<name>/<version>"))?;
            let version = version
                .parse::<u32>()
                .map_err(|_| malformed("version must be a positive integer"))?;
            if name.is_empty() || version == 0 {
                return Err(malformed("expected models:/<name>/<version>"));
            }
            return Ok(Self::Version {
                name: name.to_string(),
                version,
            });
        }
        if raw.trim().is_empty() {
            return Err(malformed("empty"));
        }
        Ok(Self::Local(PathBuf::from(
            raw.strip_prefix("file://").unwrap_or(raw),
        )))
    }
}

impl FromStr for ModelUri {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ModelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run { run_id, path } => write!(f, "runs:/{run_id}/{path}"),
            Self::Version { name, version } => write!(f, "models:/{name}/{version}"),
            Self::Alias { name, alias } => write!(f, "models:/{name}@{alias}"),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Finished,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub status: RunStatus,
    pub start_time: u64,
    pub end_time: Option<u64>,
}

/// One serialized form of a logged model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavorFile {
    pub file: String,
    pub sha256: String,
    pub size_bytes: u64,
}

/// Contents of a model's `MLmodel` descriptor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// `runs:/<run_id>/<artifact_path>`
    pub model_uri: String,
    pub run_id: String,
    pub artifact_path: String,
    /// Directory holding the descriptor and payloads.
    pub artifact_uri: String,
    pub flavors: BTreeMap<Flavor, FlavorFile>,
    pub model_uuid: String,
    pub utc_time_created: u64,
    /// Caller-supplied extra fields.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ModelInfo {
    /// The flavor to load when none is requested.
    #[must_use]
    pub fn default_flavor(&self) -> Option<Flavor> {
        self.flavors.keys().next().copied()
    }

    /// Location of the payload for `flavor`.
    #[must_use]
    pub fn payload_uri(&self, flavor: Flavor) -> Option<String> {
        self.flavors
            .get(&flavor)
            .map(|f| format!("{}/{}", self.artifact_uri.trim_end_matches('/'), f.file))
    }

    /// The descriptor as metadata entries.
    ///
    /// # Errors
    /// Only if serialization fails.
    pub fn to_metadata(&self) -> Result<Metadata> {
        match serde_json::to_value(self).context("serialize model info")? {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => anyhow::bail!("model info serialized to {other}"),
        }
    }
}

/// A numbered version in the model registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub name: String,
    pub version: u32,
    /// The `runs:/` URI the version was registered from.
    pub source: String,
    pub run_id: String,
    pub creation_timestamp: u64,
}

/// A model payload to log under the active run.
#[derive(Clone, Copy, Debug)]
pub struct LogModelRequest<'a> {
    pub artifact_path: &'a str,
    pub flavor: Flavor,
    pub payload: &'a [u8],
    pub metadata: &'a Map<String, Value>,
}

/// What the model adapters need from a tracking service.
///
/// At most one run is active per client.
pub trait TrackingClient: Send + Sync {
    /// Start a new run, or resume `run_id`.
    ///
    /// # Errors
    /// Fails if a run is already active or `run_id` does not exist.
    fn start_run(&self, run_id: Option<&str>) -> Result<RunInfo>;

    /// End the active run; a no-op without one.
    ///
    /// # Errors
    /// Fails if the run state cannot be persisted.
    fn end_run(&self) -> Result<()>;

    /// # Errors
    /// Fails if the run state cannot be read.
    fn active_run(&self) -> Result<Option<RunInfo>>;

    /// Store a model under the active run.
    ///
    /// # Errors
    /// Fails without an active run or if the artifact cannot be written.
    fn log_model(&self, request: LogModelRequest<'_>) -> Result<ModelInfo>;

    /// Register the model at `model_uri` as the next version of `name`.
    ///
    /// # Errors
    /// Fails if the URI does not point at a logged model.
    fn register_model(&self, model_uri: &str, name: &str) -> Result<ModelVersion>;

    /// Point `alias` of `name` at `version`.
    ///
    /// # Errors
    /// Fails if the version does not exist.
    fn set_alias(&self, name: &str, alias: &str, version: u32) -> Result<()>;

    /// Read the descriptor of the model at `uri`.
    ///
    /// # Errors
    /// Fails if `uri` cannot be resolved.
    fn model_info(&self, uri: &ModelUri) -> Result<ModelInfo>;

    /// Read and verify the `flavor` payload of the model at `uri`.
    ///
    /// # Errors
    /// Fails if the flavor was not logged or the checksum does not match.
    fn load_model_payload(&self, uri: &ModelUri, flavor: Flavor) -> Result<Vec<u8>>;
}

/// Hex SHA-256 of `data`.
#[must_use]
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
