//! A tracking store kept in a local directory.
//!
//! Layout under the root:
//!
//! ```text
//! runs/<run_id>/meta.json
//! runs/<run_id>/artifacts/<artifact path>/MLmodel
//! runs/<run_id>/artifacts/<artifact path>/model.{json,bin}
//! registry/<name>/versions/<n>.json
//! registry/<name>/aliases.json
//! ```
//!
//! Every JSON file is written whole; payloads carry a SHA-256 checksum in the
//! descriptor that is verified on load.

use super::{
    compute_checksum, current_timestamp_ms, FlavorFile, LogModelRequest, ModelInfo, ModelUri,
    ModelVersion, RunInfo, RunStatus, TrackingClient, MODEL_DESCRIPTOR,
};
use crate::error::AdapterError;
use crate::models::Flavor;
use anyhow::{anyhow, bail, Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, create_dir_all};
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Filesystem-backed [`TrackingClient`].
pub struct FileTracking {
    root: PathBuf,
    active: Mutex<Option<String>>,
}

impl FileTracking {
    /// Open (or create) a store rooted at `root`.
    ///
    /// # Errors
    /// Returns an error if the directories cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        create_dir_all(root.join("runs")).context("Failed to create tracking runs directory")?;
        create_dir_all(root.join("registry"))
            .context("Failed to create tracking registry directory")?;
        Ok(Self {
            root,
            active: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<String>>> {
        self.active
            .lock()
            .map_err(|_| anyhow!("tracking state mutex poisoned"))
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join("runs").join(run_id)
    }

    fn model_dir(&self, name: &str) -> PathBuf {
        self.root.join("registry").join(name)
    }

    fn read_run(&self, run_id: &str) -> Result<RunInfo> {
        check_segment("run id", run_id)?;
        let path = self.run_dir(run_id).join("meta.json");
        if !path.exists() {
            return Err(AdapterError::not_found(format!("run '{run_id}' does not exist")).into());
        }
        read_json(&path)
    }

    fn read_version(&self, name: &str, version: u32) -> Result<ModelVersion> {
        check_segment("model name", name)?;
        let path = self
            .model_dir(name)
            .join("versions")
            .join(format!("{version}.json"));
        if !path.exists() {
            return Err(
                AdapterError::not_found(format!("model '{name}' has no version {version}")).into(),
            );
        }
        read_json(&path)
    }

    fn read_aliases(&self, name: &str) -> Result<BTreeMap<String, u32>> {
        let path = self.model_dir(name).join("aliases.json");
        if path.exists() {
            read_json(&path)
        } else {
            Ok(BTreeMap::new())
        }
    }

    /// Directory holding the descriptor of the model at `uri`.
    fn artifact_dir(&self, uri: &ModelUri) -> Result<PathBuf> {
        match uri {
            ModelUri::Run { run_id, path } => {
                self.read_run(run_id)?;
                Ok(self.run_dir(run_id).join("artifacts").join(path))
            }
            ModelUri::Version { name, version } => {
                let source = self.read_version(name, *version)?.source;
                match ModelUri::parse(&source)? {
                    run @ ModelUri::Run { .. } => self.artifact_dir(&run),
                    other => bail!("version {version} of '{name}' has a non-run source {other}"),
                }
            }
            ModelUri::Alias { name, alias } => {
                check_segment("model name", name)?;
                let version = *self.read_aliases(name)?.get(alias).ok_or_else(|| {
                    AdapterError::not_found(format!("model '{name}' has no alias '{alias}'"))
                })?;
                self.artifact_dir(&ModelUri::Version {
                    name: name.clone(),
                    version,
                })
            }
            ModelUri::Local(path) => Ok(path.clone()),
        }
    }
}

impl TrackingClient for FileTracking {
    fn start_run(&self, run_id: Option<&str>) -> Result<RunInfo> {
        let mut active = self.lock()?;
        if let Some(current) = active.as_deref() {
            return Err(AdapterError::conflict(format!(
                "run '{current}' is already active; end it before starting another"
            ))
            .into());
        }

        let info = match run_id {
            Some(id) => RunInfo {
                status: RunStatus::Running,
                end_time: None,
                ..self.read_run(id)?
            },
            None => RunInfo {
                run_id: Uuid::new_v4().simple().to_string(),
                status: RunStatus::Running,
                start_time: current_timestamp_ms(),
                end_time: None,
            },
        };
        let dir = self.run_dir(&info.run_id);
        create_dir_all(dir.join("artifacts")).context("Failed to create run directory")?;
        write_json(&dir.join("meta.json"), &info)?;
        tracing::debug!(run_id = %info.run_id, resumed = run_id.is_some(), "run started");

        *active = Some(info.run_id.clone());
        Ok(info)
    }

    fn end_run(&self) -> Result<()> {
        let mut active = self.lock()?;
        let Some(run_id) = active.take() else {
            return Ok(());
        };
        let info = RunInfo {
            status: RunStatus::Finished,
            end_time: Some(current_timestamp_ms()),
            ..self.read_run(&run_id)?
        };
        write_json(&self.run_dir(&run_id).join("meta.json"), &info)?;
        tracing::debug!(%run_id, "run ended");
        Ok(())
    }

    fn active_run(&self) -> Result<Option<RunInfo>> {
        let active = self.lock()?.clone();
        active.map(|id| self.read_run(&id)).transpose()
    }

    fn log_model(&self, request: LogModelRequest<'_>) -> Result<ModelInfo> {
        let run = self
            .active_run()?
            .ok_or_else(|| AdapterError::conflict("logging a model requires an active run"))?;
        check_relative("artifact path", request.artifact_path)?;

        let dir = self
            .run_dir(&run.run_id)
            .join("artifacts")
            .join(request.artifact_path);
        create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;

        let file = request.flavor.file_name();
        fs::write(dir.join(file), request.payload)
            .with_context(|| format!("write model payload to {}", dir.display()))?;

        let info = ModelInfo {
            model_uri: format!("runs:/{}/{}", run.run_id, request.artifact_path),
            run_id: run.run_id.clone(),
            artifact_path: request.artifact_path.to_string(),
            artifact_uri: dir.display().to_string(),
            flavors: BTreeMap::from([(
                request.flavor,
                FlavorFile {
                    file: file.to_string(),
                    sha256: compute_checksum(request.payload),
                    size_bytes: request.payload.len() as u64,
                },
            )]),
            model_uuid: Uuid::new_v4().simple().to_string(),
            utc_time_created: current_timestamp_ms(),
            metadata: request.metadata.clone(),
        };
        write_json(&dir.join(MODEL_DESCRIPTOR), &info)?;
        tracing::info!(
            run_id = %run.run_id,
            artifact_path = request.artifact_path,
            flavor = %request.flavor,
            "logged model"
        );
        Ok(info)
    }

    fn register_model(&self, model_uri: &str, name: &str) -> Result<ModelVersion> {
        check_segment("model name", name)?;
        let uri = ModelUri::parse(model_uri)?;
        let ModelUri::Run { run_id, .. } = &uri else {
            return Err(AdapterError::invalid(format!(
                "only runs:/ URIs can be registered, got '{model_uri}'"
            ))
            .into());
        };
        let info = self.model_info(&uri)?;

        let versions = self.model_dir(name).join("versions");
        create_dir_all(&versions).with_context(|| format!("create {}", versions.display()))?;
        let latest = fs::read_dir(&versions)
            .with_context(|| format!("list {}", versions.display()))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                entry
                    .path()
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| s.parse::<u32>().ok())
            })
            .max()
            .unwrap_or(0);

        let version = ModelVersion {
            name: name.to_string(),
            version: latest + 1,
            source: info.model_uri,
            run_id: run_id.clone(),
            creation_timestamp: current_timestamp_ms(),
        };
        write_json(&versions.join(format!("{}.json", version.version)), &version)?;
        tracing::info!(
            name,
            version = version.version,
            source = %version.source,
            "registered model version"
        );
        Ok(version)
    }

    fn set_alias(&self, name: &str, alias: &str, version: u32) -> Result<()> {
        check_segment("alias", alias)?;
        self.read_version(name, version)?;
        let mut aliases = self.read_aliases(name)?;
        aliases.insert(alias.to_string(), version);
        write_json(&self.model_dir(name).join("aliases.json"), &aliases)?;
        tracing::info!(name, alias, version, "set model alias");
        Ok(())
    }

    fn model_info(&self, uri: &ModelUri) -> Result<ModelInfo> {
        let dir = self.artifact_dir(uri)?;
        read_json(&dir.join(MODEL_DESCRIPTOR))
            .with_context(|| format!("read model descriptor for {uri}"))
    }

    fn load_model_payload(&self, uri: &ModelUri, flavor: Flavor) -> Result<Vec<u8>> {
        let dir = self.artifact_dir(uri)?;
        let info: ModelInfo = read_json(&dir.join(MODEL_DESCRIPTOR))
            .with_context(|| format!("read model descriptor for {uri}"))?;
        let entry = info.flavors.get(&flavor).ok_or_else(|| {
            let logged: Vec<&str> = info.flavors.keys().map(|f| f.name()).collect();
            AdapterError::not_found(format!(
                "model at {uri} has no '{flavor}' flavor (logged: {})",
                logged.join(", ")
            ))
        })?;

        let path = dir.join(&entry.file);
        let payload = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        if compute_checksum(&payload) != entry.sha256 {
            bail!(
                "Model integrity check failed: checksum mismatch for {}",
                path.display()
            );
        }
        Ok(payload)
    }
}

/// A single path segment: no separators, not `.`/`..`.
fn check_segment(what: &str, value: &str) -> Result<(), AdapterError> {
    let ok = !value.is_empty()
        && !value.contains(['/', '\\'])
        && value != "."
        && value != "..";
    if ok {
        Ok(())
    } else {
        Err(AdapterError::invalid(format!("invalid {what} '{value}'")))
    }
}

/// A relative path that stays inside its base directory.
fn check_relative(what: &str, value: &str) -> Result<(), AdapterError> {
    let path = Path::new(value);
    let ok = !value.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if ok {
        Ok(())
    } else {
        Err(AdapterError::invalid(format!("invalid {what} '{value}'")))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).context("serialize tracking record")?;
    fs::write(path, bytes).with_context(|| format!("write {}", path.display()))
}
