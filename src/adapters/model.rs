//! Saving and loading models through the tracking collaborator.
//!
//! The saver logs a model as an artifact of a run and can register it under a
//! name. Which run it uses depends on `run_id` and on the run already active in
//! the client:
//!
//! | `run_id` | active run      | behavior                                  |
//! |----------|-----------------|-------------------------------------------|
//! | set      | same id         | log under the active run                  |
//! | set      | different id    | `Conflict`, nothing is written            |
//! | set      | none            | resume that run for the save, then end it |
//! | unset    | some            | log under the active run                  |
//! | unset    | none            | open a run for the save, then end it      |
//!
//! The loader resolves exactly one model location when it is built, from a
//! `model_uri`, from a run (`run_id` + `path`), or from the registry
//! (`model_name` + `version` or `version_alias`).

use crate::adapter::{deserialize_params, Adapter, DataLoader, DataSaver, IoContext, Params};
use crate::error::AdapterError;
use crate::metadata::{file_metadata, Location, Metadata};
use crate::models::{Flavor, Model};
use crate::tracking::{LogModelRequest, ModelInfo, ModelUri, TrackingClient};
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::marker::PhantomData;

const DEFAULT_ARTIFACT_PATH: &str = "model";

/// File facts of the payload, overlaid with the descriptor fields.
fn model_metadata(info: &ModelInfo, flavor: Flavor) -> Result<Metadata> {
    let mut meta = match info.payload_uri(flavor) {
        Some(uri) => file_metadata(&Location::parse(&uri)),
        None => Metadata::new(),
    };
    meta.extend(info.to_metadata()?);
    Ok(meta)
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SaverParams {
    #[serde(default = "default_artifact_path")]
    path: String,
    #[serde(default)]
    register_as: Option<String>,
    #[serde(default)]
    flavor: Option<Flavor>,
    #[serde(default)]
    run_id: Option<String>,
    #[serde(default)]
    kwargs: Map<String, Value>,
}

fn default_artifact_path() -> String {
    DEFAULT_ARTIFACT_PATH.to_string()
}

/// Logs a model to the tracking store.
pub struct ModelSaver<M> {
    /// Artifact path inside the run.
    pub path: String,
    /// Registry name to register the logged model under.
    pub register_as: Option<String>,
    pub flavor: Flavor,
    pub run_id: Option<String>,
    /// Extra fields stored in the model descriptor.
    pub kwargs: Map<String, Value>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> ModelSaver<M> {
    fn log(&self, model: &M, tracking: &dyn TrackingClient) -> Result<Metadata> {
        let payload = self.flavor.encode(model)?;
        let info = tracking.log_model(LogModelRequest {
            artifact_path: &self.path,
            flavor: self.flavor,
            payload: &payload,
            metadata: &self.kwargs,
        })?;
        let mut meta = model_metadata(&info, self.flavor)?;

        if let Some(name) = &self.register_as {
            let version = tracking.register_model(&info.model_uri, name)?;
            meta.insert(
                "registered_model".into(),
                json!({ "name": version.name, "version": version.version }),
            );
        }
        Ok(meta)
    }
}

impl<M: Model> Adapter for ModelSaver<M> {
    fn name() -> &'static str {
        "model"
    }

    fn from_params(params: &Params) -> Result<Self> {
        let p: SaverParams = deserialize_params(params)?;
        Ok(Self {
            path: p.path,
            register_as: p.register_as,
            flavor: p.flavor.unwrap_or_else(M::native_flavor),
            run_id: p.run_id,
            kwargs: p.kwargs,
            _model: PhantomData,
        })
    }
}

impl<M: Model> DataSaver for ModelSaver<M> {
    type Value = M;

    fn save_data(&self, model: &M, ctx: &IoContext) -> Result<Metadata> {
        let tracking = ctx.tracking()?;
        let active = tracking.active_run()?;

        let owns_run = match (&self.run_id, &active) {
            (Some(wanted), Some(run)) if *wanted != run.run_id => {
                return Err(AdapterError::conflict(format!(
                    "run_id '{wanted}' differs from the active run '{}'",
                    run.run_id
                ))
                .into());
            }
            (_, Some(_)) => false,
            (Some(wanted), None) => {
                tracking.start_run(Some(wanted))?;
                true
            }
            (None, None) => {
                tracking.start_run(None)?;
                true
            }
        };

        let outcome = self.log(model, tracking);
        if owns_run {
            if let Err(err) = tracking.end_run() {
                if outcome.is_ok() {
                    return Err(err);
                }
                tracing::warn!(error = %err, "failed to end run after a failed model save");
            }
        }
        outcome
    }
}

/// How a [`ModelLoader`] finds its model when no `model_uri` is given.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// A run's artifact: `run_id` + `path`.
    Tracking,
    /// A registered version: `model_name` + `version` or `version_alias`.
    Registry,
}

#[derive(Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LoaderParams {
    model_uri: Option<String>,
    mode: Option<LoadMode>,
    run_id: Option<String>,
    path: Option<String>,
    model_name: Option<String>,
    version: Option<u32>,
    version_alias: Option<String>,
    flavor: Option<Flavor>,
}

impl LoaderParams {
    fn resolve(self) -> Result<ModelUri, AdapterError> {
        let tracking_fields = self.run_id.is_some() || self.path.is_some();
        let registry_fields =
            self.model_name.is_some() || self.version.is_some() || self.version_alias.is_some();

        if let Some(uri) = self.model_uri {
            if tracking_fields || registry_fields || self.mode.is_some() {
                return Err(AdapterError::ambiguous(
                    "model_uri cannot be combined with mode, run_id, path, model_name, version or version_alias",
                ));
            }
            return ModelUri::parse(&uri);
        }
        if self.version.is_some() && self.version_alias.is_some() {
            return Err(AdapterError::ambiguous(
                "pass either version or version_alias, not both",
            ));
        }

        let mode = match self.mode {
            Some(mode) => mode,
            None if tracking_fields && registry_fields => {
                return Err(AdapterError::ambiguous(
                    "both run fields (run_id, path) and registry fields (model_name, version, version_alias) were given",
                ));
            }
            None if tracking_fields => LoadMode::Tracking,
            None if registry_fields => LoadMode::Registry,
            None => {
                return Err(AdapterError::ambiguous(
                    "cannot locate the model: pass model_uri, run_id, or model_name with version/version_alias",
                ));
            }
        };

        match mode {
            LoadMode::Tracking => {
                if registry_fields {
                    return Err(AdapterError::ambiguous(
                        "mode 'tracking' does not take model_name, version or version_alias",
                    ));
                }
                let run_id = self
                    .run_id
                    .ok_or_else(|| AdapterError::ambiguous("mode 'tracking' needs a run_id"))?;
                Ok(ModelUri::Run {
                    run_id,
                    path: self.path.unwrap_or_else(default_artifact_path),
                })
            }
            LoadMode::Registry => {
                if tracking_fields {
                    return Err(AdapterError::ambiguous(
                        "mode 'registry' does not take run_id or path",
                    ));
                }
                let name = self
                    .model_name
                    .ok_or_else(|| AdapterError::ambiguous("mode 'registry' needs a model_name"))?;
                match (self.version, self.version_alias) {
                    (Some(version), None) => Ok(ModelUri::Version { name, version }),
                    (None, Some(alias)) => Ok(ModelUri::Alias { name, alias }),
                    _ => Err(AdapterError::ambiguous(format!(
                        "model '{name}' needs exactly one of version or version_alias"
                    ))),
                }
            }
        }
    }
}

/// Loads a model from the tracking store.
pub struct ModelLoader<M> {
    pub model_uri: ModelUri,
    /// Flavor to decode; the first logged flavor when unset.
    pub flavor: Option<Flavor>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Adapter for ModelLoader<M> {
    fn name() -> &'static str {
        "model"
    }

    fn from_params(params: &Params) -> Result<Self> {
        let p: LoaderParams = deserialize_params(params)?;
        let flavor = p.flavor;
        Ok(Self {
            model_uri: p.resolve()?,
            flavor,
            _model: PhantomData,
        })
    }
}

impl<M: Model> DataLoader for ModelLoader<M> {
    type Value = M;

    fn load_data(&self, ctx: &IoContext) -> Result<(M, Metadata)> {
        let tracking = ctx.tracking()?;
        let info = tracking.model_info(&self.model_uri)?;
        let flavor = match self.flavor {
            Some(flavor) => flavor,
            None => info.default_flavor().ok_or_else(|| {
                AdapterError::not_found(format!("model at {} records no flavors", self.model_uri))
            })?,
        };
        let payload = tracking.load_model_payload(&self.model_uri, flavor)?;
        let model = flavor.decode(&payload)?;
        tracing::debug!(model_uri = %self.model_uri, %flavor, "loaded model");

        let mut meta = model_metadata(&info, flavor)?;
        meta.insert("flavor".into(), json!(flavor));
        Ok((model, meta))
    }
}
