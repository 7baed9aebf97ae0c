use anyhow::{anyhow, Result};
use ironadapt::testing::TempDirPath;
use ironadapt::tracking::RunStatus;
use ironadapt::*;
use serde_json::{json, Value};
use std::fs;
use std::sync::Arc;

struct Harness {
    _dir: TempDirPath,
    client: Arc<FileTracking>,
    registry: AdapterRegistry,
    ctx: IoContext,
}

impl Harness {
    fn new() -> Result<Self> {
        let dir = TempDirPath::new()?;
        let client = Arc::new(FileTracking::new(dir.path().join("mlruns"))?);
        let registry = AdapterRegistry::new();
        register_all_builtins(&registry)?;
        let ctx = IoContext::default().with_tracking(client.clone());
        Ok(Self {
            _dir: dir,
            client,
            registry,
            ctx,
        })
    }

    fn save(&self, model: &LinearModel, p: Value) -> Result<Metadata> {
        self.registry.save("model", &params(p)?, model, &self.ctx)
    }

    fn load(&self, p: Value) -> Result<(LinearModel, Metadata)> {
        self.registry.load::<LinearModel>("model", &params(p)?, &self.ctx)
    }

    fn run_meta(&self, run_id: &str) -> Result<Value> {
        let path = self.client.root().join("runs").join(run_id).join("meta.json");
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    fn artifacts(&self, run_id: &str) -> Result<usize> {
        let dir = self.client.root().join("runs").join(run_id).join("artifacts");
        Ok(fs::read_dir(dir)?.count())
    }
}

fn line() -> Result<LinearModel> {
    LinearModel::fit(&[1.0, 2.0, 3.0, 4.0], &[3.0, 5.0, 7.0, 9.0])
}

fn steeper() -> Result<LinearModel> {
    LinearModel::fit(&[0.0, 1.0, 2.0], &[0.5, 4.0, 7.5])
}

fn run_id(meta: &Metadata) -> Result<String> {
    meta.get("run_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("metadata has no run_id"))
}

#[test]
fn linear_model_fit_and_predict() -> Result<()> {
    let model = line()?;
    assert_eq!(model.coefficients, vec![2.0]);
    assert_eq!(model.intercept, 1.0);
    assert_eq!(model.predict(&[10.0]), vec![21.0]);

    assert!(LinearModel::fit(&[1.0], &[1.0]).is_err());
    assert!(LinearModel::fit(&[1.0, 2.0], &[1.0]).is_err());
    assert!(LinearModel::fit(&[2.0, 2.0], &[1.0, 3.0]).is_err());
    Ok(())
}

#[test]
fn save_without_active_run_opens_and_closes_one() -> Result<()> {
    let h = Harness::new()?;
    let meta = h.save(&line()?, json!({}))?;

    let id = run_id(&meta)?;
    assert_eq!(meta["model_uri"], json!(format!("runs:/{id}/model")));
    assert_eq!(meta["artifact_path"], json!("model"));
    assert!(meta["flavors"].get("postcard").is_some());
    assert!(meta["size_bytes"].as_u64().is_some_and(|n| n > 0));
    assert!(h.client.active_run()?.is_none());
    assert_eq!(h.run_meta(&id)?["status"], json!("FINISHED"));

    let (loaded, load_meta) = h.load(json!({ "model_uri": format!("runs:/{id}/model") }))?;
    assert_eq!(loaded, line()?);
    assert_eq!(load_meta["flavor"], json!("postcard"));
    assert_eq!(load_meta["run_id"], json!(id));
    Ok(())
}

#[test]
fn save_uses_the_active_run() -> Result<()> {
    let h = Harness::new()?;
    let active = h.client.start_run(None)?;

    let meta = h.save(&line()?, json!({ "path": "models/first" }))?;
    assert_eq!(run_id(&meta)?, active.run_id);
    assert_eq!(
        h.client.active_run()?.map(|r| r.status),
        Some(RunStatus::Running)
    );

    let same = h.save(&steeper()?, json!({ "run_id": active.run_id, "path": "models/second" }))?;
    assert_eq!(run_id(&same)?, active.run_id);
    h.client.end_run()?;

    let (first, _) = h.load(json!({ "run_id": active.run_id, "path": "models/first" }))?;
    let (second, _) = h.load(json!({
        "mode": "tracking",
        "run_id": active.run_id,
        "path": "models/second",
    }))?;
    assert_eq!(first, line()?);
    assert_eq!(second, steeper()?);
    Ok(())
}

#[test]
fn conflicting_run_id_writes_nothing() -> Result<()> {
    let h = Harness::new()?;
    let active = h.client.start_run(None)?;

    let err = h
        .save(&line()?, json!({ "run_id": "someone-else", "register_as": "churn" }))
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::Conflict));
    assert_eq!(h.artifacts(&active.run_id)?, 0);
    assert!(!h.client.root().join("registry/churn").exists());
    assert_eq!(
        h.client.active_run()?.map(|r| r.run_id),
        Some(active.run_id)
    );
    Ok(())
}

#[test]
fn explicit_run_id_is_resumed_then_ended() -> Result<()> {
    let h = Harness::new()?;
    let earlier = h.client.start_run(None)?;
    h.client.end_run()?;

    let meta = h.save(&line()?, json!({ "run_id": earlier.run_id }))?;
    assert_eq!(run_id(&meta)?, earlier.run_id);
    assert!(h.client.active_run()?.is_none());
    assert_eq!(h.run_meta(&earlier.run_id)?["status"], json!("FINISHED"));
    assert_eq!(h.artifacts(&earlier.run_id)?, 1);
    Ok(())
}

#[test]
fn unknown_run_id_is_not_found() -> Result<()> {
    let h = Harness::new()?;
    let err = h
        .save(&line()?, json!({ "run_id": "0123456789abcdef" }))
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::NotFound));
    assert!(h.client.active_run()?.is_none());
    Ok(())
}

#[test]
fn registry_resolution_by_version_and_uri_agree() -> Result<()> {
    let h = Harness::new()?;
    let v1 = h.save(&line()?, json!({ "register_as": "churn" }))?;
    let v2 = h.save(&steeper()?, json!({ "register_as": "churn" }))?;
    assert_eq!(v1["registered_model"], json!({ "name": "churn", "version": 1 }));
    assert_eq!(v2["registered_model"], json!({ "name": "churn", "version": 2 }));

    let (by_fields, _) = h.load(json!({ "model_name": "churn", "version": 1 }))?;
    let (by_uri, _) = h.load(json!({ "model_uri": "models:/churn/1" }))?;
    assert_eq!(by_fields.coefficients, by_uri.coefficients);
    assert_eq!(by_fields, line()?);

    let (latest, meta) =
        h.load(json!({ "mode": "registry", "model_name": "churn", "version": 2 }))?;
    assert_eq!(latest, steeper()?);
    assert_eq!(meta["run_id"], v2["run_id"]);

    let err = h
        .load(json!({ "model_name": "churn", "version": 3 }))
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::NotFound));
    Ok(())
}

#[test]
fn aliases_point_at_versions() -> Result<()> {
    let h = Harness::new()?;
    h.save(&line()?, json!({ "register_as": "churn" }))?;
    h.save(&steeper()?, json!({ "register_as": "churn" }))?;

    h.client.set_alias("churn", "champion", 1)?;
    let (champion, _) = h.load(json!({ "model_name": "churn", "version_alias": "champion" }))?;
    assert_eq!(champion, line()?);

    h.client.set_alias("churn", "champion", 2)?;
    let (champion, _) = h.load(json!({ "model_uri": "models:/churn@champion" }))?;
    assert_eq!(champion, steeper()?);

    let err = h.client.set_alias("churn", "champion", 9).unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::NotFound));
    let err = h
        .load(json!({ "model_name": "churn", "version_alias": "missing" }))
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::NotFound));
    Ok(())
}

#[test]
fn explicit_flavor_and_descriptor_fields() -> Result<()> {
    let h = Harness::new()?;
    let meta = h.save(
        &line()?,
        json!({ "flavor": "json", "kwargs": { "owner": "ml-team", "tags": ["baseline"] } }),
    )?;
    assert!(meta["flavors"].get("json").is_some());
    assert!(meta["flavors"].get("postcard").is_none());
    assert_eq!(meta["metadata"]["owner"], json!("ml-team"));

    let id = run_id(&meta)?;
    let artifact = h.client.root().join("runs").join(&id).join("artifacts/model");
    assert!(artifact.join("model.json").exists());
    assert!(artifact.join("MLmodel").exists());

    let (loaded, load_meta) = h.load(json!({ "run_id": id }))?;
    assert_eq!(loaded, line()?);
    assert_eq!(load_meta["flavor"], json!("json"));
    assert_eq!(load_meta["metadata"]["tags"], json!(["baseline"]));

    let err = h
        .load(json!({ "run_id": id, "flavor": "postcard" }))
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::NotFound));
    Ok(())
}

#[test]
fn artifact_directory_loads_directly() -> Result<()> {
    let h = Harness::new()?;
    let meta = h.save(&line()?, json!({}))?;
    let dir = meta["artifact_uri"]
        .as_str()
        .ok_or_else(|| anyhow!("no artifact_uri"))?
        .to_string();
    let (loaded, _) = h.load(json!({ "model_uri": dir }))?;
    assert_eq!(loaded, line()?);
    Ok(())
}

#[test]
fn tampered_payload_fails_checksum() -> Result<()> {
    let h = Harness::new()?;
    let meta = h.save(&line()?, json!({}))?;
    let id = run_id(&meta)?;
    let payload = h
        .client
        .root()
        .join("runs")
        .join(&id)
        .join("artifacts/model/model.bin");
    fs::write(&payload, b"tampered")?;

    let err = h.load(json!({ "run_id": id })).unwrap_err();
    assert!(!is_misconfiguration(&err));
    assert!(format!("{err:#}").contains("checksum mismatch"));
    Ok(())
}

#[test]
fn ambiguous_loader_parameters() -> Result<()> {
    let h = Harness::new()?;
    let ambiguous = [
        json!({}),
        json!({ "model_uri": "models:/churn/1", "run_id": "abc" }),
        json!({ "model_uri": "models:/churn/1", "mode": "registry" }),
        json!({ "model_name": "churn", "version": 1, "version_alias": "champion" }),
        json!({ "run_id": "abc", "model_name": "churn", "version": 1 }),
        json!({ "mode": "registry", "model_name": "churn" }),
        json!({ "mode": "registry", "version": 1 }),
        json!({ "mode": "registry", "model_name": "churn", "version": 1, "run_id": "abc" }),
        json!({ "mode": "tracking", "path": "model" }),
        json!({ "mode": "tracking", "run_id": "abc", "model_name": "churn" }),
    ];
    for case in ambiguous {
        let err = h.load(case.clone()).unwrap_err();
        assert_eq!(
            error_kind(&err),
            Some(ErrorKind::Ambiguous),
            "{case} should be ambiguous"
        );
    }

    let invalid = [
        json!({ "model_uri": "models:/churn/zero" }),
        json!({ "model_uri": "runs:/only-id" }),
        json!({ "model_name": "churn", "version": 1, "stage": "prod" }),
        json!({ "mode": "latest", "model_name": "churn" }),
    ];
    for case in invalid {
        let err = h.load(case.clone()).unwrap_err();
        assert_eq!(
            error_kind(&err),
            Some(ErrorKind::InvalidParameter),
            "{case} should be invalid"
        );
    }
    Ok(())
}

#[test]
fn model_adapters_need_a_tracking_client() -> Result<()> {
    let registry = AdapterRegistry::new();
    register_all_builtins(&registry)?;
    let ctx = IoContext::default();

    let err = registry
        .save("model", &params(json!({}))?, &line()?, &ctx)
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::MissingCollaborator));

    let err = registry
        .load::<LinearModel>("model", &params(json!({ "model_uri": "models:/a/1" }))?, &ctx)
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::MissingCollaborator));
    Ok(())
}

#[test]
fn saver_rejects_unknown_parameters() -> Result<()> {
    let h = Harness::new()?;
    let err = h
        .save(&line()?, json!({ "artifact_path": "model" }))
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::InvalidParameter));
    Ok(())
}

#[test]
fn model_uri_display_round_trips() -> Result<()> {
    for raw in ["runs:/abc/model/sub", "models:/churn/3", "models:/churn@champion"] {
        let uri: ModelUri = raw.parse()?;
        assert_eq!(uri.to_string(), raw);
    }
    assert_eq!(
        ModelUri::parse("runs:/abc/model")?,
        ModelUri::Run {
            run_id: "abc".into(),
            path: "model".into(),
        }
    );
    Ok(())
}
