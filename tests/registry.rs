use anyhow::Result;
use ironadapt::adapters::{CsvAdapter, JsonDocumentAdapter, JsonReader, BUILTIN_LIBRARY};
use ironadapt::metadata::Metadata;
use ironadapt::*;
use serde_json::{json, Value};

/// A second "csv" loader, used to provoke key collisions.
struct ShadowCsv;

impl Adapter for ShadowCsv {
    fn name() -> &'static str {
        "csv"
    }

    fn from_params(_params: &Params) -> Result<Self> {
        Ok(Self)
    }
}

impl DataLoader for ShadowCsv {
    type Value = DataFrame;

    fn load_data(&self, _ctx: &IoContext) -> Result<(DataFrame, Metadata)> {
        anyhow::bail!("never called")
    }
}

impl DataSaver for ShadowCsv {
    type Value = DataFrame;

    fn save_data(&self, _frame: &DataFrame, _ctx: &IoContext) -> Result<Metadata> {
        anyhow::bail!("never called")
    }
}

/// A loader for plain strings under a fresh name.
struct Greeting;

impl Adapter for Greeting {
    fn name() -> &'static str {
        "greeting"
    }

    fn from_params(params: &Params) -> Result<Self> {
        match params.get("who") {
            Some(Value::String(_)) | None => Ok(Self),
            Some(other) => Err(AdapterError::invalid(format!("bad who: {other}")).into()),
        }
    }
}

impl DataLoader for Greeting {
    type Value = String;

    fn load_data(&self, _ctx: &IoContext) -> Result<(String, Metadata)> {
        let mut meta = Metadata::new();
        meta.insert("source".into(), json!("memory"));
        Ok(("hello".to_string(), meta))
    }
}

fn builtins() -> Result<AdapterRegistry> {
    let registry = AdapterRegistry::new();
    register_all_builtins(&registry)?;
    Ok(registry)
}

#[test]
fn builtins_register_expected_keys() -> Result<()> {
    let registry = builtins()?;
    let frame = TypeTag::of::<DataFrame>();
    let doc = TypeTag::of::<Value>();
    let model = TypeTag::of::<LinearModel>();

    for name in ["csv", "feather", "parquet", "pickle", "json"] {
        assert_eq!(registry.resolve_loader(name, frame)?.name(), name);
        assert_eq!(registry.resolve_saver(name, frame)?.name(), name);
    }
    assert_eq!(registry.resolve_loader("json", doc)?.value_type(), doc);
    assert_eq!(registry.resolve_saver("model", model)?.value_type(), model);
    assert_eq!(registry.resolve_loader("model", model)?.name(), "model");
    Ok(())
}

#[test]
fn register_all_builtins_twice_is_idempotent() -> Result<()> {
    let registry = builtins()?;
    let before = (registry.loader_keys()?, registry.saver_keys()?);
    register_all_builtins(&registry)?;
    assert_eq!((registry.loader_keys()?, registry.saver_keys()?), before);
    Ok(())
}

#[test]
fn same_name_different_types_resolve_to_different_adapters() -> Result<()> {
    let registry = builtins()?;
    let table = registry.resolve_loader("json", TypeTag::of::<DataFrame>())?;
    let document = registry.resolve_loader("json", TypeTag::of::<Value>())?;
    assert_eq!(table.adapter(), TypeTag::of::<JsonReader>());
    assert_eq!(document.adapter(), TypeTag::of::<JsonDocumentAdapter>());
    Ok(())
}

#[test]
fn unregistered_pair_is_not_found() -> Result<()> {
    let registry = builtins()?;
    let err = registry
        .resolve_loader("csv", TypeTag::of::<Value>())
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::NotFound));
    assert!(is_misconfiguration(&err));

    let err = registry
        .resolve_saver("avro", TypeTag::of::<DataFrame>())
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::NotFound));
    Ok(())
}

#[test]
fn empty_registry_resolves_nothing() {
    let registry = AdapterRegistry::new();
    let err = registry
        .resolve_loader("csv", TypeTag::of::<DataFrame>())
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::NotFound));
}

#[test]
fn different_adapter_under_occupied_key_is_duplicate() -> Result<()> {
    let registry = builtins()?;
    let err = registry.register_loader::<ShadowCsv>().unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::Duplicate));

    let entry = registry.resolve_loader("csv", TypeTag::of::<DataFrame>())?;
    assert_eq!(entry.adapter(), TypeTag::of::<CsvAdapter>());
    Ok(())
}

#[test]
fn register_adapter_is_all_or_nothing() -> Result<()> {
    let registry = AdapterRegistry::new();
    registry.register_saver::<CsvAdapter>()?;

    let err = registry.register_adapter::<ShadowCsv>().unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::Duplicate));
    // The free load slot was not taken either.
    assert!(registry.loader_keys()?.is_empty());
    Ok(())
}

#[test]
fn custom_adapter_round_trip_through_registry() -> Result<()> {
    let registry = AdapterRegistry::new();
    registry.register_loader::<Greeting>()?;

    let (value, meta) =
        registry.load::<String>("greeting", &params(json!({}))?, &IoContext::default())?;
    assert_eq!(value, "hello");
    assert_eq!(meta["source"], json!("memory"));

    let err = registry
        .load::<String>("greeting", &params(json!({ "who": 7 }))?, &IoContext::default())
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::InvalidParameter));
    Ok(())
}

#[test]
fn lookups_by_type_and_by_name() -> Result<()> {
    let registry = builtins()?;

    let mut loaders: Vec<&str> = registry
        .loaders_for_type(TypeTag::of::<DataFrame>())?
        .iter()
        .map(|e| e.name())
        .collect();
    loaders.dedup();
    assert!(loaders.contains(&"csv"));
    assert!(loaders.contains(&"pickle"));
    assert!(!loaders.contains(&"model"));

    let savers = registry.savers_for_type(TypeTag::of::<LinearModel>())?;
    assert_eq!(savers.len(), 1);
    assert_eq!(savers[0].name(), "model");

    let json_types = registry.formats_for_name("json")?;
    assert_eq!(json_types.len(), 2);
    assert!(json_types.contains(&TypeTag::of::<DataFrame>()));
    assert!(json_types.contains(&TypeTag::of::<Value>()));
    assert!(registry.formats_for_name("avro")?.is_empty());
    Ok(())
}

#[test]
fn value_types_are_addressable_by_name() -> Result<()> {
    let registry = builtins()?;
    assert_eq!(registry.resolve_type("dataframe")?, TypeTag::of::<DataFrame>());
    assert_eq!(registry.resolve_type("json")?, TypeTag::of::<Value>());

    let names: Vec<String> = registry
        .types_for(BUILTIN_LIBRARY)?
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(names, ["dataframe", "json", "linear_model"]);

    let err = registry.resolve_type("tensor").unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::NotFound));

    let err = registry
        .register_types("other", &[("dataframe", TypeTag::of::<String>())])
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::Duplicate));
    Ok(())
}

#[test]
fn erased_saver_rejects_wrong_value_type() -> Result<()> {
    let registry = builtins()?;
    let dir = testing::TempDirPath::new()?;
    let saver = registry
        .resolve_saver("csv", TypeTag::of::<DataFrame>())?
        .build(&params(json!({ "path": dir.file("x.csv") }))?)?;

    let err = saver
        .save_erased(&"not a frame".to_string(), &IoContext::default())
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::TypeMismatch));
    assert!(!dir.path().join("x.csv").exists());
    Ok(())
}

#[test]
fn registry_is_shareable_across_threads() -> Result<()> {
    let registry = std::sync::Arc::new(AdapterRegistry::new());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let registry = registry.clone();
            std::thread::spawn(move || register_all_builtins(&registry))
        })
        .collect();
    for handle in handles {
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("registration thread panicked"))??;
    }
    assert!(registry
        .resolve_loader("feather", TypeTag::of::<DataFrame>())
        .is_ok());
    Ok(())
}
