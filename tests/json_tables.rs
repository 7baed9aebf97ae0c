use anyhow::Result;
use arrow::datatypes::{DataType, TimeUnit};
use ironadapt::testing::*;
use ironadapt::*;
use serde_json::{json, Value};
use std::fs;

fn registry() -> Result<AdapterRegistry> {
    let registry = AdapterRegistry::new();
    register_all_builtins(&registry)?;
    Ok(registry)
}

fn save(dir: &TempDirPath, file: &str, frame: &DataFrame, extra: Value) -> Result<Metadata> {
    let mut p = params(extra)?;
    p.insert("path".into(), json!(dir.file(file)));
    registry()?.save("json", &p, frame, &IoContext::default())
}

fn load(dir: &TempDirPath, file: &str, extra: Value) -> Result<DataFrame> {
    let mut p = params(extra)?;
    p.insert("source".into(), json!(dir.file(file)));
    Ok(registry()?
        .load::<DataFrame>("json", &p, &IoContext::default())?
        .0)
}

fn read_doc(dir: &TempDirPath, file: &str) -> Result<Value> {
    Ok(serde_json::from_str(&fs::read_to_string(dir.path().join(file))?)?)
}

fn data_type(frame: &DataFrame, column: &str) -> Result<DataType> {
    let schema = frame.schema();
    Ok(schema.field_with_name(column)?.data_type().clone())
}

#[test]
fn default_orient_is_columns() -> Result<()> {
    let dir = TempDirPath::new()?;
    save(&dir, "scores.json", &sample_frame()?, json!({}))?;

    let doc = read_doc(&dir, "scores.json")?;
    assert_eq!(doc["id"], json!({ "0": 1, "1": 2, "2": 3, "3": 4 }));
    assert_eq!(doc["name"]["2"], json!("carol"));

    let loaded = load(&dir, "scores.json", json!({}))?;
    assert_frames_equal(&loaded, &sample_frame()?);
    assert_eq!(loaded.to_rows::<SampleScore>()?, sample_rows());
    Ok(())
}

#[test]
fn every_orient_round_trips() -> Result<()> {
    let dir = TempDirPath::new()?;
    for orient in ["split", "records", "index", "columns"] {
        let file = format!("scores-{orient}.json");
        save(&dir, &file, &sample_frame()?, json!({ "orient": orient }))?;
        let loaded = load(&dir, &file, json!({ "orient": orient }))?;
        assert_frames_equal(&loaded, &sample_frame()?);
    }
    Ok(())
}

#[test]
fn orient_layouts() -> Result<()> {
    let dir = TempDirPath::new()?;
    let frame = sample_frame()?;

    save(&dir, "records.json", &frame, json!({ "orient": "records" }))?;
    assert_eq!(
        read_doc(&dir, "records.json")?[0],
        json!({ "id": 1, "name": "alice", "score": 91.5, "active": true })
    );

    save(&dir, "index.json", &frame, json!({ "orient": "index" }))?;
    assert_eq!(read_doc(&dir, "index.json")?["1"]["name"], json!("bob"));

    save(&dir, "split.json", &frame, json!({ "orient": "split" }))?;
    let split = read_doc(&dir, "split.json")?;
    assert_eq!(split["columns"], json!(["id", "name", "score", "active"]));
    assert_eq!(split["index"], json!([0, 1, 2, 3]));
    assert_eq!(split["data"][3], json!([4, "dave", 84.125, false]));

    save(&dir, "values.json", &frame, json!({ "orient": "values" }))?;
    assert_eq!(
        read_doc(&dir, "values.json")?[1],
        json!([2, "bob", 78.25, false])
    );
    Ok(())
}

#[test]
fn values_orient_loses_column_names() -> Result<()> {
    let dir = TempDirPath::new()?;
    save(&dir, "values.json", &sample_frame()?, json!({ "orient": "values" }))?;
    let loaded = load(&dir, "values.json", json!({ "orient": "values" }))?;
    assert_eq!(loaded.column_names(), ["0", "1", "2", "3"]);
    assert_eq!(loaded.num_rows(), 4);
    Ok(())
}

#[test]
fn split_without_index() -> Result<()> {
    let dir = TempDirPath::new()?;
    save(
        &dir,
        "split.json",
        &sample_frame()?,
        json!({ "orient": "split", "index": false }),
    )?;
    let doc = read_doc(&dir, "split.json")?;
    assert!(doc.get("index").is_none());

    let loaded = load(&dir, "split.json", json!({ "orient": "split" }))?;
    assert_frames_equal(&loaded, &sample_frame()?);
    Ok(())
}

#[test]
fn split_rejects_unexpected_keys() -> Result<()> {
    let dir = TempDirPath::new()?;
    fs::write(
        dir.path().join("bad.json"),
        r#"{"columns": ["a"], "data": [[1]], "extra": 1}"#,
    )?;
    let err = load(&dir, "bad.json", json!({ "orient": "split" })).unwrap_err();
    assert!(!is_misconfiguration(&err));
    assert!(err.to_string().contains("extra"));
    Ok(())
}

#[test]
fn lines_round_trip_and_append() -> Result<()> {
    let dir = TempDirPath::new()?;
    save(&dir, "scores.jsonl", &sample_frame()?, json!({ "lines": true }))?;

    let text = fs::read_to_string(dir.path().join("scores.jsonl"))?;
    assert_eq!(text.lines().count(), 4);
    assert!(text.starts_with(r#"{"id":1,"name":"alice","score":91.5,"active":true}"#));

    save(
        &dir,
        "scores.jsonl",
        &sample_frame()?,
        json!({ "lines": true, "mode": "a" }),
    )?;
    let loaded = load(&dir, "scores.jsonl", json!({ "lines": true }))?;
    assert_eq!(loaded.num_rows(), 8);
    assert_eq!(loaded.to_rows::<SampleScore>()?[4..], sample_rows()[..]);
    Ok(())
}

#[test]
fn nrows_and_chunksize_with_lines() -> Result<()> {
    let dir = TempDirPath::new()?;
    save(&dir, "scores.jsonl", &sample_frame()?, json!({ "lines": true }))?;

    let first_two = load(&dir, "scores.jsonl", json!({ "lines": true, "nrows": 2 }))?;
    assert_eq!(first_two.to_rows::<SampleScore>()?, sample_rows()[..2]);

    let chunked = load(&dir, "scores.jsonl", json!({ "lines": true, "chunksize": 1 }))?;
    assert_frames_equal(&chunked, &sample_frame()?);
    Ok(())
}

#[test]
fn arrow_engine_reads_lines() -> Result<()> {
    let dir = TempDirPath::new()?;
    save(&dir, "scores.jsonl", &sample_frame()?, json!({ "lines": true }))?;
    let loaded = load(
        &dir,
        "scores.jsonl",
        json!({ "lines": true, "engine": "arrow", "chunksize": 3 }),
    )?;
    assert_eq!(loaded.num_rows(), 4);
    assert_eq!(loaded.to_rows::<SampleScore>()?, sample_rows());
    Ok(())
}

#[test]
fn invalid_read_combinations() -> Result<()> {
    let registry = registry()?;
    let ctx = IoContext::default();
    let cases = [
        json!({ "source": "x.json", "chunksize": 10 }),
        json!({ "source": "x.json", "lines": true, "chunksize": 0 }),
        json!({ "source": "x.json", "nrows": 5 }),
        json!({ "source": "x.json", "engine": "arrow" }),
        json!({ "source": "x.json", "lines": true, "orient": "split" }),
        json!({ "source": "x.json", "orient": "table" }),
        json!({ "source": "x.json", "encoding": "utf-16" }),
    ];
    for case in cases {
        let err = registry
            .load::<DataFrame>("json", &params(case.clone())?, &ctx)
            .unwrap_err();
        assert_eq!(
            error_kind(&err),
            Some(ErrorKind::InvalidParameter),
            "{case} should be rejected"
        );
    }
    Ok(())
}

#[test]
fn invalid_write_combinations_touch_nothing() -> Result<()> {
    let dir = TempDirPath::new()?;
    let registry = registry()?;
    let ctx = IoContext::default();
    let cases = [
        json!({ "double_precision": 16 }),
        json!({ "lines": true, "orient": "columns" }),
        json!({ "mode": "a" }),
        json!({ "mode": "x", "lines": true }),
        json!({ "index": false, "orient": "records" }),
        json!({ "index": false }),
        json!({ "index": true, "orient": "values" }),
        json!({ "index": true, "orient": "records" }),
    ];
    for case in cases {
        let mut p = params(case.clone())?;
        p.insert("path".into(), json!(dir.file("out.json")));
        let err = registry
            .save("json", &p, &sample_frame()?, &ctx)
            .unwrap_err();
        assert_eq!(
            error_kind(&err),
            Some(ErrorKind::InvalidParameter),
            "{case} should be rejected"
        );
    }
    assert!(!dir.path().join("out.json").exists());
    Ok(())
}

#[test]
fn dtype_false_keeps_text() -> Result<()> {
    let dir = TempDirPath::new()?;
    save(&dir, "scores.json", &sample_frame()?, json!({ "orient": "records" }))?;
    let loaded = load(
        &dir,
        "scores.json",
        json!({ "orient": "records", "dtype": false }),
    )?;
    for column in ["id", "name", "score", "active"] {
        assert_eq!(data_type(&loaded, column)?, DataType::Utf8);
    }
    assert_frames_equal(&loaded, &sample_frame()?);
    Ok(())
}

#[test]
fn mixed_scalar_column_loads_as_text() -> Result<()> {
    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct Cells {
        a: String,
        b: String,
    }

    let dir = TempDirPath::new()?;
    fs::write(
        dir.path().join("mixed.json"),
        r#"[{"a":1,"b":"x"},{"a":"two","b":"y"}]"#,
    )?;
    let loaded = load(&dir, "mixed.json", json!({ "orient": "records" }))?;
    assert_eq!(data_type(&loaded, "a")?, DataType::Utf8);
    assert_eq!(
        loaded.to_rows::<Cells>()?,
        [
            Cells { a: "1".into(), b: "x".into() },
            Cells { a: "two".into(), b: "y".into() },
        ]
    );

    fs::write(
        dir.path().join("mixed.jsonl"),
        "{\"a\":1.5}\n{\"a\":\"n/a\"}\n",
    )?;
    for engine in ["serde", "arrow"] {
        let loaded = load(&dir, "mixed.jsonl", json!({ "lines": true, "engine": engine }))?;
        assert_eq!(loaded.num_rows(), 2, "{engine}");
        assert_eq!(data_type(&loaded, "a")?, DataType::Utf8, "{engine}");
    }
    Ok(())
}

#[test]
fn dtype_map_casts_named_columns() -> Result<()> {
    let dir = TempDirPath::new()?;
    save(&dir, "scores.json", &sample_frame()?, json!({}))?;
    let loaded = load(
        &dir,
        "scores.json",
        json!({ "dtype": { "id": "float", "active": "str" } }),
    )?;
    assert_eq!(data_type(&loaded, "id")?, DataType::Float64);
    assert_eq!(data_type(&loaded, "active")?, DataType::Utf8);
    assert_eq!(data_type(&loaded, "score")?, DataType::Float64);

    let err = load(&dir, "scores.json", json!({ "dtype": { "missing": "int" } })).unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::InvalidParameter));
    Ok(())
}

#[test]
fn datelike_columns_become_timestamps() -> Result<()> {
    let dir = TempDirPath::new()?;
    fs::write(
        dir.path().join("events.json"),
        r#"[
            {"id": 1, "created_at": 1700000000000, "modified": "2024-01-02T03:04:05", "date": "soon"},
            {"id": 2, "created_at": 1700000060000, "modified": "2024-01-03T00:00:00", "date": "later"}
        ]"#,
    )?;

    let loaded = load(&dir, "events.json", json!({ "orient": "records" }))?;
    let ms = DataType::Timestamp(TimeUnit::Millisecond, None);
    assert_eq!(data_type(&loaded, "created_at")?, ms);
    assert_eq!(data_type(&loaded, "modified")?, ms);
    // Unparseable values leave the column alone.
    assert_eq!(data_type(&loaded, "date")?, DataType::Utf8);
    assert_eq!(data_type(&loaded, "id")?, DataType::Int64);

    let untouched = load(
        &dir,
        "events.json",
        json!({ "orient": "records", "convert_dates": false }),
    )?;
    assert_eq!(data_type(&untouched, "created_at")?, DataType::Int64);

    let only_listed = load(
        &dir,
        "events.json",
        json!({
            "orient": "records",
            "convert_dates": ["id"],
            "keep_default_dates": false,
            "date_unit": "s",
        }),
    )?;
    assert_eq!(
        data_type(&only_listed, "id")?,
        DataType::Timestamp(TimeUnit::Second, None)
    );
    assert_eq!(data_type(&only_listed, "created_at")?, DataType::Int64);
    Ok(())
}

#[test]
fn timestamps_written_as_epoch_or_iso() -> Result<()> {
    let dir = TempDirPath::new()?;
    fs::write(
        dir.path().join("events.json"),
        r#"[{"id": 1, "created_at": 1700000000000}]"#,
    )?;
    let frame = load(&dir, "events.json", json!({ "orient": "records" }))?;

    save(&dir, "epoch.json", &frame, json!({ "orient": "records" }))?;
    assert_eq!(
        read_doc(&dir, "epoch.json")?[0]["created_at"],
        json!(1_700_000_000_000_i64)
    );

    save(
        &dir,
        "seconds.json",
        &frame,
        json!({ "orient": "records", "date_unit": "s" }),
    )?;
    assert_eq!(
        read_doc(&dir, "seconds.json")?[0]["created_at"],
        json!(1_700_000_000_i64)
    );

    save(
        &dir,
        "iso.json",
        &frame,
        json!({ "orient": "records", "date_format": "iso" }),
    )?;
    let iso = read_doc(&dir, "iso.json")?;
    let text = iso[0]["created_at"].as_str().unwrap_or_default();
    assert!(text.starts_with("2023-11-14T22:13:20"), "got {text}");
    Ok(())
}

#[test]
fn double_precision_rounds_floats() -> Result<()> {
    let dir = TempDirPath::new()?;
    save(
        &dir,
        "scores.json",
        &sample_frame()?,
        json!({ "orient": "records", "double_precision": 2 }),
    )?;
    let doc = read_doc(&dir, "scores.json")?;
    assert_eq!(doc[3]["score"], json!(84.13));
    assert_eq!(doc[0]["score"], json!(91.5));
    Ok(())
}

#[test]
fn force_ascii_escapes_non_ascii() -> Result<()> {
    #[derive(serde::Serialize, serde::Deserialize)]
    struct Row {
        name: String,
    }
    let frame = DataFrame::from_rows(&[Row {
        name: "café".into(),
    }])?;
    let dir = TempDirPath::new()?;

    save(&dir, "ascii.json", &frame, json!({ "orient": "records" }))?;
    let text = fs::read_to_string(dir.path().join("ascii.json"))?;
    assert!(text.contains(r"caf\u00e9"));
    assert!(text.is_ascii());

    save(
        &dir,
        "utf8.json",
        &frame,
        json!({ "orient": "records", "force_ascii": false }),
    )?;
    assert!(fs::read_to_string(dir.path().join("utf8.json"))?.contains("café"));

    let loaded = load(&dir, "ascii.json", json!({ "orient": "records" }))?;
    assert_frames_equal(&loaded, &frame);
    Ok(())
}

#[test]
fn indent_pretty_prints() -> Result<()> {
    let dir = TempDirPath::new()?;
    save(
        &dir,
        "pretty.json",
        &sample_frame()?,
        json!({ "orient": "split", "indent": 2 }),
    )?;
    let text = fs::read_to_string(dir.path().join("pretty.json"))?;
    assert!(text.starts_with("{\n  \"columns\""));
    Ok(())
}

#[test]
fn compressed_json_round_trip() -> Result<()> {
    let dir = TempDirPath::new()?;
    save(&dir, "scores.json.gz", &sample_frame()?, json!({}))?;
    let bytes = fs::read(dir.path().join("scores.json.gz"))?;
    assert_eq!(&bytes[..2], &[0x1f, 0x8b]);

    let loaded = load(&dir, "scores.json.gz", json!({}))?;
    assert_frames_equal(&loaded, &sample_frame()?);

    save(
        &dir,
        "scores.lines",
        &sample_frame()?,
        json!({ "lines": true, "compression": "zstd" }),
    )?;
    let loaded = load(&dir, "scores.lines", json!({ "lines": true }))?;
    assert_frames_equal(&loaded, &sample_frame()?);
    Ok(())
}

#[test]
fn encodings() -> Result<()> {
    let dir = TempDirPath::new()?;
    let mut latin1 = b"[{\"name\": \"caf".to_vec();
    latin1.push(0xe9);
    latin1.extend_from_slice(b"\"}]");
    fs::write(dir.path().join("latin1.json"), &latin1)?;

    let loaded = load(
        &dir,
        "latin1.json",
        json!({ "orient": "records", "encoding": "latin-1" }),
    )?;
    #[derive(serde::Deserialize)]
    struct Row {
        name: String,
    }
    assert_eq!(loaded.to_rows::<Row>()?[0].name, "café");

    let err = load(&dir, "latin1.json", json!({ "orient": "records" })).unwrap_err();
    assert!(!is_misconfiguration(&err));

    let replaced = load(
        &dir,
        "latin1.json",
        json!({ "orient": "records", "encoding_errors": "replace" }),
    )?;
    assert_eq!(replaced.to_rows::<Row>()?[0].name, "caf\u{fffd}");
    Ok(())
}

#[test]
fn json_load_metadata_counts_rows() -> Result<()> {
    let dir = TempDirPath::new()?;
    let saved = save(&dir, "scores.json", &sample_frame()?, json!({}))?;
    assert_eq!(saved["rows"], json!(4));
    assert_eq!(saved["columns"], json!(4));
    assert!(saved["size_bytes"].as_u64().is_some_and(|n| n > 0));
    Ok(())
}
