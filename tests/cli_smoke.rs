mod common;

use common::{build_fixture, run};
use serde_json::Value;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn stdout_json(output: &std::process::Output) -> Result<Value, serde_json::Error> {
    serde_json::from_slice(&output.stdout)
}

#[test]
fn index_then_search_json() -> TestResult {
    let tmp = tempfile::tempdir()?;
    build_fixture(tmp.path(), "hash:64")?;
    assert!(tmp.path().join("index.redb").is_file());

    let output = run(
        tmp.path(),
        &["search", "The LORD is my shepherd; I shall not want.", "--json"],
    )?;
    assert!(output.status.success());

    let value = stdout_json(&output)?;
    let results = value["results"].as_array().ok_or("results array")?;
    assert_eq!(value["result_count"], 3);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["citation"], "Psalms 2:1");
    assert_eq!(results[0]["rank"], 1);
    assert_eq!(results[0]["chapter"], 2);
    Ok(())
}

#[test]
fn search_count_larger_than_corpus() -> TestResult {
    let tmp = tempfile::tempdir()?;
    build_fixture(tmp.path(), "hash:64")?;

    let output = run(tmp.path(), &["search", "light", "-n", "50", "--json"])?;
    assert!(output.status.success());
    let value = stdout_json(&output)?;
    assert_eq!(value["result_count"], 6);
    Ok(())
}

#[test]
fn zero_count_is_rejected() -> TestResult {
    let tmp = tempfile::tempdir()?;
    build_fixture(tmp.path(), "hash:64")?;

    let output = run(tmp.path(), &["search", "light", "-n", "0"])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("InvalidArgument"));
    Ok(())
}

#[test]
fn get_by_citation() -> TestResult {
    let tmp = tempfile::tempdir()?;
    build_fixture(tmp.path(), "hash:64")?;

    let output = run(tmp.path(), &["get", "John 1:1", "--json"])?;
    assert!(output.status.success());
    let value = stdout_json(&output)?;
    assert_eq!(value["text"], "Jesus wept.");
    assert_eq!(value["collection"], "John");

    let output = run(tmp.path(), &["get", "John 11:35"])?;
    assert!(!output.status.success());
    Ok(())
}

#[test]
fn mismatched_embedder_fails_to_load() -> TestResult {
    let tmp = tempfile::tempdir()?;
    build_fixture(tmp.path(), "hash:384")?;

    let output = run(tmp.path(), &["search", "light", "--model", "hash:768"])?;
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("IndexFormat"));
    Ok(())
}

#[test]
fn missing_index_fails_to_load() -> TestResult {
    let tmp = tempfile::tempdir()?;

    let output = run(tmp.path(), &["search", "light", "--model", "hash"])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("IndexNotFound"));
    Ok(())
}

#[test]
fn failed_rebuild_keeps_previous_index() -> TestResult {
    let tmp = tempfile::tempdir()?;
    build_fixture(tmp.path(), "hash:64")?;

    let broken = tmp.path().join("broken.json");
    std::fs::write(&broken, "[{\"name\": \"Genesis\", \"chapters\": [[1]]}]")?;
    let output = run(
        tmp.path(),
        &[
            "index",
            broken.to_str().ok_or("non-utf8 path")?,
            "--model",
            "hash:64",
            "--no-progress",
        ],
    )?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("CorpusFormat"));

    let output = run(tmp.path(), &["get", "Genesis 1:3"])?;
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Let there be light"));
    Ok(())
}

#[test]
fn status_reports_index_binding() -> TestResult {
    let tmp = tempfile::tempdir()?;
    build_fixture(tmp.path(), "hash:64")?;

    let output = run(tmp.path(), &["status", "--json"])?;
    assert!(output.status.success());
    let value = stdout_json(&output)?;
    assert_eq!(value["index"]["passages"], 6);
    assert_eq!(value["index"]["dimension"], 64);
    assert_eq!(value["index"]["overlong"], "truncate");
    Ok(())
}

#[test]
fn status_inspects_index_at_custom_path() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let corpus = tmp.path().join("corpus.json");
    std::fs::write(&corpus, common::CORPUS)?;
    let custom = tmp.path().join("elsewhere").join("kjv.redb");
    let custom_str = custom.to_str().ok_or("non-utf8 path")?;

    let output = run(
        tmp.path(),
        &[
            "index",
            corpus.to_str().ok_or("non-utf8 path")?,
            "--output",
            custom_str,
            "--model",
            "hash:32",
            "--no-progress",
        ],
    )?;
    assert!(output.status.success());

    let output = run(tmp.path(), &["status", "--json"])?;
    assert!(stdout_json(&output)?["index"].is_null());

    let output = run(tmp.path(), &["status", "--index", custom_str, "--json"])?;
    assert!(output.status.success());
    let value = stdout_json(&output)?;
    assert_eq!(value["index_path"], custom_str);
    assert_eq!(value["index"]["passages"], 6);
    assert_eq!(value["index"]["dimension"], 32);
    Ok(())
}

#[test]
fn model_setting_roundtrip() -> TestResult {
    let tmp = tempfile::tempdir()?;

    let output = run(tmp.path(), &["model", "set", "hash:32"])?;
    assert!(output.status.success());

    let output = run(tmp.path(), &["model", "show", "--json"])?;
    let value = stdout_json(&output)?;
    assert_eq!(value["model"], "hash:32");
    assert_eq!(value["source"], "config");

    let output = run(tmp.path(), &["model", "clear"])?;
    assert!(output.status.success());

    let output = run(tmp.path(), &["model", "show", "--json"])?;
    let value = stdout_json(&output)?;
    assert_eq!(value["source"], "default");
    Ok(())
}
