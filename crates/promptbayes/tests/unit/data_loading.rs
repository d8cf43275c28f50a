//! Tests for loading trial corpora and ground truth from files.

use std::collections::BTreeSet;
use std::io::Write;

use promptbayes::data::{load_ground_truth, load_trials, DataError};
use promptbayes::{Configuration, Factor};
use tempfile::NamedTempFile;

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn config_json(index: usize) -> String {
    let factors = Configuration::new(index).unwrap().factors();
    serde_json::to_string(&factors).unwrap()
}

#[test]
fn loads_runner_output() {
    let text = format!(
        r#"{{"model": "some-llm", "results": [
            {{"config": {}, "config_index": 64, "detected_lines": [3, 7], "response": "..."}},
            {{"config": {}, "config_index": 0, "detected_lines": [11]}}
        ]}}"#,
        config_json(64),
        config_json(0)
    );
    let file = write_temp(&text);
    let trials = load_trials(file.path()).unwrap();

    assert_eq!(trials.len(), 2);
    assert!(trials[0].factors.is_on(Factor::UseReasoning));
    assert_eq!(trials[0].configuration().index(), 64);
    assert_eq!(trials[1].detected_lines, BTreeSet::from([11]));
}

#[test]
fn loads_ground_truth() {
    let file = write_temp(r#"{"document": "essay.md", "errors": [{"line": 7}, {"line": 3}]}"#);
    assert_eq!(load_ground_truth(file.path()).unwrap(), BTreeSet::from([3, 7]));
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.json");
    assert!(matches!(load_trials(&missing), Err(DataError::Io(_))));
    assert!(matches!(load_ground_truth(&missing), Err(DataError::Io(_))));
}

#[test]
fn bad_record_reports_index() {
    let text = format!(
        r#"[{{"config": {}, "detected_lines": [1]}}, {{"config": {}, "detected_lines": [-4]}}]"#,
        config_json(1),
        config_json(2)
    );
    let file = write_temp(&text);
    match load_trials(file.path()) {
        Err(DataError::Record { index, .. }) => assert_eq!(index, 1),
        other => panic!("expected a record error, got {:?}", other),
    }
}

#[test]
fn declared_index_mismatch_survives_loading() {
    // Loading keeps the declared index; the extractor rejects the mismatch.
    let text = format!(
        r#"[{{"config": {}, "config_index": 9, "detected_lines": [1]}}]"#,
        config_json(8)
    );
    let file = write_temp(&text);
    let trials = load_trials(file.path()).unwrap();
    assert_eq!(trials[0].declared_index, Some(9));
    assert_eq!(trials[0].configuration().index(), 8);
}
