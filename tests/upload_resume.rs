#[path = "common/mod.rs"]
mod common;

use common::*;
use recipe_etl::{
    commit_with_retry, doc_key, to_firestore_value, DirectorySink, Document, DocumentSink, FirestoreSink,
    OffsetStore, RecipeETL, UploadCfg,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn cfg(max_retries: usize) -> UploadCfg {
    UploadCfg { batch_size: 2, max_retries, retry_delay: Duration::ZERO, ..Default::default() }
}

fn write_docs(base: &Path, name: &str, ids: impl IntoIterator<Item = i64>) -> PathBuf {
    let path = base.join("out").join(name);
    let docs: Vec<Value> = ids.into_iter().map(|id| json!({ "RCP_SNO": id, "title": format!("r{id}") })).collect();
    write_json(&path, &Value::Array(docs));
    path
}

fn etl(base: &Path, files: &[PathBuf], max_retries: usize) -> RecipeETL {
    RecipeETL::new()
        .work_dir(base)
        .progress(false)
        .output_files(files)
        .upload_cfg(cfg(max_retries))
}

fn checkpoint(base: &Path) -> Value {
    read_json(&base.join("upload_checkpoint.json"))
}

fn keys(ids: &[i64]) -> Vec<String> {
    ids.iter().map(|i| i.to_string()).collect()
}

/// Demonstrates a clean upload in fixed-size batches.
/// Outcome: every document is committed once and the checkpoint reaches the file length.
#[test]
fn full_upload_advances_checkpoint_to_end() {
    let base = temp_workspace();
    let a = write_docs(&base, "a.json", 1..=5);
    let sink = FakeSink::default();

    let report = etl(&base, &[a], 0).upload(&sink).unwrap();
    let f = &report.files[0];
    assert_eq!(f.total, 5);
    assert_eq!(f.batches_committed, 3);
    assert_eq!(f.committed_offset, 5);
    assert!(f.is_complete());
    assert_eq!(sink.committed_keys(), keys(&[1, 2, 3, 4, 5]));
    assert_eq!(sink.commits.lock().iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2, 1]);
    assert_eq!(checkpoint(&base), json!({ "a.json": 5 }));
}

/// Demonstrates resume after batch B was committed.
/// Outcome: the rerun uploads only batches B+1 onward.
#[test]
fn rerun_starts_after_last_committed_batch() {
    let base = temp_workspace();
    let a = write_docs(&base, "a.json", 1..=5);
    OffsetStore::new(base.join("upload_checkpoint.json")).set("a.json", 2).unwrap();
    let sink = FakeSink::default();

    let report = etl(&base, &[a], 0).upload(&sink).unwrap();
    assert_eq!(report.files[0].start_offset, 2);
    assert_eq!(sink.committed_keys(), keys(&[3, 4, 5]));
    assert_eq!(checkpoint(&base)["a.json"], 5);
}

/// Demonstrates that a mid-batch offset realigns to batch boundaries.
/// Outcome: a short first batch, then full batches at absolute multiples.
#[test]
fn unaligned_offset_realigns_batches() {
    let base = temp_workspace();
    let a = write_docs(&base, "a.json", 1..=6);
    OffsetStore::new(base.join("upload_checkpoint.json")).set("a.json", 3).unwrap();
    let sink = FakeSink::default();

    etl(&base, &[a], 0).upload(&sink).unwrap();
    let sizes: Vec<usize> = sink.commits.lock().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![1, 2]);
    assert_eq!(sink.committed_keys(), keys(&[4, 5, 6]));
}

/// Demonstrates a batch that fails every retry.
/// Outcome: later batches still go out, the checkpoint stays at the previous offset,
/// and a rerun resumes from there.
#[test]
fn failed_batch_holds_checkpoint() {
    let base = temp_workspace();
    let a = write_docs(&base, "a.json", 1..=5);
    let bad = FakeSink::poisoned(&["3"]);

    let report = etl(&base, &[a.clone()], 2).upload(&bad).unwrap();
    let f = &report.files[0];
    assert_eq!(f.batches_failed, 1);
    assert_eq!(f.batches_committed, 2);
    assert_eq!(f.committed_offset, 2);
    // 1 + (1 + 2 retries) + 1
    assert_eq!(*bad.attempts.lock(), 5);
    assert_eq!(bad.committed_keys(), keys(&[1, 2, 5]));
    assert_eq!(checkpoint(&base)["a.json"], 2);

    let good = FakeSink::default();
    let report = etl(&base, &[a], 2).upload(&good).unwrap();
    assert_eq!(report.batches_failed(), 0);
    assert_eq!(good.committed_keys(), keys(&[3, 4, 5]));
    assert_eq!(checkpoint(&base)["a.json"], 5);
}

/// Demonstrates a batch the store refuses as malformed.
/// Outcome: one attempt only, no retries, and the checkpoint holds before that batch.
#[test]
fn invalid_document_is_not_retried() {
    let sink = FakeSink::rejecting(&["bad"]);
    let batch = vec![Document { key: "bad".into(), body: json!({}) }];
    assert!(!commit_with_retry(&sink, &cfg(3), &batch, "a.json"));
    assert_eq!(*sink.attempts.lock(), 1);

    let base = temp_workspace();
    let a = write_docs(&base, "a.json", 1..=4);
    let sink = FakeSink::rejecting(&["3"]);
    let report = etl(&base, &[a], 3).upload(&sink).unwrap();
    assert_eq!(report.batches_failed(), 1);
    // 1 + 1 (no retries on the rejected batch)
    assert_eq!(*sink.attempts.lock(), 2);
    assert_eq!(sink.committed_keys(), keys(&[1, 2]));
    assert_eq!(checkpoint(&base)["a.json"], 2);
}

/// Demonstrates parallel workers sharing one checkpoint file.
/// Outcome: both files' offsets survive in the checkpoint.
#[test]
fn parallel_files_keep_both_offsets() {
    let base = temp_workspace();
    let a = write_docs(&base, "final_recipes_part1.json", 1..=7);
    let b = write_docs(&base, "final_recipes_part2.json", 101..=109);
    let sink = FakeSink::default();

    let report = etl(&base, &[a, b], 0).parallelism(2).upload(&sink).unwrap();
    assert_eq!(report.documents_committed(), 16);
    assert_eq!(
        checkpoint(&base),
        json!({ "final_recipes_part1.json": 7, "final_recipes_part2.json": 9 })
    );
}

/// Demonstrates the default inputs: the two refine partitions under the output dir.
/// Outcome: a file that is already complete uploads nothing.
#[test]
fn completed_files_are_skipped() {
    let base = temp_workspace();
    write_docs(&base, "final_recipes_part1.json", 1..=2);
    write_docs(&base, "final_recipes_part2.json", 3..=4);
    let store = OffsetStore::new(base.join("upload_checkpoint.json"));
    store.set("final_recipes_part1.json", 2).unwrap();
    store.set("final_recipes_part2.json", 99).unwrap();
    let sink = FakeSink::default();

    let report = RecipeETL::new()
        .work_dir(&base)
        .output_dir(base.join("out"))
        .progress(false)
        .upload_cfg(cfg(0))
        .upload(&sink)
        .unwrap();
    assert_eq!(report.files.len(), 2);
    assert_eq!(report.documents_committed(), 0);
    assert_eq!(*sink.attempts.lock(), 0);
}

/// Demonstrates the missing-input path.
/// Outcome: an error before anything is committed.
#[test]
fn missing_upload_input_is_an_error() {
    let base = temp_workspace();
    let sink = FakeSink::default();
    let err = etl(&base, &[base.join("nope.json")], 0).upload(&sink).unwrap_err();
    assert!(format!("{err:#}").contains("nope.json"));
    assert_eq!(*sink.attempts.lock(), 0);
}

/// Demonstrates document key selection.
/// Outcome: the record id when present, otherwise file name plus absolute index.
#[test]
fn document_keys_fall_back_to_position() {
    assert_eq!(doc_key(&json!({ "RCP_SNO": 6912734 }), "a.json", 0), "6912734");
    assert_eq!(doc_key(&json!({ "RCP_SNO": "abc" }), "a.json", 0), "abc");
    assert_eq!(doc_key(&json!({ "RCP_SNO": null }), "a.json", 7), "a.json_7");
    assert_eq!(doc_key(&json!({ "title": "x" }), "a.json", 501), "a.json_501");

    let base = temp_workspace();
    let path = base.join("out").join("a.json");
    write_json(&path, &json!([{ "RCP_SNO": 1 }, { "title": "anon" }, { "title": "anon2" }]));
    let sink = FakeSink::default();
    etl(&base, &[path], 0).upload(&sink).unwrap();
    assert_eq!(sink.committed_keys(), vec!["1", "a.json_1", "a.json_2"]);
}

/// Demonstrates the Firestore typed-value encoding.
/// Outcome: integers are strings, floats are doubles, nesting uses array/map values.
#[test]
fn firestore_value_encoding() {
    let v = to_firestore_value(&json!({
        "n": 3, "f": 1.5, "s": "x", "b": true, "z": null,
        "a": [1, "y"], "m": { "k": "v" }
    }));
    let fields = &v["mapValue"]["fields"];
    assert_eq!(fields["n"], json!({ "integerValue": "3" }));
    assert_eq!(fields["f"], json!({ "doubleValue": 1.5 }));
    assert_eq!(fields["s"], json!({ "stringValue": "x" }));
    assert_eq!(fields["b"], json!({ "booleanValue": true }));
    assert_eq!(fields["z"], json!({ "nullValue": null }));
    assert_eq!(
        fields["a"],
        json!({ "arrayValue": { "values": [{ "integerValue": "1" }, { "stringValue": "y" }] } })
    );
    assert_eq!(fields["m"], json!({ "mapValue": { "fields": { "k": { "stringValue": "v" } } } }));
}

/// Demonstrates the commit request body for one batch.
/// Outcome: one update write per document, named under the collection.
#[test]
fn firestore_commit_body() {
    let sink = FirestoreSink::new("demo", "token").unwrap();
    let batch = vec![Document { key: "42".into(), body: json!({ "title": "t" }) }];
    let body = sink.commit_body("recipes", &batch).unwrap();
    let write = &body["writes"][0]["update"];
    assert_eq!(write["name"], "projects/demo/databases/(default)/documents/recipes/42");
    assert_eq!(write["fields"]["title"]["stringValue"], "t");

    let not_object = vec![Document { key: "1".into(), body: json!([1]) }];
    assert!(sink.commit_body("recipes", &not_object).is_err());
}

/// Demonstrates targeting a non-default database through another endpoint.
/// Outcome: both the commit URL and the document names follow the overrides.
#[test]
fn firestore_endpoint_and_database_overrides() {
    let sink = FirestoreSink::new("demo", "token")
        .unwrap()
        .with_endpoint("http://localhost:8080/v1/")
        .with_database("staging");
    assert_eq!(sink.commit_url(), "http://localhost:8080/v1/projects/demo/databases/staging/documents:commit");
    let batch = vec![Document { key: "7".into(), body: json!({ "title": "t" }) }];
    let body = sink.commit_body("recipes", &batch).unwrap();
    assert_eq!(body["writes"][0]["update"]["name"], "projects/demo/databases/staging/documents/recipes/7");

    let default = FirestoreSink::new("demo", "token").unwrap();
    assert!(default.commit_url().starts_with(recipe_etl::FIRESTORE_ENDPOINT));
}

/// Demonstrates the local mirror sink end to end.
/// Outcome: one JSON file per document under the collection directory.
#[test]
fn directory_sink_writes_documents() {
    let base = temp_workspace();
    let a = write_docs(&base, "a.json", 1..=3);
    let mirror = base.join("mirror");
    let sink = DirectorySink::new(&mirror);

    etl(&base, &[a], 0).upload(&sink).unwrap();
    for id in 1..=3 {
        let doc = read_json(&mirror.join("recipes").join(format!("{id}.json")));
        assert_eq!(doc["title"], format!("r{id}"));
    }
    assert!(sink.commit("recipes", &[Document { key: String::new(), body: json!({}) }]).is_err());
}
