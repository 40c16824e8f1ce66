#[path = "common/mod.rs"]
mod common;

use common::*;
use recipe_etl::{load_csv_recipes, parse_counter, IngestReport, ProgressScope, RecipeETL};
use std::fs;

/// Demonstrates merging two CSV exports with overlapping ids.
/// Outcome: each id appears once, the first file's row wins, and order follows first sight.
#[test]
fn ingest_dedups_across_files_first_file_wins() {
    let base = temp_workspace();
    let a = base.join("in").join("a.csv");
    let b = base.join("in").join("b.csv");
    write_csv(&a, &[("1", "first", "10", "반찬"), ("2", "second", "20", "국/탕")]);
    write_csv(&b, &[("2", "second-dup", "999", "국/탕"), ("3", "third", "\"1,234\"", "\"밥,죽,떡\"")]);

    let report = RecipeETL::new()
        .work_dir(&base)
        .progress(false)
        .csv_inputs([&a, &b])
        .ingest()
        .unwrap();

    assert_eq!(report.files, 2);
    assert_eq!(report.rows_read, 4);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.written, 3);

    let out = read_json(&base.join("all_recipes_for_firestore.json"));
    let rows = out.as_array().unwrap();
    let ids: Vec<i64> = rows.iter().map(|r| r["RCP_SNO"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(rows[1]["title"], "second");
    assert_eq!(rows[1]["view_count"], 20);
    assert_eq!(rows[2]["view_count"], 1234);
}

/// Demonstrates the normalized record shape written by ingest.
/// Outcome: crawl fields exist with empty defaults and CSV columns are mapped by name.
#[test]
fn ingest_fills_schema_defaults() {
    let base = temp_workspace();
    let a = base.join("a.csv");
    write_csv(&a, &[("42", "김치찌개", "5", "찌개")]);

    RecipeETL::new().work_dir(&base).progress(false).csv_inputs([&a]).ingest().unwrap();

    let out = read_json(&base.join("all_recipes_for_firestore.json"));
    let r = &out[0];
    assert_eq!(r["RCP_SNO"], 42);
    assert_eq!(r["title"], "김치찌개");
    assert_eq!(r["category_kind"], "찌개");
    assert_eq!(r["servings"], "2인분");
    assert_eq!(r["imageUrl"], "http://img/42.jpg");
    assert_eq!(r["ingredients_raw"], "");
    assert_eq!(r["ingredients"].as_array().unwrap().len(), 0);
    assert_eq!(r["cooking_steps"].as_array().unwrap().len(), 0);
    assert_eq!(r["recommend_count"], 3);
    assert_eq!(r["scrap_count"], 4);
}

/// Demonstrates that rows without an id never reach the output.
/// Outcome: the blank-id row is counted as skipped.
#[test]
fn ingest_skips_rows_without_id() {
    let base = temp_workspace();
    let a = base.join("a.csv");
    write_csv(&a, &[("", "orphan", "1", "반찬"), ("7", "kept", "1", "반찬")]);

    let report = RecipeETL::new().work_dir(&base).progress(false).csv_inputs([&a]).ingest().unwrap();
    assert_eq!(report.rows_skipped, 1);
    assert_eq!(report.written, 1);
}

/// Demonstrates the fatal path for a missing input.
/// Outcome: an error naming the file, and no output is written.
#[test]
fn ingest_missing_csv_is_an_error() {
    let base = temp_workspace();
    let err = RecipeETL::new()
        .work_dir(&base)
        .progress(false)
        .csv_inputs([base.join("nope.csv")])
        .ingest()
        .unwrap_err();
    assert!(format!("{err:#}").contains("nope.csv"));
    assert!(!base.join("all_recipes_for_firestore.json").exists());
    assert!(fs::read_dir(&base).unwrap().next().is_none());
}

/// Demonstrates lenient counter parsing.
/// Outcome: separators and decimals are tolerated, junk and negatives become 0.
#[test]
fn counters_are_parsed_leniently() {
    assert_eq!(parse_counter("1,234"), 1234);
    assert_eq!(parse_counter(" 12.9 "), 12);
    assert_eq!(parse_counter("-5"), 0);
    assert_eq!(parse_counter("n/a"), 0);
    assert_eq!(parse_counter(""), 0);
}

/// Demonstrates per-file progress while loading CSV exports.
/// Outcome: the bar advances once per file read, and stops at the file that fails.
#[test]
fn progress_advances_per_file() {
    let base = temp_workspace();
    let a = base.join("a.csv");
    let b = base.join("b.csv");
    write_csv(&a, &[("1", "one", "10", "반찬")]);
    write_csv(&b, &[("2", "two", "20", "반찬")]);

    let pb = ProgressScope::count("Ingest CSV", 3);
    let mut report = IngestReport::default();
    let recipes = load_csv_recipes(&[a.clone(), b], &mut report, &pb).unwrap();
    assert_eq!(recipes.len(), 2);
    assert_eq!(pb.position(), 2);

    let pb = ProgressScope::count("Ingest CSV", 2);
    let res = load_csv_recipes(&[a, base.join("gone.csv")], &mut IngestReport::default(), &pb);
    assert!(res.is_err());
    assert_eq!(pb.position(), 1);
}
