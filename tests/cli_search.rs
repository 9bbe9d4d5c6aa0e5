mod util;

use assert_cmd::Command;
use chrono::Datelike;
use predicates::prelude::*;
use predicates::str::contains;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use tempfile::TempDir;

/// Binary isolated from the user's config, data dir, and environment.
fn base_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("csearch"));
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env_remove("CSEARCH_DB")
        .env_remove("CSEARCH_RESULT_LIMIT")
        .env_remove("CSEARCH_BACKEND_TIMEOUT_MS")
        .env_remove("CSEARCH_DEFAULT_WEIGHT")
        .env_remove("RUST_LOG");
    cmd
}

/// Temp home with the fixture imported through the CLI.
fn imported() -> (TempDir, std::path::PathBuf) {
    let home = TempDir::new().unwrap();
    let db = home.path().join("catalog/courses.db");
    let output = base_cmd(home.path())
        .args(["--json", "--db"])
        .arg(&db)
        .arg("import")
        .arg(util::fixture_path())
        .assert()
        .success()
        .get_output()
        .clone();
    let report: Value = serde_json::from_slice(&output.stdout).expect("import json");
    assert_eq!(report["read"], 6);
    assert_eq!(report["inserted"], 6);
    assert_eq!(report["replaced"], 0);
    (home, db)
}

fn run_json(home: &Path, db: &Path, args: &[&str]) -> Value {
    let output = base_cmd(home)
        .arg("--json")
        .arg("--db")
        .arg(db)
        .args(args)
        .assert()
        .success()
        .get_output()
        .clone();
    serde_json::from_slice(&output.stdout).expect("valid json on stdout")
}

fn course_ids(courses: &Value) -> Vec<i64> {
    courses
        .as_array()
        .expect("course array")
        .iter()
        .map(|c| c["id"].as_i64().unwrap())
        .collect()
}

#[test]
fn title_search_ranks_by_score() {
    let (home, db) = imported();
    let courses = run_json(home.path(), &db, &["search", "economics", "--field", "title"]);

    let ids: BTreeSet<_> = course_ids(&courses).into_iter().collect();
    assert_eq!(ids, BTreeSet::from([101, 205, 620]));

    let scores: Vec<f64> = courses
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["score"].as_f64().unwrap())
        .collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    for course in courses.as_array().unwrap() {
        assert_eq!(course["semester"], "Fall 2026");
        assert!(course["department_color"].as_str().unwrap().starts_with('#'));
    }
}

#[test]
fn instructor_search_matches_name_prefixes() {
    let (home, db) = imported();
    let courses = run_json(home.path(), &db, &["search", "smith", "-f", "instructor"]);
    let mut ids = course_ids(&courses);
    ids.sort();
    assert_eq!(ids, vec![101, 310, 412]);
}

#[test]
fn search_honours_day_and_component_filters() {
    let (home, db) = imported();
    let courses = run_json(
        home.path(),
        &db,
        &["search", "economics", "--day", "thu:14:00-17:00"],
    );
    assert_eq!(course_ids(&courses), vec![620]);

    let courses = run_json(
        home.path(),
        &db,
        &["search", "economics", "--component", "SEM"],
    );
    assert_eq!(course_ids(&courses), vec![205]);

    let courses = run_json(
        home.path(),
        &db,
        &["search", "economics", "--term", "Spring_2027"],
    );
    assert_eq!(course_ids(&courses), Vec::<i64>::new());
}

#[test]
fn limit_caps_result_count() {
    let (home, db) = imported();
    let courses = run_json(home.path(), &db, &["search", "economics", "--limit", "2"]);
    assert_eq!(course_ids(&courses).len(), 2);
}

#[test]
fn keywords_file_skips_inactive_entries() {
    let (home, db) = imported();
    let file = home.path().join("keywords.json");
    std::fs::write(
        &file,
        r#"[
            {"text": "chemistry", "weight": 3},
            {"text": "economics", "weight": 9, "active": false}
        ]"#,
    )
    .unwrap();
    let courses = run_json(
        home.path(),
        &db,
        &["search", "--keywords-file", file.to_str().unwrap()],
    );
    assert_eq!(course_ids(&courses), vec![310]);
}

#[test]
fn empty_search_returns_no_courses() {
    let (home, db) = imported();
    let courses = run_json(home.path(), &db, &["search"]);
    assert_eq!(courses, Value::Array(Vec::new()));
}

#[test]
fn empty_search_succeeds_without_a_database() {
    let home = TempDir::new().unwrap();
    let missing = home.path().join("nope/courses.db");
    let output = base_cmd(home.path())
        .arg("--json")
        .arg("--db")
        .arg(&missing)
        .arg("search")
        .assert()
        .success()
        .get_output()
        .clone();
    let courses: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(courses, Value::Array(Vec::new()));

    let file = home.path().join("dormant.json");
    std::fs::write(&file, r#"[{"text": "economics", "active": false}]"#).unwrap();
    let output = base_cmd(home.path())
        .arg("--json")
        .arg("--db")
        .arg(&missing)
        .args(["search", "--keywords-file", file.to_str().unwrap()])
        .assert()
        .success()
        .get_output()
        .clone();
    let courses: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(courses, Value::Array(Vec::new()));
    assert!(!missing.exists());
}

#[test]
fn lookup_returns_requested_offerings() {
    let (home, db) = imported();
    let courses = run_json(
        home.path(),
        &db,
        &["lookup", "7001:Spring:2027:001", "5001:Fall:2026:002"],
    );
    assert_eq!(course_ids(&courses), vec![412, 620]);
    let law = &courses[0];
    assert_eq!(law["semester"], "Spring 2027");
    assert_eq!(law["schedule"], Value::Array(Vec::new()));
    assert!(law["score"].is_null());
    let econ = &courses[1];
    assert_eq!(econ["schedule"][0]["day"], "thursday");
    assert_eq!(econ["schedule"][0]["start_time"], 900);
}

#[test]
fn explain_prints_compiled_query_without_a_database() {
    let home = TempDir::new().unwrap();
    let output = base_cmd(home.path())
        .args(["--db", "/nonexistent/courses.db"])
        .args(["search", "Micro-Economics", "-w", "4"])
        .arg("--explain")
        .assert()
        .success()
        .get_output()
        .clone();
    let compiled: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(compiled["terms"], serde_json::json!(["economics", "micro"]));
    assert_eq!(
        compiled["primary_columns"],
        serde_json::json!(["course_description_long", "title"])
    );
    assert_eq!(compiled["field_weights"]["TITLE"], 4);
    assert_eq!(compiled["ranking"]["prefix_match"], true);
}

#[test]
fn catalog_lists_distinct_values() {
    let (home, db) = imported();
    let schools = run_json(home.path(), &db, &["catalog", "schools"]);
    assert_eq!(
        schools,
        serde_json::json!(["Arts & Sciences", "Engineering", "Law"])
    );

    let components = run_json(home.path(), &db, &["catalog", "components"]);
    assert_eq!(components, serde_json::json!(["LAB", "LEC", "SEM"]));

    let this_year = chrono::Local::now().year();
    let terms = run_json(home.path(), &db, &["catalog", "terms"]);
    for token in terms.as_array().unwrap() {
        let (_, year) = token.as_str().unwrap().rsplit_once('_').unwrap();
        assert!(year.parse::<i32>().unwrap() >= this_year);
    }
}

#[test]
fn keyword_options_mark_defaults() {
    let home = TempDir::new().unwrap();
    base_cmd(home.path())
        .args(["catalog", "keyword-options"])
        .assert()
        .success()
        .stdout(contains("Title (default)"))
        .stdout(contains("Instructor\n"))
        .stdout(contains("Library reserves").not());
}

#[test]
fn schedule_catalog_renders_bounds() {
    let home = TempDir::new().unwrap();
    base_cmd(home.path())
        .args(["catalog", "schedule", "--bound", "monday_min=09:00"])
        .args(["--bound", "friday_max=720"])
        .assert()
        .success()
        .stdout(contains("monday\t09:00-\n"))
        .stdout(contains("tuesday\t-\n"))
        .stdout(contains("friday\t-12:00\n"));
}

#[test]
fn missing_database_reports_json_error() {
    let home = TempDir::new().unwrap();
    let missing = home.path().join("nope/courses.db");
    let output = base_cmd(home.path())
        .arg("--json")
        .arg("--db")
        .arg(&missing)
        .args(["search", "economics"])
        .assert()
        .failure()
        .get_output()
        .clone();
    let err: Value = serde_json::from_slice(&output.stdout).expect("json error");
    assert_eq!(err["error"], true);
    assert_eq!(err["code"], "backend_unavailable");
    let message = err["message"].as_str().unwrap();
    assert!(message.contains("not found"));
    assert_eq!(message.matches("backend unreachable").count(), 1);
    assert!(!missing.exists());
}

#[test]
fn out_of_range_weight_is_rejected() {
    let (home, db) = imported();
    let output = base_cmd(home.path())
        .arg("--json")
        .arg("--db")
        .arg(&db)
        .args(["search", "economics", "--weight", "12"])
        .assert()
        .failure()
        .get_output()
        .clone();
    let err: Value = serde_json::from_slice(&output.stdout).expect("json error");
    assert_eq!(err["code"], "invalid_keyword");
}

#[test]
fn env_supplies_database_path() {
    let (home, db) = imported();
    let output = base_cmd(home.path())
        .env("CSEARCH_DB", &db)
        .args(["--json", "search", "constitutional"])
        .assert()
        .success()
        .get_output()
        .clone();
    let courses: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(course_ids(&courses), vec![412]);
}

#[test]
fn plain_output_lists_courses() {
    let (home, db) = imported();
    base_cmd(home.path())
        .env("NO_COLOR", "1")
        .arg("--db")
        .arg(&db)
        .args(["search", "data", "--field", "title"])
        .assert()
        .success()
        .stdout(contains("CS 225"))
        .stdout(contains("Data Structures"))
        .stdout(contains("Li Wei"));
}
