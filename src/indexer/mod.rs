//! Import course trees from JSON into storage.
//!
//! Accepts either a JSON array of courses or JSON Lines, one course per
//! line. Each course carries its `course_instructors` and
//! `course_meeting_patterns` inline.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::model::types::CourseRecord;
use crate::storage::sqlite::SqliteStorage;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub db_path: PathBuf,
    pub source: PathBuf,
    /// Rebuild both full-text tables after writing.
    pub rebuild_fts: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub read: usize,
    pub inserted: usize,
    pub replaced: usize,
    /// `(line, reason)` for JSON Lines entries that failed to decode.
    pub rejected: Vec<(usize, String)>,
}

pub fn run_import(opts: &ImportOptions) -> Result<ImportReport> {
    let start = Instant::now();
    let text = std::fs::read_to_string(&opts.source)
        .with_context(|| format!("reading {}", opts.source.display()))?;
    let (courses, rejected) = parse_courses(&text)
        .with_context(|| format!("decoding {}", opts.source.display()))?;

    let mut storage = SqliteStorage::open(&opts.db_path)?;
    let mut report = import_courses(&mut storage, &courses)?;
    report.rejected = rejected;
    for (line, reason) in &report.rejected {
        tracing::warn!(line, reason = %reason, "import_line_rejected");
    }
    if opts.rebuild_fts {
        storage.rebuild_fts()?;
    }

    tracing::info!(
        source = %opts.source.display(),
        db = %opts.db_path.display(),
        read = report.read,
        inserted = report.inserted,
        replaced = report.replaced,
        rejected = report.rejected.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "import_complete"
    );
    Ok(report)
}

/// Write `courses` in one transaction.
pub fn import_courses(
    storage: &mut SqliteStorage,
    courses: &[CourseRecord],
) -> Result<ImportReport> {
    let outcomes = storage.upsert_course_trees(courses)?;
    let replaced = outcomes.iter().filter(|o| o.replaced).count();
    Ok(ImportReport {
        read: courses.len(),
        inserted: outcomes.len() - replaced,
        replaced,
        rejected: Vec::new(),
    })
}

/// Decode either format. A malformed array fails as a whole; malformed
/// JSON Lines entries are returned as rejections.
pub fn parse_courses(text: &str) -> Result<(Vec<CourseRecord>, Vec<(usize, String)>)> {
    if text.trim_start().starts_with('[') {
        let courses: Vec<CourseRecord> = serde_json::from_str(text)?;
        return Ok((courses, Vec::new()));
    }
    let mut courses = Vec::new();
    let mut rejected = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<CourseRecord>(line) {
            Ok(course) => courses.push(course),
            Err(e) => rejected.push((idx + 1, e.to_string())),
        }
    }
    Ok((courses, rejected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ARRAY: &str = r#"[
        {"external_course_id": 1, "term_name": "Fall", "term_year": 2026, "class_section": "001",
         "title": "Intro to Economics", "catalog_number": 101,
         "course_instructors": [{"first_name": "Ada", "last_name": "Smith"}],
         "course_meeting_patterns": [{"meets_on_monday": true, "meeting_time_start": 540, "meeting_time_end": 600}]},
        {"external_course_id": 2, "term_name": "Fall", "term_year": 2026, "class_section": "001",
         "title": "Statistics"}
    ]"#;

    #[test]
    fn parses_array_and_numeric_catalog_numbers() {
        let (courses, rejected) = parse_courses(ARRAY).unwrap();
        assert!(rejected.is_empty());
        assert_eq!(courses.len(), 2);
        assert_eq!(courses[0].catalog_number.as_deref(), Some("101"));
        assert_eq!(courses[0].course_meeting_patterns.len(), 1);
    }

    #[test]
    fn json_lines_reject_bad_lines_individually() {
        let text = concat!(
            r#"{"external_course_id": 1, "term_name": "Fall", "term_year": 2026, "class_section": "001"}"#,
            "\n\n",
            r#"{"title": "no identity"}"#,
            "\n"
        );
        let (courses, rejected) = parse_courses(text).unwrap();
        assert_eq!(courses.len(), 1);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].0, 3);
    }

    #[test]
    fn reimport_replaces_instead_of_duplicating() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("courses.json");
        std::fs::write(&source, ARRAY).unwrap();
        let opts = ImportOptions {
            db_path: dir.path().join("courses.db"),
            source,
            rebuild_fts: false,
        };
        let first = run_import(&opts).unwrap();
        assert_eq!((first.inserted, first.replaced), (2, 0));
        let second = run_import(&opts).unwrap();
        assert_eq!((second.inserted, second.replaced), (0, 2));

        let storage = SqliteStorage::open(&opts.db_path).unwrap();
        assert_eq!(storage.course_count().unwrap(), 2);
    }
}
