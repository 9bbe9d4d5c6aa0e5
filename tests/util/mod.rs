use course_search::indexer::{ImportOptions, run_import};
use course_search::model::types::CourseKey;
use course_search::search::backend::{
    BackendError, CatalogColumn, CatalogFilter, RawHit, SearchBackend, TermRef,
};
use course_search::search::compiler::CompiledQuery;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

struct TestWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[allow(dead_code)]
pub fn fixture_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/courses.json")
}

/// A temp dir holding `courses.db` seeded from the shared fixture.
#[allow(dead_code)]
pub fn seeded_db() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("courses.db");
    run_import(&ImportOptions {
        db_path: db_path.clone(),
        source: fixture_path(),
        rebuild_fts: false,
    })
    .unwrap();
    (dir, db_path)
}

/// Minimal hit shaped like a backend row.
#[allow(dead_code)]
pub fn course_hit(id: i64, score: f64, title: &str) -> RawHit {
    RawHit::scored(
        score,
        json!({
            "id": id,
            "external_course_id": id + 9000,
            "term_name": "Fall",
            "term_year": 2026,
            "class_section": "001",
            "title": title,
            "academic_group": "Arts & Sciences",
            "course_instructors": [],
            "course_meeting_patterns": [],
        }),
    )
}

/// Backend that replays canned hits and counts calls.
#[allow(dead_code)]
#[derive(Default)]
pub struct CannedBackend {
    pub hits: Vec<RawHit>,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl CannedBackend {
    pub fn new(hits: Vec<RawHit>) -> Self {
        Self {
            hits,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SearchBackend for CannedBackend {
    fn full_text(&self, _: &CompiledQuery, limit: usize) -> Result<Vec<RawHit>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.hits.iter().take(limit).cloned().collect())
    }

    fn lookup(&self, _: &[CourseKey]) -> Result<Vec<RawHit>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.hits.clone())
    }

    fn distinct_values(
        &self,
        _: CatalogColumn,
        _: &CatalogFilter,
    ) -> Result<Vec<String>, BackendError> {
        Ok(Vec::new())
    }

    fn distinct_terms(&self, _: i32) -> Result<Vec<TermRef>, BackendError> {
        Ok(Vec::new())
    }
}
