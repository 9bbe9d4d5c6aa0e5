//! `SQLite` storage: schema, pragmas, migrations, and course tree writes.

use crate::model::types::{CourseInstructor, CourseKey, CourseMeetingPattern, CourseRecord};
use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Transaction, params};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub const SCHEMA_VERSION: i64 = 3;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database not found at {0}")]
    NotFound(std::path::PathBuf),
    #[error("Database schema version {found} is newer than supported {supported}")]
    SchemaTooNew { found: i64, supported: i64 },
}

const MIGRATION_V1: &str = r"
CREATE TABLE IF NOT EXISTS courses (
    id INTEGER PRIMARY KEY,
    external_course_id INTEGER NOT NULL,
    term_name TEXT NOT NULL,
    term_year INTEGER NOT NULL,
    class_section TEXT NOT NULL,
    subject TEXT,
    subject_description TEXT,
    subject_academic_org_description TEXT,
    catalog_number TEXT,
    title TEXT,
    course_description_long TEXT,
    units_maximum REAL,
    academic_group TEXT,
    class_academic_org_description TEXT,
    component TEXT,
    UNIQUE(external_course_id, term_name, term_year, class_section)
);

CREATE TABLE IF NOT EXISTS course_meeting_patterns (
    id INTEGER PRIMARY KEY,
    course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
    class_meeting_number TEXT,
    meets_on_monday INTEGER NOT NULL DEFAULT 0,
    meets_on_tuesday INTEGER NOT NULL DEFAULT 0,
    meets_on_wednesday INTEGER NOT NULL DEFAULT 0,
    meets_on_thursday INTEGER NOT NULL DEFAULT 0,
    meets_on_friday INTEGER NOT NULL DEFAULT 0,
    meets_on_saturday INTEGER NOT NULL DEFAULT 0,
    meets_on_sunday INTEGER NOT NULL DEFAULT 0,
    meeting_time_start INTEGER, -- minutes after midnight
    meeting_time_end INTEGER,
    start_date TEXT,
    end_date TEXT,
    external_facility_id TEXT,
    facility_description TEXT
);

CREATE TABLE IF NOT EXISTS course_instructors (
    id INTEGER PRIMARY KEY,
    course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
    first_name TEXT,
    last_name TEXT,
    display_name TEXT
);

CREATE INDEX IF NOT EXISTS idx_meeting_patterns_course ON course_meeting_patterns(course_id);
CREATE INDEX IF NOT EXISTS idx_instructors_course ON course_instructors(course_id);

CREATE VIRTUAL TABLE IF NOT EXISTS courses_fts USING fts5(
    title,
    course_description_long,
    subject,
    catalog_number,
    course_id UNINDEXED,
    tokenize='porter unicode61'
);

CREATE VIRTUAL TABLE IF NOT EXISTS course_instructors_fts USING fts5(
    first_name,
    last_name,
    course_id UNINDEXED,
    tokenize='porter unicode61'
);
";

const MIGRATION_V2: &str = r"
-- Filter catalog projections
CREATE INDEX IF NOT EXISTS idx_courses_term ON courses(term_year, term_name);
CREATE INDEX IF NOT EXISTS idx_courses_group ON courses(academic_group);
";

const MIGRATION_V3: &str = r"
-- Unstemmed twins of the FTS tables so raw partial words still prefix-match
CREATE VIRTUAL TABLE IF NOT EXISTS courses_prefix_fts USING fts5(
    title,
    course_description_long,
    subject,
    catalog_number,
    course_id UNINDEXED,
    tokenize='unicode61'
);

CREATE VIRTUAL TABLE IF NOT EXISTS course_instructors_prefix_fts USING fts5(
    first_name,
    last_name,
    course_id UNINDEXED,
    tokenize='unicode61'
);

DELETE FROM courses_prefix_fts;
DELETE FROM course_instructors_prefix_fts;
INSERT INTO courses_prefix_fts(title, course_description_long, subject, catalog_number, course_id)
    SELECT title, course_description_long, subject, catalog_number, id FROM courses;
INSERT INTO course_instructors_prefix_fts(first_name, last_name, course_id)
    SELECT first_name, last_name, course_id FROM course_instructors;
";

/// Stemmed full-text tables paired with their unstemmed twins.
pub const COURSE_FTS_TABLES: [&str; 2] = ["courses_fts", "courses_prefix_fts"];
pub const INSTRUCTOR_FTS_TABLES: [&str; 2] =
    ["course_instructors_fts", "course_instructors_prefix_fts"];

pub struct SqliteStorage {
    conn: Connection,
}

/// Result of writing one course tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub course_id: i64,
    /// `true` when an existing offering with the same identity was replaced.
    pub replaced: bool,
}

impl SqliteStorage {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating db directory {}", parent.display()))?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("opening sqlite db at {}", path.display()))?;

        apply_pragmas(&mut conn)?;
        init_meta(&mut conn)?;
        migrate(&mut conn)?;

        Ok(Self { conn })
    }

    pub fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(StorageError::NotFound(path.to_path_buf()).into());
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("opening sqlite db readonly at {}", path.display()))?;

        apply_common_pragmas(&conn)?;

        Ok(Self { conn })
    }

    /// In-memory database with the full schema, for tests and benches.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        apply_common_pragmas(&conn)?;
        init_meta(&mut conn)?;
        migrate(&mut conn)?;
        Ok(Self { conn })
    }

    pub fn raw(&self) -> &Connection {
        &self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }

    pub fn schema_version(&self) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT value FROM meta WHERE key='schema_version'",
                [],
                |row| row.get::<_, String>(0).map(|s| s.parse().unwrap_or(0)),
            )
            .optional()?
            .ok_or_else(|| anyhow!("schema_version missing"))
    }

    pub fn course_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM courses", [], |row| row.get(0))?)
    }

    pub fn find_course_id(&self, key: &CourseKey) -> Result<Option<i64>> {
        Ok(find_course_id(&self.conn, key)?)
    }

    /// Insert a course with its instructors and meeting patterns, replacing
    /// any existing offering with the same identity.
    pub fn upsert_course_tree(&mut self, course: &CourseRecord) -> Result<UpsertOutcome> {
        let tx = self.conn.transaction()?;
        let outcome = upsert_in_tx(&tx, course)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// Write many trees in a single transaction.
    pub fn upsert_course_trees(&mut self, courses: &[CourseRecord]) -> Result<Vec<UpsertOutcome>> {
        let tx = self.conn.transaction()?;
        let mut outcomes = Vec::with_capacity(courses.len());
        for course in courses {
            outcomes.push(
                upsert_in_tx(&tx, course)
                    .with_context(|| format!("writing course {}", course.key()))?,
            );
        }
        tx.commit()?;
        Ok(outcomes)
    }

    pub fn rebuild_fts(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        for table in COURSE_FTS_TABLES {
            tx.execute_batch(&format!(
                "DELETE FROM {table};
                 INSERT INTO {table}(title, course_description_long, subject, catalog_number, course_id)
                     SELECT title, course_description_long, subject, catalog_number, id FROM courses;"
            ))?;
        }
        for table in INSTRUCTOR_FTS_TABLES {
            tx.execute_batch(&format!(
                "DELETE FROM {table};
                 INSERT INTO {table}(first_name, last_name, course_id)
                     SELECT first_name, last_name, course_id FROM course_instructors;"
            ))?;
        }
        tx.commit()?;
        info!("rebuilt full-text tables");
        Ok(())
    }
}

pub(crate) fn find_course_id(conn: &Connection, key: &CourseKey) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM courses
         WHERE external_course_id = ? AND term_name = ? AND term_year = ? AND class_section = ?",
        params![
            key.external_course_id,
            &key.term_name,
            key.term_year,
            &key.class_section
        ],
        |row| row.get(0),
    )
    .optional()
}

fn upsert_in_tx(tx: &Transaction<'_>, course: &CourseRecord) -> Result<UpsertOutcome> {
    let existing = find_course_id(tx, &course.key())?;
    let course_id = match existing {
        Some(id) => {
            update_course(tx, id, course)?;
            tx.execute("DELETE FROM course_meeting_patterns WHERE course_id = ?", [id])?;
            tx.execute("DELETE FROM course_instructors WHERE course_id = ?", [id])?;
            for table in COURSE_FTS_TABLES.iter().chain(&INSTRUCTOR_FTS_TABLES) {
                tx.execute(&format!("DELETE FROM {table} WHERE course_id = ?"), [id])?;
            }
            id
        }
        None => insert_course(tx, course)?,
    };

    for mp in &course.course_meeting_patterns {
        insert_meeting_pattern(tx, course_id, mp)?;
    }
    for instructor in &course.course_instructors {
        insert_instructor(tx, course_id, instructor)?;
    }
    for table in COURSE_FTS_TABLES {
        tx.execute(
            &format!(
                "INSERT INTO {table}(title, course_description_long, subject, catalog_number, course_id)
                 VALUES(?,?,?,?,?)"
            ),
            params![
                course.title,
                course.course_description_long,
                course.subject,
                course.catalog_number,
                course_id
            ],
        )?;
    }

    Ok(UpsertOutcome {
        course_id,
        replaced: existing.is_some(),
    })
}

fn insert_course(tx: &Transaction<'_>, c: &CourseRecord) -> Result<i64> {
    tx.execute(
        "INSERT INTO courses(
            id, external_course_id, term_name, term_year, class_section, subject,
            subject_description, subject_academic_org_description, catalog_number, title,
            course_description_long, units_maximum, academic_group,
            class_academic_org_description, component
        ) VALUES(?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)",
        params![
            c.id,
            c.external_course_id,
            &c.term_name,
            c.term_year,
            &c.class_section,
            c.subject,
            c.subject_description,
            c.subject_academic_org_description,
            c.catalog_number,
            c.title,
            c.course_description_long,
            c.units_maximum,
            c.academic_group,
            c.class_academic_org_description,
            c.component
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

fn update_course(tx: &Transaction<'_>, id: i64, c: &CourseRecord) -> Result<()> {
    tx.execute(
        "UPDATE courses SET
            subject = ?, subject_description = ?, subject_academic_org_description = ?,
            catalog_number = ?, title = ?, course_description_long = ?, units_maximum = ?,
            academic_group = ?, class_academic_org_description = ?, component = ?
         WHERE id = ?",
        params![
            c.subject,
            c.subject_description,
            c.subject_academic_org_description,
            c.catalog_number,
            c.title,
            c.course_description_long,
            c.units_maximum,
            c.academic_group,
            c.class_academic_org_description,
            c.component,
            id
        ],
    )?;
    Ok(())
}

fn insert_meeting_pattern(
    tx: &Transaction<'_>,
    course_id: i64,
    mp: &CourseMeetingPattern,
) -> Result<()> {
    tx.execute(
        "INSERT INTO course_meeting_patterns(
            course_id, class_meeting_number,
            meets_on_monday, meets_on_tuesday, meets_on_wednesday, meets_on_thursday,
            meets_on_friday, meets_on_saturday, meets_on_sunday,
            meeting_time_start, meeting_time_end, start_date, end_date,
            external_facility_id, facility_description
        ) VALUES(?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)",
        params![
            course_id,
            mp.class_meeting_number,
            mp.meets_on_monday,
            mp.meets_on_tuesday,
            mp.meets_on_wednesday,
            mp.meets_on_thursday,
            mp.meets_on_friday,
            mp.meets_on_saturday,
            mp.meets_on_sunday,
            mp.meeting_time_start,
            mp.meeting_time_end,
            mp.start_date.map(|d| d.to_string()),
            mp.end_date.map(|d| d.to_string()),
            mp.external_facility_id,
            mp.facility_description
        ],
    )?;
    Ok(())
}

fn insert_instructor(tx: &Transaction<'_>, course_id: i64, i: &CourseInstructor) -> Result<()> {
    tx.execute(
        "INSERT INTO course_instructors(course_id, first_name, last_name, display_name)
         VALUES(?,?,?,?)",
        params![course_id, i.first_name, i.last_name, i.display_name],
    )?;
    for table in INSTRUCTOR_FTS_TABLES {
        tx.execute(
            &format!("INSERT INTO {table}(first_name, last_name, course_id) VALUES(?,?,?)"),
            params![i.first_name, i.last_name, course_id],
        )?;
    }
    Ok(())
}

fn apply_pragmas(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        r"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        ",
    )?;
    apply_common_pragmas(conn)
}

fn apply_common_pragmas(conn: &Connection) -> Result<()> {
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch(
        r"
        PRAGMA temp_store = MEMORY;
        PRAGMA cache_size = -16384; -- 16MB
        PRAGMA foreign_keys = ON;
        ",
    )?;
    Ok(())
}

fn init_meta(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        [],
    )?;

    let existing: Option<i64> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get::<_, String>(0).map(|s| s.parse().unwrap_or(0)),
        )
        .optional()?;

    if existing.is_none() {
        conn.execute(
            "INSERT INTO meta(key, value) VALUES('schema_version', '0')",
            [],
        )?;
    }

    Ok(())
}

fn migrate(conn: &mut Connection) -> Result<()> {
    let current: i64 = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get::<_, String>(0).map(|s| s.parse().unwrap_or(0)),
        )
        .optional()?
        .unwrap_or(0);

    if current == SCHEMA_VERSION {
        return Ok(());
    }
    if current > SCHEMA_VERSION {
        return Err(StorageError::SchemaTooNew {
            found: current,
            supported: SCHEMA_VERSION,
        }
        .into());
    }

    let tx = conn.transaction()?;

    match current {
        0 => {
            tx.execute_batch(MIGRATION_V1)?;
            tx.execute_batch(MIGRATION_V2)?;
            tx.execute_batch(MIGRATION_V3)?;
        }
        1 => {
            tx.execute_batch(MIGRATION_V2)?;
            tx.execute_batch(MIGRATION_V3)?;
        }
        2 => {
            tx.execute_batch(MIGRATION_V3)?;
        }
        v => return Err(anyhow!("unsupported schema version {v}")),
    }

    tx.execute(
        "UPDATE meta SET value = ? WHERE key = 'schema_version'",
        params![SCHEMA_VERSION.to_string()],
    )?;

    tx.commit()?;
    info!(from = current, to = SCHEMA_VERSION, "migrated course schema");

    Ok(())
}
