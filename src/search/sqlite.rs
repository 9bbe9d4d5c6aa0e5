//! FTS5-backed [`SearchBackend`].
//!
//! Course columns live in `courses_fts`, instructor names in
//! `course_instructors_fts`. Each has an unstemmed `*_prefix_fts` twin so a
//! half-typed word the stemmer mangles still prefix-matches. Each full-text
//! source yields `(course_id, score)` pairs; scores from different sources
//! are summed and a course matching only through an instructor is still
//! included.

use std::collections::BTreeMap;
use std::path::Path;

use itertools::Itertools;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use crate::model::types::{CourseInstructor, CourseKey, CourseMeetingPattern, CourseRecord};
use crate::search::backend::{
    BackendError, CatalogColumn, CatalogFilter, RawHit, SearchBackend, TermRef,
};
use crate::search::compiler::{CompiledQuery, RankingOptions};
use crate::search::fields::TargetEntity;
use crate::storage::sqlite::{
    COURSE_FTS_TABLES, INSTRUCTOR_FTS_TABLES, SqliteStorage, find_course_id,
};

/// Indexed columns of `courses_fts`, in table order.
const COURSE_FTS_COLUMNS: [&str; 4] = [
    "title",
    "course_description_long",
    "subject",
    "catalog_number",
];
/// Indexed columns of `course_instructors_fts`, in table order.
const INSTRUCTOR_FTS_COLUMNS: [&str; 2] = ["first_name", "last_name"];

const COURSE_SELECT: &str = "SELECT id, external_course_id, term_name, term_year, class_section,
    subject, subject_description, subject_academic_org_description, catalog_number, title,
    course_description_long, units_maximum, academic_group, class_academic_org_description,
    component FROM courses";

pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Open an existing catalog database for searching.
    pub fn open(path: &Path) -> Result<Self, BackendError> {
        let storage = SqliteStorage::open_readonly(path)
            .map_err(|e| BackendError::Unavailable(format!("{e:#}")))?;
        Ok(Self::from_storage(storage))
    }

    pub fn from_storage(storage: SqliteStorage) -> Self {
        Self::new(storage.into_connection())
    }
}

impl SearchBackend for SqliteBackend {
    fn full_text(
        &self,
        query: &CompiledQuery,
        limit: usize,
    ) -> Result<Vec<RawHit>, BackendError> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        let scores = match_scores(&conn, query)?;

        let mut ranked: Vec<(i64, f64)> = scores.into_iter().collect();
        // BTreeMap iteration gave id order; the stable sort keeps it for ties.
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut hits = Vec::with_capacity(limit.min(ranked.len()));
        for (course_id, score) in ranked {
            if hits.len() >= limit {
                break;
            }
            let Some(record) = load_record(&conn, course_id)? else {
                continue;
            };
            if !query.filters.admits(&record) {
                continue;
            }
            hits.push(RawHit::scored(score, to_json(&record)?));
        }
        tracing::debug!(
            backend = "sqlite",
            hits = hits.len(),
            "full_text_complete"
        );
        Ok(hits)
    }

    fn lookup(&self, keys: &[CourseKey]) -> Result<Vec<RawHit>, BackendError> {
        let conn = self.conn.lock();
        let mut hits = Vec::with_capacity(keys.len());
        for key in keys.iter().unique() {
            let Some(id) = find_course_id(&conn, key)? else {
                continue;
            };
            if let Some(record) = load_record(&conn, id)? {
                hits.push(RawHit::unscored(to_json(&record)?));
            }
        }
        Ok(hits)
    }

    fn distinct_values(
        &self,
        column: CatalogColumn,
        filter: &CatalogFilter,
    ) -> Result<Vec<String>, BackendError> {
        let col = column.column();
        let mut sql = format!(
            "SELECT DISTINCT {col} FROM courses WHERE {col} IS NOT NULL AND {col} <> ''"
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(group) = &filter.academic_group {
            sql.push_str(" AND academic_group = ?");
            args.push(Box::new(group.clone()));
        }
        if let Some(name) = &filter.term_name {
            sql.push_str(" AND term_name = ?");
            args.push(Box::new(name.clone()));
        }
        if let Some(year) = filter.term_year {
            sql.push_str(" AND term_year = ?");
            args.push(Box::new(year));
        }
        sql.push_str(&format!(" ORDER BY {col}"));

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter().map(|b| &**b)), |row| {
            row.get::<_, String>(0)
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn distinct_terms(&self, min_year: i32) -> Result<Vec<TermRef>, BackendError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT term_name, term_year FROM courses
             WHERE term_year >= ? ORDER BY term_year ASC, term_name DESC",
        )?;
        let rows = stmt.query_map([min_year], |row| {
            Ok(TermRef {
                term_name: row.get(0)?,
                term_year: row.get(1)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

/// Summed relevance per course id across every full-text source.
fn match_scores(
    conn: &Connection,
    query: &CompiledQuery,
) -> Result<BTreeMap<i64, f64>, BackendError> {
    let terms = match_terms(query);
    let mut scores: BTreeMap<i64, f64> = BTreeMap::new();

    if !query.primary_columns.is_empty() {
        let weights: Vec<u8> = COURSE_FTS_COLUMNS
            .iter()
            .map(|c| query.column_weight(TargetEntity::Course, c))
            .collect();
        let columns = query.primary_columns.iter().join(" ");
        for (id, score) in best_per_course(conn, &COURSE_FTS_TABLES, &weights, &columns, &terms)? {
            *scores.entry(id).or_default() += score;
        }
    }

    for (entity, joined) in &query.joined_columns {
        let Some(table) = joined.path.fts_table else {
            continue;
        };
        let weights: Vec<u8> = INSTRUCTOR_FTS_COLUMNS
            .iter()
            .map(|c| query.column_weight(*entity, c))
            .collect();
        let columns = joined.columns.iter().join(" ");
        // Several matching children fold into their best score.
        let tables = with_unstemmed_twin(table);
        for (id, score) in best_per_course(conn, &tables, &weights, &columns, &terms)? {
            *scores.entry(id).or_default() += score;
        }
    }

    Ok(scores)
}

fn with_unstemmed_twin(table: &'static str) -> Vec<&'static str> {
    [COURSE_FTS_TABLES, INSTRUCTOR_FTS_TABLES]
        .into_iter()
        .find(|pair| pair[0] == table)
        .map_or_else(|| vec![table], |pair| pair.to_vec())
}

/// Highest score per course over every row of `tables`.
fn best_per_course(
    conn: &Connection,
    tables: &[&str],
    weights: &[u8],
    columns: &str,
    terms: &str,
) -> Result<BTreeMap<i64, f64>, BackendError> {
    let mut best: BTreeMap<i64, f64> = BTreeMap::new();
    for table in tables {
        for (id, score) in fts_source(conn, table, weights, columns, terms)? {
            best.entry(id)
                .and_modify(|s| *s = s.max(score))
                .or_insert(score);
        }
    }
    Ok(best)
}

/// Disjunction of prefix phrases, e.g. `"econ"* OR "micro"*`.
fn match_terms(query: &CompiledQuery) -> String {
    let RankingOptions {
        prefix_match,
        any_word,
        ..
    } = query.ranking;
    let joiner = if any_word { " OR " } else { " AND " };
    query
        .terms
        .iter()
        .map(|t| {
            let phrase = format!("\"{}\"", t.replace('"', "\"\""));
            if prefix_match { phrase + "*" } else { phrase }
        })
        .join(joiner)
}

fn fts_source(
    conn: &Connection,
    table: &str,
    weights: &[u8],
    columns: &str,
    terms: &str,
) -> Result<Vec<(i64, f64)>, BackendError> {
    let weights = weights.iter().map(|w| format!("{w}.0")).join(", ");
    let sql = format!(
        "SELECT course_id, -bm25({table}, {weights}) FROM {table} WHERE {table} MATCH ?"
    );
    let expr = format!("{{{columns}}} : ({terms})");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([expr], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn load_record(conn: &Connection, id: i64) -> Result<Option<CourseRecord>, BackendError> {
    let sql = format!("{COURSE_SELECT} WHERE id = ?");
    let course = conn
        .query_row(&sql, [id], |row| {
            Ok(CourseRecord {
                id: Some(row.get(0)?),
                external_course_id: row.get(1)?,
                term_name: row.get(2)?,
                term_year: row.get(3)?,
                class_section: row.get(4)?,
                subject: row.get(5)?,
                subject_description: row.get(6)?,
                subject_academic_org_description: row.get(7)?,
                catalog_number: row.get(8)?,
                title: row.get(9)?,
                course_description_long: row.get(10)?,
                units_maximum: row.get(11)?,
                academic_group: row.get(12)?,
                class_academic_org_description: row.get(13)?,
                component: row.get(14)?,
                course_instructors: Vec::new(),
                course_meeting_patterns: Vec::new(),
            })
        })
        .optional()?;
    let Some(mut course) = course else {
        return Ok(None);
    };
    course.course_meeting_patterns = load_meeting_patterns(conn, id)?;
    course.course_instructors = load_instructors(conn, id)?;
    Ok(Some(course))
}

fn load_meeting_patterns(
    conn: &Connection,
    course_id: i64,
) -> Result<Vec<CourseMeetingPattern>, BackendError> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, class_meeting_number,
                meets_on_monday, meets_on_tuesday, meets_on_wednesday, meets_on_thursday,
                meets_on_friday, meets_on_saturday, meets_on_sunday,
                meeting_time_start, meeting_time_end, start_date, end_date,
                external_facility_id, facility_description
         FROM course_meeting_patterns WHERE course_id = ? ORDER BY id",
    )?;
    let rows = stmt.query_map(params![course_id], |row| {
        let date = |idx: usize| -> rusqlite::Result<Option<chrono::NaiveDate>> {
            Ok(row
                .get::<_, Option<String>>(idx)?
                .and_then(|s| s.parse().ok()))
        };
        Ok(CourseMeetingPattern {
            id: row.get(0)?,
            class_meeting_number: row.get(1)?,
            meets_on_monday: row.get(2)?,
            meets_on_tuesday: row.get(3)?,
            meets_on_wednesday: row.get(4)?,
            meets_on_thursday: row.get(5)?,
            meets_on_friday: row.get(6)?,
            meets_on_saturday: row.get(7)?,
            meets_on_sunday: row.get(8)?,
            meeting_time_start: row.get(9)?,
            meeting_time_end: row.get(10)?,
            start_date: date(11)?,
            end_date: date(12)?,
            external_facility_id: row.get(13)?,
            facility_description: row.get(14)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn load_instructors(
    conn: &Connection,
    course_id: i64,
) -> Result<Vec<CourseInstructor>, BackendError> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, first_name, last_name, display_name
         FROM course_instructors WHERE course_id = ? ORDER BY id",
    )?;
    let rows = stmt.query_map(params![course_id], |row| {
        Ok(CourseInstructor {
            id: row.get(0)?,
            first_name: row.get(1)?,
            last_name: row.get(2)?,
            display_name: row.get(3)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn to_json(record: &CourseRecord) -> Result<serde_json::Value, BackendError> {
    serde_json::to_value(record).map_err(|e| BackendError::Query(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keywords::{Keyword, KeywordSet};
    use crate::search::compiler::compile;
    use crate::search::fields::FieldTag;

    fn seeded() -> SqliteBackend {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let courses = [
            (1, "Principles of Economics", "Supply and demand.", "ECON", "Smith"),
            (2, "Macroeconomic Theory", "Growth models and economics policy.", "ECON", "Jones"),
            (3, "Organic Chemistry", "Carbon compounds.", "CHEM", "Economou"),
        ];
        for (ext, title, desc, subject, last) in courses {
            storage
                .upsert_course_tree(&CourseRecord {
                    external_course_id: ext,
                    term_name: "Fall".into(),
                    term_year: 2026,
                    class_section: "001".into(),
                    subject: Some(subject.into()),
                    catalog_number: Some(format!("{}", 100 + ext)),
                    title: Some(title.into()),
                    course_description_long: Some(desc.into()),
                    academic_group: Some("Arts & Sciences".into()),
                    course_instructors: vec![CourseInstructor {
                        last_name: Some(last.into()),
                        ..Default::default()
                    }],
                    ..Default::default()
                })
                .unwrap();
        }
        SqliteBackend::from_storage(storage)
    }

    fn ids(hits: &[RawHit]) -> Vec<i64> {
        hits.iter().filter_map(RawHit::row_id).collect()
    }

    #[test]
    fn prefix_match_on_default_columns() {
        let backend = seeded();
        let set: KeywordSet = [Keyword::new("econ", 1).unwrap()].into_iter().collect();
        let hits = backend.full_text(&compile(&set), 50).unwrap();
        let mut found = ids(&hits);
        found.sort();
        assert_eq!(found, vec![1, 2]);
        assert!(hits.iter().all(|h| h.score.is_some_and(|s| s > 0.0)));
    }

    #[test]
    fn instructor_join_includes_parent() {
        let backend = seeded();
        let set: KeywordSet = [Keyword::new("economou", 3)
            .unwrap()
            .with_fields([FieldTag::Instructor])]
        .into_iter()
        .collect();
        let hits = backend.full_text(&compile(&set), 50).unwrap();
        assert_eq!(ids(&hits), vec![3]);
        let record = &hits[0].record;
        assert_eq!(record["course_instructors"][0]["last_name"], "Economou");
    }

    #[test]
    fn partial_words_match_at_every_typing_step() {
        let backend = seeded();
        for typed in ["econo", "econom", "economi", "economic", "economics"] {
            let set: KeywordSet = [Keyword::new(typed, 1)
                .unwrap()
                .with_fields([FieldTag::Title])]
            .into_iter()
            .collect();
            let hits = backend.full_text(&compile(&set), 50).unwrap();
            assert_eq!(ids(&hits), vec![1], "typed `{typed}`");
        }
    }

    #[test]
    fn partial_instructor_name_matches() {
        let backend = seeded();
        let set: KeywordSet = [Keyword::new("economo", 1)
            .unwrap()
            .with_fields([FieldTag::Instructor])]
        .into_iter()
        .collect();
        assert_eq!(ids(&backend.full_text(&compile(&set), 50).unwrap()), vec![3]);
    }

    #[test]
    fn unmatched_terms_return_nothing() {
        let backend = seeded();
        let set: KeywordSet = [Keyword::new("zzzz", 1).unwrap()].into_iter().collect();
        assert!(backend.full_text(&compile(&set), 50).unwrap().is_empty());
    }

    #[test]
    fn lookup_returns_unscored_rows() {
        let backend = seeded();
        let hits = backend
            .lookup(&[
                CourseKey::new(2, "Fall", 2026, "001"),
                CourseKey::new(9, "Fall", 2026, "001"),
            ])
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, None);
        assert_eq!(hits[0].record["external_course_id"], 2);
    }

    #[test]
    fn distinct_projections() {
        let backend = seeded();
        let subjects = backend
            .distinct_values(CatalogColumn::Subject, &CatalogFilter::default())
            .unwrap();
        assert_eq!(subjects, vec!["CHEM", "ECON"]);
        let terms = backend.distinct_terms(2026).unwrap();
        assert_eq!(
            terms,
            vec![TermRef {
                term_name: "Fall".into(),
                term_year: 2026
            }]
        );
        assert!(backend.distinct_terms(2027).unwrap().is_empty());
    }
}
