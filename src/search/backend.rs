//! Contract between the executor and the storage/indexing engine.

use crate::model::types::CourseKey;
use crate::search::compiler::CompiledQuery;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Unavailable(String),
    #[error("backend timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend query failed: {0}")]
    Query(String),
}

impl From<rusqlite::Error> for BackendError {
    fn from(e: rusqlite::Error) -> Self {
        let unreachable = matches!(
            &e,
            rusqlite::Error::SqliteFailure(failure, _) if matches!(
                failure.code,
                rusqlite::ErrorCode::DatabaseBusy
                    | rusqlite::ErrorCode::DatabaseLocked
                    | rusqlite::ErrorCode::CannotOpen
                    | rusqlite::ErrorCode::NotADatabase
            )
        );
        if unreachable {
            BackendError::Unavailable(e.to_string())
        } else {
            BackendError::Query(e.to_string())
        }
    }
}

/// One row returned by the backend, shaped like the transport's JSON
/// contract: course attributes plus embedded `course_meeting_patterns`
/// and `course_instructors` arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    /// Relevance, higher is better. `None` for identity lookups.
    pub score: Option<f64>,
    pub record: serde_json::Value,
}

impl RawHit {
    pub fn scored(score: f64, record: serde_json::Value) -> Self {
        Self {
            score: Some(score),
            record,
        }
    }

    pub fn unscored(record: serde_json::Value) -> Self {
        Self {
            score: None,
            record,
        }
    }

    /// Storage row id, when present.
    pub fn row_id(&self) -> Option<i64> {
        self.record.get("id").and_then(serde_json::Value::as_i64)
    }
}

/// Course columns exposed to the filter catalogs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogColumn {
    AcademicGroup,
    ClassAcademicOrg,
    SubjectDescription,
    SubjectAcademicOrg,
    Component,
    Subject,
}

impl CatalogColumn {
    pub fn column(self) -> &'static str {
        match self {
            CatalogColumn::AcademicGroup => "academic_group",
            CatalogColumn::ClassAcademicOrg => "class_academic_org_description",
            CatalogColumn::SubjectDescription => "subject_description",
            CatalogColumn::SubjectAcademicOrg => "subject_academic_org_description",
            CatalogColumn::Component => "component",
            CatalogColumn::Subject => "subject",
        }
    }
}

/// Optional narrowing for catalog projections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    pub academic_group: Option<String>,
    pub term_name: Option<String>,
    pub term_year: Option<i32>,
}

impl CatalogFilter {
    pub fn is_empty(&self) -> bool {
        self.academic_group.is_none() && self.term_name.is_none() && self.term_year.is_none()
    }
}

/// A distinct `(term_name, term_year)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TermRef {
    pub term_name: String,
    pub term_year: i32,
}

pub trait SearchBackend {
    /// Ranked full-text query, best first, at most `limit` hits.
    fn full_text(&self, query: &CompiledQuery, limit: usize) -> Result<Vec<RawHit>, BackendError>;

    /// Exact-match rows for `keys`; order is not significant.
    fn lookup(&self, keys: &[CourseKey]) -> Result<Vec<RawHit>, BackendError>;

    /// Sorted distinct non-null values of `column`.
    fn distinct_values(
        &self,
        column: CatalogColumn,
        filter: &CatalogFilter,
    ) -> Result<Vec<String>, BackendError>;

    /// Distinct terms with `term_year >= min_year`.
    fn distinct_terms(&self, min_year: i32) -> Result<Vec<TermRef>, BackendError>;
}

impl<B: SearchBackend + ?Sized> SearchBackend for &B {
    fn full_text(&self, query: &CompiledQuery, limit: usize) -> Result<Vec<RawHit>, BackendError> {
        (**self).full_text(query, limit)
    }

    fn lookup(&self, keys: &[CourseKey]) -> Result<Vec<RawHit>, BackendError> {
        (**self).lookup(keys)
    }

    fn distinct_values(
        &self,
        column: CatalogColumn,
        filter: &CatalogFilter,
    ) -> Result<Vec<String>, BackendError> {
        (**self).distinct_values(column, filter)
    }

    fn distinct_terms(&self, min_year: i32) -> Result<Vec<TermRef>, BackendError> {
        (**self).distinct_terms(min_year)
    }
}
