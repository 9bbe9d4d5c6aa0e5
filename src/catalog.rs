//! Filter catalogs: the distinct values a search UI offers as choices.

use std::collections::BTreeMap;

use chrono::Datelike;
use serde::Serialize;
use thiserror::Error;

use crate::model::types::Weekday;
use crate::search::backend::{BackendError, CatalogColumn, CatalogFilter, SearchBackend};
use crate::search::fields::FieldTag;
use crate::search::filters::TimeWindow;

/// Days offered by the schedule filter.
pub const SCHEDULE_DAYS: [Weekday; 5] = [
    Weekday::Monday,
    Weekday::Tuesday,
    Weekday::Wednesday,
    Weekday::Thursday,
    Weekday::Friday,
];

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("invalid schedule bound {key}={value}: {reason}")]
    InvalidBound {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CatalogKind {
    Terms,
    Schools,
    Departments,
    Subjects,
    Components,
    SubjectGroups,
    KeywordOptions,
    Schedule,
}

/// Upcoming terms as `NAME_YEAR` tokens, from the current calendar year on.
pub fn terms<B: SearchBackend + ?Sized>(backend: &B) -> Result<Vec<String>, CatalogError> {
    terms_from(backend, chrono::Local::now().year())
}

/// Terms with `term_year >= min_year`, year ascending then name descending.
pub fn terms_from<B: SearchBackend + ?Sized>(
    backend: &B,
    min_year: i32,
) -> Result<Vec<String>, CatalogError> {
    let mut terms = backend.distinct_terms(min_year)?;
    terms.sort_by(|a, b| {
        a.term_year
            .cmp(&b.term_year)
            .then_with(|| b.term_name.cmp(&a.term_name))
    });
    terms.dedup();
    Ok(terms
        .into_iter()
        .map(|t| format!("{}_{}", t.term_name, t.term_year))
        .collect())
}

fn distinct<B: SearchBackend + ?Sized>(
    backend: &B,
    column: CatalogColumn,
    filter: &CatalogFilter,
) -> Result<Vec<String>, CatalogError> {
    let mut values = backend.distinct_values(column, filter)?;
    values.sort();
    values.dedup();
    Ok(values)
}

pub fn schools<B: SearchBackend + ?Sized>(backend: &B) -> Result<Vec<String>, CatalogError> {
    distinct(backend, CatalogColumn::AcademicGroup, &CatalogFilter::default())
}

pub fn departments<B: SearchBackend + ?Sized>(backend: &B) -> Result<Vec<String>, CatalogError> {
    distinct(backend, CatalogColumn::ClassAcademicOrg, &CatalogFilter::default())
}

pub fn subject_descriptions<B: SearchBackend + ?Sized>(
    backend: &B,
) -> Result<Vec<String>, CatalogError> {
    distinct(backend, CatalogColumn::SubjectDescription, &CatalogFilter::default())
}

pub fn component_types<B: SearchBackend + ?Sized>(
    backend: &B,
) -> Result<Vec<String>, CatalogError> {
    distinct(backend, CatalogColumn::Component, &CatalogFilter::default())
}

/// Subject groups, optionally narrowed to a school or term.
pub fn subject_groups<B: SearchBackend + ?Sized>(
    backend: &B,
    filter: &CatalogFilter,
) -> Result<Vec<String>, CatalogError> {
    distinct(backend, CatalogColumn::SubjectAcademicOrg, filter)
}

/// Plain text values for any catalog kind.
pub fn list<B: SearchBackend + ?Sized>(
    backend: &B,
    kind: CatalogKind,
    filter: &CatalogFilter,
) -> Result<Vec<String>, CatalogError> {
    match kind {
        CatalogKind::Terms => terms(backend),
        CatalogKind::Schools => schools(backend),
        CatalogKind::Departments => departments(backend),
        CatalogKind::Subjects => subject_descriptions(backend),
        CatalogKind::Components => component_types(backend),
        CatalogKind::SubjectGroups => subject_groups(backend, filter),
        CatalogKind::KeywordOptions => Ok(keyword_options()
            .into_iter()
            .map(|o| o.display.to_string())
            .collect()),
        CatalogKind::Schedule => Ok(SCHEDULE_DAYS.iter().map(|d| d.as_str().to_string()).collect()),
    }
}

/// A selectable keyword field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordOption {
    pub field: FieldTag,
    pub display: &'static str,
    pub default: bool,
}

/// Fields a keyword can be scoped to. Fields without a storage mapping are
/// left out.
pub fn keyword_options() -> Vec<KeywordOption> {
    FieldTag::ALL
        .into_iter()
        .filter(|tag| tag.mapping().is_some())
        .map(|field| KeywordOption {
            field,
            display: field.display_name(),
            default: field.is_default(),
        })
        .collect()
}

/// Build the weekday schedule filter from `monday_min`/`monday_max` style
/// parameters. Every schedule day is present; missing bounds stay open.
pub fn schedule_filter_map(
    values: &BTreeMap<String, String>,
) -> Result<BTreeMap<Weekday, TimeWindow>, CatalogError> {
    let mut map = BTreeMap::new();
    for day in SCHEDULE_DAYS {
        let min = bound(values, &format!("{}_min", day.as_str()))?;
        let max = bound(values, &format!("{}_max", day.as_str()))?;
        map.insert(day, TimeWindow { min, max });
    }
    Ok(map)
}

/// Accepts `HH:MM` or a bare minute count.
fn bound(values: &BTreeMap<String, String>, key: &str) -> Result<Option<u16>, CatalogError> {
    let Some(raw) = values.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let invalid = |reason: String| CatalogError::InvalidBound {
        key: key.to_string(),
        value: raw.to_string(),
        reason,
    };
    if let Ok(minutes) = raw.parse::<u16>() {
        if minutes >= 24 * 60 {
            return Err(invalid("past end of day".into()));
        }
        return Ok(Some(minutes));
    }
    let window: TimeWindow = format!("{raw}-").parse().map_err(invalid)?;
    Ok(window.min)
}
