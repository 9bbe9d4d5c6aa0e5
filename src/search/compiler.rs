//! Keyword set → backend-agnostic search request.
//!
//! Compilation is a pure function of the *set* of active keywords: every
//! collection in [`CompiledQuery`] is ordered, so two keyword sets whose
//! active members agree compile to equal values regardless of insertion
//! order. Upstream memoization relies on that equality.

use crate::keywords::{DEFAULT_WEIGHT, Keyword, KeywordSet};
use crate::search::fields::{
    FALLBACK_PRIMARY_COLUMNS, FieldTag, JoinPath, TargetEntity, field_mapping, owning_field,
};
use crate::search::filters::CourseFilters;
use itertools::Itertools;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dictionary {
    English,
}

/// Fixed ranking policy. Not user configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RankingOptions {
    pub dictionary: Dictionary,
    /// Terms also match words they prefix, so partially typed words work.
    pub prefix_match: bool,
    /// Any single term may match (disjunctive).
    pub any_word: bool,
}

impl RankingOptions {
    pub const POLICY: RankingOptions = RankingOptions {
        dictionary: Dictionary::English,
        prefix_match: true,
        any_word: true,
    };
}

impl Default for RankingOptions {
    fn default() -> Self {
        Self::POLICY
    }
}

/// Columns of a child entity widened into the match through a join.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JoinedColumns {
    pub path: JoinPath,
    pub columns: BTreeSet<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CompiledQuery {
    /// Lowercased words drawn from every active keyword.
    pub terms: BTreeSet<String>,
    /// Distinct keyword texts, sorted, space joined.
    pub keyword_text: String,
    pub primary_columns: BTreeSet<&'static str>,
    pub joined_columns: BTreeMap<TargetEntity, JoinedColumns>,
    /// Highest weight of any active keyword targeting the field.
    pub field_weights: BTreeMap<FieldTag, u8>,
    pub ranking: RankingOptions,
    #[serde(skip_serializing_if = "CourseFilters::is_empty")]
    pub filters: CourseFilters,
}

impl CompiledQuery {
    /// Whether execution can skip the backend entirely.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn with_filters(mut self, filters: CourseFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Ranking multiplier for `column` on `entity`.
    pub fn column_weight(&self, entity: TargetEntity, column: &str) -> u8 {
        owning_field(entity, column)
            .and_then(|tag| self.field_weights.get(&tag).copied())
            .unwrap_or(DEFAULT_WEIGHT)
    }

    /// Whether any column of a joined entity is searched.
    pub fn requires_join(&self) -> bool {
        !self.joined_columns.is_empty()
    }
}

/// Compile the active members of `set`.
pub fn compile(set: &KeywordSet) -> CompiledQuery {
    compile_keywords(set.active())
}

/// Compile an explicit list of keywords, ignoring inactive ones.
pub fn compile_keywords<'a>(keywords: impl IntoIterator<Item = &'a Keyword>) -> CompiledQuery {
    let active: Vec<&Keyword> = keywords
        .into_iter()
        .filter(|k| k.is_active() && !k.text().trim().is_empty())
        .collect();

    let terms: BTreeSet<String> = active.iter().flat_map(|k| tokenize(k.text())).collect();

    let keyword_text = active
        .iter()
        .map(|k| k.text().trim())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .join(" ");

    let mut field_weights: BTreeMap<FieldTag, u8> = BTreeMap::new();
    for kw in &active {
        for tag in kw.apply_to() {
            let weight = field_weights.entry(*tag).or_insert(kw.weight());
            *weight = (*weight).max(kw.weight());
        }
    }

    let mut primary_columns: BTreeSet<&'static str> = BTreeSet::new();
    let mut joined_columns: BTreeMap<TargetEntity, JoinedColumns> = BTreeMap::new();
    for tag in field_weights.keys() {
        let Some(mapping) = field_mapping(*tag) else {
            continue;
        };
        match mapping.join_path() {
            None => primary_columns.extend(mapping.columns.iter().copied()),
            Some(path) => joined_columns
                .entry(mapping.target)
                .or_insert_with(|| JoinedColumns {
                    path,
                    columns: BTreeSet::new(),
                })
                .columns
                .extend(mapping.columns.iter().copied()),
        }
    }

    if primary_columns.is_empty() && joined_columns.is_empty() {
        primary_columns.extend(FALLBACK_PRIMARY_COLUMNS);
    }

    let compiled = CompiledQuery {
        terms,
        keyword_text,
        primary_columns,
        joined_columns,
        field_weights,
        ranking: RankingOptions::POLICY,
        filters: CourseFilters::default(),
    };
    tracing::debug!(
        terms = compiled.terms.len(),
        primary = ?compiled.primary_columns,
        joins = compiled.joined_columns.len(),
        "query_compiled"
    );
    compiled
}

/// Split keyword text into lowercase words on non-alphanumeric boundaries.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}
