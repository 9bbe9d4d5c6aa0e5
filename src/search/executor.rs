//! Runs a compiled query (or an identity list) against the backend.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::model::types::CourseKey;
use crate::search::backend::{BackendError, RawHit, SearchBackend};
use crate::search::compiler::CompiledQuery;
use crate::search::error::SearchError;

/// Original page size of the catalog search.
pub const DEFAULT_RESULT_LIMIT: usize = 50;

/// What to fetch. Keyword mode and identity mode are mutually exclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRequest {
    pub compiled: Option<CompiledQuery>,
    pub identities: Vec<CourseKey>,
}

impl QueryRequest {
    pub fn keywords(compiled: CompiledQuery) -> Self {
        Self {
            compiled: Some(compiled),
            identities: Vec::new(),
        }
    }

    pub fn identities(keys: impl IntoIterator<Item = CourseKey>) -> Self {
        Self {
            compiled: None,
            identities: keys.into_iter().collect(),
        }
    }

    /// Resolve the execution mode, or `None` when the request is a
    /// legitimate no-op (an empty keyword query).
    pub fn mode(&self) -> Result<Option<ExecutionMode<'_>>, SearchError> {
        match (&self.compiled, self.identities.is_empty()) {
            (None, true) => Err(SearchError::InvalidQueryRequest(
                "neither keywords nor course identities were supplied".into(),
            )),
            (Some(q), false) if !q.is_empty() => Err(SearchError::InvalidQueryRequest(
                "keyword and identity queries cannot be combined".into(),
            )),
            (Some(q), true) if q.is_empty() => Ok(None),
            (Some(q), true) => Ok(Some(ExecutionMode::Keyword(q))),
            (_, false) => Ok(Some(ExecutionMode::Identity(&self.identities))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ExecutionMode<'a> {
    Keyword(&'a CompiledQuery),
    Identity(&'a [CourseKey]),
}

pub struct SearchExecutor<B> {
    backend: B,
    limit: usize,
}

impl<B: SearchBackend> SearchExecutor<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            limit: DEFAULT_RESULT_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Execute `request`, returning hits best first.
    pub fn execute(&self, request: &QueryRequest) -> Result<Vec<RawHit>, SearchError> {
        let Some(mode) = request.mode()? else {
            tracing::debug!("empty keyword query, backend not contacted");
            return Ok(Vec::new());
        };
        let start = Instant::now();
        let hits = match mode {
            ExecutionMode::Keyword(query) => {
                tracing::info!(
                    mode = "keyword",
                    terms = %query.keyword_text,
                    joins = query.joined_columns.len(),
                    limit = self.limit,
                    "search_start"
                );
                let mut hits = self.backend.full_text(query, self.limit)?;
                rank(&mut hits);
                hits.truncate(self.limit);
                hits
            }
            ExecutionMode::Identity(keys) => {
                tracing::info!(mode = "identity", keys = keys.len(), "search_start");
                let hits = self.backend.lookup(keys)?;
                order_by_identity(keys, hits)
            }
        };
        tracing::info!(
            hits = hits.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "search_complete"
        );
        Ok(hits)
    }
}

impl<B: SearchBackend + Send + Sync + 'static> SearchExecutor<B> {
    /// Execute on the blocking pool, giving up after `timeout`.
    ///
    /// An abandoned call keeps running to completion in the background but
    /// its result is dropped.
    pub async fn execute_with_timeout(
        self: Arc<Self>,
        request: QueryRequest,
        timeout: Duration,
    ) -> Result<Vec<RawHit>, SearchError> {
        let task = tokio::task::spawn_blocking(move || self.execute(&request));
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(SearchError::BackendUnavailable(BackendError::Unavailable(
                format!("search task failed: {join_err}"),
            ))),
            Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "search_timeout");
                Err(SearchError::BackendUnavailable(BackendError::Timeout(
                    timeout,
                )))
            }
        }
    }
}

/// Stable sort by score, descending. Ties keep backend order.
fn rank(hits: &mut [RawHit]) {
    hits.sort_by(|a, b| {
        let a = a.score.unwrap_or(f64::NEG_INFINITY);
        let b = b.score.unwrap_or(f64::NEG_INFINITY);
        b.total_cmp(&a)
    });
}

/// Reorder lookup rows to follow the first occurrence of each key.
fn order_by_identity(keys: &[CourseKey], hits: Vec<RawHit>) -> Vec<RawHit> {
    let mut slots: Vec<Option<RawHit>> = hits.into_iter().map(Some).collect();
    let mut seen = HashSet::new();
    let mut ordered = Vec::with_capacity(slots.len());
    for key in keys {
        if !seen.insert(key) {
            continue;
        }
        if let Some(slot) = slots
            .iter_mut()
            .find(|s| s.as_ref().is_some_and(|hit| hit_matches_key(hit, key)))
        {
            ordered.extend(slot.take());
        }
    }
    ordered
}

fn hit_matches_key(hit: &RawHit, key: &CourseKey) -> bool {
    let r = &hit.record;
    r.get("external_course_id").and_then(serde_json::Value::as_i64) == Some(key.external_course_id)
        && r.get("term_name").and_then(serde_json::Value::as_str) == Some(key.term_name.as_str())
        && r.get("term_year").and_then(serde_json::Value::as_i64) == Some(i64::from(key.term_year))
        && r.get("class_section").and_then(serde_json::Value::as_str)
            == Some(key.class_section.as_str())
}
