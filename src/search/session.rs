//! Search session state with latest-search-wins sequencing.
//!
//! Each `begin_search` hands out a ticket. Only a completion carrying the
//! most recently issued ticket is applied; older completions are dropped
//! before they can touch the registry.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::keywords::KeywordSet;
use crate::model::types::{Course, CourseKey};
use crate::search::backend::RawHit;
use crate::search::compiler::{CompiledQuery, compile};
use crate::search::error::SearchError;
use crate::search::executor::QueryRequest;
use crate::search::filters::CourseFilters;
use crate::search::normalize::{NormalizeReport, normalize};
use crate::search::registry::CourseRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SearchTicket(u64);

impl SearchTicket {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Monotonic ticket source.
#[derive(Debug, Default)]
pub struct SearchSequencer {
    issued: AtomicU64,
}

impl SearchSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> SearchTicket {
        SearchTicket(self.issued.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn latest(&self) -> Option<SearchTicket> {
        match self.issued.load(Ordering::Acquire) {
            0 => None,
            n => Some(SearchTicket(n)),
        }
    }

    pub fn is_current(&self, ticket: SearchTicket) -> bool {
        self.latest() == Some(ticket)
    }
}

/// A search that has been issued but not yet completed.
#[derive(Debug, Clone)]
pub struct PendingSearch {
    pub ticket: SearchTicket,
    pub request: QueryRequest,
}

#[derive(Debug)]
pub enum SearchOutcome {
    Applied(NormalizeReport),
    /// A newer search was issued; the completion was discarded.
    Stale,
}

#[derive(Debug, Default)]
pub struct SearchSession {
    keywords: KeywordSet,
    filters: CourseFilters,
    registry: CourseRegistry,
    sequencer: SearchSequencer,
    results: Vec<CourseKey>,
}

impl SearchSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keywords(keywords: KeywordSet) -> Self {
        Self {
            keywords,
            ..Self::default()
        }
    }

    pub fn keywords(&self) -> &KeywordSet {
        &self.keywords
    }

    pub fn keywords_mut(&mut self) -> &mut KeywordSet {
        &mut self.keywords
    }

    pub fn filters(&self) -> &CourseFilters {
        &self.filters
    }

    pub fn set_filters(&mut self, filters: CourseFilters) {
        self.filters = filters;
    }

    pub fn registry(&self) -> &CourseRegistry {
        &self.registry
    }

    /// Compile the current keyword snapshot with the session filters.
    pub fn compiled(&self) -> CompiledQuery {
        compile(&self.keywords).with_filters(self.filters.clone())
    }

    /// Issue a keyword search over the current active keywords.
    pub fn begin_search(&self) -> PendingSearch {
        let ticket = self.sequencer.next();
        let request = QueryRequest::keywords(self.compiled());
        tracing::debug!(ticket = ticket.get(), "search_issued");
        PendingSearch { ticket, request }
    }

    /// Issue an identity lookup.
    pub fn begin_lookup(&self, keys: impl IntoIterator<Item = CourseKey>) -> PendingSearch {
        PendingSearch {
            ticket: self.sequencer.next(),
            request: QueryRequest::identities(keys),
        }
    }

    /// Apply a finished search if it is still the latest one.
    ///
    /// Errors from a stale search are swallowed along with its hits.
    pub fn complete_search(
        &mut self,
        ticket: SearchTicket,
        result: Result<Vec<RawHit>, SearchError>,
    ) -> Result<SearchOutcome, SearchError> {
        if !self.sequencer.is_current(ticket) {
            tracing::debug!(
                ticket = ticket.get(),
                latest = self.sequencer.latest().map(SearchTicket::get),
                "stale_search_discarded"
            );
            return Ok(SearchOutcome::Stale);
        }
        let report = normalize(result?, &mut self.registry);
        self.results = report.courses.iter().map(Course::key).collect();
        Ok(SearchOutcome::Applied(report))
    }

    /// Courses of the last applied search, in rank order.
    pub fn results(&self) -> impl Iterator<Item = &Course> {
        self.registry.select(&self.results)
    }
}
