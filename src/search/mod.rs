//! Search layer facade.
//!
//! - **[`fields`]**: Field tags and the static field → column table.
//! - **[`compiler`]**: Active keywords → [`compiler::CompiledQuery`].
//! - **[`filters`]**: Structured term/school/schedule narrowing.
//! - **[`backend`]**: The storage seam the executor talks to.
//! - **[`sqlite`]**: FTS5 implementation of that seam.
//! - **[`executor`]**: Keyword and identity execution, ranking, timeouts.
//! - **[`normalize`]**: Raw hits → display-ready courses.
//! - **[`registry`]**: Identity-keyed store of fetched courses.
//! - **[`session`]**: Keyword state plus latest-search-wins sequencing.

pub mod backend;
pub mod compiler;
pub mod error;
pub mod executor;
pub mod fields;
pub mod filters;
pub mod normalize;
pub mod registry;
pub mod session;
pub mod sqlite;
