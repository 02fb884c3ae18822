//! Search index and ranker.
//!
//! [`SearchIndex::build`] freezes a unified entity set into an immutable
//! snapshot; [`query`] answers filtered, relevance-ranked requests against
//! it. Snapshots publish through an [`IndexHandle`] with an atomic swap, so
//! concurrent queries never coordinate with index rebuilds.

pub mod filters;
pub mod index;
pub mod query;

pub use filters::{FilterValue, JobFilter, StudentFilter};
pub use index::{tokenize, IndexHandle, SearchIndex};
pub use query::{query, query_at, SearchHit, SearchKind, SearchRequest};
