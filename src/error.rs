//! Error taxonomy for the search core.

use std::time::Duration;

use thiserror::Error;

/// External collaborator a failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    /// Query translation provider.
    Translation,
    /// Embedding model provider.
    Embedding,
    /// Vector index holding the text and meaning namespaces.
    VectorIndex,
}

impl std::fmt::Display for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Upstream::Translation => write!(f, "translation"),
            Upstream::Embedding => write!(f, "embedding"),
            Upstream::VectorIndex => write!(f, "vector index"),
        }
    }
}

/// Errors surfaced by the search core.
///
/// Data integrity problems inside retrieved records never show up here; they are
/// logged and the offending record is left out of the ranking.
#[derive(Debug, Error)]
pub enum SearchError {
    /// An external call failed.
    #[error("{service} provider unavailable: {source:#}")]
    UpstreamUnavailable {
        /// Which collaborator failed.
        service: Upstream,
        /// Underlying failure reported by the adapter.
        #[source]
        source: anyhow::Error,
    },

    /// An external call did not answer before its deadline.
    #[error("{service} provider timed out after {after:?}")]
    Timeout {
        /// Which collaborator timed out.
        service: Upstream,
        /// Deadline that was exceeded.
        after: Duration,
    },

    /// The query was blank after trimming.
    #[error("query text must not be empty")]
    EmptyQuery,

    /// Construction-time validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The curated title table could not be read.
    #[error("failed to load title table: {0}")]
    TitleTable(#[from] csv::Error),
}

impl SearchError {
    /// Wraps an adapter failure for the given collaborator.
    pub fn upstream(service: Upstream, source: anyhow::Error) -> Self {
        Self::UpstreamUnavailable { service, source }
    }

    /// True when the failure came from an external collaborator, meaning the
    /// request may be retried and should not count against any quota.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            SearchError::UpstreamUnavailable { .. } | SearchError::Timeout { .. }
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SearchError>;
