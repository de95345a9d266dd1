#![warn(missing_docs)]
//! Core library entry points for the vidsearch video-segment search service.

pub mod config;
pub mod embedder;
pub mod error;
pub mod formatter;
pub mod fusion;
pub mod heartbeat;
pub mod index;
pub mod quota;
pub mod search;
pub mod segments;
pub mod titles;
pub mod translate;

pub use config::SearchArgs;
pub use embedder::{Embedder, Embedding};
pub use error::{SearchError, Upstream};
pub use formatter::{Phrasebook, ResultFormatter};
pub use fusion::{fuse, FusionEngine, FusionSettings, FusionStats, MeaningRetrieval, RelevanceWeights};
pub use heartbeat::Heartbeat;
pub use index::{Namespace, SimilarityQuery, VectorIndex};
pub use quota::{DailyLimit, InMemoryQuota, RequestQuota};
pub use search::{SearchService, SearchSettings};
pub use segments::{IndexMatch, RankedResult, SegmentMetadata};
pub use titles::{extract_video_id, TitleIndex, TitleResolver};
pub use translate::{Passthrough, Translator};

/// Installs the `tracing` subscriber used by the binaries. `RUST_LOG` overrides the
/// default `info` level.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
