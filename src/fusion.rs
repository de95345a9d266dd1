//! Relevance fusion: joins text-segment and meaning-segment similarity into one
//! ranking, keeps the best segment per video and returns the top results.
//!
//! ```text
//! query vector ──┬─► text namespace    (top N, with metadata) ──┐
//!                └─► meaning namespace (top M, ids only)     ───┴─► fuse ─► dedupe ─► sort ─► top K
//! ```
//!
//! A text segment is scored only when the meaning segment it references is among the
//! retrieved meaning hits; otherwise it is dropped. Dropping is not an error.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::error::{Result, SearchError, Upstream};
use crate::index::{Namespace, SimilarityQuery, VectorIndex};
use crate::segments::{video_id_of, video_id_of_meaning, IndexMatch, RankedResult, SegmentMetadata};
use crate::titles::TitleResolver;

/// Text segments fetched per query.
pub const DEFAULT_TEXT_CANDIDATES: usize = 20;
/// Meaning segments fetched per query; large enough to cover the references of the
/// text candidates.
pub const DEFAULT_MEANING_CANDIDATES: usize = 1600;
/// Upper bound on concurrent partition queries.
pub const DEFAULT_PARTITION_CONCURRENCY: usize = 10;

/// Weighting policy for joint relevance.
///
/// The default favors the meaning signal (0.6) over the text signal (0.4). Weights are
/// non-negative and sum to one, so joint relevance stays within the range of the input
/// similarities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceWeights {
    text: f64,
    meaning: f64,
}

impl RelevanceWeights {
    /// Validates and builds a weighting policy.
    pub fn new(text: f64, meaning: f64) -> Result<Self> {
        if !(text.is_finite() && meaning.is_finite()) || text < 0.0 || meaning < 0.0 {
            return Err(SearchError::InvalidConfig(format!(
                "relevance weights must be non-negative, got text={text} meaning={meaning}"
            )));
        }
        if ((text + meaning) - 1.0).abs() > 1e-9 {
            return Err(SearchError::InvalidConfig(format!(
                "relevance weights must sum to 1, got {}",
                text + meaning
            )));
        }
        Ok(Self { text, meaning })
    }

    /// Weight of the text-segment similarity.
    pub fn text(&self) -> f64 {
        self.text
    }

    /// Weight of the meaning-segment similarity.
    pub fn meaning(&self) -> f64 {
        self.meaning
    }

    /// Joint relevance of a text/meaning similarity pair.
    pub fn joint(&self, text_relevance: f64, meaning_relevance: f64) -> f64 {
        self.text * text_relevance + self.meaning * meaning_relevance
    }
}

impl Default for RelevanceWeights {
    fn default() -> Self {
        Self {
            text: 0.4,
            meaning: 0.6,
        }
    }
}

/// How meaning segments are retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MeaningRetrieval {
    /// One query for all meaning candidates.
    #[default]
    Single,
    /// One filtered query per partition value (e.g. per playlist), merged afterwards.
    Partitioned {
        /// Metadata field the filter applies to.
        field: String,
        /// Values to query; one request each.
        values: Vec<String>,
        /// Maximum requests in flight; candidates are split evenly across this many.
        max_concurrency: usize,
    },
}

/// Tunables of the fusion engine.
#[derive(Debug, Clone)]
pub struct FusionSettings {
    /// Text segments fetched per query.
    pub text_candidates: usize,
    /// Meaning segments fetched per query.
    pub meaning_candidates: usize,
    /// Joint relevance policy.
    pub weights: RelevanceWeights,
    /// Meaning retrieval strategy.
    pub meaning_retrieval: MeaningRetrieval,
    /// Deadline for each index query.
    pub query_timeout: Duration,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            text_candidates: DEFAULT_TEXT_CANDIDATES,
            meaning_candidates: DEFAULT_MEANING_CANDIDATES,
            weights: RelevanceWeights::default(),
            meaning_retrieval: MeaningRetrieval::Single,
            query_timeout: Duration::from_secs(30),
        }
    }
}

/// Counters describing one fusion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FusionStats {
    /// Text segments examined.
    pub considered: usize,
    /// Segments that received a joint relevance.
    pub scored: usize,
    /// Segments whose meaning reference was not among the meaning hits.
    pub dropped_unmatched: usize,
    /// Segments with missing or malformed metadata.
    pub dropped_malformed: usize,
    /// Distinct videos before truncation.
    pub unique_videos: usize,
}

/// Ranks video segments against a query embedding.
#[derive(Clone)]
pub struct FusionEngine {
    index: Arc<dyn VectorIndex>,
    titles: Arc<TitleResolver>,
    settings: FusionSettings,
}

impl FusionEngine {
    /// Creates an engine over an injected index and title resolver.
    pub fn new(
        index: Arc<dyn VectorIndex>,
        titles: Arc<TitleResolver>,
        settings: FusionSettings,
    ) -> Result<Self> {
        if settings.text_candidates == 0 || settings.meaning_candidates == 0 {
            return Err(SearchError::InvalidConfig(
                "candidate counts must be positive".to_string(),
            ));
        }
        if let MeaningRetrieval::Partitioned {
            values,
            max_concurrency,
            ..
        } = &settings.meaning_retrieval
        {
            if values.is_empty() || *max_concurrency == 0 {
                return Err(SearchError::InvalidConfig(
                    "partitioned meaning retrieval needs values and a positive concurrency"
                        .to_string(),
                ));
            }
        }
        Ok(Self {
            index,
            titles,
            settings,
        })
    }

    /// Active settings.
    pub fn settings(&self) -> &FusionSettings {
        &self.settings
    }

    /// Returns at most `top_k` results, one per video, by descending joint relevance.
    pub async fn rank(&self, vector: &[f32], top_k: usize) -> Result<Vec<RankedResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let started = Instant::now();
        let text_query =
            SimilarityQuery::new(vector, Namespace::Text, self.settings.text_candidates)
                .with_metadata();
        let (texts, meanings) = tokio::join!(self.fetch(text_query), self.fetch_meanings(vector));
        let texts = texts?;
        let meanings = meanings?;
        let retrieval_ms = started.elapsed().as_secs_f64() * 1000.0;

        let fuse_started = Instant::now();
        let (results, stats) = fuse(
            &texts,
            &meanings,
            &self.settings.weights,
            &self.titles,
            top_k,
        );
        info!(
            texts = texts.len(),
            meanings = meanings.len(),
            results = results.len(),
            retrieval_ms,
            fusion_ms = fuse_started.elapsed().as_secs_f64() * 1000.0,
            "ranked query"
        );
        debug!(?stats, "fusion stats");
        Ok(results)
    }

    async fn fetch(&self, query: SimilarityQuery<'_>) -> Result<Vec<IndexMatch>> {
        let namespace = query.namespace;
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.settings.query_timeout, self.index.query(query))
            .await
            .map_err(|_| SearchError::Timeout {
                service: Upstream::VectorIndex,
                after: self.settings.query_timeout,
            })?;
        let matches = outcome.map_err(|err| SearchError::upstream(Upstream::VectorIndex, err))?;
        debug!(
            %namespace,
            matches = matches.len(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "index query finished"
        );
        Ok(matches)
    }

    async fn fetch_meanings(&self, vector: &[f32]) -> Result<Vec<IndexMatch>> {
        match &self.settings.meaning_retrieval {
            MeaningRetrieval::Single => {
                self.fetch(SimilarityQuery::new(
                    vector,
                    Namespace::Meaning,
                    self.settings.meaning_candidates,
                ))
                .await
            }
            MeaningRetrieval::Partitioned {
                field,
                values,
                max_concurrency,
            } => {
                let per_partition = self.settings.meaning_candidates.div_ceil(*max_concurrency);
                let queries: Vec<_> = values
                    .iter()
                    .map(|value| {
                        self.fetch(
                            SimilarityQuery::new(vector, Namespace::Meaning, per_partition)
                                .with_eq_filter(field, value),
                        )
                    })
                    .collect();
                let batches: Vec<Result<Vec<IndexMatch>>> = stream::iter(queries)
                    .buffered(*max_concurrency)
                    .collect()
                    .await;
                let mut merged = Vec::new();
                for batch in batches {
                    merged.extend(batch?);
                }
                Ok(merged)
            }
        }
    }
}

/// Scores, sorts, deduplicates and truncates retrieved segments.
///
/// Pure; the output depends only on the inputs. Segments are ordered by joint
/// relevance with ties kept in index order, and each video is represented by the first
/// segment it has in that order.
pub fn fuse(
    texts: &[IndexMatch],
    meanings: &[IndexMatch],
    weights: &RelevanceWeights,
    titles: &TitleResolver,
    top_k: usize,
) -> (Vec<RankedResult>, FusionStats) {
    let mut stats = FusionStats::default();
    let mut meaning_scores: HashMap<&str, f64> = HashMap::with_capacity(meanings.len());
    for meaning in meanings {
        meaning_scores.entry(meaning.id.as_str()).or_insert(meaning.score);
    }

    let mut scored: Vec<Scored<'_>> = Vec::with_capacity(texts.len());
    for text in texts {
        stats.considered += 1;
        let Some(map) = text.metadata.as_ref() else {
            warn!(segment = %text.id, "skipping text segment without metadata");
            stats.dropped_malformed += 1;
            continue;
        };
        let metadata = match SegmentMetadata::from_map(map) {
            Ok(metadata) => metadata,
            Err(reason) => {
                warn!(segment = %text.id, %reason, "skipping text segment with malformed metadata");
                stats.dropped_malformed += 1;
                continue;
            }
        };
        let Some(&meaning_relevance) = meaning_scores.get(metadata.meaning_id.as_str()) else {
            warn!(
                segment = %text.id,
                meaning_id = %metadata.meaning_id,
                "meaning relevance is not defined; dropping segment"
            );
            stats.dropped_unmatched += 1;
            continue;
        };
        if !text.score.is_finite() || !meaning_relevance.is_finite() {
            warn!(
                segment = %text.id,
                text_score = text.score,
                meaning_score = meaning_relevance,
                "skipping text segment with non-finite score"
            );
            stats.dropped_malformed += 1;
            continue;
        }
        stats.scored += 1;
        scored.push(Scored {
            video_id: video_id_of(&text.id),
            relevance: weights.joint(text.score, meaning_relevance),
            text_relevance: text.score,
            meaning_relevance,
            metadata,
        });
    }

    // `sort_by` is stable, which keeps index order among ties.
    scored.sort_by(|a, b| b.relevance.partial_cmp(&a.relevance).unwrap_or(Ordering::Equal));

    let mut seen: HashSet<&str> = HashSet::new();
    let mut kept: Vec<RankedResult> = Vec::new();
    for segment in scored {
        if seen.insert(segment.video_id) {
            kept.push(build_result(segment, titles));
        }
    }
    stats.unique_videos = kept.len();
    kept.truncate(top_k);
    (kept, stats)
}

struct Scored<'a> {
    video_id: &'a str,
    relevance: f64,
    text_relevance: f64,
    meaning_relevance: f64,
    metadata: SegmentMetadata,
}

fn build_result(segment: Scored<'_>, titles: &TitleResolver) -> RankedResult {
    let Scored {
        video_id,
        relevance,
        text_relevance,
        meaning_relevance,
        metadata,
    } = segment;
    let title_key = video_id_of_meaning(&metadata.meaning_id).unwrap_or(video_id);
    let title = titles.resolve_title(title_key, metadata.title.as_deref());
    let url = metadata.url_with_offset();
    RankedResult {
        video_id: video_id.to_string(),
        relevance,
        text_relevance,
        meaning_relevance,
        text: metadata.text,
        url,
        start_secs: metadata.start_secs,
        title,
        published: metadata.published,
    }
}
