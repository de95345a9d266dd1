//! End-to-end search: translate, embed, rank, format.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::embedder::Embedder;
use crate::error::{Result, SearchError, Upstream};
use crate::formatter::ResultFormatter;
use crate::fusion::FusionEngine;
use crate::segments::RankedResult;
use crate::translate::Translator;

/// Request-level tunables.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    /// Language users write in.
    pub source_lang: String,
    /// Language the index was embedded in.
    pub target_lang: String,
    /// Results returned per query.
    pub top_k: usize,
    /// Deadline for each translation or embedding call.
    pub upstream_timeout: Duration,
    /// Cached query embeddings (0 disables caching).
    pub embedding_cache_size: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            source_lang: "ru".to_string(),
            target_lang: "en".to_string(),
            top_k: 3,
            upstream_timeout: Duration::from_secs(30),
            embedding_cache_size: 0,
        }
    }
}

type EmbeddingCache = Arc<Mutex<LruCache<String, Vec<f32>>>>;

/// The search entry point. Stateless apart from the optional embedding cache, so
/// calls are idempotent and safe to retry.
#[derive(Clone)]
pub struct SearchService {
    translator: Arc<dyn Translator>,
    embedder: Arc<dyn Embedder>,
    engine: FusionEngine,
    formatter: ResultFormatter,
    settings: SearchSettings,
    embedding_cache: Option<EmbeddingCache>,
}

impl SearchService {
    /// Wires the service from its collaborators.
    pub fn new(
        translator: Arc<dyn Translator>,
        embedder: Arc<dyn Embedder>,
        engine: FusionEngine,
        formatter: ResultFormatter,
        settings: SearchSettings,
    ) -> Self {
        let embedding_cache = NonZeroUsize::new(settings.embedding_cache_size)
            .map(|capacity| Arc::new(Mutex::new(LruCache::new(capacity))));
        Self {
            translator,
            embedder,
            engine,
            formatter,
            settings,
            embedding_cache,
        }
    }

    /// Active settings.
    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Answers `query` with the formatted top results.
    pub async fn search(&self, query: &str) -> Result<String> {
        let results = self.search_ranked(query, self.settings.top_k).await?;
        Ok(self.formatter.format(&results, query))
    }

    /// Renders already-ranked results the way [`SearchService::search`] does.
    pub fn format(&self, results: &[RankedResult], query: &str) -> String {
        self.formatter.format(results, query)
    }

    /// Returns up to `top_k` ranked results for `query`.
    pub async fn search_ranked(&self, query: &str, top_k: usize) -> Result<Vec<RankedResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let started = Instant::now();
        info!(query, "user query");

        let translated = self.translate(query).await?;
        let vector = self.embed(translated).await?;
        let results = self.engine.rank(&vector, top_k).await?;

        match results.first() {
            Some(top) => info!(
                results = results.len(),
                text_relevance = top.text_relevance,
                meaning_relevance = top.meaning_relevance,
                elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
                "search finished"
            ),
            None => info!(
                elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
                "search found nothing"
            ),
        }
        Ok(results)
    }

    async fn translate(&self, query: &str) -> Result<String> {
        let translator = Arc::clone(&self.translator);
        let text = query.to_string();
        let source = self.settings.source_lang.clone();
        let target = self.settings.target_lang.clone();
        let translated = self
            .run_blocking(Upstream::Translation, move || {
                translator.translate(&text, &source, &target)
            })
            .await?;
        debug!(translated = %translated, "query translated");
        Ok(translated)
    }

    async fn embed(&self, text: String) -> Result<Vec<f32>> {
        if let Some(cache) = &self.embedding_cache {
            if let Some(hit) = {
                let mut guard = cache.lock().await;
                guard.get(&text).cloned()
            } {
                debug!("query embedding served from cache");
                return Ok(hit);
            }
        }

        let embedder = Arc::clone(&self.embedder);
        let input = text.clone();
        let embedding = self
            .run_blocking(Upstream::Embedding, move || embedder.embed(&input))
            .await?;
        info!(tokens = embedding.token_count, "embedded user query");

        if let Some(cache) = &self.embedding_cache {
            let mut guard = cache.lock().await;
            guard.put(text, embedding.vector.clone());
        }
        Ok(embedding.vector)
    }

    /// Runs a blocking adapter call under the upstream deadline. On timeout the task
    /// is left to finish in the background and its result is discarded.
    async fn run_blocking<T, F>(&self, service: Upstream, job: F) -> Result<T>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = tokio::task::spawn_blocking(job);
        match tokio::time::timeout(self.settings.upstream_timeout, handle).await {
            Err(_) => Err(SearchError::Timeout {
                service,
                after: self.settings.upstream_timeout,
            }),
            Ok(Err(join_err)) => Err(SearchError::upstream(
                service,
                anyhow!("{service} task join error: {join_err}"),
            )),
            Ok(Ok(outcome)) => outcome.map_err(|err| SearchError::upstream(service, err)),
        }
    }
}
