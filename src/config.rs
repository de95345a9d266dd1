//! Command-line and environment configuration shared by the binaries.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use crate::embedder::openai::OpenAiEmbedder;
use crate::formatter::{Phrasebook, ResultFormatter};
use crate::fusion::{FusionEngine, FusionSettings, MeaningRetrieval, RelevanceWeights};
use crate::index::pinecone::PineconeIndex;
use crate::search::{SearchService, SearchSettings};
use crate::titles::{
    TitleIndex, TitleResolver, DEFAULT_BOILERPLATE_SUFFIX, DEFAULT_TITLE_COLUMN,
    DEFAULT_URL_COLUMN,
};
use crate::translate::{GoogleTranslator, Passthrough, Translator};

/// Knobs for the search pipeline and its external providers.
#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Pinecone API key.
    #[arg(long, env = "PINECONE_API_KEY")]
    pub pinecone_api_key: String,

    /// Pinecone index host (https://<index>-<project>.svc.<env>.pinecone.io).
    #[arg(long, env = "PINECONE_INDEX_HOST")]
    pub pinecone_host: String,

    /// OpenAI API key used for query embeddings.
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: String,

    /// Embedding model identifier; must match the model the index was built with.
    #[arg(
        long,
        env = "VIDSEARCH_OPENAI_MODEL",
        default_value = "text-embedding-ada-002"
    )]
    pub openai_model: String,

    /// Optional embedding dimension override.
    #[arg(long, env = "VIDSEARCH_OPENAI_DIMENSIONS")]
    pub openai_dimensions: Option<usize>,

    /// Base URL for OpenAI-compatible endpoints.
    #[arg(
        long,
        env = "VIDSEARCH_OPENAI_BASE",
        default_value = "https://api.openai.com/v1"
    )]
    pub openai_base_url: String,

    /// Google Cloud Translation key; queries are embedded untranslated when unset.
    #[arg(long, env = "GOOGLE_TRANSLATE_API_KEY")]
    pub translate_api_key: Option<String>,

    /// Translation endpoint.
    #[arg(
        long,
        env = "VIDSEARCH_TRANSLATE_ENDPOINT",
        default_value = GoogleTranslator::DEFAULT_ENDPOINT
    )]
    pub translate_endpoint: String,

    /// Language users write in.
    #[arg(long, env = "VIDSEARCH_SOURCE_LANG", default_value = "ru")]
    pub source_lang: String,

    /// Language of the indexed transcripts.
    #[arg(long, env = "VIDSEARCH_TARGET_LANG", default_value = "en")]
    pub target_lang: String,

    /// Curated title table (CSV).
    #[arg(long, env = "VIDSEARCH_TITLES_CSV")]
    pub titles_csv: Option<PathBuf>,

    /// CSV column holding the video link.
    #[arg(long, default_value = DEFAULT_URL_COLUMN)]
    pub title_url_column: String,

    /// CSV column holding the curated title.
    #[arg(long, default_value = DEFAULT_TITLE_COLUMN)]
    pub title_column: String,

    /// Suffixes stripped from raw video titles, comma separated.
    #[arg(long, env = "VIDSEARCH_TITLE_SUFFIXES", default_value = DEFAULT_BOILERPLATE_SUFFIX)]
    pub title_suffixes: String,

    /// Lower-case shouted words in raw video titles.
    #[arg(long, env = "VIDSEARCH_TAME_CAPS", default_value_t = false)]
    pub tame_caps: bool,

    /// Phrasebook JSON with greetings, closers and the no-answer message.
    #[arg(long, env = "VIDSEARCH_PHRASEBOOK")]
    pub phrasebook: Option<PathBuf>,

    /// Results returned per query.
    #[arg(long, env = "VIDSEARCH_TOP_K", default_value_t = 3)]
    pub top_k: usize,

    /// Text segments fetched before fusion.
    #[arg(long, default_value_t = crate::fusion::DEFAULT_TEXT_CANDIDATES)]
    pub text_candidates: usize,

    /// Meaning segments fetched before fusion.
    #[arg(long, default_value_t = crate::fusion::DEFAULT_MEANING_CANDIDATES)]
    pub meaning_candidates: usize,

    /// Weight of text similarity in joint relevance.
    #[arg(long, default_value_t = 0.4)]
    pub text_weight: f64,

    /// Weight of meaning similarity in joint relevance.
    #[arg(long, default_value_t = 0.6)]
    pub meaning_weight: f64,

    /// Split meaning retrieval into one query per value, comma separated.
    #[arg(long, env = "VIDSEARCH_MEANING_PARTITIONS")]
    pub meaning_partitions: Option<String>,

    /// Metadata field partition values are matched against.
    #[arg(long, env = "VIDSEARCH_PARTITION_FIELD", default_value = "playlist_id")]
    pub partition_field: String,

    /// Partition queries in flight at once.
    #[arg(long, default_value_t = crate::fusion::DEFAULT_PARTITION_CONCURRENCY)]
    pub partition_concurrency: usize,

    /// Seconds before any external call is abandoned.
    #[arg(long, env = "VIDSEARCH_UPSTREAM_TIMEOUT_SECS", default_value_t = 30)]
    pub upstream_timeout_secs: u64,

    /// Attempts per provider request (1 disables retries).
    #[arg(long, env = "VIDSEARCH_MAX_RETRIES", default_value_t = 1)]
    pub max_retries: usize,

    /// Max cached query embeddings kept in-memory (0 disables caching).
    #[arg(long, default_value_t = 0)]
    pub embedding_cache_size: usize,
}

impl SearchArgs {
    /// Deadline applied to external calls.
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs.max(1))
    }

    /// Converts the parsed flags into fusion settings.
    pub fn build_fusion_settings(&self) -> Result<FusionSettings> {
        let weights = RelevanceWeights::new(self.text_weight, self.meaning_weight)?;
        let partitions = split_list(self.meaning_partitions.as_deref().unwrap_or_default());
        let meaning_retrieval = if partitions.is_empty() {
            MeaningRetrieval::Single
        } else {
            MeaningRetrieval::Partitioned {
                field: self.partition_field.clone(),
                values: partitions,
                max_concurrency: self.partition_concurrency.max(1),
            }
        };
        Ok(FusionSettings {
            text_candidates: self.text_candidates.max(1),
            meaning_candidates: self.meaning_candidates.max(1),
            weights,
            meaning_retrieval,
            query_timeout: self.upstream_timeout(),
        })
    }

    /// Converts the parsed flags into request-level settings.
    pub fn build_search_settings(&self) -> SearchSettings {
        SearchSettings {
            source_lang: self.source_lang.clone(),
            target_lang: self.target_lang.clone(),
            top_k: self.top_k.max(1),
            upstream_timeout: self.upstream_timeout(),
            embedding_cache_size: self.embedding_cache_size,
        }
    }

    /// Loads the curated title table, if configured, into a resolver.
    pub fn load_title_resolver(&self) -> Result<TitleResolver> {
        let index = match &self.titles_csv {
            Some(path) => TitleIndex::from_csv_path(path, &self.title_url_column, &self.title_column)
                .with_context(|| format!("failed to load titles from {:?}", path))?,
            None => TitleIndex::default(),
        };
        Ok(TitleResolver::new(index)
            .with_boilerplate_suffixes(split_list(&self.title_suffixes))
            .with_tame_caps(self.tame_caps))
    }

    /// Loads the phrasebook, falling back to the built-in phrases.
    pub fn load_formatter(&self) -> Result<ResultFormatter> {
        let phrases = match &self.phrasebook {
            Some(path) => Phrasebook::from_json_path(path)?,
            None => Phrasebook::default(),
        };
        Ok(ResultFormatter::new(phrases))
    }

    /// Builds the translation adapter.
    pub fn build_translator(&self) -> Result<Arc<dyn Translator>> {
        match &self.translate_api_key {
            Some(key) if !key.trim().is_empty() => Ok(Arc::new(GoogleTranslator::new(
                key.clone(),
                self.translate_endpoint.clone(),
                self.upstream_timeout(),
            )?)),
            _ => Ok(Arc::new(Passthrough)),
        }
    }

    /// Builds the embedding adapter.
    pub fn build_embedder(&self) -> Result<OpenAiEmbedder> {
        OpenAiEmbedder::new(
            self.openai_api_key.clone(),
            self.openai_base_url.clone(),
            self.openai_model.clone(),
            self.openai_dimensions,
            self.upstream_timeout(),
            self.max_retries,
        )
    }

    /// Builds the Pinecone client and probes the index.
    pub async fn connect_index(&self) -> Result<PineconeIndex> {
        let index = PineconeIndex::new(
            self.pinecone_api_key.clone(),
            self.pinecone_host.clone(),
            self.upstream_timeout(),
            self.max_retries,
        )?;
        index
            .describe_index_stats()
            .await
            .with_context(|| format!("failed to reach Pinecone index at {}", self.pinecone_host))?;
        Ok(index)
    }

    /// Wires a complete search service from the parsed flags.
    pub async fn build_service(&self) -> Result<SearchService> {
        let index = Arc::new(self.connect_index().await?);
        let titles = Arc::new(self.load_title_resolver()?);
        let engine = FusionEngine::new(index, titles, self.build_fusion_settings()?)?;
        Ok(SearchService::new(
            self.build_translator()?,
            Arc::new(self.build_embedder()?),
            engine,
            self.load_formatter()?,
            self.build_search_settings(),
        ))
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
