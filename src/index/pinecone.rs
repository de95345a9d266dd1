//! Pinecone data-plane client implementing [`VectorIndex`].

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{SimilarityQuery, VectorIndex};
use crate::segments::IndexMatch;

/// Async client for a single Pinecone index host.
#[derive(Clone)]
pub struct PineconeIndex {
    client: Client,
    host: String,
    max_retries: usize,
}

impl PineconeIndex {
    /// Builds a client for the index served at `host`
    /// (e.g. `https://videos-abc123.svc.us-east1-gcp.pinecone.io`).
    pub fn new(api_key: String, host: String, timeout: Duration, max_retries: usize) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Pinecone API key");
        anyhow::ensure!(
            host.starts_with("http://") || host.starts_with("https://"),
            "Pinecone host must be an http(s) URL"
        );
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Api-Key",
            HeaderValue::from_str(api_key.trim()).context("invalid Pinecone API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build Pinecone HTTP client")?;
        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            max_retries: max_retries.max(1),
        })
    }

    /// Fetches index statistics; used at startup to fail fast on a bad host or key.
    pub async fn describe_index_stats(&self) -> Result<IndexStats> {
        let url = format!("{}/describe_index_stats", self.host);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .context("Pinecone describe_index_stats request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            anyhow::bail!("Pinecone describe_index_stats failed ({}): {}", status, body);
        }
        let stats: IndexStats = resp
            .json()
            .await
            .context("failed to parse Pinecone index stats")?;
        info!(
            dimension = stats.dimension,
            total_vectors = stats.total_vector_count,
            namespaces = stats.namespaces.len(),
            "connected to Pinecone index"
        );
        Ok(stats)
    }

    async fn post_query(&self, body: &QueryRequest<'_>) -> Result<QueryResponse> {
        let url = format!("{}/query", self.host);
        let mut attempt = 0usize;
        loop {
            match self.client.post(&url).json(body).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp
                            .json()
                            .await
                            .context("failed to parse Pinecone query response");
                    }
                    let text = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    anyhow::bail!("Pinecone query failed ({}): {}", status, text);
                }
                Err(err) => {
                    if (err.is_connect() || err.is_timeout()) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(err).context("Pinecone query request failed");
                }
            }
        }
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(&self, request: SimilarityQuery<'_>) -> Result<Vec<IndexMatch>> {
        let body = QueryRequest {
            namespace: request.namespace.as_str(),
            vector: request.vector,
            top_k: request.top_k,
            include_metadata: request.include_metadata,
            include_values: false,
            filter: request.filter.as_ref(),
        };
        let response = self.post_query(&body).await?;
        debug!(
            namespace = %request.namespace,
            requested = request.top_k,
            returned = response.matches.len(),
            "Pinecone query finished"
        );
        Ok(response.matches)
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(250 * (1 << capped))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a Value>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<IndexMatch>,
}

/// Subset of `describe_index_stats` the service reports on.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    /// Vector dimension of the index.
    #[serde(default)]
    pub dimension: usize,
    /// Total number of stored vectors.
    #[serde(default)]
    pub total_vector_count: u64,
    /// Per-namespace statistics keyed by namespace name.
    #[serde(default)]
    pub namespaces: serde_json::Map<String, Value>,
}
