//! Query embeddings from OpenAI-compatible `/embeddings` endpoints.

use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Embedder, Embedding};

/// Blocking client embedding one query text per request.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimensions: Option<usize>,
    max_attempts: usize,
}

enum Outcome {
    Embedded(Embedding),
    Transient(anyhow::Error),
}

impl OpenAiEmbedder {
    /// Builds a client for `{base_url}/embeddings`.
    ///
    /// `max_retries` counts attempts, so `1` sends each request exactly once.
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        dimensions: Option<usize>,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self> {
        let api_key = api_key.trim().to_string();
        anyhow::ensure!(!api_key.is_empty(), "missing OpenAI API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing OpenAI model name");
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build OpenAI HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            api_key,
            model,
            dimensions,
            max_attempts: max_retries.max(1),
        })
    }

    fn attempt(&self, text: &str) -> Result<Outcome> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
            dimensions: self.dimensions,
        };
        let sent = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send();
        let resp = match sent {
            Ok(resp) => resp,
            Err(err) if err.is_timeout() || err.is_connect() => {
                return Ok(Outcome::Transient(err.into()));
            }
            Err(err) => return Err(err).context("OpenAI embeddings request failed"),
        };
        let status = resp.status();
        if status.is_success() {
            let parsed: EmbeddingResponse = resp
                .json()
                .context("failed to parse OpenAI embedding response")?;
            return parsed.into_embedding().map(Outcome::Embedded);
        }
        let failure = anyhow!("OpenAI embeddings request failed ({status}): {}", body_of(resp));
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Ok(Outcome::Transient(failure))
        } else {
            Err(failure)
        }
    }
}

impl Embedder for OpenAiEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        anyhow::ensure!(!text.trim().is_empty(), "cannot embed empty text");
        let mut attempt = 1usize;
        loop {
            match self.attempt(text)? {
                Outcome::Embedded(embedding) => return Ok(embedding),
                Outcome::Transient(err) if attempt < self.max_attempts => {
                    warn!(attempt, error = %err, "retrying OpenAI embeddings request");
                    thread::sleep(backoff(attempt));
                    attempt += 1;
                }
                Outcome::Transient(err) => return Err(err),
            }
        }
    }
}

fn backoff(attempt: usize) -> Duration {
    Duration::from_millis(500u64 << attempt.min(5))
}

fn body_of(resp: Response) -> String {
    resp.text()
        .unwrap_or_else(|_| "<body unavailable>".to_string())
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<Usage>,
}

impl EmbeddingResponse {
    fn into_embedding(self) -> Result<Embedding> {
        let token_count = self.usage.map_or(0, |usage| usage.total_tokens);
        let vector = self
            .data
            .into_iter()
            .min_by_key(|entry| entry.index)
            .map(|entry| entry.embedding)
            .ok_or_else(|| anyhow!("OpenAI returned no embedding"))?;
        anyhow::ensure!(!vector.is_empty(), "OpenAI returned an empty embedding");
        Ok(Embedding {
            vector,
            token_count,
        })
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_yields_vector_and_token_count() {
        let raw = r#"{
            "object": "list",
            "data": [{"object": "embedding", "index": 0, "embedding": [0.1, -0.2, 0.3]}],
            "model": "text-embedding-ada-002",
            "usage": {"prompt_tokens": 7, "total_tokens": 7}
        }"#;
        let parsed: EmbeddingResponse = serde_json::from_str(raw).expect("parse");
        let embedding = parsed.into_embedding().expect("embedding");
        assert_eq!(embedding.vector, vec![0.1, -0.2, 0.3]);
        assert_eq!(embedding.token_count, 7);
    }

    #[test]
    fn empty_data_is_an_error() {
        let parsed: EmbeddingResponse = serde_json::from_str(r#"{"data": []}"#).expect("parse");
        assert!(parsed.into_embedding().is_err());
    }

    #[test]
    fn request_omits_unset_dimensions() {
        let request = EmbeddingRequest {
            model: "text-embedding-3-small",
            input: "hello",
            dimensions: None,
        };
        let encoded = serde_json::to_string(&request).expect("serialize");
        assert_eq!(encoded, r#"{"model":"text-embedding-3-small","input":"hello"}"#);
    }

    #[test]
    fn constructor_rejects_blank_key() {
        let result = OpenAiEmbedder::new(
            " ".into(),
            "https://api.openai.com/v1".into(),
            "text-embedding-ada-002".into(),
            None,
            Duration::from_secs(1),
            1,
        );
        assert!(result.is_err());
    }
}
