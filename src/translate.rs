//! Query translation port and adapters.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

/// Normalizes the language of a query before it is embedded.
///
/// Implementations may block; the search service calls them from a blocking task.
pub trait Translator: Send + Sync {
    /// Translates `text` from `source` to `target` (ISO 639-1 codes).
    fn translate(&self, text: &str, source: &str, target: &str) -> Result<String>;
}

/// Returns the input unchanged. Used when the index language matches the users'.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl Translator for Passthrough {
    fn translate(&self, text: &str, _source: &str, _target: &str) -> Result<String> {
        Ok(text.to_string())
    }
}

/// Blocking client for the Google Cloud Translation v2 REST API.
#[derive(Clone)]
pub struct GoogleTranslator {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl GoogleTranslator {
    /// Default Cloud Translation v2 endpoint.
    pub const DEFAULT_ENDPOINT: &'static str =
        "https://translation.googleapis.com/language/translate/v2";

    /// Builds a new translation client.
    pub fn new(api_key: String, endpoint: String, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Google Translate API key");
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Google Translate HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
        })
    }
}

impl Translator for GoogleTranslator {
    fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        if source == target {
            return Ok(text.to_string());
        }
        let request = TranslateRequest {
            q: text,
            source,
            target,
            format: "text",
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .context("Google Translate request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            anyhow::bail!("Google Translate request failed ({}): {}", status, body);
        }
        let parsed: TranslateResponse = resp
            .json()
            .context("failed to parse Google Translate response")?;
        parsed.into_text()
    }
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateData {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Translation {
    translated_text: String,
}

impl TranslateResponse {
    fn into_text(self) -> Result<String> {
        self.data
            .translations
            .into_iter()
            .next()
            .map(|t| t.translated_text)
            .ok_or_else(|| anyhow!("Google Translate returned no translations"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_keeps_text() {
        let out = Passthrough.translate("как жить", "ru", "en").expect("translate");
        assert_eq!(out, "как жить");
    }

    #[test]
    fn parses_first_translation() {
        let raw = r#"{"data":{"translations":[{"translatedText":"how to live","detectedSourceLanguage":"ru"}]}}"#;
        let parsed: TranslateResponse = serde_json::from_str(raw).expect("parse");
        assert_eq!(parsed.into_text().expect("text"), "how to live");
    }

    #[test]
    fn empty_translation_list_is_an_error() {
        let parsed: TranslateResponse =
            serde_json::from_str(r#"{"data":{"translations":[]}}"#).expect("parse");
        assert!(parsed.into_text().is_err());
    }
}
