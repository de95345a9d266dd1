//! Records read from the vector index and the ranked results built from them.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One hit returned by a similarity query, in the order the index returned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMatch {
    /// Record identifier inside its namespace.
    pub id: String,
    /// Similarity against the query vector.
    pub score: f64,
    /// Attached metadata, absent when the query did not request it.
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl IndexMatch {
    /// Hit without metadata, as returned from the meaning namespace.
    pub fn bare(id: impl Into<String>, score: f64) -> Self {
        Self {
            id: id.into(),
            score,
            metadata: None,
        }
    }
}

/// Metadata every text segment must carry to be rankable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SegmentMetadata {
    /// Transcribed text of the segment.
    pub text: String,
    /// Source video URL.
    pub url: String,
    /// Offset of the segment inside the video.
    #[serde(rename = "start", deserialize_with = "seconds")]
    pub start_secs: f64,
    /// Raw video title as stored at indexing time, if any.
    #[serde(default)]
    pub title: Option<String>,
    /// Publication timestamp, kept as the index renders it.
    #[serde(deserialize_with = "stringified")]
    pub published: String,
    /// Identifier of the meaning segment this text segment belongs to.
    pub meaning_id: String,
}

impl SegmentMetadata {
    /// Parses the metadata map of a text hit. The error names what is wrong.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, String> {
        serde_json::from_value(Value::Object(map.clone())).map_err(|err| err.to_string())
    }

    /// Source URL with the segment's offset appended as whole seconds.
    pub fn url_with_offset(&self) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        let secs = self.start_secs.max(0.0).trunc() as u64;
        format!("{}{}t={}", self.url, separator, secs)
    }
}

fn seconds<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(num) => num
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("start offset out of range")),
        Value::String(raw) => raw
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("start offset {raw:?} is not numeric"))),
        other => Err(serde::de::Error::custom(format!(
            "start offset has unexpected type: {other}"
        ))),
    }
}

fn stringified<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(raw) => Ok(raw),
        Value::Number(num) => Ok(num.to_string()),
        Value::Null => Err(serde::de::Error::custom("published is null")),
        other => Ok(other.to_string()),
    }
}

/// Deduplication key of a text segment: everything before the first `-`.
pub fn video_id_of(segment_id: &str) -> &str {
    segment_id
        .split_once('-')
        .map_or(segment_id, |(video, _)| video)
}

/// Video identifier encoded in a meaning id shaped like `<video>-t<chapter>`.
pub fn video_id_of_meaning(meaning_id: &str) -> Option<&str> {
    meaning_id.find("-t").map(|pos| &meaning_id[..pos])
}

/// A fused, deduplicated search hit. Built once per query and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    /// Source video identifier; unique within one result list.
    pub video_id: String,
    /// Joint relevance combining text and meaning similarity.
    pub relevance: f64,
    /// Similarity of the text segment.
    pub text_relevance: f64,
    /// Similarity of the referenced meaning segment.
    pub meaning_relevance: f64,
    /// Transcribed text of the winning segment.
    pub text: String,
    /// Video URL pointing at the segment's offset.
    pub url: String,
    /// Offset of the segment inside the video.
    pub start_secs: f64,
    /// Display title.
    pub title: String,
    /// Publication timestamp.
    pub published: String,
}
