//! Read contract of the vector index that stores the two segment namespaces.

pub mod pinecone;

use async_trait::async_trait;
use serde_json::Value;

use crate::segments::IndexMatch;

/// Logical partition of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Fine-grained transcript segments, stored with metadata.
    Text,
    /// Coarser semantic units referenced by text segments.
    Meaning,
}

impl Namespace {
    /// Name of the namespace inside the index.
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Text => "text",
            Namespace::Meaning => "meaning",
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nearest-neighbour request against one namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityQuery<'a> {
    /// Query embedding.
    pub vector: &'a [f32],
    /// Namespace to search.
    pub namespace: Namespace,
    /// Number of neighbours requested.
    pub top_k: usize,
    /// Whether matches should carry their metadata.
    pub include_metadata: bool,
    /// Optional metadata filter in the index's filter language.
    pub filter: Option<Value>,
}

impl<'a> SimilarityQuery<'a> {
    /// Builds an unfiltered query.
    pub fn new(vector: &'a [f32], namespace: Namespace, top_k: usize) -> Self {
        Self {
            vector,
            namespace,
            top_k,
            include_metadata: false,
            filter: None,
        }
    }

    /// Requests metadata on every match.
    pub fn with_metadata(mut self) -> Self {
        self.include_metadata = true;
        self
    }

    /// Restricts matches to records whose `field` equals `value`.
    pub fn with_eq_filter(mut self, field: &str, value: &str) -> Self {
        let mut filter = serde_json::Map::new();
        filter.insert(field.to_string(), serde_json::json!({ "$eq": value }));
        self.filter = Some(Value::Object(filter));
        self
    }
}

/// Vector index consumed by the fusion engine.
///
/// Implementations return matches ordered by descending similarity. The engine never
/// writes to the index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Runs a similarity query.
    async fn query(&self, request: SimilarityQuery<'_>) -> anyhow::Result<Vec<IndexMatch>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_sets_filter_and_metadata() {
        let vector = [0.1f32, 0.2];
        let query = SimilarityQuery::new(&vector, Namespace::Meaning, 160)
            .with_eq_filter("playlist_id", "PL1")
            .with_metadata();
        assert!(query.include_metadata);
        assert_eq!(query.filter, Some(json!({"playlist_id": {"$eq": "PL1"}})));
        assert_eq!(query.namespace.to_string(), "meaning");
    }
}
