//! Embedding provider port and its adapters.

pub mod openai;

/// Query embedding plus the token count the provider billed for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// Model embedding vector.
    pub vector: Vec<f32>,
    /// Tokens consumed by the request.
    pub token_count: u64,
}

/// Turns text into a fixed-length vector.
///
/// Implementations may block; the search service calls them from a blocking task.
pub trait Embedder: Send + Sync {
    /// Embeds a single piece of text.
    fn embed(&self, text: &str) -> anyhow::Result<Embedding>;
}
