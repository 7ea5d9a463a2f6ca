// Embeddings module
// Chunking of document text and the backends that turn text into vectors

pub mod chunking;
pub mod hashing;
pub mod ollama;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Config, EmbeddingProvider};
use crate::{RagError, Result};

pub use chunking::{Chunk, ChunkingConfig, split_documents, split_text};
pub use hashing::HashingEmbedder;
pub use ollama::{OllamaClient, OllamaEmbedder};

/// Maps text into a fixed-dimension vector space.
///
/// Implementations must be deterministic for a fixed configuration, and
/// `embed_query` must target the same space as `embed`.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifies the vector space, e.g. the model name
    fn model_id(&self) -> &str;

    /// Length of every vector this embedder produces
    fn dimension(&self) -> usize;

    /// Verify the backing model is reachable
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    /// Embed a batch of document chunks, returning one vector per input in order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a search query
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// Build the embedder selected by the configuration
#[inline]
pub fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    match config.embedding.provider {
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbedder::new(
            config.embedding.dimension as usize,
        ))),
        EmbeddingProvider::Ollama => {
            let client = OllamaClient::new(&config.ollama)
                .map_err(|e| RagError::Config(format!("{:#}", e)))?;
            Ok(Arc::new(OllamaEmbedder::new(
                Arc::new(client),
                &config.embedding,
                config.ollama.timeout(),
            )))
        }
    }
}

/// Check a backend response against the request: one vector per input, all of the expected length
#[inline]
pub fn validate_embeddings(
    vectors: &[Vec<f32>],
    expected_count: usize,
    expected_dimension: usize,
) -> Result<()> {
    if vectors.len() != expected_count {
        return Err(RagError::EmbeddingFailure(format!(
            "Mismatch between request and response counts: {} vs {}",
            expected_count,
            vectors.len()
        )));
    }

    if let Some(bad) = vectors.iter().find(|v| v.len() != expected_dimension) {
        return Err(RagError::EmbeddingFailure(format!(
            "Embedding has {} dimensions, expected {}",
            bad.len(),
            expected_dimension
        )));
    }

    Ok(())
}
