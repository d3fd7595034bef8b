//! Embedding backend trait and implementations.

use ndarray::Array1;

use kgprobe_core::{Error, Result};

use crate::ollama::OllamaClient;

#[allow(async_fn_in_trait)]
pub trait EmbedderBackend: Send + Sync {
    /// One vector per input text, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Array1<f32>>>;

    async fn embed(&self, text: &str) -> Result<Array1<f32>> {
        self.embed_batch(&[text])
            .await?
            .pop()
            .ok_or_else(|| Error::Inference("embedder returned no vector".into()))
    }

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;

    /// Whether vectors can be produced at all.
    fn is_available(&self) -> bool;
}

/// Placeholder embedder: unavailable, search falls back to keywords and graph.
pub struct NoopEmbedder {
    dim: usize,
}

impl NoopEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl EmbedderBackend for NoopEmbedder {
    async fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Array1<f32>>> {
        Err(Error::Inference("embeddings are disabled".into()))
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Embedder selected at startup.
pub enum Embedder {
    Ollama(OllamaClient),
    Noop(NoopEmbedder),
}

impl EmbedderBackend for Embedder {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Array1<f32>>> {
        match self {
            Self::Ollama(client) => client.embed_batch(texts).await,
            Self::Noop(noop) => noop.embed_batch(texts).await,
        }
    }

    fn dimension(&self) -> usize {
        match self {
            Self::Ollama(client) => client.dimension(),
            Self::Noop(noop) => noop.dimension(),
        }
    }

    fn is_available(&self) -> bool {
        match self {
            Self::Ollama(client) => client.is_available(),
            Self::Noop(noop) => noop.is_available(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_is_unavailable() {
        let embedder = Embedder::Noop(NoopEmbedder::new(768));
        assert!(!embedder.is_available());
        assert_eq!(embedder.dimension(), 768);
        assert!(matches!(embedder.embed("hello").await, Err(Error::Inference(_))));
    }
}
