//! kgprobe infer — language model and embedding backends.
//!
//! `LanguageModel` and `EmbedderBackend` are the seams the knowledge store
//! talks through. `OllamaClient` implements both against a local Ollama
//! server; `NoopEmbedder` disables vector search.

pub mod embedder;
pub mod llm;
pub mod ollama;

pub use embedder::{Embedder, EmbedderBackend, NoopEmbedder};
pub use llm::{LanguageModel, Prompt};
pub use ollama::OllamaClient;

use kgprobe_core::{LlmSettings, Result};

/// Create the chat client and the best embedder the settings allow.
pub fn create_backends(settings: &LlmSettings) -> Result<(OllamaClient, Embedder)> {
    let client = OllamaClient::new(settings)?;
    let embedder = if settings.embeddings_enabled {
        tracing::info!(
            "Using Ollama embeddings (model={}, dim={})",
            settings.embedding_model,
            settings.embedding_dimensions
        );
        Embedder::Ollama(client.clone())
    } else {
        tracing::info!("Embeddings disabled. Using keyword and graph search only.");
        Embedder::Noop(NoopEmbedder::new(settings.embedding_dimensions))
    };
    Ok((client, embedder))
}
