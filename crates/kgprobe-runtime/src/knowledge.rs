//! The knowledge store contract used by the probe run.

use serde::Serialize;

use kgprobe_core::Result;
use kgprobe_store::Triplet;

/// Verbs of a knowledge store: reset, add raw text, derive the graph, query it.
#[allow(async_fn_in_trait)]
pub trait KnowledgeStore {
    /// Remove all raw ingested data.
    async fn prune_data(&self) -> Result<()>;

    /// Remove derived state (graph, chunk index, embeddings). With
    /// `clear_metadata`, also the document registry and pipeline history.
    async fn prune_system(&self, clear_metadata: bool) -> Result<()>;

    /// Register a text document for the next cognify.
    async fn add(&self, document: String) -> Result<()>;

    /// Build the knowledge graph from everything added so far. Slow.
    async fn cognify(&self) -> Result<()>;

    /// Query the store. An empty result is not an error.
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    /// Ranked text chunks (keyword, fused with vectors when available).
    Chunks,
    /// Graph facts around entities that match the query.
    Insights,
    /// A model-written answer grounded on insights and chunks.
    #[default]
    GraphCompletion,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SearchResult {
    Chunk {
        chunk_id: i64,
        doc_id: i64,
        text: String,
        score: f64,
    },
    Insight(Triplet),
    Answer { text: String },
}

impl std::fmt::Display for SearchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chunk { text, .. } => write!(f, "{}", text),
            Self::Insight(t) => write!(f, "{} --{}--> {}", t.source, t.relationship, t.target),
            Self::Answer { text } => write!(f, "{}", text),
        }
    }
}
