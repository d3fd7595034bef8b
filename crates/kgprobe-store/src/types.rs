//! Data types for documents, chunks, graph elements and search results.

use serde::{Deserialize, Serialize};

/// A registered raw-data document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub name: String,
    /// Path of the raw text file under the data directory.
    pub raw_path: String,
    pub content_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: i64,
    /// Set once the document's chunks and graph have been derived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cognified_at: Option<i64>,
}

/// Fields needed to register a new document.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub name: String,
    pub raw_path: String,
    pub content_hash: String,
    pub metadata: Option<serde_json::Value>,
}

/// A chunk row from the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: i64,
    pub doc_id: i64,
    pub text: String,
    pub chunk_index: i32,
    pub char_start: i32,
    pub char_end: i32,
    pub created_at: i64,
}

/// A scored chunk returned by keyword, vector or fused search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: i64,
    pub doc_id: i64,
    pub text: String,
    pub score: f64,
    pub chunk_index: i32,
}

/// An entity in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Normalized identifier (lowercase snake case).
    pub id: String,
    pub label: String,
    pub node_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A directed, labelled relationship between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub relationship: String,
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<i64>,
}

/// A resolved `(subject, relationship, object)` fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triplet {
    pub source_id: String,
    pub source: String,
    pub relationship: String,
    pub target_id: String,
    pub target: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Started,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "started" => Some(Self::Started),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Bookkeeping row for one pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: String,
    pub pipeline: String,
    pub status: RunStatus,
    pub documents: i64,
    pub started_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Store-level statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_documents: i64,
    pub pending_documents: i64,
    pub total_chunks: i64,
    pub embeddings_stored: i64,
    pub graph_nodes: i64,
    pub graph_edges: i64,
    pub pipeline_runs: i64,
    pub db_path: String,
    pub db_size_mb: f64,
}
