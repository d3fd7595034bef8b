//! Probe run types.

use serde::Serialize;

/// One step of a probe run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Prune raw data, then the system stores and metadata.
    Reset,
    /// Add the input document.
    Ingest,
    /// Cognify: build chunks, embeddings and the knowledge graph.
    Transform,
    /// Search the knowledge store.
    Query,
}

impl Phase {
    /// Progress line printed when the phase starts.
    pub fn heading(&self) -> &'static str {
        match self {
            Self::Reset => "1. Resetting system...",
            Self::Ingest => "2. Adding text data...",
            Self::Transform => "3. Running cognify (this may take a moment with Ollama)...",
            Self::Query => "4. Testing search functionality...",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reset => write!(f, "reset"),
            Self::Ingest => write!(f, "ingest"),
            Self::Transform => write!(f, "transform"),
            Self::Query => write!(f, "query"),
        }
    }
}

/// Progress of a probe run.
///
/// `Failed` is only reachable from the first three phases; a failing query
/// still ends in `Queried`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "phase")]
pub enum RunState {
    Pending,
    Reset,
    Ingested,
    Transformed,
    Queried,
    Failed(Phase),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Queried | Self::Failed(_))
    }
}

/// What the query phase observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum QueryOutcome {
    Results { count: usize, preview: String },
    Empty,
    /// The search call failed; the error was reported and absorbed.
    Failed { message: String },
}
