//! kgprobe runtime — the knowledge store verbs and the probe run that
//! drives them.
//!
//! `KnowledgeStore` is the collaborator contract (prune, add, cognify,
//! search). `GraphMemory` implements it over SQLite and a local model
//! backend. `ProbeRun` executes the reset → ingest → cognify → search
//! sequence and reports each step.

pub mod knowledge;
pub mod memory;
pub mod orchestrator;
pub mod types;

pub use knowledge::{KnowledgeStore, SearchKind, SearchResult};
pub use memory::{CognifyReport, GraphMemory};
pub use orchestrator::{preview, ProbeRun, DEFAULT_DOCUMENT, DEFAULT_QUERY, PREVIEW_WIDTH};
pub use types::*;
