//! kgprobe ingest — raw data registration, chunking and graph extraction parsing.

pub mod chunking;
pub mod extract;
pub mod ingest;

pub use chunking::{ParagraphChunker, TextChunk};
pub use extract::{extraction_prompt, parse_extraction, ExtractedGraph, EXTRACTION_SYSTEM_PROMPT};
pub use ingest::{content_hash, Ingester};
