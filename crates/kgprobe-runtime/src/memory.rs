//! `GraphMemory` — a knowledge store over SQLite and a local model backend.

use std::io::ErrorKind;

use tracing::{debug, info, warn};

use kgprobe_core::{DataPaths, Error, Result};
use kgprobe_infer::{EmbedderBackend, LanguageModel, Prompt};
use kgprobe_ingest::{
    extraction_prompt, parse_extraction, Ingester, ParagraphChunker, EXTRACTION_SYSTEM_PROMPT,
};
use kgprobe_store::{Document, RunStatus, SearchHit, SqliteStore, Triplet};

use crate::knowledge::{KnowledgeStore, SearchKind, SearchResult};

pub const COGNIFY_PIPELINE: &str = "cognify";
const CHUNK_LIMIT: usize = 10;
const CONTEXT_CHUNKS: usize = 5;
const INSIGHT_LIMIT: usize = 20;
const SEED_NODES: usize = 5;
const RRF_K: usize = 60;

const ANSWER_SYSTEM_PROMPT: &str = "You answer questions using only the provided context \
from a knowledge graph and source passages. Be concise. If the context does not contain \
the answer, say so.";

/// Totals for one cognify pass.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct CognifyReport {
    pub run_id: Option<String>,
    pub documents: usize,
    pub chunks: usize,
    pub embedded: usize,
    pub nodes: usize,
    pub edges: usize,
}

/// Knowledge store: raw files under `data/`, everything derived in SQLite under `system/`.
pub struct GraphMemory<L, E> {
    store: SqliteStore,
    paths: DataPaths,
    llm: L,
    embedder: E,
    chunker: ParagraphChunker,
}

impl<L: LanguageModel, E: EmbedderBackend> GraphMemory<L, E> {
    pub fn open(paths: DataPaths, llm: L, embedder: E) -> Result<Self> {
        paths.ensure_dirs()?;
        let store = SqliteStore::open(&paths.system)?;
        Ok(Self {
            store,
            paths,
            llm,
            embedder,
            chunker: ParagraphChunker::default(),
        })
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    /// Process every pending document and record the run.
    pub async fn run_cognify(&self) -> Result<CognifyReport> {
        let pending = self.store.pending_documents()?;
        if pending.is_empty() {
            info!("Cognify: no pending documents");
            return Ok(CognifyReport::default());
        }

        let run_id = self.store.start_pipeline_run(COGNIFY_PIPELINE, pending.len())?;
        info!(
            "Cognify run {} started: {} documents, model={}",
            run_id,
            pending.len(),
            self.llm.model_name()
        );

        let mut report = CognifyReport {
            run_id: Some(run_id.clone()),
            ..Default::default()
        };
        for doc in &pending {
            if let Err(e) = self.cognify_document(doc, &mut report).await {
                let detail = e.to_string();
                if let Err(mark_err) =
                    self.store.finish_pipeline_run(&run_id, RunStatus::Failed, Some(&detail))
                {
                    warn!("Could not record failed run {}: {}", run_id, mark_err);
                }
                return Err(e);
            }
            report.documents += 1;
        }

        self.store
            .finish_pipeline_run(&run_id, RunStatus::Completed, None)?;
        info!(
            "Cognify run {} complete: {} chunks, {} embedded, {} nodes, {} edges",
            run_id, report.chunks, report.embedded, report.nodes, report.edges
        );
        Ok(report)
    }

    async fn cognify_document(&self, doc: &Document, report: &mut CognifyReport) -> Result<()> {
        let text = std::fs::read_to_string(&doc.raw_path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::NotFound(format!(
                "raw data for document {} ({})",
                doc.id, doc.raw_path
            )),
            _ => Error::Io(e),
        })?;

        // Leftovers from an interrupted run
        let stale = self.store.delete_chunks_for_document(doc.id)?;
        if stale > 0 {
            debug!("Removed {} stale chunks for document {}", stale, doc.id);
        }

        let chunks = self.chunker.chunk(&text);
        let mut chunk_ids = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let id = self.store.add_chunk(
                doc.id,
                &chunk.text,
                chunk.chunk_index as i32,
                chunk.char_start as i32,
                chunk.char_end as i32,
            )?;
            chunk_ids.push(id);
        }
        report.chunks += chunks.len();

        if self.embedder.is_available() && !chunks.is_empty() {
            let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            for (id, vector) in chunk_ids.iter().zip(vectors.iter()) {
                self.store.add_chunk_embedding(*id, vector)?;
                report.embedded += 1;
            }
        }

        for (chunk, chunk_id) in chunks.iter().zip(chunk_ids.iter()) {
            let prompt = extraction_prompt(&chunk.text);
            let raw = self
                .llm
                .complete(Prompt::json(EXTRACTION_SYSTEM_PROMPT, &prompt))
                .await?;
            let graph = parse_extraction(&raw)?;
            if graph.is_empty() {
                warn!("No entities extracted from chunk {}", chunk_id);
                continue;
            }
            for node in &graph.nodes {
                self.store.upsert_node(node)?;
            }
            for mut edge in graph.edges {
                edge.chunk_id = Some(*chunk_id);
                self.store.upsert_edge(&edge)?;
                report.edges += 1;
            }
            report.nodes += graph.nodes.len();
            debug!("Chunk {}: graph extracted", chunk_id);
        }

        self.store.mark_document_cognified(doc.id)?;
        Ok(())
    }

    /// Search with an explicit strategy.
    pub async fn search_with(&self, kind: SearchKind, query: &str) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::Search("query is empty".into()));
        }
        if self.store.count_chunks()? == 0 && self.store.count_nodes()? == 0 {
            return Err(Error::Search(
                "knowledge graph is empty; run cognify first".into(),
            ));
        }

        match kind {
            SearchKind::Chunks => Ok(self
                .chunk_hits(query, CHUNK_LIMIT)
                .await?
                .into_iter()
                .map(chunk_result)
                .collect()),
            SearchKind::Insights => Ok(self
                .insights(query)?
                .into_iter()
                .map(SearchResult::Insight)
                .collect()),
            SearchKind::GraphCompletion => self.graph_completion(query).await,
        }
    }

    async fn chunk_hits(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let keyword = self.store.bm25_search(query, limit)?;
        if !self.embedder.is_available() || self.store.count_embeddings()? == 0 {
            return Ok(keyword);
        }

        let query_vector = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Query embedding failed, using keyword results only: {}", e);
                return Ok(keyword);
            }
        };
        let vector = self.store.vector_search(&query_vector, limit)?;
        let mut fused =
            SqliteStore::reciprocal_rank_fusion(&[keyword.as_slice(), vector.as_slice()], RRF_K);
        fused.truncate(limit);
        Ok(fused)
    }

    fn insights(&self, query: &str) -> Result<Vec<Triplet>> {
        let view = self.store.graph_view()?;
        let stats = view.stats();
        debug!("Graph view: {} nodes, {} edges", stats.node_count, stats.edge_count);
        let seeds: Vec<&str> = view
            .match_nodes(query)
            .into_iter()
            .take(SEED_NODES)
            .map(|n| n.id.as_str())
            .collect();
        let mut triplets = view.neighborhood(&seeds, 1);
        triplets.truncate(INSIGHT_LIMIT);
        Ok(triplets)
    }

    async fn graph_completion(&self, query: &str) -> Result<Vec<SearchResult>> {
        let triplets = self.insights(query)?;
        let hits = self.chunk_hits(query, CONTEXT_CHUNKS).await?;
        if triplets.is_empty() && hits.is_empty() {
            debug!("No context for query {:?}", query);
            return Ok(Vec::new());
        }

        let prompt = answer_prompt(query, &triplets, &hits);
        let answer = self
            .llm
            .complete(Prompt::text(ANSWER_SYSTEM_PROMPT, &prompt))
            .await?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![SearchResult::Answer {
            text: answer.to_string(),
        }])
    }

    fn clear_raw_data(&self) -> Result<usize> {
        let mut removed = 0;
        if self.paths.data.exists() {
            for entry in std::fs::read_dir(&self.paths.data)? {
                let path = entry?.path();
                if path.is_dir() {
                    std::fs::remove_dir_all(&path)?;
                } else {
                    std::fs::remove_file(&path)?;
                }
                removed += 1;
            }
        }
        std::fs::create_dir_all(&self.paths.data)?;
        Ok(removed)
    }
}

fn chunk_result(hit: SearchHit) -> SearchResult {
    SearchResult::Chunk {
        chunk_id: hit.chunk_id,
        doc_id: hit.doc_id,
        text: hit.text,
        score: hit.score,
    }
}

fn answer_prompt(query: &str, triplets: &[Triplet], hits: &[SearchHit]) -> String {
    let mut prompt = String::from("Context\n");
    if !triplets.is_empty() {
        prompt.push_str("\nKnowledge graph facts:\n");
        for t in triplets {
            prompt.push_str(&format!("- {} --{}--> {}\n", t.source, t.relationship, t.target));
        }
    }
    if !hits.is_empty() {
        prompt.push_str("\nSource passages:\n");
        for hit in hits {
            prompt.push_str(&format!("- {}\n", hit.text.trim()));
        }
    }
    prompt.push_str(&format!("\nQuestion: {}", query));
    prompt
}

impl<L: LanguageModel, E: EmbedderBackend> KnowledgeStore for GraphMemory<L, E> {
    async fn prune_data(&self) -> Result<()> {
        let removed = self.clear_raw_data()?;
        info!("Pruned {} raw data entries", removed);
        Ok(())
    }

    async fn prune_system(&self, clear_metadata: bool) -> Result<()> {
        self.store.clear_graph()?;
        self.store.clear_vectors()?;
        if clear_metadata {
            self.store.clear_metadata()?;
        }
        Ok(())
    }

    async fn add(&self, document: String) -> Result<()> {
        Ingester::new(&self.store, &self.paths.data).add_text(&document)?;
        Ok(())
    }

    async fn cognify(&self) -> Result<()> {
        self.run_cognify().await.map(|_| ())
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        self.search_with(SearchKind::default(), query).await
    }
}
