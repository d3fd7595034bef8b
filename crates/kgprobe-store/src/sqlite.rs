//! SQLite-backed knowledge store: raw-data registry, FTS5 chunk index,
//! quantized chunk embeddings and graph tables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ndarray::Array1;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::embedding::{cosine_similarity, QuantizedEmbedding};
use crate::graph::GraphView;
use crate::schema::{FTS_SCHEMA_SQL, FTS_TRIGGERS_SQL, GRAPH_SCHEMA_SQL, SCHEMA_SQL};
use crate::types::*;
use kgprobe_core::{Error, Result};

const DB_FILE: &str = "kgprobe.db";

fn db_err(e: rusqlite::Error) -> Error {
    Error::Database(e.to_string())
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// SQLite store shared by ingestion, cognify and search.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open or create the store at `db_dir/kgprobe.db`.
    pub fn open(db_dir: impl AsRef<Path>) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        let db_path = db_dir.join(DB_FILE);

        let conn = Connection::open(&db_path).map_err(db_err)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(db_err)?;
        let full_schema = format!(
            "{}\n{}\n{}\n{}",
            SCHEMA_SQL, GRAPH_SCHEMA_SQL, FTS_SCHEMA_SQL, FTS_TRIGGERS_SQL
        );
        conn.execute_batch(&full_schema)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };
        info!(
            "SqliteStore opened: {} documents, {} chunks, path={}",
            store.count("documents")?,
            store.count("chunks")?,
            store.db_path.display()
        );
        Ok(store)
    }

    fn count(&self, table: &str) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .map_err(db_err)
    }

    // ---------------------------------------------------------------
    // Documents
    // ---------------------------------------------------------------

    /// Register a document. Fails with `Storage` on a duplicate content hash.
    pub fn add_document(&self, doc: &NewDocument) -> Result<i64> {
        let meta_json = doc
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let conn = self.conn.lock();
        let id = conn
            .prepare_cached(
                "INSERT INTO documents (name, raw_path, content_hash, metadata_json, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .map_err(db_err)?
            .insert(params![doc.name, doc.raw_path, doc.content_hash, meta_json, now_millis()])
            .map_err(|e| {
                if e.to_string().contains("UNIQUE constraint") {
                    Error::Storage(format!("duplicate content hash {}", doc.content_hash))
                } else {
                    db_err(e)
                }
            })?;
        Ok(id)
    }

    pub fn find_document_by_hash(&self, content_hash: &str) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        let doc = conn
            .prepare_cached("SELECT * FROM documents WHERE content_hash = ?1")
            .map_err(db_err)?
            .query_row(params![content_hash], |row| Self::row_to_document(row))
            .optional()
            .map_err(db_err)?;
        Ok(doc)
    }

    pub fn get_document(&self, doc_id: i64) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        let doc = conn
            .prepare_cached("SELECT * FROM documents WHERE id = ?1")
            .map_err(db_err)?
            .query_row(params![doc_id], |row| Self::row_to_document(row))
            .optional()
            .map_err(db_err)?;
        Ok(doc)
    }

    /// Documents not yet processed by cognify, oldest first.
    pub fn pending_documents(&self) -> Result<Vec<Document>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM documents WHERE cognified_at IS NULL ORDER BY id ASC")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| Self::row_to_document(row))
            .map_err(db_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(db_err)
    }

    pub fn mark_document_cognified(&self, doc_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE documents SET cognified_at = ?1 WHERE id = ?2",
                params![now_millis(), doc_id],
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    pub fn count_documents(&self) -> Result<i64> {
        self.count("documents")
    }

    // ---------------------------------------------------------------
    // Chunks and embeddings
    // ---------------------------------------------------------------

    pub fn add_chunk(
        &self,
        doc_id: i64,
        text: &str,
        chunk_index: i32,
        char_start: i32,
        char_end: i32,
    ) -> Result<i64> {
        let conn = self.conn.lock();
        let id = conn
            .prepare_cached(
                "INSERT INTO chunks (doc_id, text, chunk_index, char_start, char_end, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .map_err(db_err)?
            .insert(params![doc_id, text, chunk_index, char_start, char_end, now_millis()])
            .map_err(db_err)?;
        Ok(id)
    }

    pub fn get_chunks_for_document(&self, doc_id: i64) -> Result<Vec<Chunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM chunks WHERE doc_id = ?1 ORDER BY chunk_index")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![doc_id], |row| Self::row_to_chunk(row))
            .map_err(db_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(db_err)
    }

    pub fn get_chunk(&self, chunk_id: i64) -> Result<Option<Chunk>> {
        let conn = self.conn.lock();
        let chunk = conn
            .prepare_cached("SELECT * FROM chunks WHERE id = ?1")
            .map_err(db_err)?
            .query_row(params![chunk_id], |row| Self::row_to_chunk(row))
            .optional()
            .map_err(db_err)?;
        Ok(chunk)
    }

    /// Remove a document's chunks (and, by cascade, their embeddings).
    pub fn delete_chunks_for_document(&self, doc_id: i64) -> Result<usize> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM chunks WHERE doc_id = ?1", params![doc_id])
            .map_err(db_err)
    }

    pub fn count_chunks(&self) -> Result<i64> {
        self.count("chunks")
    }

    /// Store a quantized embedding for a chunk, replacing any previous one.
    pub fn add_chunk_embedding(&self, chunk_id: i64, embedding: &Array1<f32>) -> Result<()> {
        let q = QuantizedEmbedding::encode(embedding);
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO chunk_embeddings (chunk_id, embedding, scale, offset_val) \
             VALUES (?1, ?2, ?3, ?4)",
            params![chunk_id, q.bytes, q.scale, q.offset],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn count_embeddings(&self) -> Result<i64> {
        self.count("chunk_embeddings")
    }

    // ---------------------------------------------------------------
    // Search
    // ---------------------------------------------------------------

    /// Full-text search using FTS5 BM25 ranking.
    pub fn bm25_search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let fts_query = Self::sanitize_fts_query(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT c.id, c.doc_id, c.text, c.chunk_index, chunks_fts.rank AS bm25_score \
                 FROM chunks_fts \
                 JOIN chunks c ON c.id = chunks_fts.rowid \
                 WHERE chunks_fts MATCH ?1 \
                 ORDER BY chunks_fts.rank \
                 LIMIT ?2",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![fts_query, top_k as i64], |row| {
                let bm25: f64 = row.get(4)?;
                Ok(SearchHit {
                    chunk_id: row.get(0)?,
                    doc_id: row.get(1)?,
                    text: row.get(2)?,
                    chunk_index: row.get(3)?,
                    // FTS5 rank is negative; negate for positive
                    score: -bm25,
                })
            })
            .map_err(db_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(db_err)
    }

    /// Quote each token and OR them so user text is never parsed as FTS syntax.
    fn sanitize_fts_query(query: &str) -> String {
        query
            .split_whitespace()
            .map(|t| t.replace('"', ""))
            .filter(|t| !t.is_empty())
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    /// Cosine similarity search over all stored chunk embeddings.
    pub fn vector_search(&self, query_embedding: &Array1<f32>, top_k: usize) -> Result<Vec<SearchHit>> {
        let mut scored: Vec<(f32, SearchHit)> = {
            let conn = self.conn.lock();
            let mut stmt = conn
                .prepare_cached(
                    "SELECT c.id, c.doc_id, c.text, c.chunk_index, \
                            ce.embedding, ce.scale, ce.offset_val \
                     FROM chunk_embeddings ce JOIN chunks c ON c.id = ce.chunk_id",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map([], |row| {
                    let q = QuantizedEmbedding {
                        bytes: row.get(4)?,
                        scale: row.get::<_, f64>(5)? as f32,
                        offset: row.get::<_, f64>(6)? as f32,
                    };
                    let hit = SearchHit {
                        chunk_id: row.get(0)?,
                        doc_id: row.get(1)?,
                        text: row.get(2)?,
                        chunk_index: row.get(3)?,
                        score: 0.0,
                    };
                    Ok((q, hit))
                })
                .map_err(db_err)?;

            let mut scored = Vec::new();
            for row in rows {
                let (q, mut hit) = row.map_err(db_err)?;
                let sim = cosine_similarity(&q.decode(), query_embedding);
                hit.score = sim as f64;
                scored.push((sim, hit));
            }
            scored
        };

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        debug!("Vector search scored {} chunks", scored.len());
        Ok(scored.into_iter().map(|(_, hit)| hit).collect())
    }

    /// Fuse ranked lists with Reciprocal Rank Fusion: `sum(1 / (k + rank))`.
    pub fn reciprocal_rank_fusion(lists: &[&[SearchHit]], k: usize) -> Vec<SearchHit> {
        let mut fused: HashMap<i64, SearchHit> = HashMap::new();
        for list in lists {
            for (rank, hit) in list.iter().enumerate() {
                let contribution = 1.0 / (k as f64 + rank as f64 + 1.0);
                fused
                    .entry(hit.chunk_id)
                    .and_modify(|h| h.score += contribution)
                    .or_insert_with(|| SearchHit {
                        score: contribution,
                        ..hit.clone()
                    });
            }
        }
        let mut hits: Vec<SearchHit> = fused.into_values().collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits
    }

    // ---------------------------------------------------------------
    // Graph
    // ---------------------------------------------------------------

    /// Insert a node, or fill in its description if it already exists.
    pub fn upsert_node(&self, node: &GraphNode) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO graph_nodes (id, label, node_type, description, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(id) DO UPDATE SET \
                 description = COALESCE(graph_nodes.description, excluded.description)",
        )
        .map_err(db_err)?
        .execute(params![node.id, node.label, node.node_type, node.description, now_millis()])
        .map_err(db_err)?;
        Ok(())
    }

    /// Insert an edge; a repeated `(source, target, relationship)` adds its weight.
    pub fn upsert_edge(&self, edge: &GraphEdge) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO graph_edges (source, target, relationship, weight, chunk_id) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(source, target, relationship) DO UPDATE SET \
                 weight = graph_edges.weight + excluded.weight",
        )
        .map_err(db_err)?
        .execute(params![edge.source, edge.target, edge.relationship, edge.weight, edge.chunk_id])
        .map_err(db_err)?;
        Ok(())
    }

    pub fn all_nodes(&self) -> Result<Vec<GraphNode>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT id, label, node_type, description FROM graph_nodes ORDER BY id")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(GraphNode {
                    id: row.get(0)?,
                    label: row.get(1)?,
                    node_type: row.get(2)?,
                    description: row.get(3)?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(db_err)
    }

    pub fn all_edges(&self) -> Result<Vec<GraphEdge>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT source, target, relationship, weight, chunk_id FROM graph_edges \
                 ORDER BY source, target, relationship",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(GraphEdge {
                    source: row.get(0)?,
                    target: row.get(1)?,
                    relationship: row.get(2)?,
                    weight: row.get(3)?,
                    chunk_id: row.get(4)?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(db_err)
    }

    /// Load the whole graph into a petgraph-backed view.
    pub fn graph_view(&self) -> Result<GraphView> {
        Ok(GraphView::from_parts(self.all_nodes()?, self.all_edges()?))
    }

    pub fn count_nodes(&self) -> Result<i64> {
        self.count("graph_nodes")
    }

    // ---------------------------------------------------------------
    // Pipeline runs
    // ---------------------------------------------------------------

    /// Record the start of a pipeline run. Returns the run id.
    pub fn start_pipeline_run(&self, pipeline: &str, documents: usize) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO pipeline_runs (id, pipeline, status, documents, started_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, pipeline, RunStatus::Started.as_str(), documents as i64, now_millis()],
        )
        .map_err(db_err)?;
        Ok(id)
    }

    pub fn finish_pipeline_run(&self, run_id: &str, status: RunStatus, detail: Option<&str>) -> Result<()> {
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE pipeline_runs SET status = ?1, finished_at = ?2, detail = ?3 WHERE id = ?4",
                params![status.as_str(), now_millis(), detail, run_id],
            )
            .map_err(db_err)?;
        if count == 0 {
            return Err(Error::NotFound(format!("pipeline run {}", run_id)));
        }
        Ok(())
    }

    pub fn get_pipeline_run(&self, run_id: &str) -> Result<Option<PipelineRun>> {
        let conn = self.conn.lock();
        let run = conn
            .prepare_cached("SELECT * FROM pipeline_runs WHERE id = ?1")
            .map_err(db_err)?
            .query_row(params![run_id], |row| Self::row_to_pipeline_run(row))
            .optional()
            .map_err(db_err)?;
        Ok(run)
    }

    pub fn latest_pipeline_run(&self, pipeline: &str) -> Result<Option<PipelineRun>> {
        let conn = self.conn.lock();
        let run = conn
            .prepare_cached(
                "SELECT * FROM pipeline_runs WHERE pipeline = ?1 \
                 ORDER BY started_at DESC, rowid DESC LIMIT 1",
            )
            .map_err(db_err)?
            .query_row(params![pipeline], |row| Self::row_to_pipeline_run(row))
            .optional()
            .map_err(db_err)?;
        Ok(run)
    }

    // ---------------------------------------------------------------
    // Reset
    // ---------------------------------------------------------------

    /// Drop every node and edge.
    pub fn clear_graph(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch("DELETE FROM graph_edges; DELETE FROM graph_nodes;")
            .map_err(db_err)?;
        info!("Knowledge graph cleared");
        Ok(())
    }

    /// Drop chunks and embeddings; documents go back to pending.
    pub fn clear_vectors(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "DELETE FROM chunk_embeddings;
             DELETE FROM chunks;
             UPDATE documents SET cognified_at = NULL;",
        )
        .map_err(db_err)?;
        info!("Chunk index and embeddings cleared");
        Ok(())
    }

    /// Drop the document registry and pipeline history.
    pub fn clear_metadata(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch("DELETE FROM documents; DELETE FROM pipeline_runs;")
            .map_err(db_err)?;
        info!("Document registry and pipeline history cleared");
        Ok(())
    }

    // ---------------------------------------------------------------
    // Stats
    // ---------------------------------------------------------------

    pub fn get_stats(&self) -> Result<StoreStats> {
        let pending: i64 = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT COUNT(*) FROM documents WHERE cognified_at IS NULL",
                [],
                |row| row.get(0),
            )
            .map_err(db_err)?
        };
        let db_size = std::fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0);

        Ok(StoreStats {
            total_documents: self.count("documents")?,
            pending_documents: pending,
            total_chunks: self.count("chunks")?,
            embeddings_stored: self.count("chunk_embeddings")?,
            graph_nodes: self.count("graph_nodes")?,
            graph_edges: self.count("graph_edges")?,
            pipeline_runs: self.count("pipeline_runs")?,
            db_path: self.db_path.to_string_lossy().to_string(),
            db_size_mb: db_size as f64 / (1024.0 * 1024.0),
        })
    }

    // ---------------------------------------------------------------
    // Row mapping
    // ---------------------------------------------------------------

    fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
        Ok(Document {
            id: row.get("id")?,
            name: row.get("name")?,
            raw_path: row.get("raw_path")?,
            content_hash: row.get("content_hash")?,
            metadata: row
                .get::<_, Option<String>>("metadata_json")?
                .and_then(|s| serde_json::from_str(&s).ok()),
            created_at: row.get("created_at")?,
            cognified_at: row.get("cognified_at")?,
        })
    }

    fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
        Ok(Chunk {
            id: row.get("id")?,
            doc_id: row.get("doc_id")?,
            text: row.get("text")?,
            chunk_index: row.get("chunk_index")?,
            char_start: row.get("char_start")?,
            char_end: row.get("char_end")?,
            created_at: row.get("created_at")?,
        })
    }

    fn row_to_pipeline_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<PipelineRun> {
        let status: String = row.get("status")?;
        Ok(PipelineRun {
            id: row.get("id")?,
            pipeline: row.get("pipeline")?,
            status: RunStatus::parse(&status).unwrap_or(RunStatus::Failed),
            documents: row.get("documents")?,
            started_at: row.get("started_at")?,
            finished_at: row.get("finished_at")?,
            detail: row.get("detail")?,
        })
    }
}
