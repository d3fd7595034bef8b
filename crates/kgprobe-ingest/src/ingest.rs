//! Raw data ingestion: text → raw file → document registry.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use kgprobe_core::{Error, Result};
use kgprobe_store::{NewDocument, SqliteStore};

/// Writes raw text under the data directory and registers it in the store.
pub struct Ingester<'a> {
    store: &'a SqliteStore,
    data_dir: PathBuf,
}

impl<'a> Ingester<'a> {
    pub fn new(store: &'a SqliteStore, data_dir: impl AsRef<Path>) -> Self {
        Self {
            store,
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    /// Register a text document. Returns its document ID.
    ///
    /// Adding identical text again returns the existing ID, restoring the raw
    /// file if it was removed.
    pub fn add_text(&self, text: &str) -> Result<i64> {
        if text.trim().is_empty() {
            return Err(Error::Ingest("cannot add empty text".into()));
        }

        let hash = content_hash(text);
        let name = format!("text_{}", hash);
        let raw_path = self.data_dir.join(format!("{}.txt", name));

        if let Some(existing) = self.store.find_document_by_hash(&hash)? {
            if !Path::new(&existing.raw_path).exists() {
                self.write_raw(Path::new(&existing.raw_path), text)?;
            }
            debug!("Text already registered as document {}", existing.id);
            return Ok(existing.id);
        }

        self.write_raw(&raw_path, text)?;
        let doc_id = self.store.add_document(&NewDocument {
            name,
            raw_path: raw_path.to_string_lossy().to_string(),
            content_hash: hash,
            metadata: Some(serde_json::json!({
                "source": "text",
                "size": text.len(),
            })),
        })?;

        info!("Added document {} ({} bytes)", doc_id, text.len());
        Ok(doc_id)
    }

    fn write_raw(&self, path: &Path, text: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        Ok(())
    }
}

/// Compute SHA-256 content hash.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
