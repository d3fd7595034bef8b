//! Configuration and data directory management.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_LLM_ENDPOINT: &str = "http://localhost:11434";
pub const DEFAULT_LLM_MODEL: &str = "llama3.1:8b";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// On-disk layout of a kgprobe installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root directory (e.g., `.kgprobe/`).
    pub root: PathBuf,
    /// Raw ingested text files (`.kgprobe/data/`).
    pub data: PathBuf,
    /// Database and derived indexes (`.kgprobe/system/`).
    pub system: PathBuf,
}

impl DataPaths {
    /// Create data paths under a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            data: root.join("data"),
            system: root.join("system"),
            root,
        };
        paths.ensure_dirs()?;
        Ok(paths)
    }

    /// Create all required directories.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data)?;
        std::fs::create_dir_all(&self.system)?;
        Ok(())
    }
}

/// Connection settings for the local Ollama backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Base URL, without a trailing slash.
    pub endpoint: String,
    /// Chat model used for graph extraction and answers.
    pub model: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub timeout_secs: u64,
    /// When false the store runs keyword + graph search only.
    pub embeddings_enabled: bool,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_LLM_ENDPOINT.into(),
            model: DEFAULT_LLM_MODEL.into(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.into(),
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            embeddings_enabled: true,
        }
    }
}

impl LlmSettings {
    /// Build settings from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            endpoint: lookup("LLM_ENDPOINT")
                .map(|s| s.trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.endpoint),
            model: lookup("LLM_MODEL")
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.model),
            embedding_model: lookup("EMBEDDING_MODEL")
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.embedding_model),
            embedding_dimensions: parse_or("EMBEDDING_DIMENSIONS", &lookup, defaults.embedding_dimensions),
            timeout_secs: parse_or("LLM_TIMEOUT_SECS", &lookup, defaults.timeout_secs),
            embeddings_enabled: lookup("EMBEDDINGS_ENABLED")
                .map(|v| !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off"))
                .unwrap_or(defaults.embeddings_enabled),
        }
    }
}

fn parse_or<T: FromStr + Copy>(
    key: &str,
    lookup: &impl Fn(&str) -> Option<String>,
    default: T,
) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring unparseable {}={:?}", key, raw);
            default
        }),
        None => default,
    }
}

/// Top-level kgprobe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub data_paths: DataPaths,
    pub llm: LlmSettings,
}

impl ProbeConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self {
            data_paths: DataPaths::new(data_dir)?,
            llm: LlmSettings::from_lookup(|key| std::env::var(key).ok()),
        })
    }
}
