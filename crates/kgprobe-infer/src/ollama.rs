//! Ollama HTTP client: `/api/chat`, `/api/embed` and `/api/tags`.

use std::time::Duration;

use ndarray::Array1;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use kgprobe_core::{Error, LlmSettings, Result};

use crate::embedder::EmbedderBackend;
use crate::llm::{LanguageModel, Prompt};

/// Client for a local Ollama server. Cheap to clone.
#[derive(Clone)]
pub struct OllamaClient {
    http: Client,
    endpoint: String,
    model: String,
    embedding_model: String,
    embedding_dim: usize,
}

impl std::fmt::Debug for OllamaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

impl OllamaClient {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            embedding_model: settings.embedding_model.clone(),
            embedding_dim: settings.embedding_dimensions,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Names of the models the server has pulled.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.endpoint);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(format!("Request to {} failed: {}", url, e)))?;
        let body = Self::read_body(response).await?;
        let tags: TagsResponse = serde_json::from_str(&body)?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn post(&self, path: &str, body: &Value) -> Result<String> {
        let url = format!("{}{}", self.endpoint, path);
        debug!("POST {}", url);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Http(format!("Request to {} failed: {}", url, e)))?;
        Self::read_body(response).await
    }

    async fn read_body(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("Failed to read response: {}", e)))?;
        if !status.is_success() {
            return Err(Error::Http(format!("Ollama error {}: {}", status, body.trim())));
        }
        Ok(body)
    }
}

impl LanguageModel for OllamaClient {
    async fn complete(&self, prompt: Prompt<'_>) -> Result<String> {
        let body = chat_request_body(&self.model, prompt);
        let raw = self.post("/api/chat", &body).await?;
        parse_chat_response(&raw)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

impl EmbedderBackend for OllamaClient {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Array1<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = embed_request_body(&self.embedding_model, texts);
        let raw = self.post("/api/embed", &body).await?;
        parse_embed_response(&raw, texts.len(), self.embedding_dim)
    }

    fn dimension(&self) -> usize {
        self.embedding_dim
    }

    fn is_available(&self) -> bool {
        true
    }
}

fn chat_request_body(model: &str, prompt: Prompt<'_>) -> Value {
    let mut body = json!({
        "model": model,
        "messages": [
            {"role": "system", "content": prompt.system},
            {"role": "user", "content": prompt.user},
        ],
        "stream": false,
        "options": {"temperature": 0},
    });
    if prompt.json {
        body["format"] = json!("json");
    }
    body
}

fn parse_chat_response(raw: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(raw)
        .map_err(|e| Error::Inference(format!("Unexpected chat response: {}", e)))?;
    Ok(response.message.content)
}

fn embed_request_body(model: &str, texts: &[&str]) -> Value {
    json!({"model": model, "input": texts})
}

fn parse_embed_response(raw: &str, expected: usize, dim: usize) -> Result<Vec<Array1<f32>>> {
    let response: EmbedResponse = serde_json::from_str(raw)
        .map_err(|e| Error::Inference(format!("Unexpected embed response: {}", e)))?;
    if response.embeddings.len() != expected {
        return Err(Error::Inference(format!(
            "Expected {} embeddings, got {}",
            expected,
            response.embeddings.len()
        )));
    }
    response
        .embeddings
        .into_iter()
        .map(|v| {
            if v.len() != dim {
                return Err(Error::Inference(format!(
                    "Embedding dimension {} does not match configured {}",
                    v.len(),
                    dim
                )));
            }
            Ok(Array1::from(v))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_body() {
        let body = chat_request_body("llama3.1:8b", Prompt::json("sys", "hi"));
        assert_eq!(body["model"], "llama3.1:8b");
        assert_eq!(body["stream"], false);
        assert_eq!(body["format"], "json");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");

        let plain = chat_request_body("m", Prompt::text("sys", "hi"));
        assert!(plain.get("format").is_none());
    }

    #[test]
    fn test_parse_chat() {
        let raw = r#"{"model":"m","message":{"role":"assistant","content":"{\"nodes\":[]}"},"done":true}"#;
        assert_eq!(parse_chat_response(raw).unwrap(), "{\"nodes\":[]}");
        assert!(matches!(parse_chat_response("{}"), Err(Error::Inference(_))));
    }

    #[test]
    fn test_embed_body() {
        let body = embed_request_body("nomic-embed-text", &["a", "b"]);
        assert_eq!(body["input"][1], "b");
    }

    #[test]
    fn test_parse_embed() {
        let raw = r#"{"model":"m","embeddings":[[0.1,0.2,0.3],[0.4,0.5,0.6]]}"#;
        let vectors = parse_embed_response(raw, 2, 3).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1][2], 0.6);

        assert!(matches!(parse_embed_response(raw, 3, 3), Err(Error::Inference(_))));
        assert!(matches!(parse_embed_response(raw, 2, 768), Err(Error::Inference(_))));
    }

    #[test]
    fn test_endpoint_trailing_slash() {
        let settings = LlmSettings {
            endpoint: "http://localhost:11434/".into(),
            ..Default::default()
        };
        let client = OllamaClient::new(&settings).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:11434");
    }
}
