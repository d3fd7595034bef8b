//! Full probe runs against `GraphMemory` with a scripted model and no network.

use kgprobe_core::{DataPaths, Error, Result};
use kgprobe_infer::{LanguageModel, NoopEmbedder, Prompt};
use kgprobe_runtime::{GraphMemory, ProbeRun, QueryOutcome, RunState, SearchKind};

const GRAPH_JSON: &str = r#"```json
{
  "nodes": [
    {"id": "Artificial Intelligence", "type": "Field",
     "description": "AI is transforming how we work and live"},
    {"id": "Natural Language Processing", "type": "Field"},
    {"id": "Human Language", "type": "Concept"}
  ],
  "edges": [
    {"source": "Natural Language Processing", "target": "Artificial Intelligence", "relationship": "branch of"},
    {"source": "Natural Language Processing", "target": "Human Language", "relationship": "understands"}
  ]
}
```"#;

/// Answers extraction prompts with `GRAPH_JSON`. Question prompts get
/// `answer`, or an error when it is `None`.
struct ScriptedModel {
    answer: Option<&'static str>,
}

impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: Prompt<'_>) -> Result<String> {
        if prompt.json {
            return Ok(GRAPH_JSON.to_string());
        }
        self.answer
            .map(str::to_string)
            .ok_or_else(|| Error::Http("model unloaded".into()))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

fn open(dir: &tempfile::TempDir, answer: Option<&'static str>) -> GraphMemory<ScriptedModel, NoopEmbedder> {
    let paths = DataPaths::new(dir.path()).unwrap();
    GraphMemory::open(paths, ScriptedModel { answer }, NoopEmbedder::new(768)).unwrap()
}

#[tokio::test]
async fn probe_reports_answer() {
    let dir = tempfile::tempdir().unwrap();
    let memory = open(&dir, Some("AI covers machine learning and language processing."));

    let mut probe = ProbeRun::default();
    let mut out = Vec::new();
    let outcome = probe.execute(&memory, &mut out).await.unwrap();
    let out = String::from_utf8(out).unwrap();

    assert_eq!(
        outcome,
        QueryOutcome::Results {
            count: 1,
            preview: "AI covers machine learning and language processing.".into(),
        }
    );
    assert_eq!(probe.state(), RunState::Queried);
    assert!(out.contains("✓ Cognify complete - knowledge graph created!"));
    assert!(out.contains("✓ Search returned 1 result"));

    let stats = memory.store().get_stats().unwrap();
    assert_eq!(stats.total_documents, 1);
    assert_eq!(stats.pending_documents, 0);
    assert_eq!(stats.graph_nodes, 3);
    assert_eq!(stats.graph_edges, 2);
    assert_eq!(stats.embeddings_stored, 0);
}

#[tokio::test]
async fn probe_absorbs_answer_failure() {
    let dir = tempfile::tempdir().unwrap();
    let memory = open(&dir, None);

    let mut probe = ProbeRun::default();
    let mut out = Vec::new();
    let outcome = probe.execute(&memory, &mut out).await.unwrap();
    let out = String::from_utf8(out).unwrap();

    assert!(matches!(outcome, QueryOutcome::Failed { ref message } if message.contains("model unloaded")));
    assert!(out.contains("⚠ Search encountered an issue: HTTP error: model unloaded"));
    assert!(out.trim_end().ends_with(&"=".repeat(60)));

    // The graph is still there for other search kinds
    let insights = memory.search_with(SearchKind::Insights, "AI").await.unwrap();
    assert_eq!(insights.len(), 1);
    assert_eq!(
        insights[0].to_string(),
        "Natural Language Processing --branch_of--> Artificial Intelligence"
    );
}

#[tokio::test]
async fn second_probe_starts_from_clean_store() {
    let dir = tempfile::tempdir().unwrap();
    let memory = open(&dir, Some("ok"));

    ProbeRun::default().execute(&memory, &mut Vec::<u8>::new()).await.unwrap();
    let mut again = ProbeRun::new("Rust is a systems programming language.", "Rust");
    again.execute(&memory, &mut Vec::<u8>::new()).await.unwrap();

    let stats = memory.store().get_stats().unwrap();
    assert_eq!(stats.total_documents, 1);
    assert_eq!(stats.pipeline_runs, 1);
    assert_eq!(std::fs::read_dir(&memory.paths().data).unwrap().count(), 1);
}
