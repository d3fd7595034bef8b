//! The probe run: reset, ingest, cognify, then search, reported on a writer.
//!
//! Phases 1–3 are fail-fast and return the store's error unchanged. The
//! search phase absorbs any error into a warning so the run still finishes.

use std::io::Write;

use tracing::{info, warn};

use kgprobe_core::{Error, Result};

use crate::knowledge::KnowledgeStore;
use crate::types::{Phase, QueryOutcome, RunState};

pub const DEFAULT_DOCUMENT: &str = "
    Artificial Intelligence is transforming how we work and live.
    Machine learning enables computers to learn from data.
    Natural language processing helps computers understand human language.
    ";

pub const DEFAULT_QUERY: &str = "AI";

/// Characters of the first result shown before truncation.
pub const PREVIEW_WIDTH: usize = 200;

const BANNER_WIDTH: usize = 60;

/// First `width` characters of `text`, with `...` appended when anything was cut.
pub fn preview(text: &str, width: usize) -> String {
    match text.char_indices().nth(width) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// A single run over one document and one query.
#[derive(Debug)]
pub struct ProbeRun {
    document: Option<String>,
    query: String,
    state: RunState,
}

impl Default for ProbeRun {
    fn default() -> Self {
        Self::new(DEFAULT_DOCUMENT, DEFAULT_QUERY)
    }
}

impl ProbeRun {
    pub fn new(document: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            document: Some(document.into()),
            query: query.into(),
            state: RunState::Pending,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Drive all four phases against `store`, writing progress to `out`.
    pub async fn execute<S, W>(&mut self, store: &S, out: &mut W) -> Result<QueryOutcome>
    where
        S: KnowledgeStore,
        W: Write,
    {
        if self.state != RunState::Pending {
            return Err(Error::Internal(format!(
                "probe run already executed (state {:?})",
                self.state
            )));
        }
        let document = self
            .document
            .take()
            .ok_or_else(|| Error::Internal("probe run has no document".into()))?;

        let rule = "=".repeat(BANNER_WIDTH);
        writeln!(out, "{}", rule)?;
        writeln!(out, "Testing kgprobe with Ollama")?;
        writeln!(out, "{}", rule)?;

        writeln!(out, "\n{}", Phase::Reset.heading())?;
        self.guard(Phase::Reset, async {
            store.prune_data().await?;
            store.prune_system(true).await
        })
        .await?;
        self.state = RunState::Reset;
        writeln!(out, "✓ System reset complete")?;

        writeln!(out, "\n{}", Phase::Ingest.heading())?;
        self.guard(Phase::Ingest, store.add(document)).await?;
        self.state = RunState::Ingested;
        writeln!(out, "✓ Text added successfully")?;

        writeln!(out, "\n{}", Phase::Transform.heading())?;
        self.guard(Phase::Transform, store.cognify()).await?;
        self.state = RunState::Transformed;
        writeln!(out, "✓ Cognify complete - knowledge graph created!")?;

        writeln!(out, "\n{}", Phase::Query.heading())?;
        let outcome = match store.search(&self.query).await {
            Ok(results) if results.is_empty() => {
                writeln!(out, "✓ Search completed (no results found)")?;
                QueryOutcome::Empty
            }
            Ok(results) => {
                let count = results.len();
                let first = preview(&results[0].to_string(), PREVIEW_WIDTH);
                let noun = if count == 1 { "result" } else { "results" };
                writeln!(out, "✓ Search returned {} {}", count, noun)?;
                writeln!(out, "\nFirst result sample:")?;
                writeln!(out, "{}", first)?;
                QueryOutcome::Results {
                    count,
                    preview: first,
                }
            }
            Err(e) => {
                warn!("Search failed for query {:?}: {}", self.query, e);
                writeln!(out, "⚠ Search encountered an issue: {}", e)?;
                writeln!(out, "  (This is expected in early stages of data processing)")?;
                QueryOutcome::Failed {
                    message: e.to_string(),
                }
            }
        };
        self.state = RunState::Queried;

        writeln!(out, "\n{}", rule)?;
        writeln!(out, "✅ kgprobe is working with Ollama!")?;
        writeln!(out, "{}", rule)?;
        info!("Probe run finished: {:?}", outcome);
        Ok(outcome)
    }

    async fn guard<F>(&mut self, phase: Phase, step: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<()>>,
    {
        if let Err(e) = step.await {
            self.state = RunState::Failed(phase);
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::SearchResult;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeStore {
        calls: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
        search: Mutex<Option<Result<Vec<SearchResult>>>>,
    }

    impl FakeStore {
        fn returning(results: Vec<SearchResult>) -> Self {
            Self {
                search: Mutex::new(Some(Ok(results))),
                ..Default::default()
            }
        }

        fn failing_search(message: &str) -> Self {
            Self {
                search: Mutex::new(Some(Err(Error::Http(message.to_string())))),
                ..Default::default()
            }
        }

        fn failing_at(verb: &'static str) -> Self {
            Self {
                fail_on: Some(verb),
                ..Default::default()
            }
        }

        fn record(&self, verb: &str) -> Result<()> {
            self.calls.lock().push(verb.to_string());
            if self.fail_on == Some(verb) {
                return Err(Error::Storage(format!("{} exploded", verb)));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl KnowledgeStore for FakeStore {
        async fn prune_data(&self) -> Result<()> {
            self.record("prune_data")
        }

        async fn prune_system(&self, clear_metadata: bool) -> Result<()> {
            self.record(&format!("prune_system({})", clear_metadata))
        }

        async fn add(&self, document: String) -> Result<()> {
            assert!(!document.trim().is_empty());
            self.record("add")
        }

        async fn cognify(&self) -> Result<()> {
            self.record("cognify")
        }

        async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
            self.record(&format!("search({})", query))?;
            self.search.lock().take().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn answer(text: String) -> SearchResult {
        SearchResult::Answer { text }
    }

    #[test]
    fn test_fresh_run_is_pending() {
        let probe = ProbeRun::new("text", "query");
        assert_eq!(probe.state(), RunState::Pending);
        assert!(!probe.state().is_terminal());
    }

    async fn run(store: &FakeStore) -> (ProbeRun, Result<QueryOutcome>, String) {
        let mut probe = ProbeRun::default();
        let mut out = Vec::new();
        let result = probe.execute(store, &mut out).await;
        (probe, result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_preview_truncation() {
        assert_eq!(preview("short", 200), "short");
        let exact = "x".repeat(200);
        assert_eq!(preview(&exact, 200), exact);
        let long = "y".repeat(250);
        assert_eq!(preview(&long, 200), format!("{}...", "y".repeat(200)));
    }

    #[test]
    fn test_preview_counts_chars_not_bytes() {
        let text = "é".repeat(201);
        let shown = preview(&text, 200);
        assert_eq!(shown.chars().count(), 203);
        assert!(shown.ends_with("é..."));
    }

    #[tokio::test]
    async fn test_calls_happen_in_order() {
        let store = FakeStore::default();
        let (probe, result, _) = run(&store).await;
        assert!(result.is_ok());
        assert!(probe.state().is_terminal());
        assert_eq!(
            store.calls(),
            vec!["prune_data", "prune_system(true)", "add", "cognify", "search(AI)"]
        );
        assert_eq!(probe.state(), RunState::Queried);
    }

    #[tokio::test]
    async fn test_search_error_is_absorbed() {
        let store = FakeStore::failing_search("index not ready");
        let (probe, result, out) = run(&store).await;

        let outcome = result.unwrap();
        assert!(matches!(outcome, QueryOutcome::Failed { ref message } if message.contains("index not ready")));
        assert_eq!(probe.state(), RunState::Queried);

        let lines: Vec<&str> = out.lines().filter(|l| !l.is_empty()).collect();
        let warning = lines.iter().position(|l| l.contains("index not ready")).unwrap();
        assert!(lines[warning].starts_with("⚠"));
        assert!(lines[warning + 1].contains("expected in early stages"));
        assert!(lines[warning + 3].contains("is working with Ollama"));
    }

    #[tokio::test]
    async fn test_empty_results() {
        let store = FakeStore::returning(Vec::new());
        let (_, result, out) = run(&store).await;

        assert_eq!(result.unwrap(), QueryOutcome::Empty);
        assert!(out.contains("no results found"));
        assert!(!out.contains("Search returned"));
        assert!(out.contains("✅ kgprobe is working with Ollama!"));
    }

    #[tokio::test]
    async fn test_results_are_counted_and_previewed() {
        let first = "a".repeat(250);
        let store = FakeStore::returning(vec![
            answer(first),
            answer("second".into()),
            answer("third".into()),
        ]);
        let (_, result, out) = run(&store).await;

        let expected = format!("{}...", "a".repeat(200));
        assert_eq!(
            result.unwrap(),
            QueryOutcome::Results {
                count: 3,
                preview: expected.clone(),
            }
        );
        assert!(out.contains("✓ Search returned 3 results"));
        assert!(out.lines().any(|l| l == expected));
    }

    #[tokio::test]
    async fn test_single_result_not_truncated() {
        let store = FakeStore::returning(vec![answer("AI helps".into())]);
        let (_, _, out) = run(&store).await;
        assert!(out.contains("✓ Search returned 1 result\n"));
        assert!(out.lines().any(|l| l == "AI helps"));
    }

    #[tokio::test]
    async fn test_reset_failure_stops_run() {
        let store = FakeStore::failing_at("prune_data");
        let (probe, result, out) = run(&store).await;

        assert!(matches!(result, Err(Error::Storage(ref m)) if m == "prune_data exploded"));
        assert_eq!(store.calls(), vec!["prune_data"]);
        assert_eq!(probe.state(), RunState::Failed(Phase::Reset));
        assert!(probe.state().is_terminal());
        assert!(!out.contains("✓"));
        assert!(!out.contains("is working"));
    }

    #[tokio::test]
    async fn test_prune_system_failure_stops_run() {
        let store = FakeStore::failing_at("prune_system(true)");
        let (probe, result, out) = run(&store).await;

        assert!(matches!(result, Err(Error::Storage(_))));
        assert_eq!(store.calls(), vec!["prune_data", "prune_system(true)"]);
        assert_eq!(probe.state(), RunState::Failed(Phase::Reset));
        assert!(!out.contains("✓ System reset complete"));
        assert!(!out.contains(Phase::Ingest.heading()));
    }

    #[tokio::test]
    async fn test_add_failure_stops_run() {
        let store = FakeStore::failing_at("add");
        let (probe, result, out) = run(&store).await;

        assert!(matches!(result, Err(Error::Storage(ref m)) if m == "add exploded"));
        assert_eq!(store.calls(), vec!["prune_data", "prune_system(true)", "add"]);
        assert_eq!(probe.state(), RunState::Failed(Phase::Ingest));
        assert!(out.contains("✓ System reset complete"));
        assert!(!out.contains("✓ Text added successfully"));
        assert!(!out.contains(Phase::Transform.heading()));
    }

    #[tokio::test]
    async fn test_cognify_failure_is_fatal() {
        let store = FakeStore::failing_at("cognify");
        let (probe, result, out) = run(&store).await;

        assert!(result.is_err());
        assert_eq!(store.calls().last().map(String::as_str), Some("cognify"));
        assert_eq!(probe.state(), RunState::Failed(Phase::Transform));
        assert!(out.contains("✓ Text added successfully"));
        assert!(!out.contains(Phase::Query.heading()));
    }

    #[tokio::test]
    async fn test_run_executes_once() {
        let store = FakeStore::default();
        let (mut probe, _, _) = run(&store).await;
        let again = probe.execute(&store, &mut Vec::<u8>::new()).await;
        assert!(matches!(again, Err(Error::Internal(_))));
        assert_eq!(store.calls().len(), 5);
    }
}
