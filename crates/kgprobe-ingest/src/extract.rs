//! Knowledge graph extraction: prompt construction and parsing of the
//! model's JSON answer into store-ready nodes and edges.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use kgprobe_core::{Error, Result};
use kgprobe_store::{GraphEdge, GraphNode};

pub const EXTRACTION_SYSTEM_PROMPT: &str = "You extract knowledge graphs from text. \
Respond with a single JSON object and nothing else, shaped as \
{\"nodes\": [{\"id\": string, \"name\": string, \"type\": string, \"description\": string}], \
\"edges\": [{\"source\": string, \"target\": string, \"relationship\": string}]}. \
Use short lowercase snake_case ids and relationship names. \
Every edge source and target must be the id of a node you listed. \
Only include facts stated in the text.";

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").unwrap());
static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

pub fn extraction_prompt(chunk: &str) -> String {
    format!(
        "Extract the entities and relationships from the following text.\n\nText:\n\"\"\"\n{}\n\"\"\"",
        chunk.trim()
    )
}

/// Nodes and edges parsed from one model response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedGraph {
    pub nodes: Vec<GraphNode>,
    /// Edges with weight 1.0 and no chunk attribution yet.
    pub edges: Vec<GraphEdge>,
}

impl ExtractedGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Deserialize)]
struct RawGraph {
    #[serde(default)]
    nodes: Vec<Value>,
    #[serde(default, alias = "relationships")]
    edges: Vec<Value>,
}

#[derive(Deserialize)]
struct RawNode {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default, alias = "label")]
    name: Option<Value>,
    #[serde(default, rename = "type")]
    node_type: Option<Value>,
    #[serde(default)]
    description: Option<Value>,
}

#[derive(Deserialize)]
struct RawEdge {
    #[serde(default, alias = "source_node_id")]
    source: Option<Value>,
    #[serde(default, alias = "target_node_id")]
    target: Option<Value>,
    #[serde(default, alias = "relationship_name", alias = "label")]
    relationship: Option<Value>,
}

/// Strings and numbers as trimmed text; anything else is treated as absent.
fn scalar_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Parse a model response into a graph.
///
/// Accepts bare JSON or JSON inside a fenced block. Malformed nodes and
/// edges are skipped one by one; edges that point at nodes missing from the
/// response are dropped. Only a response that is not a graph object at all
/// is an error.
pub fn parse_extraction(raw: &str) -> Result<ExtractedGraph> {
    let payload = json_payload(raw)
        .ok_or_else(|| Error::Cognify("model output contained no JSON object".into()))?;
    let parsed: RawGraph = serde_json::from_str(payload)
        .map_err(|e| Error::Cognify(format!("malformed graph JSON: {}", e)))?;

    let mut graph = ExtractedGraph::default();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for value in parsed.nodes {
        let raw_node: RawNode = match serde_json::from_value(value) {
            Ok(node) => node,
            Err(e) => {
                debug!("Skipping node: {}", e);
                continue;
            }
        };
        let raw_id = scalar_text(raw_node.id.as_ref());
        let label = scalar_text(raw_node.name.as_ref())
            .or_else(|| raw_id.clone())
            .unwrap_or_default();
        let id = normalize_id(raw_id.as_deref().unwrap_or(&label));
        if id.is_empty() {
            debug!("Skipping node without id or name");
            continue;
        }
        let description = scalar_text(raw_node.description.as_ref());

        match positions.get(&id) {
            Some(&pos) => {
                let existing = &mut graph.nodes[pos];
                if existing.description.is_none() {
                    existing.description = description;
                }
            }
            None => {
                positions.insert(id.clone(), graph.nodes.len());
                graph.nodes.push(GraphNode {
                    label: if label.is_empty() { id.clone() } else { label },
                    id,
                    node_type: scalar_text(raw_node.node_type.as_ref())
                        .map(|t| normalize_id(&t))
                        .filter(|t| !t.is_empty())
                        .unwrap_or_else(|| "entity".into()),
                    description,
                });
            }
        }
    }

    let mut seen = HashSet::new();
    for value in parsed.edges {
        let raw_edge: RawEdge = match serde_json::from_value(value) {
            Ok(edge) => edge,
            Err(e) => {
                debug!("Skipping edge: {}", e);
                continue;
            }
        };
        let field = |v: &Option<Value>| {
            scalar_text(v.as_ref())
                .map(|t| normalize_id(&t))
                .unwrap_or_default()
        };
        let source = field(&raw_edge.source);
        let target = field(&raw_edge.target);
        let relationship = field(&raw_edge.relationship);
        if relationship.is_empty()
            || !positions.contains_key(&source)
            || !positions.contains_key(&target)
        {
            debug!("Dropping edge {:?} -{:?}-> {:?}", source, relationship, target);
            continue;
        }
        if seen.insert((source.clone(), target.clone(), relationship.clone())) {
            graph.edges.push(GraphEdge {
                source,
                target,
                relationship,
                weight: 1.0,
                chunk_id: None,
            });
        }
    }

    Ok(graph)
}

fn json_payload(raw: &str) -> Option<&str> {
    if let Some(caps) = FENCED_JSON.captures(raw) {
        return caps.get(1).map(|m| m.as_str());
    }
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// Lowercase snake case: `"Machine Learning"` → `"machine_learning"`.
pub fn normalize_id(raw: &str) -> String {
    NON_ALNUM
        .replace_all(&raw.trim().to_lowercase(), "_")
        .trim_matches('_')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_id() {
        assert_eq!(normalize_id("Machine Learning"), "machine_learning");
        assert_eq!(normalize_id("  AI (field) "), "ai_field");
        assert_eq!(normalize_id("!!!"), "");
    }

    #[test]
    fn test_prompt_embeds_text() {
        let prompt = extraction_prompt("  Machine learning learns from data.  ");
        assert!(prompt.contains("\"\"\"\nMachine learning learns from data.\n\"\"\""));
    }

    #[test]
    fn test_parse_bare_json() {
        let raw = r#"{
            "nodes": [
                {"id": "machine_learning", "name": "Machine Learning", "type": "Field", "description": "Learning from data"},
                {"id": "data", "name": "Data", "type": "concept"}
            ],
            "edges": [
                {"source": "machine_learning", "target": "data", "relationship": "learns from"}
            ]
        }"#;
        let graph = parse_extraction(raw).unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.nodes[0].label, "Machine Learning");
        assert_eq!(graph.nodes[0].node_type, "field");
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].relationship, "learns_from");
        assert_eq!(graph.edges[0].weight, 1.0);
    }

    #[test]
    fn test_parse_fenced_and_names_as_ids() {
        let raw = "Here is the graph:\n```json\n{\"nodes\": [{\"name\": \"Natural Language Processing\"}, {\"name\": \"Human Language\"}], \"edges\": [{\"source\": \"Natural Language Processing\", \"target\": \"Human Language\", \"relationship\": \"understands\"}]}\n```";
        let graph = parse_extraction(raw).unwrap();
        assert_eq!(graph.nodes[0].id, "natural_language_processing");
        assert_eq!(graph.nodes[0].node_type, "entity");
        assert_eq!(graph.edges[0].target, "human_language");
    }

    #[test]
    fn test_dangling_and_duplicate_edges_dropped() {
        let raw = r#"{"nodes": [{"id": "ai"}, {"id": "ai", "description": "Artificial intelligence"}],
                      "edges": [{"source": "ai", "target": "ghost", "relationship": "haunts"},
                                {"source": "ai", "target": "ai", "relationship": "is"},
                                {"source": "AI", "target": "ai", "relationship": "is"}]}"#;
        let graph = parse_extraction(raw).unwrap();
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].description.as_deref(), Some("Artificial intelligence"));
        assert_eq!(graph.edges.len(), 1);
    }

    #[test]
    fn test_incomplete_edge_skipped() {
        let raw = r#"{"nodes": [{"id": "a"}, {"id": "b"}, {"id": "c"}],
                      "edges": [{"source": "a", "target": "b", "relationship": "uses"},
                                {"source": "b", "target": "c"},
                                {"source": "c", "target": "a", "relationship": null},
                                "not an edge"]}"#;
        let graph = parse_extraction(raw).unwrap();
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].relationship, "uses");
    }

    #[test]
    fn test_numeric_and_odd_node_fields() {
        let raw = r#"{"nodes": [{"id": 1, "name": "AI", "type": ["field"]},
                                {"id": {"nested": true}, "name": "Data"},
                                {"description": "no id or name"},
                                42],
                      "edges": [{"source": 1, "target": "data", "relationship": "needs"}]}"#;
        let graph = parse_extraction(raw).unwrap();
        let ids: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "data"]);
        assert_eq!(graph.nodes[0].label, "AI");
        assert_eq!(graph.nodes[0].node_type, "entity");
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].source, "1");
    }

    #[test]
    fn test_malformed_output() {
        assert!(matches!(parse_extraction("no graph here"), Err(Error::Cognify(_))));
        assert!(matches!(parse_extraction("{\"nodes\": 3}"), Err(Error::Cognify(_))));
    }

    #[test]
    fn test_empty_graph() {
        let graph = parse_extraction("{}").unwrap();
        assert!(graph.is_empty());
    }
}
