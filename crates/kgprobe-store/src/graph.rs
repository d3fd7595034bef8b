//! In-memory view of the stored knowledge graph, backed by petgraph.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::types::{GraphEdge, GraphNode, Triplet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
}

/// Directed graph of entities and relationships loaded from the store.
pub struct GraphView {
    graph: DiGraph<GraphNode, GraphEdge>,
    node_index: HashMap<String, NodeIndex>,
}

impl GraphView {
    /// Build a view; edges whose endpoints are missing are skipped.
    pub fn from_parts(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> Self {
        let mut graph = DiGraph::with_capacity(nodes.len(), edges.len());
        let mut node_index = HashMap::with_capacity(nodes.len());
        for node in nodes {
            let id = node.id.clone();
            let idx = graph.add_node(node);
            node_index.insert(id, idx);
        }
        for edge in edges {
            let (Some(&a), Some(&b)) = (node_index.get(&edge.source), node_index.get(&edge.target))
            else {
                continue;
            };
            graph.add_edge(a, b, edge);
        }
        Self { graph, node_index }
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            node_count: self.graph.node_count(),
            edge_count: self.graph.edge_count(),
        }
    }

    /// Nodes whose label or description mentions a query term, best first.
    ///
    /// A term hit in the label scores 2, in the description 1.
    pub fn match_nodes(&self, query: &str) -> Vec<&GraphNode> {
        let terms: HashSet<String> = tokens(query).collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, &GraphNode)> = self
            .graph
            .node_weights()
            .filter_map(|node| {
                let label_hits = tokens(&node.label).filter(|t| terms.contains(t)).count();
                let desc_hits = node
                    .description
                    .as_deref()
                    .map(|d| tokens(d).filter(|t| terms.contains(t)).count())
                    .unwrap_or(0);
                let score = label_hits * 2 + desc_hits.min(1);
                (score > 0).then_some((score, node))
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        scored.into_iter().map(|(_, n)| n).collect()
    }

    /// Triplets reachable within `depth` hops of the seed nodes, in either direction.
    pub fn neighborhood(&self, seeds: &[&str], depth: usize) -> Vec<Triplet> {
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut seen_edges = HashSet::new();
        let mut queue: VecDeque<(NodeIndex, usize)> = VecDeque::new();
        let mut triplets = Vec::new();

        for seed in seeds {
            if let Some(&idx) = self.node_index.get(*seed) {
                if visited.insert(idx) {
                    queue.push_back((idx, 0));
                }
            }
        }

        while let Some((idx, hops)) = queue.pop_front() {
            if hops >= depth {
                continue;
            }
            for direction in [Direction::Outgoing, Direction::Incoming] {
                for edge in self.graph.edges_directed(idx, direction) {
                    if !seen_edges.insert(edge.id()) {
                        continue;
                    }
                    let (src, dst) = (edge.source(), edge.target());
                    triplets.push(Triplet {
                        source_id: self.graph[src].id.clone(),
                        source: self.graph[src].label.clone(),
                        relationship: edge.weight().relationship.clone(),
                        target_id: self.graph[dst].id.clone(),
                        target: self.graph[dst].label.clone(),
                        weight: edge.weight().weight,
                    });
                    let next = if src == idx { dst } else { src };
                    if visited.insert(next) {
                        queue.push_back((next, hops + 1));
                    }
                }
            }
        }

        triplets.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        triplets
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, label: &str, description: Option<&str>) -> GraphNode {
        GraphNode {
            id: id.into(),
            label: label.into(),
            node_type: "concept".into(),
            description: description.map(String::from),
        }
    }

    fn edge(source: &str, target: &str, relationship: &str, weight: f64) -> GraphEdge {
        GraphEdge {
            source: source.into(),
            target: target.into(),
            relationship: relationship.into(),
            weight,
            chunk_id: None,
        }
    }

    fn sample() -> GraphView {
        GraphView::from_parts(
            vec![
                node("ai", "AI", Some("Artificial intelligence")),
                node("machine_learning", "Machine Learning", Some("A field of AI")),
                node("data", "Data", None),
                node("nlp", "Natural Language Processing", None),
            ],
            vec![
                edge("machine_learning", "ai", "is_subfield_of", 1.0),
                edge("machine_learning", "data", "learns_from", 2.0),
                edge("nlp", "machine_learning", "uses", 1.0),
                edge("ghost", "ai", "haunts", 1.0),
            ],
        )
    }

    #[test]
    fn test_dangling_edges_skipped() {
        let view = sample();
        assert_eq!(view.stats().node_count, 4);
        assert_eq!(view.stats().edge_count, 3);
    }

    #[test]
    fn test_match_prefers_label() {
        let view = sample();
        let matches = view.match_nodes("AI");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "ai");
        assert_eq!(matches[1].id, "machine_learning");
        assert!(view.match_nodes("   ").is_empty());
    }

    #[test]
    fn test_neighborhood_depth() {
        let view = sample();
        let one_hop = view.neighborhood(&["ai"], 1);
        assert_eq!(one_hop.len(), 1);
        assert_eq!(one_hop[0].source, "Machine Learning");
        assert_eq!(one_hop[0].relationship, "is_subfield_of");

        let two_hops = view.neighborhood(&["ai"], 2);
        assert_eq!(two_hops.len(), 3);
        // Heaviest edge first
        assert_eq!(two_hops[0].relationship, "learns_from");
    }

    #[test]
    fn test_unknown_seed() {
        let view = sample();
        assert!(view.neighborhood(&["quantum"], 3).is_empty());
    }
}
