use crate::planner;
use pipeguard_core::{AttrMap, NodeKey};
use pipeguard_graph::DependencyGraph;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisNode {
    pub id: NodeKey,
    pub label: String,
    pub kind: String,
    pub x: f64,
    pub y: f64,
    pub attributes: AttrMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisEdge {
    pub source: NodeKey,
    pub target: NodeKey,
    pub kind: String,
    pub attributes: AttrMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisualizationPayload {
    pub nodes: Vec<VisNode>,
    pub edges: Vec<VisEdge>,
}

const LEVEL_SPACING: f64 = 220.0;
const SLOT_SPACING: f64 = 90.0;

/// Deterministic layout payload: dependency levels map to columns,
/// level members to rows. Rendering happens elsewhere; this only
/// carries positions.
pub fn visualization_payload(graph: &DependencyGraph) -> VisualizationPayload {
    let scope: FxHashSet<&str> = graph.node_keys().iter().map(String::as_str).collect();
    let levels = planner::level_groups_for(graph, &scope);

    let mut nodes = Vec::with_capacity(graph.node_count());
    for (level_index, level) in levels.iter().enumerate() {
        for (slot, key) in level.iter().enumerate() {
            let Some(meta) = graph.get_node(key) else {
                continue;
            };
            let label = meta
                .attributes
                .get("name")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| {
                    key.rsplit(':').next().unwrap_or(key.as_str()).to_string()
                });
            nodes.push(VisNode {
                id: key.clone(),
                label,
                kind: meta.kind.to_string(),
                x: level_index as f64 * LEVEL_SPACING,
                y: slot as f64 * SLOT_SPACING,
                attributes: meta.attributes.clone(),
            });
        }
    }

    let edges = graph
        .all_edges()
        .into_iter()
        .map(|(source, target, meta)| VisEdge {
            source: source.clone(),
            target: target.clone(),
            kind: meta.kind.to_string(),
            attributes: meta.attributes.clone(),
        })
        .collect();

    VisualizationPayload { nodes, edges }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeguard_core::{EdgeKind, EdgeMeta, NodeKind, NodeMeta};

    #[test]
    fn levels_become_columns() {
        let mut g = DependencyGraph::new();
        g.add_node("file:a.py", NodeMeta::new(NodeKind::File).with_path("a.py"));
        g.add_node("file:b.py", NodeMeta::new(NodeKind::File).with_path("b.py"));
        g.add_edge("file:a.py", "file:b.py", EdgeMeta::new(EdgeKind::Import));

        let payload = visualization_payload(&g);
        assert_eq!(payload.nodes.len(), 2);
        assert_eq!(payload.edges.len(), 1);

        let a = payload.nodes.iter().find(|n| n.id == "file:a.py").unwrap();
        let b = payload.nodes.iter().find(|n| n.id == "file:b.py").unwrap();
        assert!(a.x < b.x);
        assert_eq!(a.label, "a.py");
        assert_eq!(payload.edges[0].kind, "import");
    }

    #[test]
    fn every_node_is_positioned_even_in_cycles() {
        let mut g = DependencyGraph::new();
        g.add_edge("a", "b", EdgeMeta::default());
        g.add_edge("b", "a", EdgeMeta::default());
        let payload = visualization_payload(&g);
        assert_eq!(payload.nodes.len(), 2);
    }
}
