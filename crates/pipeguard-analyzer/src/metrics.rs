use pipeguard_core::NodeKey;
use pipeguard_graph::DependencyGraph;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedNode {
    pub node_id: NodeKey,
    pub in_degree: usize,
    pub out_degree: usize,
    pub total_degree: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Connectivity {
    pub average_degree: f64,
    pub max_in_degree: usize,
    pub max_out_degree: usize,
    pub highly_connected_nodes: Vec<ConnectedNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Complexity {
    pub cyclomatic_complexity: i64,
    pub dependency_depth: usize,
    pub dependency_cycles: Vec<Vec<NodeKey>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    pub node_types: BTreeMap<String, usize>,
    pub edge_types: BTreeMap<String, usize>,
    pub connectivity: Connectivity,
    pub complexity: Complexity,
}

const HIGHLY_CONNECTED_THRESHOLD: usize = 5;
const HIGHLY_CONNECTED_LIMIT: usize = 10;

/// Compute graph metrics in a single pass over nodes and edges. The
/// formulas are fixed for reproducibility: average degree `2E / N`,
/// cyclomatic number `E − N + 2` (0 for an empty graph), dependency
/// depth as the longest dependency chain.
pub fn calculate_metrics(graph: &DependencyGraph) -> GraphMetrics {
    let node_count = graph.node_count();
    let edge_count = graph.edge_count();

    let mut node_types = BTreeMap::new();
    for (_, meta) in graph.all_nodes() {
        *node_types.entry(meta.kind.to_string()).or_insert(0) += 1;
    }

    let mut edge_types = BTreeMap::new();
    for (_, _, meta) in graph.all_edges() {
        *edge_types.entry(meta.kind.to_string()).or_insert(0) += 1;
    }

    let mut highly_connected = Vec::new();
    let mut max_in_degree = 0;
    let mut max_out_degree = 0;
    for key in graph.node_keys() {
        let in_degree = graph.dependents(key).len();
        let out_degree = graph.dependencies(key).len();
        max_in_degree = max_in_degree.max(in_degree);
        max_out_degree = max_out_degree.max(out_degree);

        let total_degree = in_degree + out_degree;
        if total_degree > HIGHLY_CONNECTED_THRESHOLD {
            highly_connected.push(ConnectedNode {
                node_id: key.clone(),
                in_degree,
                out_degree,
                total_degree,
            });
        }
    }
    highly_connected.sort_by(|a, b| b.total_degree.cmp(&a.total_degree));
    highly_connected.truncate(HIGHLY_CONNECTED_LIMIT);

    let average_degree = if node_count > 0 {
        (edge_count * 2) as f64 / node_count as f64
    } else {
        0.0
    };

    let cyclomatic_complexity = if node_count > 0 {
        edge_count as i64 - node_count as i64 + 2
    } else {
        0
    };

    GraphMetrics {
        node_count,
        edge_count,
        node_types,
        edge_types,
        connectivity: Connectivity {
            average_degree,
            max_in_degree,
            max_out_degree,
            highly_connected_nodes: highly_connected,
        },
        complexity: Complexity {
            cyclomatic_complexity,
            dependency_depth: max_dependency_depth(graph),
            dependency_cycles: graph.find_cycles(),
        },
    }
}

/// Longest dependency chain over the whole graph, iterative with
/// memoization. Back-edges inside cycles contribute zero so the walk
/// terminates.
fn max_dependency_depth(graph: &DependencyGraph) -> usize {
    let mut memo: FxHashMap<&str, usize> = FxHashMap::default();
    let mut max_depth = 0;

    for root in graph.node_keys() {
        if memo.contains_key(root.as_str()) {
            continue;
        }

        // Post-order: (node, children expanded?)
        let mut stack: Vec<(&str, bool)> = vec![(root.as_str(), false)];
        let mut on_path: FxHashMap<&str, ()> = FxHashMap::default();

        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                let depth = graph
                    .dependencies(node)
                    .iter()
                    .filter_map(|dep| memo.get(dep.as_str()))
                    .map(|d| d + 1)
                    .max()
                    .unwrap_or(0);
                memo.insert(node, depth);
                on_path.remove(node);
                continue;
            }
            if memo.contains_key(node) || on_path.contains_key(node) {
                continue;
            }
            on_path.insert(node, ());
            stack.push((node, true));
            for dep in graph.dependencies(node) {
                if !memo.contains_key(dep.as_str()) && !on_path.contains_key(dep.as_str()) {
                    stack.push((dep.as_str(), false));
                }
            }
        }

        if let Some(depth) = memo.get(root.as_str()) {
            max_depth = max_depth.max(*depth);
        }
    }

    max_depth
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeguard_core::{EdgeKind, EdgeMeta, NodeKind, NodeMeta};

    #[test]
    fn empty_graph_has_zero_metrics() {
        let metrics = calculate_metrics(&DependencyGraph::new());
        assert_eq!(metrics.node_count, 0);
        assert_eq!(metrics.complexity.cyclomatic_complexity, 0);
        assert_eq!(metrics.connectivity.average_degree, 0.0);
    }

    #[test]
    fn counts_and_formulas() {
        let mut g = DependencyGraph::new();
        g.add_node("file:a", NodeMeta::new(NodeKind::File));
        g.add_node("file:b", NodeMeta::new(NodeKind::File));
        g.add_node("package:x", NodeMeta::new(NodeKind::Package));
        g.add_edge("file:a", "file:b", EdgeMeta::new(EdgeKind::Import));
        g.add_edge("file:a", "package:x", EdgeMeta::new(EdgeKind::Package));

        let metrics = calculate_metrics(&g);
        assert_eq!(metrics.node_count, 3);
        assert_eq!(metrics.edge_count, 2);
        assert_eq!(metrics.node_types["file"], 2);
        assert_eq!(metrics.edge_types["import"], 1);
        // E - N + 2 = 2 - 3 + 2
        assert_eq!(metrics.complexity.cyclomatic_complexity, 1);
        assert!((metrics.connectivity.average_degree - 4.0 / 3.0).abs() < 1e-9);
        assert_eq!(metrics.connectivity.max_out_degree, 2);
        assert_eq!(metrics.complexity.dependency_depth, 1);
    }

    #[test]
    fn depth_follows_longest_chain() {
        let mut g = DependencyGraph::new();
        g.add_edge("a", "b", EdgeMeta::default());
        g.add_edge("b", "c", EdgeMeta::default());
        g.add_edge("a", "c", EdgeMeta::default());
        let metrics = calculate_metrics(&g);
        assert_eq!(metrics.complexity.dependency_depth, 2);
    }

    #[test]
    fn cyclic_depth_terminates() {
        let mut g = DependencyGraph::new();
        g.add_edge("a", "b", EdgeMeta::default());
        g.add_edge("b", "a", EdgeMeta::default());
        let metrics = calculate_metrics(&g);
        assert_eq!(metrics.complexity.dependency_cycles.len(), 1);
        assert!(metrics.complexity.dependency_depth <= 2);
    }

    #[test]
    fn highly_connected_limited_to_top_ten() {
        let mut g = DependencyGraph::new();
        for hub in 0..12 {
            for spoke in 0..(6 + hub) {
                g.add_edge(format!("hub{}", hub), format!("h{}s{}", hub, spoke), EdgeMeta::default());
            }
        }
        let metrics = calculate_metrics(&g);
        assert_eq!(metrics.connectivity.highly_connected_nodes.len(), 10);
        let degrees: Vec<usize> = metrics
            .connectivity
            .highly_connected_nodes
            .iter()
            .map(|n| n.total_degree)
            .collect();
        let mut sorted = degrees.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(degrees, sorted);
    }
}
