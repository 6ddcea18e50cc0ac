use crate::DependencyGraph;
use pipeguard_core::NodeKey;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use tracing::debug;

/// Result of a Kahn topological sort. When the graph is cyclic the
/// unemitted nodes are appended in insertion order and the flag is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopoSort {
    pub order: Vec<NodeKey>,
    pub is_cyclic: bool,
}

impl DependencyGraph {
    /// Find simple cycles via DFS with a recursion-stack set. One cycle
    /// is reported per DFS tree, extracted from the path at the point
    /// the back-edge closes it. The walk uses an explicit stack so
    /// pathologically deep chains cannot overflow.
    pub fn find_cycles(&self) -> Vec<Vec<NodeKey>> {
        let mut cycles: Vec<Vec<NodeKey>> = Vec::new();
        let mut visited: FxHashSet<&NodeKey> = FxHashSet::default();

        for root in self.node_keys() {
            if visited.contains(root) {
                continue;
            }

            // (node, next child index) frames
            let mut stack: Vec<(&NodeKey, usize)> = vec![(root, 0)];
            let mut path: Vec<&NodeKey> = vec![root];
            let mut on_path: FxHashSet<&NodeKey> = FxHashSet::default();
            on_path.insert(root);
            visited.insert(root);

            'dfs: while let Some(top) = stack.len().checked_sub(1) {
                let (node, idx) = stack[top];
                let deps = self.dependencies(node);

                if idx >= deps.len() {
                    stack.pop();
                    on_path.remove(node);
                    path.pop();
                    continue;
                }
                stack[top].1 += 1;

                let dep = deps[idx];
                if !visited.contains(dep) {
                    visited.insert(dep);
                    on_path.insert(dep);
                    path.push(dep);
                    stack.push((dep, 0));
                } else if on_path.contains(dep) {
                    // Back-edge: the cycle is the path suffix starting
                    // at the revisited node.
                    if let Some(start) = path.iter().position(|k| *k == dep) {
                        cycles.push(path[start..].iter().map(|k| (*k).clone()).collect());
                    }
                    break 'dfs;
                }
            }
        }

        cycles
    }

    /// Kahn's algorithm over the whole graph.
    pub fn topological_sort(&self) -> TopoSort {
        let mut in_degree: FxHashMap<&NodeKey, usize> = FxHashMap::default();
        for key in self.node_keys() {
            in_degree.insert(key, 0);
        }
        for (_, target, _) in self.all_edges() {
            if let Some(count) = in_degree.get_mut(target) {
                *count += 1;
            }
        }

        let mut queue: VecDeque<&NodeKey> = self
            .node_keys()
            .iter()
            .filter(|k| in_degree.get(*k) == Some(&0))
            .collect();

        let mut order: Vec<NodeKey> = Vec::with_capacity(self.node_count());
        while let Some(node) = queue.pop_front() {
            order.push(node.clone());
            for dep in self.dependencies(node) {
                if let Some(count) = in_degree.get_mut(dep) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(dep);
                    }
                }
            }
        }

        let is_cyclic = order.len() != self.node_count();
        if is_cyclic {
            debug!(
                emitted = order.len(),
                total = self.node_count(),
                "topological sort hit a cycle; appending remainder"
            );
            let emitted: FxHashSet<&str> = order.iter().map(String::as_str).collect();
            let remainder: Vec<NodeKey> = self
                .node_keys()
                .iter()
                .filter(|key| !emitted.contains(key.as_str()))
                .cloned()
                .collect();
            drop(emitted);
            order.extend(remainder);
        }

        TopoSort { order, is_cyclic }
    }

    /// Longest simple path, computed by relaxing along the topological
    /// order. Ties are broken by node insertion order.
    pub fn critical_path(&self) -> Vec<NodeKey> {
        if self.is_empty() {
            return Vec::new();
        }

        let topo = self.topological_sort();

        let mut longest: FxHashMap<&str, usize> = FxHashMap::default();
        let mut predecessor: FxHashMap<&str, &str> = FxHashMap::default();
        for key in self.node_keys() {
            longest.insert(key.as_str(), 0);
        }

        for node in &topo.order {
            let node_len = longest.get(node.as_str()).copied().unwrap_or(0);
            for dep in self.dependencies(node) {
                let dep_len = longest.get(dep.as_str()).copied().unwrap_or(0);
                if dep_len < node_len + 1 {
                    longest.insert(dep.as_str(), node_len + 1);
                    predecessor.insert(dep.as_str(), node.as_str());
                }
            }
        }

        // First maximum in insertion order.
        let mut end: Option<&str> = None;
        let mut best = 0usize;
        for key in self.node_keys() {
            let len = longest.get(key.as_str()).copied().unwrap_or(0);
            if end.is_none() || len > best {
                end = Some(key.as_str());
                best = len;
            }
        }

        let mut path: Vec<NodeKey> = Vec::new();
        let mut current = end;
        let mut guard = self.node_count() + 1;
        while let Some(node) = current {
            path.push(node.to_string());
            current = predecessor.get(node).copied();
            guard -= 1;
            if guard == 0 {
                break;
            }
        }
        path.reverse();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeguard_core::EdgeMeta;

    fn chain() -> DependencyGraph {
        let mut g = DependencyGraph::new();
        g.add_edge("a", "b", EdgeMeta::default());
        g.add_edge("b", "c", EdgeMeta::default());
        g
    }

    #[test]
    fn topo_of_chain_is_source_first() {
        let topo = chain().topological_sort();
        assert_eq!(topo.order, vec!["a", "b", "c"]);
        assert!(!topo.is_cyclic);
    }

    #[test]
    fn topo_contains_each_node_once_and_respects_edges() {
        let mut g = DependencyGraph::new();
        g.add_edge("a", "c", EdgeMeta::default());
        g.add_edge("b", "c", EdgeMeta::default());
        g.add_edge("c", "d", EdgeMeta::default());
        let topo = g.topological_sort();
        assert_eq!(topo.order.len(), 4);
        let index = |k: &str| topo.order.iter().position(|n| n == k).unwrap();
        for (s, t, _) in g.all_edges() {
            assert!(index(s) < index(t), "{} should precede {}", s, t);
        }
    }

    #[test]
    fn cyclic_graph_appends_remainder_with_flag() {
        let mut g = DependencyGraph::new();
        g.add_edge("a", "b", EdgeMeta::default());
        g.add_edge("b", "c", EdgeMeta::default());
        g.add_edge("c", "a", EdgeMeta::default());
        let topo = g.topological_sort();
        assert!(topo.is_cyclic);
        assert_eq!(topo.order.len(), 3);
        let mut sorted = topo.order.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["a", "b", "c"]);
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        assert!(chain().find_cycles().is_empty());
    }

    #[test]
    fn three_cycle_detected_once() {
        let mut g = DependencyGraph::new();
        g.add_edge("a", "b", EdgeMeta::default());
        g.add_edge("b", "c", EdgeMeta::default());
        g.add_edge("c", "a", EdgeMeta::default());
        let cycles = g.find_cycles();
        assert_eq!(cycles.len(), 1);
        let mut cycle = cycles[0].clone();
        cycle.sort();
        assert_eq!(cycle, vec!["a", "b", "c"]);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut g = DependencyGraph::new();
        g.add_edge("a", "a", EdgeMeta::default());
        let cycles = g.find_cycles();
        assert_eq!(cycles, vec![vec!["a".to_string()]]);
    }

    #[test]
    fn critical_path_of_chain() {
        assert_eq!(chain().critical_path(), vec!["a", "b", "c"]);
    }

    #[test]
    fn critical_path_picks_longest_branch() {
        let mut g = DependencyGraph::new();
        g.add_edge("a", "b", EdgeMeta::default());
        g.add_edge("a", "x", EdgeMeta::default());
        g.add_edge("b", "c", EdgeMeta::default());
        g.add_edge("c", "d", EdgeMeta::default());
        assert_eq!(g.critical_path(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let mut g = DependencyGraph::new();
        for i in 0..20_000u32 {
            g.add_edge(format!("n{}", i), format!("n{}", i + 1), EdgeMeta::default());
        }
        assert!(g.find_cycles().is_empty());
        let topo = g.topological_sort();
        assert!(!topo.is_cyclic);
        assert_eq!(topo.order.len(), 20_001);
        assert_eq!(g.critical_path().len(), 20_001);
    }
}
