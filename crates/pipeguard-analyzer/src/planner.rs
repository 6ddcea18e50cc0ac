use pipeguard_core::{file_key, NodeKey};
use pipeguard_graph::DependencyGraph;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanMetrics {
    pub total_nodes: usize,
    pub critical_path_length: usize,
    pub total_groups: usize,
    pub estimated_time: usize,
}

/// Build plan over the affected sub-graph (or the whole graph when no
/// change set is given).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildPlan {
    /// Changed nodes plus the transitive closure of their dependents.
    pub affected: Vec<NodeKey>,
    pub build_order: Vec<NodeKey>,
    pub critical_path: Vec<NodeKey>,
    /// Kahn levels: each level is a set of mutually independent tasks.
    pub parallel_groups: Vec<Vec<NodeKey>>,
    /// Levels chunked into batches of at most `max_parallel_jobs`.
    pub execution_plan: Vec<Vec<NodeKey>>,
    pub has_cycles: bool,
    pub metrics: PlanMetrics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParallelOpportunities {
    /// Undirected connected components; any component larger than one
    /// node is independently buildable.
    pub independent_components: Vec<Vec<NodeKey>>,
    pub parallel_paths: Vec<Vec<NodeKey>>,
}

/// Produce the build plan. Rebuild propagates along *reverse* edges:
/// the affected set is the closure of dependents of the changed nodes.
pub fn plan_build(
    graph: &DependencyGraph,
    changed_files: Option<&[String]>,
    max_parallel_jobs: usize,
) -> BuildPlan {
    if graph.is_empty() {
        return BuildPlan::default();
    }

    let affected: Vec<NodeKey> = match changed_files {
        Some(changed) if !changed.is_empty() => affected_nodes(graph, changed),
        _ => graph.node_keys().to_vec(),
    };
    let scope: FxHashSet<&str> = affected.iter().map(String::as_str).collect();

    let (build_order, has_cycles) = scoped_topological_sort(graph, &scope);
    if has_cycles {
        warn!(
            nodes = affected.len(),
            "cycles in affected sub-graph; remainder appended to build order"
        );
    }

    let critical_path = scoped_critical_path(graph, &scope, &build_order);
    let parallel_groups = level_groups_for(graph, &scope);

    let jobs = max_parallel_jobs.max(1);
    let mut execution_plan = Vec::new();
    for level in &parallel_groups {
        for batch in level.chunks(jobs) {
            execution_plan.push(batch.to_vec());
        }
    }

    let metrics = PlanMetrics {
        total_nodes: affected.len(),
        critical_path_length: critical_path.len(),
        total_groups: parallel_groups.len(),
        // Unit cost per batch.
        estimated_time: execution_plan.len(),
    };

    BuildPlan {
        affected,
        build_order,
        critical_path,
        parallel_groups,
        execution_plan,
        has_cycles,
        metrics,
    }
}

/// Changed nodes plus every transitive dependent, in graph insertion
/// order. Changed entries may be raw node keys or bare file paths.
pub fn affected_nodes(graph: &DependencyGraph, changed: &[String]) -> Vec<NodeKey> {
    let mut affected: FxHashSet<String> = FxHashSet::default();
    let mut queue: VecDeque<String> = VecDeque::new();

    for entry in changed {
        for candidate in [entry.clone(), file_key(entry)] {
            if graph.contains_node(&candidate) {
                if affected.insert(candidate.clone()) {
                    queue.push_back(candidate);
                }
                break;
            }
        }
    }

    while let Some(node) = queue.pop_front() {
        for dependent in graph.dependents(&node) {
            if !affected.contains(dependent.as_str()) {
                affected.insert(dependent.clone());
                queue.push_back(dependent.clone());
            }
        }
    }

    graph
        .node_keys()
        .iter()
        .filter(|k| affected.contains(k.as_str()))
        .cloned()
        .collect()
}

/// Kahn's algorithm restricted to `scope`. Returns the order plus a
/// cyclic flag; unemitted nodes are appended in insertion order.
fn scoped_topological_sort(
    graph: &DependencyGraph,
    scope: &FxHashSet<&str>,
) -> (Vec<NodeKey>, bool) {
    let mut in_degree: FxHashMap<&str, usize> = FxHashMap::default();
    for key in graph.node_keys() {
        if scope.contains(key.as_str()) {
            in_degree.insert(key.as_str(), 0);
        }
    }
    for (source, target, _) in graph.all_edges() {
        if scope.contains(source.as_str()) && scope.contains(target.as_str()) {
            if let Some(count) = in_degree.get_mut(target.as_str()) {
                *count += 1;
            }
        }
    }

    let mut queue: VecDeque<&str> = graph
        .node_keys()
        .iter()
        .map(String::as_str)
        .filter(|k| in_degree.get(k) == Some(&0))
        .collect();

    let mut order: Vec<NodeKey> = Vec::with_capacity(in_degree.len());
    while let Some(node) = queue.pop_front() {
        order.push(node.to_string());
        for dep in graph.dependencies(node) {
            if !scope.contains(dep.as_str()) {
                continue;
            }
            if let Some(count) = in_degree.get_mut(dep.as_str()) {
                *count -= 1;
                if *count == 0 {
                    queue.push_back(dep.as_str());
                }
            }
        }
    }

    let has_cycles = order.len() != in_degree.len();
    if has_cycles {
        let emitted: FxHashSet<&str> = order.iter().map(String::as_str).collect();
        let remainder: Vec<_> = graph
            .node_keys()
            .iter()
            .filter(|key| scope.contains(key.as_str()) && !emitted.contains(key.as_str()))
            .cloned()
            .collect();
        drop(emitted);
        order.extend(remainder);
    }

    (order, has_cycles)
}

/// Longest path within `scope`, relaxed along the scoped topological
/// order; ties break by insertion order.
fn scoped_critical_path(
    graph: &DependencyGraph,
    scope: &FxHashSet<&str>,
    topo_order: &[NodeKey],
) -> Vec<NodeKey> {
    if topo_order.is_empty() {
        return Vec::new();
    }

    let mut longest: FxHashMap<&str, usize> = FxHashMap::default();
    let mut predecessor: FxHashMap<&str, &str> = FxHashMap::default();
    for key in topo_order {
        longest.insert(key.as_str(), 0);
    }

    for node in topo_order {
        let node_len = longest.get(node.as_str()).copied().unwrap_or(0);
        for dep in graph.dependencies(node) {
            if !scope.contains(dep.as_str()) {
                continue;
            }
            let dep_len = longest.get(dep.as_str()).copied().unwrap_or(0);
            if dep_len < node_len + 1 {
                longest.insert(dep.as_str(), node_len + 1);
                predecessor.insert(dep.as_str(), node.as_str());
            }
        }
    }

    let mut end: Option<&str> = None;
    let mut best = 0usize;
    for key in graph.node_keys() {
        if !scope.contains(key.as_str()) {
            continue;
        }
        let len = longest.get(key.as_str()).copied().unwrap_or(0);
        if end.is_none() || len > best {
            end = Some(key.as_str());
            best = len;
        }
    }

    let mut path = Vec::new();
    let mut current = end;
    let mut guard = scope.len() + 1;
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

/// Kahn levels within `scope`: every zero-in-degree node forms a level,
/// remove the level, repeat. A cyclic remainder becomes one last level.
pub(crate) fn level_groups_for(graph: &DependencyGraph, scope: &FxHashSet<&str>) -> Vec<Vec<NodeKey>> {
    let mut in_degree: FxHashMap<&str, usize> = FxHashMap::default();
    for key in graph.node_keys() {
        if scope.contains(key.as_str()) {
            in_degree.insert(key.as_str(), 0);
        }
    }
    for (source, target, _) in graph.all_edges() {
        if scope.contains(source.as_str()) && scope.contains(target.as_str()) {
            if let Some(count) = in_degree.get_mut(target.as_str()) {
                *count += 1;
            }
        }
    }

    let mut levels: Vec<Vec<NodeKey>> = Vec::new();
    let mut remaining = in_degree.len();
    let mut current: Vec<&str> = graph
        .node_keys()
        .iter()
        .map(String::as_str)
        .filter(|k| in_degree.get(k) == Some(&0))
        .collect();

    while !current.is_empty() {
        remaining -= current.len();
        let mut next: Vec<&str> = Vec::new();
        for node in &current {
            for dep in graph.dependencies(node) {
                if !scope.contains(dep.as_str()) {
                    continue;
                }
                if let Some(count) = in_degree.get_mut(dep.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        next.push(dep.as_str());
                    }
                }
            }
        }
        levels.push(current.iter().map(|k| k.to_string()).collect());
        current = next;
    }

    if remaining > 0 {
        // Cycle members never reach zero in-degree; emit them together.
        let placed: FxHashSet<&str> = levels
            .iter()
            .flat_map(|level| level.iter().map(String::as_str))
            .collect();
        let leftover: Vec<NodeKey> = graph
            .node_keys()
            .iter()
            .filter(|k| scope.contains(k.as_str()) && !placed.contains(k.as_str()))
            .cloned()
            .collect();
        if !leftover.is_empty() {
            warn!(count = leftover.len(), "cyclic nodes grouped into final level");
            levels.push(leftover);
        }
    }

    levels
}

/// Identify independent build opportunities over the whole graph.
pub fn parallel_opportunities(graph: &DependencyGraph) -> ParallelOpportunities {
    ParallelOpportunities {
        independent_components: connected_components(graph),
        parallel_paths: parallel_paths(graph),
    }
}

/// Connected components of the underlying undirected graph.
fn connected_components(graph: &DependencyGraph) -> Vec<Vec<NodeKey>> {
    let mut components = Vec::new();
    let mut visited: FxHashSet<&str> = FxHashSet::default();

    for root in graph.node_keys() {
        if visited.contains(root.as_str()) {
            continue;
        }
        let mut component = Vec::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(root.as_str());
        visited.insert(root.as_str());

        while let Some(node) = queue.pop_front() {
            component.push(node.to_string());
            for neighbour in graph
                .dependencies(node)
                .into_iter()
                .chain(graph.dependents(node))
            {
                if visited.insert(neighbour.as_str()) {
                    queue.push_back(neighbour.as_str());
                }
            }
        }
        components.push(component);
    }

    components
}

/// For each node with more than one dependency, walk each dependency
/// toward a leaf following first dependencies, guarding against cycles.
fn parallel_paths(graph: &DependencyGraph) -> Vec<Vec<NodeKey>> {
    let mut paths = Vec::new();

    for node in graph.node_keys() {
        let deps = graph.dependencies(node);
        if deps.len() <= 1 {
            continue;
        }
        for seed in deps {
            let mut path = vec![node.clone(), seed.clone()];
            let mut visited: FxHashSet<&str> = FxHashSet::default();
            visited.insert(node.as_str());
            visited.insert(seed.as_str());

            let mut current = seed.as_str();
            loop {
                let next = graph
                    .dependencies(current)
                    .into_iter()
                    .find(|d| !visited.contains(d.as_str()));
                match next {
                    Some(next) => {
                        visited.insert(next.as_str());
                        path.push(next.clone());
                        current = next.as_str();
                    }
                    None => break,
                }
            }
            paths.push(path);
        }
    }

    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeguard_core::{EdgeKind, EdgeMeta, NodeKind, NodeMeta};

    fn file_graph() -> DependencyGraph {
        // fileZ -> fileX -> libY  (imports)
        let mut g = DependencyGraph::new();
        g.add_node("file:libY", NodeMeta::new(NodeKind::File).with_path("libY"));
        g.add_node("file:fileX", NodeMeta::new(NodeKind::File).with_path("fileX"));
        g.add_node("file:fileZ", NodeMeta::new(NodeKind::File).with_path("fileZ"));
        g.add_edge("file:fileX", "file:libY", EdgeMeta::new(EdgeKind::Import));
        g.add_edge("file:fileZ", "file:fileX", EdgeMeta::new(EdgeKind::Import));
        g
    }

    #[test]
    fn impact_propagates_to_dependents() {
        let g = file_graph();
        let affected = affected_nodes(&g, &["libY".to_string()]);
        let mut sorted = affected.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["file:fileX", "file:fileZ", "file:libY"]);
    }

    #[test]
    fn unchanged_leaf_affects_only_itself() {
        let g = file_graph();
        let affected = affected_nodes(&g, &["fileZ".to_string()]);
        assert_eq!(affected, vec!["file:fileZ"]);
    }

    #[test]
    fn plan_without_changes_covers_whole_graph() {
        let g = file_graph();
        let plan = plan_build(&g, None, 4);
        assert_eq!(plan.metrics.total_nodes, 3);
        assert_eq!(plan.build_order.len(), 3);
        assert!(!plan.has_cycles);
        assert_eq!(plan.critical_path.len(), 3);
    }

    #[test]
    fn empty_graph_yields_empty_plan() {
        let plan = plan_build(&DependencyGraph::new(), None, 4);
        assert!(plan.affected.is_empty());
        assert_eq!(plan.metrics.estimated_time, 0);
    }

    #[test]
    fn levels_are_mutually_independent() {
        let mut g = DependencyGraph::new();
        g.add_edge("a", "c", EdgeMeta::default());
        g.add_edge("b", "c", EdgeMeta::default());
        g.add_edge("c", "d", EdgeMeta::default());
        let plan = plan_build(&g, None, 4);
        assert_eq!(plan.parallel_groups.len(), 3);
        assert_eq!(plan.parallel_groups[0], vec!["a", "b"]);
        assert_eq!(plan.parallel_groups[1], vec!["c"]);
        assert_eq!(plan.parallel_groups[2], vec!["d"]);
    }

    #[test]
    fn execution_plan_respects_job_cap() {
        let mut g = DependencyGraph::new();
        for i in 0..5 {
            g.add_node(format!("n{}", i), NodeMeta::default());
        }
        let plan = plan_build(&g, None, 2);
        assert_eq!(plan.parallel_groups.len(), 1);
        assert_eq!(plan.execution_plan.len(), 3);
        assert_eq!(plan.metrics.estimated_time, 3);
        assert!(plan.execution_plan.iter().all(|batch| batch.len() <= 2));
    }

    #[test]
    fn cyclic_subgraph_flagged() {
        let mut g = DependencyGraph::new();
        g.add_edge("a", "b", EdgeMeta::default());
        g.add_edge("b", "a", EdgeMeta::default());
        let plan = plan_build(&g, None, 4);
        assert!(plan.has_cycles);
        assert_eq!(plan.build_order.len(), 2);
        assert_eq!(plan.parallel_groups.len(), 1);
    }

    #[test]
    fn components_split_disconnected_work() {
        let mut g = DependencyGraph::new();
        g.add_edge("a", "b", EdgeMeta::default());
        g.add_edge("x", "y", EdgeMeta::default());
        g.add_node("lonely", NodeMeta::default());

        let opportunities = parallel_opportunities(&g);
        assert_eq!(opportunities.independent_components.len(), 3);
        let buildable: Vec<_> = opportunities
            .independent_components
            .iter()
            .filter(|c| c.len() > 1)
            .collect();
        assert_eq!(buildable.len(), 2);
    }

    #[test]
    fn parallel_paths_seed_from_fanout() {
        let mut g = DependencyGraph::new();
        g.add_edge("root", "left", EdgeMeta::default());
        g.add_edge("root", "right", EdgeMeta::default());
        g.add_edge("left", "leaf", EdgeMeta::default());

        let opportunities = parallel_opportunities(&g);
        assert_eq!(opportunities.parallel_paths.len(), 2);
        assert!(opportunities
            .parallel_paths
            .contains(&vec!["root".to_string(), "left".to_string(), "leaf".to_string()]));
        assert!(opportunities
            .parallel_paths
            .contains(&vec!["root".to_string(), "right".to_string()]));
    }
}
