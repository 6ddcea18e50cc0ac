use pipeguard_core::{EdgeMeta, NodeKey, NodeMeta, Result};
use rustc_hash::FxHashMap;
use serde_json::{json, Value};

/// Directed labelled dependency graph.
///
/// Nodes are keyed by stable string ids (`file:…`, `package:…`,
/// `function:…:…`). Two adjacency maps are kept consistent at all
/// times: the forward map owns the edge metadata, the reverse map only
/// records source keys. Nodes never hold pointers to their edges.
///
/// Insertion order of nodes is preserved and is the tie-break order for
/// every traversal.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    nodes: FxHashMap<NodeKey, NodeMeta>,
    /// Node keys in insertion order.
    order: Vec<NodeKey>,
    /// source -> [(target, metadata)] in insertion order per source.
    edges: FxHashMap<NodeKey, Vec<(NodeKey, EdgeMeta)>>,
    /// target -> [source] in insertion order per target.
    reverse: FxHashMap<NodeKey, Vec<NodeKey>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Re-adding an existing key replaces its metadata and
    /// keeps its edges and insertion position.
    pub fn add_node(&mut self, key: impl Into<NodeKey>, meta: NodeMeta) {
        let key = key.into();
        if !self.nodes.contains_key(&key) {
            self.order.push(key.clone());
            self.edges.entry(key.clone()).or_default();
            self.reverse.entry(key.clone()).or_default();
        }
        self.nodes.insert(key, meta);
    }

    /// Add an edge, auto-creating missing endpoints with empty metadata.
    /// Edges form a set per (source, target): re-adding replaces the
    /// metadata.
    pub fn add_edge(
        &mut self,
        source: impl Into<NodeKey>,
        target: impl Into<NodeKey>,
        meta: EdgeMeta,
    ) {
        let source = source.into();
        let target = target.into();

        if !self.nodes.contains_key(&source) {
            self.add_node(source.clone(), NodeMeta::default());
        }
        if !self.nodes.contains_key(&target) {
            self.add_node(target.clone(), NodeMeta::default());
        }

        let outgoing = self.edges.entry(source.clone()).or_default();
        if let Some(slot) = outgoing.iter_mut().find(|(t, _)| *t == target) {
            slot.1 = meta;
            return;
        }
        outgoing.push((target.clone(), meta));

        let incoming = self.reverse.entry(target).or_default();
        if !incoming.contains(&source) {
            incoming.push(source);
        }
    }

    /// Remove a node and every incident edge, in both maps.
    pub fn remove_node(&mut self, key: &str) {
        if self.nodes.remove(key).is_none() {
            return;
        }
        self.order.retain(|k| k != key);

        // Outgoing edges: unhook this node from each target's reverse list.
        if let Some(outgoing) = self.edges.remove(key) {
            for (target, _) in outgoing {
                if let Some(incoming) = self.reverse.get_mut(&target) {
                    incoming.retain(|s| s != key);
                }
            }
        }

        // Incoming edges: drop this node from each source's forward list.
        if let Some(incoming) = self.reverse.remove(key) {
            for source in incoming {
                if let Some(outgoing) = self.edges.get_mut(&source) {
                    outgoing.retain(|(t, _)| t != key);
                }
            }
        }
    }

    pub fn remove_edge(&mut self, source: &str, target: &str) {
        if let Some(outgoing) = self.edges.get_mut(source) {
            outgoing.retain(|(t, _)| t != target);
        }
        if let Some(incoming) = self.reverse.get_mut(target) {
            incoming.retain(|s| s != source);
        }
    }

    pub fn get_node(&self, key: &str) -> Option<&NodeMeta> {
        self.nodes.get(key)
    }

    pub fn get_edge(&self, source: &str, target: &str) -> Option<&EdgeMeta> {
        self.edges
            .get(source)?
            .iter()
            .find(|(t, _)| t == target)
            .map(|(_, meta)| meta)
    }

    pub fn contains_node(&self, key: &str) -> bool {
        self.nodes.contains_key(key)
    }

    /// Outgoing neighbours: the nodes `key` depends on.
    pub fn dependencies(&self, key: &str) -> Vec<&NodeKey> {
        self.edges
            .get(key)
            .map(|outgoing| outgoing.iter().map(|(t, _)| t).collect())
            .unwrap_or_default()
    }

    /// Incoming neighbours: the nodes that depend on `key`.
    pub fn dependents(&self, key: &str) -> Vec<&NodeKey> {
        self.reverse
            .get(key)
            .map(|incoming| incoming.iter().collect())
            .unwrap_or_default()
    }

    /// Nodes in insertion order.
    pub fn all_nodes(&self) -> impl Iterator<Item = (&NodeKey, &NodeMeta)> {
        self.order.iter().map(move |k| (k, &self.nodes[k]))
    }

    pub fn node_keys(&self) -> &[NodeKey] {
        &self.order
    }

    /// Edges in source insertion order, then per-source insertion order.
    pub fn all_edges(&self) -> Vec<(&NodeKey, &NodeKey, &EdgeMeta)> {
        let mut result = Vec::new();
        for source in &self.order {
            if let Some(outgoing) = self.edges.get(source) {
                for (target, meta) in outgoing {
                    result.push((source, target, meta));
                }
            }
        }
        result
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Merge another graph into this one. Colliding nodes and edges take
    /// the other graph's metadata.
    pub fn merge(&mut self, other: &DependencyGraph) {
        for (key, meta) in other.all_nodes() {
            self.add_node(key.clone(), meta.clone());
        }
        for (source, target, meta) in other.all_edges() {
            self.add_edge(source.clone(), target.clone(), meta.clone());
        }
    }

    /// Serialize to the stable wire format:
    /// `{"nodes": {key: meta}, "edges": [{"source","target","metadata"}]}`.
    pub fn to_value(&self) -> Result<Value> {
        let mut nodes = serde_json::Map::new();
        for (key, meta) in self.all_nodes() {
            nodes.insert(key.clone(), serde_json::to_value(meta)?);
        }

        let mut edges = Vec::new();
        for (source, target, meta) in self.all_edges() {
            edges.push(json!({
                "source": source,
                "target": target,
                "metadata": serde_json::to_value(meta)?,
            }));
        }

        Ok(json!({ "nodes": nodes, "edges": edges }))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_value()?)?)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let mut graph = Self::new();

        if let Some(nodes) = value.get("nodes").and_then(Value::as_object) {
            for (key, meta) in nodes {
                let meta: NodeMeta = serde_json::from_value(meta.clone())?;
                graph.add_node(key.clone(), meta);
            }
        }

        if let Some(edges) = value.get("edges").and_then(Value::as_array) {
            for edge in edges {
                let source = edge.get("source").and_then(Value::as_str);
                let target = edge.get("target").and_then(Value::as_str);
                if let (Some(source), Some(target)) = (source, target) {
                    let meta = match edge.get("metadata") {
                        Some(m) => serde_json::from_value(m.clone())?,
                        None => EdgeMeta::default(),
                    };
                    graph.add_edge(source, target, meta);
                }
            }
        }

        Ok(graph)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }
}

/// Equality is structural: same node set with same metadata, same edge
/// set with same metadata. Insertion order is not observable here.
impl PartialEq for DependencyGraph {
    fn eq(&self, other: &Self) -> bool {
        if self.nodes != other.nodes {
            return false;
        }
        if self.edge_count() != other.edge_count() {
            return false;
        }
        self.all_edges()
            .into_iter()
            .all(|(s, t, meta)| other.get_edge(s, t) == Some(meta))
    }
}

impl Eq for DependencyGraph {}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeguard_core::{EdgeKind, NodeKind};

    fn sample() -> DependencyGraph {
        let mut g = DependencyGraph::new();
        g.add_node("a", NodeMeta::new(NodeKind::File).with_path("a.py"));
        g.add_node("b", NodeMeta::new(NodeKind::File).with_path("b.py"));
        g.add_edge("a", "b", EdgeMeta::new(EdgeKind::Import));
        g
    }

    #[test]
    fn add_edge_creates_missing_endpoints() {
        let mut g = DependencyGraph::new();
        g.add_edge("x", "y", EdgeMeta::default());
        assert!(g.contains_node("x"));
        assert!(g.contains_node("y"));
        assert_eq!(g.get_node("x").unwrap().kind, NodeKind::Custom);
    }

    #[test]
    fn readding_edge_replaces_metadata() {
        let mut g = sample();
        g.add_edge("a", "b", EdgeMeta::new(EdgeKind::FunctionCall));
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.get_edge("a", "b").unwrap().kind, EdgeKind::FunctionCall);
    }

    #[test]
    fn dependents_mirror_dependencies() {
        let g = sample();
        assert_eq!(g.dependencies("a"), vec!["b"]);
        assert_eq!(g.dependents("b"), vec!["a"]);
        assert!(g.dependencies("b").is_empty());
        assert!(g.dependents("a").is_empty());
    }

    #[test]
    fn remove_node_cascades_both_maps() {
        let mut g = sample();
        g.add_edge("b", "c", EdgeMeta::default());
        g.remove_node("b");
        assert!(!g.contains_node("b"));
        assert!(g.dependencies("a").is_empty());
        assert!(g.dependents("c").is_empty());
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn remove_then_readd_is_idempotent() {
        let mut g = sample();
        let before = g.clone();
        let meta = g.get_node("b").cloned().unwrap();
        g.remove_node("b");
        g.add_node("b", meta);
        g.add_edge("a", "b", EdgeMeta::new(EdgeKind::Import));
        assert_eq!(g, before);
    }

    #[test]
    fn json_round_trip_preserves_structure() {
        let mut g = sample();
        g.add_edge(
            "a",
            "package:requests",
            EdgeMeta::new(EdgeKind::Package)
                .transitive()
                .with_attr("version", "2.31.0"),
        );
        let text = g.to_json().unwrap();
        let restored = DependencyGraph::from_json(&text).unwrap();
        assert_eq!(restored, g);
    }

    #[test]
    fn missing_keys_return_none() {
        let g = sample();
        assert!(g.get_node("nope").is_none());
        assert!(g.get_edge("a", "nope").is_none());
        assert!(g.dependencies("nope").is_empty());
    }

    #[test]
    fn merge_unions_nodes_and_edges() {
        let mut g = sample();
        let mut h = DependencyGraph::new();
        h.add_edge("b", "c", EdgeMeta::new(EdgeKind::Import));
        g.merge(&h);
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.get_edge("b", "c").unwrap().kind, EdgeKind::Import);
    }
}
