use pipeguard_core::{
    class_key, file_key, function_key, language_from_path, EdgeKind, EdgeMeta, NodeKind, NodeMeta,
};
use pipeguard_graph::DependencyGraph;
use pipeguard_scanner::{CallKind, CodeScan, DependencyScope, PackageRecords};
use rustc_hash::FxHashMap;
use serde_json::json;
use tracing::debug;

/// Merge language and package scanner outputs into one dependency
/// graph.
///
/// Materialization rules:
/// - files become `file:<relpath>` nodes;
/// - a resolved import becomes an `import` edge between file nodes;
/// - a call resolved to a definition in file B becomes a
///   `function:<name>:<B>` node plus two edges, caller → function
///   (`function_call`) and function → B (`custom`, defined_in);
/// - a class becomes `class:<name>:<file>` linked to its defining file
///   and to each known parent class by an `inheritance` edge;
/// - package records keep the scanner's direct/transitive flag.
pub fn assemble(code: &CodeScan, packages: &[PackageRecords]) -> DependencyGraph {
    let mut graph = DependencyGraph::new();

    // Definition indexes across the whole scan, used to resolve call
    // targets and class parents. First definition wins.
    let mut function_index: FxHashMap<&str, &str> = FxHashMap::default();
    let mut class_index: FxHashMap<&str, &str> = FxHashMap::default();
    for file in &code.files {
        for function in &file.functions {
            function_index.entry(function.as_str()).or_insert(&file.path);
        }
        for class in &file.classes {
            class_index.entry(class.name.as_str()).or_insert(&file.path);
        }
    }

    for file in &code.files {
        let file_node = file_key(&file.path);
        add_file_node(&mut graph, &file.path);

        for import in &file.imports {
            let Some(resolved) = &import.resolved else {
                continue;
            };
            add_file_node(&mut graph, resolved);
            graph.add_edge(
                file_node.clone(),
                file_key(resolved),
                EdgeMeta::new(EdgeKind::Import).with_attr("name", json!(import.name)),
            );
        }

        for call in &file.calls {
            let definition_name = match call.kind {
                CallKind::Function => call.name.as_str(),
                CallKind::Method => call.name.rsplit('.').next().unwrap_or(call.name.as_str()),
            };
            let Some(defining_file) = function_index.get(definition_name).copied() else {
                continue;
            };

            add_file_node(&mut graph, defining_file);
            let function_node = function_key(definition_name, defining_file);
            let mut function_meta = NodeMeta::new(NodeKind::Function)
                .with_path(defining_file)
                .with_attr("name", json!(definition_name));
            if let Some(language) = language_from_path(defining_file) {
                function_meta.language = Some(language.to_string());
            }
            graph.add_node(function_node.clone(), function_meta);

            graph.add_edge(
                file_node.clone(),
                function_node.clone(),
                EdgeMeta::new(EdgeKind::FunctionCall).with_attr("call", json!(call.name)),
            );
            graph.add_edge(
                function_node,
                file_key(defining_file),
                EdgeMeta::new(EdgeKind::Custom).with_attr("relationship", json!("defined_in")),
            );
        }

        for class in &file.classes {
            let class_node = class_key(&class.name, &file.path);
            graph.add_node(
                class_node.clone(),
                NodeMeta::new(NodeKind::Class)
                    .with_path(&file.path)
                    .with_attr("name", json!(class.name)),
            );
            graph.add_edge(
                class_node.clone(),
                file_node.clone(),
                EdgeMeta::new(EdgeKind::Custom).with_attr("relationship", json!("defined_in")),
            );

            for parent in &class.parents {
                let Some(parent_file) = class_index.get(parent.as_str()).copied() else {
                    continue;
                };
                let parent_node = class_key(parent, parent_file);
                graph.add_node(
                    parent_node.clone(),
                    NodeMeta::new(NodeKind::Class)
                        .with_path(parent_file)
                        .with_attr("name", json!(parent)),
                );
                graph.add_edge(
                    class_node.clone(),
                    parent_node,
                    EdgeMeta::new(EdgeKind::Inheritance),
                );
            }
        }
    }

    for records in packages {
        for node in &records.nodes {
            let mut meta = NodeMeta::new(NodeKind::Package);
            meta.attributes = node.attributes.clone();
            graph.add_node(node.key.clone(), meta);
        }
        for edge in &records.edges {
            let mut meta = EdgeMeta::new(EdgeKind::Package);
            meta.is_direct = !matches!(edge.scope, DependencyScope::Transitive);
            if let Some(version) = &edge.version {
                meta.attributes.insert("version".to_string(), json!(version));
            }
            if let Some(declared_in) = &edge.declared_in {
                meta.attributes
                    .insert("source".to_string(), json!(declared_in));
            }
            graph.add_edge(edge.source.clone(), edge.target.clone(), meta);
        }
    }

    debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "assembled dependency graph"
    );
    graph
}

fn add_file_node(graph: &mut DependencyGraph, path: &str) {
    let key = file_key(path);
    if graph.contains_node(&key) {
        return;
    }
    let mut meta = NodeMeta::new(NodeKind::File).with_path(path);
    if let Some(language) = language_from_path(path) {
        meta.language = Some(language.to_string());
    }
    graph.add_node(key, meta);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeguard_scanner::{CallRecord, ClassRecord, FileScan, ImportKind, ImportRecord};

    fn import(name: &str, resolved: Option<&str>) -> ImportRecord {
        ImportRecord {
            name: name.to_string(),
            alias: None,
            kind: ImportKind::Absolute,
            resolved: resolved.map(|r| r.to_string()),
        }
    }

    #[test]
    fn resolved_imports_link_files() {
        let code = CodeScan {
            files: vec![FileScan {
                path: "app.py".into(),
                language: Some("python".into()),
                imports: vec![import("utils", Some("utils.py")), import("os", None)],
                ..Default::default()
            }],
            failed: vec![],
        };

        let graph = assemble(&code, &[]);
        assert!(graph.contains_node("file:app.py"));
        assert!(graph.contains_node("file:utils.py"));
        let edge = graph.get_edge("file:app.py", "file:utils.py").unwrap();
        assert_eq!(edge.kind, EdgeKind::Import);
        // unresolved import adds no node
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn calls_materialize_function_nodes_with_two_edges() {
        let code = CodeScan {
            files: vec![
                FileScan {
                    path: "lib.py".into(),
                    language: Some("python".into()),
                    functions: vec!["helper".into()],
                    ..Default::default()
                },
                FileScan {
                    path: "app.py".into(),
                    language: Some("python".into()),
                    calls: vec![CallRecord {
                        name: "helper".into(),
                        kind: CallKind::Function,
                        object: None,
                    }],
                    ..Default::default()
                },
            ],
            failed: vec![],
        };

        let graph = assemble(&code, &[]);
        let function_node = "function:helper:lib.py";
        assert_eq!(
            graph.get_node(function_node).unwrap().kind,
            NodeKind::Function
        );
        assert_eq!(
            graph.get_edge("file:app.py", function_node).unwrap().kind,
            EdgeKind::FunctionCall
        );
        let defined_in = graph.get_edge(function_node, "file:lib.py").unwrap();
        assert_eq!(defined_in.kind, EdgeKind::Custom);
        assert_eq!(
            defined_in.attributes.get("relationship").unwrap(),
            "defined_in"
        );
    }

    #[test]
    fn class_hierarchy_with_inheritance_edges() {
        let code = CodeScan {
            files: vec![
                FileScan {
                    path: "base.py".into(),
                    classes: vec![ClassRecord {
                        name: "Base".into(),
                        parents: vec![],
                    }],
                    ..Default::default()
                },
                FileScan {
                    path: "impl.py".into(),
                    classes: vec![ClassRecord {
                        name: "Impl".into(),
                        parents: vec!["Base".into(), "External".into()],
                    }],
                    ..Default::default()
                },
            ],
            failed: vec![],
        };

        let graph = assemble(&code, &[]);
        assert_eq!(
            graph
                .get_edge("class:Impl:impl.py", "class:Base:base.py")
                .unwrap()
                .kind,
            EdgeKind::Inheritance
        );
        // unknown parent is skipped
        assert!(graph
            .node_keys()
            .iter()
            .all(|k| !k.contains("External")));
    }
}
