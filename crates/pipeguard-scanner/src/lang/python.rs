use crate::collect::relative_key;
use crate::records::{CallKind, CallRecord, ClassRecord, FileScan, ImportKind, ImportRecord};
use std::path::{Path, PathBuf};
use tracing::warn;
use tree_sitter::{Node, Parser};

/// Extract imports, calls, classes and function definitions from a
/// Python source file using a full AST parse.
pub fn scan(root: &Path, path: &Path, content: &str) -> FileScan {
    let mut scan = FileScan {
        path: relative_key(root, path),
        language: Some("python".to_string()),
        ..Default::default()
    };

    let mut parser = Parser::new();
    if parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .is_err()
    {
        warn!(path = %path.display(), "python grammar unavailable");
        return scan;
    }

    let Some(tree) = parser.parse(content, None) else {
        warn!(path = %path.display(), "python parse produced no tree");
        return scan;
    };

    let file_dir = path.parent().unwrap_or(root).to_path_buf();
    let source = content.as_bytes();

    // Iterative preorder walk; recursion depth is not bounded by input.
    let mut cursor = tree.walk();
    let mut done = false;
    while !done {
        let node = cursor.node();
        match node.kind() {
            "import_statement" => collect_import(&mut scan, node, source, &file_dir, root),
            "import_from_statement" => {
                collect_from_import(&mut scan, node, source, &file_dir, root)
            }
            "call" => collect_call(&mut scan, node, source),
            "class_definition" => collect_class(&mut scan, node, source),
            "function_definition" => {
                if let Some(name) = field_text(node, "name", source) {
                    scan.functions.push(name);
                }
            }
            _ => {}
        }

        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                done = true;
                break;
            }
        }
    }

    scan
}

fn node_text(node: Node, source: &[u8]) -> Option<String> {
    node.utf8_text(source).ok().map(|s| s.to_string())
}

fn field_text(node: Node, field: &str, source: &[u8]) -> Option<String> {
    node.child_by_field_name(field)
        .and_then(|n| node_text(n, source))
}

/// `import a.b` / `import a.b as c`
fn collect_import(scan: &mut FileScan, node: Node, source: &[u8], file_dir: &Path, root: &Path) {
    let mut walker = node.walk();
    for child in node.named_children(&mut walker) {
        match child.kind() {
            "dotted_name" => {
                if let Some(name) = node_text(child, source) {
                    let resolved = resolve_module(&name, file_dir, root);
                    scan.imports.push(ImportRecord {
                        name,
                        alias: None,
                        kind: ImportKind::Absolute,
                        resolved,
                    });
                }
            }
            "aliased_import" => {
                let name = field_text(child, "name", source);
                let alias = field_text(child, "alias", source);
                if let Some(name) = name {
                    let resolved = resolve_module(&name, file_dir, root);
                    scan.imports.push(ImportRecord {
                        name,
                        alias,
                        kind: ImportKind::Absolute,
                        resolved,
                    });
                }
            }
            _ => {}
        }
    }
}

/// `from x.y import z [as w]`, including relative forms.
fn collect_from_import(
    scan: &mut FileScan,
    node: Node,
    source: &[u8],
    file_dir: &Path,
    root: &Path,
) {
    let Some(module_node) = node.child_by_field_name("module_name") else {
        return;
    };
    let module = node_text(module_node, source).unwrap_or_default();
    let relative = module.starts_with('.');
    let kind = if relative {
        ImportKind::Relative
    } else {
        ImportKind::From
    };
    let resolved = resolve_module(&module, file_dir, root);

    let mut found_name = false;
    let mut walker = node.walk();
    for child in node.named_children(&mut walker) {
        if child.id() == module_node.id() {
            continue;
        }
        match child.kind() {
            "dotted_name" => {
                if let Some(symbol) = node_text(child, source) {
                    found_name = true;
                    scan.imports.push(ImportRecord {
                        name: join_module(&module, &symbol),
                        alias: None,
                        kind,
                        resolved: resolved.clone(),
                    });
                }
            }
            "aliased_import" => {
                let symbol = field_text(child, "name", source);
                let alias = field_text(child, "alias", source);
                if let Some(symbol) = symbol {
                    found_name = true;
                    scan.imports.push(ImportRecord {
                        name: join_module(&module, &symbol),
                        alias,
                        kind,
                        resolved: resolved.clone(),
                    });
                }
            }
            "wildcard_import" => {
                found_name = true;
                scan.imports.push(ImportRecord {
                    name: module.clone(),
                    alias: None,
                    kind,
                    resolved: resolved.clone(),
                });
            }
            _ => {}
        }
    }

    if !found_name && !module.is_empty() {
        scan.imports.push(ImportRecord {
            name: module,
            alias: None,
            kind,
            resolved,
        });
    }
}

fn join_module(module: &str, symbol: &str) -> String {
    if module.is_empty() {
        symbol.to_string()
    } else {
        format!("{}.{}", module, symbol)
    }
}

fn collect_call(scan: &mut FileScan, node: Node, source: &[u8]) {
    let Some(function) = node.child_by_field_name("function") else {
        return;
    };
    match function.kind() {
        "identifier" => {
            if let Some(name) = node_text(function, source) {
                scan.calls.push(CallRecord {
                    name,
                    kind: CallKind::Function,
                    object: None,
                });
            }
        }
        "attribute" => {
            let object = function
                .child_by_field_name("object")
                .filter(|n| n.kind() == "identifier")
                .and_then(|n| node_text(n, source));
            let attr = field_text(function, "attribute", source);
            if let (Some(object), Some(attr)) = (object, attr) {
                scan.calls.push(CallRecord {
                    name: format!("{}.{}", object, attr),
                    kind: CallKind::Method,
                    object: Some(object),
                });
            }
        }
        _ => {}
    }
}

fn collect_class(scan: &mut FileScan, node: Node, source: &[u8]) {
    let Some(name) = field_text(node, "name", source) else {
        return;
    };

    let mut parents = Vec::new();
    if let Some(superclasses) = node.child_by_field_name("superclasses") {
        let mut walker = superclasses.walk();
        for parent in superclasses.named_children(&mut walker) {
            match parent.kind() {
                "identifier" | "attribute" | "dotted_name" => {
                    if let Some(text) = node_text(parent, source) {
                        parents.push(text);
                    }
                }
                _ => {}
            }
        }
    }

    scan.classes.push(ClassRecord { name, parents });
}

/// Resolve a dotted module name to a project file by probing
/// `<dir>/<parts>.py` then `<dir>/<parts>/__init__.py`, walking up
/// toward the project root. Relative modules (leading dots) resolve
/// against the importing file's package.
fn resolve_module(module: &str, file_dir: &Path, root: &Path) -> Option<String> {
    if module.is_empty() {
        return None;
    }

    if let Some(stripped) = module.strip_prefix('.') {
        // One leading dot is the current package, each further dot one up.
        let mut base = file_dir.to_path_buf();
        let extra_dots = stripped.chars().take_while(|c| *c == '.').count();
        for _ in 0..extra_dots {
            base = base.parent()?.to_path_buf();
            if !base.starts_with(root) {
                return None;
            }
        }
        let remainder = &stripped[extra_dots..];
        return probe(&base, remainder, root);
    }

    let mut dir = file_dir.to_path_buf();
    loop {
        if let Some(found) = probe(&dir, module, root) {
            return Some(found);
        }
        if dir == root {
            return None;
        }
        match dir.parent() {
            Some(parent) if parent.starts_with(root) => dir = parent.to_path_buf(),
            _ => return None,
        }
    }
}

fn probe(base: &Path, module: &str, root: &Path) -> Option<String> {
    let mut candidate: PathBuf = base.to_path_buf();
    for part in module.split('.').filter(|p| !p.is_empty()) {
        candidate.push(part);
    }

    let as_file = candidate.with_extension("py");
    if as_file.is_file() {
        return Some(relative_key(root, &as_file));
    }
    let as_package = candidate.join("__init__.py");
    if as_package.is_file() {
        return Some(relative_key(root, &as_package));
    }
    None
}
