use crate::collect::relative_key;
use crate::records::{CallKind, CallRecord, ClassRecord, FileScan, ImportKind, ImportRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

// Regex extraction is an accepted approximation for JS/TS: it catches
// the syntactic superset a simple reader would, not every dynamic form.
static ES6_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"import\s+(?:\{([^}]*)\}\s+from\s+)?(?:([A-Za-z_$][\w$]*)\s*,?\s*(?:\{([^}]*)\})?\s+from\s+)?['"]([^'"]+)['"]"#,
    )
    .expect("static pattern")
});

static REQUIRE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?:const|let|var)\s+(?:\{([^}]*)\}|([A-Za-z_$][\w$]*))\s*=\s*require\(\s*['"]([^'"]+)['"]\s*\)"#,
    )
    .expect("static pattern")
});

static NAMED_SPEC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z_$][\w$]*)(?:\s+as\s+([A-Za-z_$][\w$]*))?").expect("static pattern")
});

static DESTRUCTURE_SPEC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z_$][\w$]*)(?:\s*:\s*([A-Za-z_$][\w$]*))?").expect("static pattern")
});

static METHOD_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Za-z_$][\w$]*)\.([A-Za-z_$][\w$]*)\s*\(").expect("static pattern")
});

static FUNCTION_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^.\w$])([A-Za-z_$][\w$]*)\s*\(").expect("static pattern")
});

static CLASS_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"class\s+([A-Za-z_$][\w$]*)(?:\s+extends\s+([A-Za-z_$][\w$.]*))?")
        .expect("static pattern")
});

static FUNCTION_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"function\s+([A-Za-z_$][\w$]*)\s*\(").expect("static pattern")
});

static ARROW_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*=>",
    )
    .expect("static pattern")
});

const CALL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "function", "return", "typeof", "await", "async",
    "new", "import", "require", "super", "constructor",
];

/// Extract imports, calls, classes and function declarations from a
/// JavaScript or TypeScript source file.
pub fn scan(root: &Path, path: &Path, content: &str) -> FileScan {
    let language = match path.extension().and_then(|e| e.to_str()) {
        Some("ts") | Some("tsx") => "typescript",
        _ => "javascript",
    };

    let mut scan = FileScan {
        path: relative_key(root, path),
        language: Some(language.to_string()),
        ..Default::default()
    };

    let file_dir = path.parent().unwrap_or(root);

    for capture in ES6_IMPORT.captures_iter(content) {
        let leading_named = capture.get(1).map(|m| m.as_str());
        let default_import = capture.get(2).map(|m| m.as_str());
        let trailing_named = capture.get(3).map(|m| m.as_str());
        let module = match capture.get(4) {
            Some(m) => m.as_str(),
            None => continue,
        };
        let resolved = resolve_module(module, file_dir, root);

        if let Some(default_import) = default_import {
            scan.imports.push(ImportRecord {
                name: module.to_string(),
                alias: Some(default_import.to_string()),
                kind: ImportKind::Default,
                resolved: resolved.clone(),
            });
        }
        for named in [leading_named, trailing_named].into_iter().flatten() {
            for spec in NAMED_SPEC.captures_iter(named) {
                let name = spec.get(1).map(|m| m.as_str()).unwrap_or_default();
                if name == "as" || name.is_empty() {
                    continue;
                }
                scan.imports.push(ImportRecord {
                    name: format!("{}.{}", module, name),
                    alias: spec.get(2).map(|m| m.as_str().to_string()),
                    kind: ImportKind::Named,
                    resolved: resolved.clone(),
                });
            }
        }
        if default_import.is_none() && leading_named.is_none() && trailing_named.is_none() {
            scan.imports.push(ImportRecord {
                name: module.to_string(),
                alias: None,
                kind: ImportKind::SideEffect,
                resolved,
            });
        }
    }

    for capture in REQUIRE.captures_iter(content) {
        let destructured = capture.get(1).map(|m| m.as_str());
        let binding = capture.get(2).map(|m| m.as_str());
        let module = match capture.get(3) {
            Some(m) => m.as_str(),
            None => continue,
        };
        let resolved = resolve_module(module, file_dir, root);

        if let Some(binding) = binding {
            scan.imports.push(ImportRecord {
                name: module.to_string(),
                alias: Some(binding.to_string()),
                kind: ImportKind::Require,
                resolved: resolved.clone(),
            });
        }
        if let Some(destructured) = destructured {
            for spec in DESTRUCTURE_SPEC.captures_iter(destructured) {
                let name = spec.get(1).map(|m| m.as_str()).unwrap_or_default();
                if name.is_empty() {
                    continue;
                }
                let alias = spec
                    .get(2)
                    .map(|m| m.as_str().to_string())
                    .or_else(|| Some(name.to_string()));
                scan.imports.push(ImportRecord {
                    name: format!("{}.{}", module, name),
                    alias,
                    kind: ImportKind::Require,
                    resolved: resolved.clone(),
                });
            }
        }
    }

    let mut method_receivers = Vec::new();
    for capture in METHOD_CALL.captures_iter(content) {
        let object = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
        let method = capture.get(2).map(|m| m.as_str()).unwrap_or_default();
        if object.is_empty() || method.is_empty() || CALL_KEYWORDS.contains(&object) {
            continue;
        }
        method_receivers.push(method.to_string());
        scan.calls.push(CallRecord {
            name: format!("{}.{}", object, method),
            kind: CallKind::Method,
            object: Some(object.to_string()),
        });
    }
    for capture in FUNCTION_CALL.captures_iter(content) {
        let name = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
        if name.is_empty()
            || CALL_KEYWORDS.contains(&name)
            || method_receivers.iter().any(|m| m == name)
        {
            continue;
        }
        scan.calls.push(CallRecord {
            name: name.to_string(),
            kind: CallKind::Function,
            object: None,
        });
    }

    for capture in CLASS_DECL.captures_iter(content) {
        let name = match capture.get(1) {
            Some(m) => m.as_str().to_string(),
            None => continue,
        };
        let parents = capture
            .get(2)
            .map(|m| vec![m.as_str().to_string()])
            .unwrap_or_default();
        scan.classes.push(ClassRecord { name, parents });
    }

    for capture in FUNCTION_DECL.captures_iter(content) {
        if let Some(name) = capture.get(1) {
            scan.functions.push(name.as_str().to_string());
        }
    }
    for capture in ARROW_DECL.captures_iter(content) {
        if let Some(name) = capture.get(1) {
            scan.functions.push(name.as_str().to_string());
        }
    }

    scan
}

/// Resolve a relative module path by probing source extensions and
/// directory `index.*` files. Bare specifiers (npm packages) stay
/// unresolved.
fn resolve_module(module: &str, file_dir: &Path, root: &Path) -> Option<String> {
    if !module.starts_with('.') {
        return None;
    }

    let base = file_dir.join(module);
    const EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx"];

    for ext in EXTENSIONS {
        let candidate = base.with_extension(ext);
        if candidate.is_file() {
            return Some(relative_key(root, &candidate));
        }
    }
    if base.is_dir() {
        for ext in EXTENSIONS {
            let candidate = base.join(format!("index.{}", ext));
            if candidate.is_file() {
                return Some(relative_key(root, &candidate));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scan_source(name: &str, source: &str) -> FileScan {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        fs::write(&path, source).unwrap();
        scan(dir.path(), &path, source)
    }

    #[test]
    fn default_and_named_imports() {
        let scan = scan_source(
            "app.js",
            "import React, { useState, useEffect as effect } from 'react';\n",
        );
        assert_eq!(scan.imports.len(), 3);
        assert_eq!(scan.imports[0].kind, ImportKind::Default);
        assert_eq!(scan.imports[0].alias.as_deref(), Some("React"));
        assert_eq!(scan.imports[1].name, "react.useState");
        assert_eq!(scan.imports[2].alias.as_deref(), Some("effect"));
    }

    #[test]
    fn side_effect_import() {
        let scan = scan_source("app.js", "import './styles.css';\n");
        assert_eq!(scan.imports.len(), 1);
        assert_eq!(scan.imports[0].kind, ImportKind::SideEffect);
    }

    #[test]
    fn commonjs_require_forms() {
        let scan = scan_source(
            "app.js",
            "const fs = require('fs');\nconst { join, resolve: res } = require('path');\n",
        );
        assert_eq!(scan.imports.len(), 3);
        assert_eq!(scan.imports[0].name, "fs");
        assert_eq!(scan.imports[0].kind, ImportKind::Require);
        assert_eq!(scan.imports[1].name, "path.join");
        assert_eq!(scan.imports[2].alias.as_deref(), Some("res"));
    }

    #[test]
    fn relative_import_resolves_to_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("util.ts"), "export const x = 1;\n").unwrap();
        let path = dir.path().join("app.ts");
        let source = "import { x } from './util';\n";
        fs::write(&path, source).unwrap();

        let scan = scan(dir.path(), &path, source);
        assert_eq!(scan.imports[0].resolved.as_deref(), Some("util.ts"));
        assert_eq!(scan.language.as_deref(), Some("typescript"));
    }

    #[test]
    fn relative_import_resolves_to_index() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/index.js"), "").unwrap();
        let path = dir.path().join("app.js");
        let source = "const lib = require('./lib');\n";
        fs::write(&path, source).unwrap();

        let scan = scan(dir.path(), &path, source);
        assert_eq!(scan.imports[0].resolved.as_deref(), Some("lib/index.js"));
    }

    #[test]
    fn calls_classified() {
        let scan = scan_source("app.js", "doWork();\nlogger.info('hi');\nif (x) {}\n");
        let names: Vec<&str> = scan.calls.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"doWork"));
        assert!(names.contains(&"logger.info"));
        assert!(!names.contains(&"if"));
    }

    #[test]
    fn classes_and_functions() {
        let scan = scan_source(
            "app.js",
            "class Widget extends Base {}\nfunction render() {}\nconst handler = async (e) => {};\n",
        );
        assert_eq!(scan.classes[0].name, "Widget");
        assert_eq!(scan.classes[0].parents, vec!["Base"]);
        assert!(scan.functions.contains(&"render".to_string()));
        assert!(scan.functions.contains(&"handler".to_string()));
    }
}
