use super::{add_dependency, read_manifest, tool::run_tree_tool, with_project_root};
use crate::records::{DependencyScope, PackageEdgeRecord, PackageManager, PackageRecords};
use once_cell::sync::Lazy;
use pipeguard_core::{package_key, Result};
use regex::Regex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

static REQUIREMENT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9][A-Za-z0-9._-]*)\s*(?:\[[^\]]*\])?\s*(?:[=<>!~]=?\s*([^#;,\s]+))?")
        .expect("static pattern")
});

static SETUP_REQUIRES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"install_requires\s*=\s*\[([^\]]*)\]").expect("static pattern")
});

static QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"['"]([^'"]+)['"]"#).expect("static pattern"));

pub async fn scan(root: &Path, files: &[PathBuf], timeout: Duration) -> Result<PackageRecords> {
    let mut records = with_project_root(PackageManager::Pip, root);

    for file in files {
        let name = file.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let content = match read_manifest(file) {
            Ok(c) => c,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "unreadable manifest; skipped");
                continue;
            }
        };

        if name.starts_with("requirements") {
            parse_requirements(&mut records, &content, file);
        } else if name == "setup.py" {
            parse_setup_py(&mut records, &content, file);
        } else if name == "pyproject.toml" {
            parse_pyproject(&mut records, &content, file);
        }
    }

    // Transitive closure via pipdeptree, when present.
    if let Some(output) = run_tree_tool("pipdeptree", &["--json-tree"], root, timeout).await {
        if let Ok(tree) = serde_json::from_str::<Value>(&output) {
            ingest_pipdeptree(&mut records, &tree);
        }
    }

    Ok(records)
}

fn parse_requirements(records: &mut PackageRecords, content: &str, file: &Path) {
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
            continue;
        }
        if let Some(capture) = REQUIREMENT_LINE.captures(line) {
            let name = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
            if name.is_empty() {
                continue;
            }
            let version = capture.get(2).map(|m| m.as_str());
            add_dependency(
                records,
                package_key(name),
                name,
                version,
                DependencyScope::Direct,
                Some(file),
            );
        }
    }
}

fn parse_setup_py(records: &mut PackageRecords, content: &str, file: &Path) {
    let Some(capture) = SETUP_REQUIRES.captures(content) else {
        return;
    };
    let body = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
    for spec in QUOTED.captures_iter(body) {
        let requirement = spec.get(1).map(|m| m.as_str()).unwrap_or_default();
        if let Some(capture) = REQUIREMENT_LINE.captures(requirement) {
            let name = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
            if name.is_empty() {
                continue;
            }
            add_dependency(
                records,
                package_key(name),
                name,
                capture.get(2).map(|m| m.as_str()),
                DependencyScope::Direct,
                Some(file),
            );
        }
    }
}

fn parse_pyproject(records: &mut PackageRecords, content: &str, file: &Path) {
    let Ok(document) = content.parse::<toml::Value>() else {
        warn!(file = %file.display(), "invalid pyproject.toml; skipped");
        return;
    };
    let dependencies = document
        .get("project")
        .and_then(|p| p.get("dependencies"))
        .and_then(|d| d.as_array());
    let Some(dependencies) = dependencies else {
        return;
    };
    for entry in dependencies {
        let Some(requirement) = entry.as_str() else {
            continue;
        };
        if let Some(capture) = REQUIREMENT_LINE.captures(requirement) {
            let name = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
            if name.is_empty() {
                continue;
            }
            add_dependency(
                records,
                package_key(name),
                name,
                capture.get(2).map(|m| m.as_str()),
                DependencyScope::Direct,
                Some(file),
            );
        }
    }
}

/// Walk the pipdeptree forest with an explicit stack, recording each
/// package and the parent→child edges as transitive closure data.
fn ingest_pipdeptree(records: &mut PackageRecords, tree: &Value) {
    let Some(roots) = tree.as_array() else {
        return;
    };

    let mut stack: Vec<&Value> = roots.iter().collect();
    while let Some(entry) = stack.pop() {
        let package = entry.get("package").unwrap_or(entry);
        let name = package
            .get("key")
            .or_else(|| package.get("package_name"))
            .and_then(Value::as_str);
        let Some(name) = name else {
            continue;
        };
        let version = package.get("installed_version").and_then(Value::as_str);
        let parent_key = package_key(name);
        add_dependency(
            records,
            parent_key.clone(),
            name,
            version,
            DependencyScope::Transitive,
            None,
        );

        if let Some(children) = entry.get("dependencies").and_then(Value::as_array) {
            for child in children {
                let child_pkg = child.get("package").unwrap_or(child);
                let child_name = child_pkg
                    .get("key")
                    .or_else(|| child_pkg.get("package_name"))
                    .and_then(Value::as_str);
                if let Some(child_name) = child_name {
                    let child_version =
                        child_pkg.get("installed_version").and_then(Value::as_str);
                    let child_key = package_key(child_name);
                    add_dependency(
                        records,
                        child_key.clone(),
                        child_name,
                        child_version,
                        DependencyScope::Transitive,
                        None,
                    );
                    records.push_edge(PackageEdgeRecord {
                        source: parent_key.clone(),
                        target: child_key,
                        scope: DependencyScope::Transitive,
                        version: child_version.map(|v| v.to_string()),
                        declared_in: None,
                    });
                }
                stack.push(child);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeguard_core::PROJECT_PACKAGE_KEY;
    use std::fs;

    #[tokio::test]
    async fn requirements_direct_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let req = dir.path().join("requirements.txt");
        fs::write(
            &req,
            "# comment\nrequests==2.31.0\nflask>=2.0\npyyaml\n-r other.txt\n",
        )
        .unwrap();

        let records = scan(dir.path(), &[req], Duration::from_millis(10))
            .await
            .unwrap();

        let keys: Vec<&str> = records.nodes.iter().map(|n| n.key.as_str()).collect();
        assert!(keys.contains(&"package:requests"));
        assert!(keys.contains(&"package:flask"));
        assert!(keys.contains(&"package:pyyaml"));
        assert!(keys.contains(&PROJECT_PACKAGE_KEY));

        let edge = records
            .edges
            .iter()
            .find(|e| e.target == "package:requests")
            .unwrap();
        assert_eq!(edge.source, PROJECT_PACKAGE_KEY);
        assert_eq!(edge.scope, DependencyScope::Direct);
        assert_eq!(edge.version.as_deref(), Some("2.31.0"));
    }

    #[tokio::test]
    async fn pyproject_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("pyproject.toml");
        fs::write(
            &manifest,
            "[project]\nname = \"demo\"\ndependencies = [\"httpx>=0.27\", \"rich\"]\n",
        )
        .unwrap();

        let records = scan(dir.path(), &[manifest], Duration::from_millis(10))
            .await
            .unwrap();
        let keys: Vec<&str> = records.nodes.iter().map(|n| n.key.as_str()).collect();
        assert!(keys.contains(&"package:httpx"));
        assert!(keys.contains(&"package:rich"));
    }

    #[test]
    fn pipdeptree_forest_ingested() {
        let mut records = with_project_root(PackageManager::Pip, Path::new("/p"));
        let tree: Value = serde_json::from_str(
            r#"[{"package": {"key": "flask", "installed_version": "2.0.1"},
                 "dependencies": [{"package": {"key": "jinja2", "installed_version": "3.1.0"},
                                   "dependencies": []}]}]"#,
        )
        .unwrap();
        ingest_pipdeptree(&mut records, &tree);

        assert!(records.nodes.iter().any(|n| n.key == "package:jinja2"));
        let edge = records
            .edges
            .iter()
            .find(|e| e.source == "package:flask")
            .unwrap();
        assert_eq!(edge.target, "package:jinja2");
        assert_eq!(edge.scope, DependencyScope::Transitive);
    }
}
