use super::{add_dependency, read_manifest, tool::run_tree_tool, with_project_root};
use crate::records::{DependencyScope, PackageEdgeRecord, PackageManager, PackageRecords};
use pipeguard_core::{package_key, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub async fn scan(root: &Path, files: &[PathBuf], timeout: Duration) -> Result<PackageRecords> {
    let mut records = with_project_root(PackageManager::Npm, root);

    for file in files {
        let content = match read_manifest(file) {
            Ok(c) => c,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "unreadable manifest; skipped");
                continue;
            }
        };
        let Ok(manifest) = serde_json::from_str::<Value>(&content) else {
            warn!(file = %file.display(), "invalid package.json; skipped");
            continue;
        };

        collect_section(&mut records, &manifest, "dependencies", DependencyScope::Direct, file);
        collect_section(
            &mut records,
            &manifest,
            "devDependencies",
            DependencyScope::Dev,
            file,
        );
    }

    if let Some(output) =
        run_tree_tool("npm", &["list", "--json", "--all"], root, timeout).await
    {
        if let Ok(tree) = serde_json::from_str::<Value>(&output) {
            ingest_npm_tree(&mut records, &tree);
        }
    }

    Ok(records)
}

fn collect_section(
    records: &mut PackageRecords,
    manifest: &Value,
    section: &str,
    scope: DependencyScope,
    file: &Path,
) {
    let Some(dependencies) = manifest.get(section).and_then(Value::as_object) else {
        return;
    };
    for (name, version) in dependencies {
        add_dependency(
            records,
            package_key(name),
            name,
            version.as_str(),
            scope,
            Some(file),
        );
    }
}

/// `npm list --json` nests dependencies arbitrarily deep; walk with an
/// explicit stack of (parent key, subtree).
fn ingest_npm_tree(records: &mut PackageRecords, tree: &Value) {
    let mut stack: Vec<(Option<String>, &Value)> = vec![(None, tree)];

    while let Some((parent, node)) = stack.pop() {
        let Some(dependencies) = node.get("dependencies").and_then(Value::as_object) else {
            continue;
        };
        for (name, details) in dependencies {
            let version = details.get("version").and_then(Value::as_str);
            let key = package_key(name);
            add_dependency(
                records,
                key.clone(),
                name,
                version,
                DependencyScope::Transitive,
                None,
            );
            if let Some(parent_key) = &parent {
                records.push_edge(PackageEdgeRecord {
                    source: parent_key.clone(),
                    target: key.clone(),
                    scope: DependencyScope::Transitive,
                    version: version.map(|v| v.to_string()),
                    declared_in: None,
                });
            }
            stack.push((Some(key), details));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeguard_core::PROJECT_PACKAGE_KEY;
    use std::fs;

    #[tokio::test]
    async fn direct_and_dev_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("package.json");
        fs::write(
            &manifest,
            r#"{"name": "demo",
                "dependencies": {"express": "^4.18.0"},
                "devDependencies": {"jest": "^29.0.0"}}"#,
        )
        .unwrap();

        let records = scan(dir.path(), &[manifest], Duration::from_millis(10))
            .await
            .unwrap();

        let express = records
            .edges
            .iter()
            .find(|e| e.target == "package:express")
            .unwrap();
        assert_eq!(express.source, PROJECT_PACKAGE_KEY);
        assert_eq!(express.scope, DependencyScope::Direct);

        let jest = records
            .edges
            .iter()
            .find(|e| e.target == "package:jest")
            .unwrap();
        assert_eq!(jest.scope, DependencyScope::Dev);
    }

    #[test]
    fn nested_tree_produces_package_edges() {
        let mut records = with_project_root(PackageManager::Npm, Path::new("/p"));
        let tree: Value = serde_json::from_str(
            r#"{"dependencies": {
                  "express": {"version": "4.18.2",
                              "dependencies": {"accepts": {"version": "1.3.8"}}}}}"#,
        )
        .unwrap();
        ingest_npm_tree(&mut records, &tree);

        let edge = records
            .edges
            .iter()
            .find(|e| e.source == "package:express")
            .unwrap();
        assert_eq!(edge.target, "package:accepts");
        assert_eq!(edge.version.as_deref(), Some("1.3.8"));
    }
}
