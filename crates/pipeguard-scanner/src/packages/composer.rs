use super::{add_dependency, read_manifest, with_project_root};
use crate::records::{DependencyScope, PackageManager, PackageRecords};
use pipeguard_core::{package_key, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

pub fn scan(root: &Path, files: &[PathBuf]) -> Result<PackageRecords> {
    let mut records = with_project_root(PackageManager::Composer, root);

    for file in files {
        let content = match read_manifest(file) {
            Ok(c) => c,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "unreadable manifest; skipped");
                continue;
            }
        };
        let Ok(manifest) = serde_json::from_str::<Value>(&content) else {
            warn!(file = %file.display(), "invalid composer.json; skipped");
            continue;
        };

        collect_section(&mut records, &manifest, "require", DependencyScope::Direct, file);
        collect_section(&mut records, &manifest, "require-dev", DependencyScope::Dev, file);
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
    let Some(requirements) = manifest.get(section).and_then(Value::as_object) else {
        return;
    };
    for (name, version) in requirements {
        // Platform requirements (php itself, extensions) are not packages.
        if name == "php" || name.starts_with("ext-") || name.starts_with("lib-") {
            continue;
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn platform_requirements_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("composer.json");
        fs::write(
            &manifest,
            r#"{"require": {"php": ">=8.1", "ext-json": "*", "monolog/monolog": "^3.0"},
                "require-dev": {"phpunit/phpunit": "^10.0"}}"#,
        )
        .unwrap();

        let records = scan(dir.path(), &[manifest]).unwrap();
        let keys: Vec<&str> = records.nodes.iter().map(|n| n.key.as_str()).collect();
        assert!(keys.contains(&"package:monolog/monolog"));
        assert!(!keys.contains(&"package:php"));
        assert!(!keys.contains(&"package:ext-json"));

        let phpunit = records
            .edges
            .iter()
            .find(|e| e.target == "package:phpunit/phpunit")
            .unwrap();
        assert_eq!(phpunit.scope, DependencyScope::Dev);
    }
}
