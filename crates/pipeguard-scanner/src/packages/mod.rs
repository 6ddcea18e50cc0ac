pub mod bundler;
pub mod cargo;
pub mod composer;
pub mod golang;
pub mod gradle;
pub mod maven;
pub mod npm;
pub mod nuget;
pub mod pip;
pub mod tool;

use crate::records::{
    DependencyScope, PackageEdgeRecord, PackageManager, PackageNodeRecord, PackageRecords,
};
use globset::{Glob, GlobSetBuilder};
use ignore::WalkBuilder;
use pipeguard_core::{AttrMap, Result, PROJECT_PACKAGE_KEY};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Filename globs that betray each package manager.
const MANAGER_PATTERNS: &[(PackageManager, &[&str])] = &[
    (PackageManager::Pip, &["requirements*.txt", "setup.py", "pyproject.toml"]),
    (PackageManager::Npm, &["package.json"]),
    (PackageManager::Maven, &["pom.xml"]),
    (PackageManager::Gradle, &["build.gradle", "build.gradle.kts"]),
    (PackageManager::Cargo, &["Cargo.toml"]),
    (PackageManager::Go, &["go.mod"]),
    (PackageManager::Bundler, &["Gemfile"]),
    (PackageManager::Composer, &["composer.json"]),
    (PackageManager::Nuget, &["*.csproj", "packages.config"]),
];

const SKIP_DIRS: &[&str] = &["node_modules", "target", "vendor", ".git", "venv", ".venv"];

/// Detect package managers used in a project, with the manifest files
/// that triggered each detection.
pub fn detect_managers(root: &Path) -> Vec<(PackageManager, Vec<PathBuf>)> {
    let mut sets = Vec::new();
    for (manager, patterns) in MANAGER_PATTERNS {
        let mut builder = GlobSetBuilder::new();
        for pattern in *patterns {
            if let Ok(glob) = Glob::new(pattern) {
                builder.add(glob);
            }
        }
        match builder.build() {
            Ok(set) => sets.push((*manager, set, Vec::<PathBuf>::new())),
            Err(e) => warn!(manager = manager.as_str(), error = %e, "bad detection globs"),
        }
    }

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .filter_entry(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| !SKIP_DIRS.contains(&name))
                .unwrap_or(true)
        })
        .build();

    for entry in walker.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        for (_, set, files) in sets.iter_mut() {
            if set.is_match(name) {
                files.push(path.to_path_buf());
            }
        }
    }

    sets.into_iter()
        .filter(|(_, _, files)| !files.is_empty())
        .map(|(manager, _, files)| (manager, files))
        .collect()
}

/// Scan every detected package manager. Individual manager failures are
/// logged and skipped; the batch returns whatever succeeded.
pub async fn scan_packages(root: &Path, tool_timeout: Duration) -> Vec<PackageRecords> {
    let detected = detect_managers(root);
    info!(
        managers = ?detected.iter().map(|(m, _)| m.as_str()).collect::<Vec<_>>(),
        "detected package managers"
    );

    let mut results = Vec::new();
    for (manager, files) in detected {
        let scanned = match manager {
            PackageManager::Pip => pip::scan(root, &files, tool_timeout).await,
            PackageManager::Npm => npm::scan(root, &files, tool_timeout).await,
            PackageManager::Maven => maven::scan(root, &files, tool_timeout).await,
            PackageManager::Gradle => gradle::scan(root, &files),
            PackageManager::Cargo => cargo::scan(root, &files),
            PackageManager::Go => golang::scan(root, &files),
            PackageManager::Bundler => bundler::scan(root, &files),
            PackageManager::Composer => composer::scan(root, &files),
            PackageManager::Nuget => nuget::scan(root, &files),
        };
        match scanned {
            Ok(records) => results.push(records),
            Err(e) => warn!(manager = manager.as_str(), error = %e, "package scan failed"),
        }
    }
    results
}

/// Start a record set with the virtual project root node.
pub(crate) fn with_project_root(manager: PackageManager, root: &Path) -> PackageRecords {
    let mut records = PackageRecords::new(manager);
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string());
    let mut attributes = AttrMap::new();
    attributes.insert("name".to_string(), json!(name));
    attributes.insert("type".to_string(), json!("project"));
    records.upsert_node(PackageNodeRecord {
        key: PROJECT_PACKAGE_KEY.to_string(),
        attributes,
    });
    records
}

/// Add a package node and, for direct/dev dependencies, the edge from
/// the project root.
pub(crate) fn add_dependency(
    records: &mut PackageRecords,
    key: String,
    name: &str,
    version: Option<&str>,
    scope: DependencyScope,
    declared_in: Option<&Path>,
) {
    let mut attributes = AttrMap::new();
    attributes.insert("name".to_string(), json!(name));
    attributes.insert("type".to_string(), json!(records.manager.as_str()));
    if let Some(version) = version {
        attributes.insert("version".to_string(), json!(version));
    }
    records.upsert_node(PackageNodeRecord {
        key: key.clone(),
        attributes,
    });

    if matches!(scope, DependencyScope::Direct | DependencyScope::Dev) {
        records.push_edge(PackageEdgeRecord {
            source: PROJECT_PACKAGE_KEY.to_string(),
            target: key,
            scope,
            version: version.map(|v| v.to_string()),
            declared_in: declared_in.map(|p| p.to_string_lossy().to_string()),
        });
    }
}

pub(crate) fn read_manifest(path: &Path) -> Result<String> {
    Ok(std::fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn detection_by_filename_glob() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("requirements-dev.txt"), "").unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        fs::write(dir.path().join("Cargo.toml"), "").unwrap();

        let detected = detect_managers(dir.path());
        let managers: Vec<PackageManager> = detected.iter().map(|(m, _)| *m).collect();
        assert!(managers.contains(&PackageManager::Pip));
        assert!(managers.contains(&PackageManager::Npm));
        assert!(managers.contains(&PackageManager::Cargo));
        assert!(!managers.contains(&PackageManager::Maven));
    }

    #[test]
    fn node_modules_not_scanned_for_manifests() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules/dep")).unwrap();
        fs::write(dir.path().join("node_modules/dep/package.json"), "{}").unwrap();
        assert!(detect_managers(dir.path()).is_empty());
    }
}
