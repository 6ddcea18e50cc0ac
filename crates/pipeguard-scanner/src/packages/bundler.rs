use super::{add_dependency, read_manifest, with_project_root};
use crate::records::{DependencyScope, PackageManager, PackageRecords};
use once_cell::sync::Lazy;
use pipeguard_core::{package_key, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::warn;

static GEM_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*gem\s+['"]([^'"]+)['"](?:\s*,\s*['"]([^'"]+)['"])?"#)
        .expect("static pattern")
});

pub fn scan(root: &Path, files: &[PathBuf]) -> Result<PackageRecords> {
    let mut records = with_project_root(PackageManager::Bundler, root);

    for file in files {
        let content = match read_manifest(file) {
            Ok(c) => c,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "unreadable manifest; skipped");
                continue;
            }
        };
        for line in content.lines() {
            if let Some(capture) = GEM_LINE.captures(line) {
                let name = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
                if name.is_empty() {
                    continue;
                }
                add_dependency(
                    &mut records,
                    package_key(name),
                    name,
                    capture.get(2).map(|m| m.as_str()),
                    DependencyScope::Direct,
                    Some(file),
                );
            }
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn gems_with_and_without_versions() {
        let dir = tempfile::tempdir().unwrap();
        let gemfile = dir.path().join("Gemfile");
        fs::write(
            &gemfile,
            "source 'https://rubygems.org'\n\ngem 'rails', '~> 7.1'\ngem 'puma'\n",
        )
        .unwrap();

        let records = scan(dir.path(), &[gemfile]).unwrap();
        let rails = records
            .edges
            .iter()
            .find(|e| e.target == "package:rails")
            .unwrap();
        assert_eq!(rails.version.as_deref(), Some("~> 7.1"));
        assert!(records.edges.iter().any(|e| e.target == "package:puma"));
    }
}
