use super::{add_dependency, read_manifest, with_project_root};
use crate::records::{DependencyScope, PackageManager, PackageRecords};
use once_cell::sync::Lazy;
use pipeguard_core::{package_key, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::warn;

static PACKAGE_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<PackageReference\s+Include="([^"]+)"(?:\s+Version="([^"]+)")?"#)
        .expect("static pattern")
});

static PACKAGES_CONFIG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<package\s+id="([^"]+)"(?:\s+version="([^"]+)")?"#).expect("static pattern")
});

pub fn scan(root: &Path, files: &[PathBuf]) -> Result<PackageRecords> {
    let mut records = with_project_root(PackageManager::Nuget, root);

    for file in files {
        let content = match read_manifest(file) {
            Ok(c) => c,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "unreadable manifest; skipped");
                continue;
            }
        };

        let pattern = if file
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n == "packages.config")
            .unwrap_or(false)
        {
            &PACKAGES_CONFIG
        } else {
            &PACKAGE_REFERENCE
        };

        for capture in pattern.captures_iter(&content) {
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

    Ok(records)
}
