use super::{add_dependency, read_manifest, with_project_root};
use crate::records::{DependencyScope, PackageManager, PackageRecords};
use once_cell::sync::Lazy;
use pipeguard_core::Result;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::warn;

static COORDINATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(implementation|api|compileOnly|runtimeOnly|testImplementation|testRuntimeOnly)\s*\(?\s*['"]([^:'"]+):([^:'"]+):([^'"]+)['"]"#,
    )
    .expect("static pattern")
});

pub fn scan(root: &Path, files: &[PathBuf]) -> Result<PackageRecords> {
    let mut records = with_project_root(PackageManager::Gradle, root);

    for file in files {
        let content = match read_manifest(file) {
            Ok(c) => c,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "unreadable manifest; skipped");
                continue;
            }
        };
        for capture in COORDINATE.captures_iter(&content) {
            let configuration = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
            let group = capture.get(2).map(|m| m.as_str()).unwrap_or_default();
            let artifact = capture.get(3).map(|m| m.as_str()).unwrap_or_default();
            let version = capture.get(4).map(|m| m.as_str());
            if group.is_empty() || artifact.is_empty() {
                continue;
            }

            let scope = if configuration.starts_with("test") {
                DependencyScope::Dev
            } else {
                DependencyScope::Direct
            };
            let name = format!("{}:{}", group, artifact);
            add_dependency(
                &mut records,
                format!("package:{}:{}", group, artifact),
                &name,
                version,
                scope,
                Some(file),
            );
        }
    }

    Ok(records)
}
