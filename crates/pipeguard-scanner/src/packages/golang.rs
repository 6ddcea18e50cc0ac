use super::{add_dependency, read_manifest, with_project_root};
use crate::records::{DependencyScope, PackageManager, PackageRecords};
use pipeguard_core::{package_key, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

pub fn scan(root: &Path, files: &[PathBuf]) -> Result<PackageRecords> {
    let mut records = with_project_root(PackageManager::Go, root);

    for file in files {
        let content = match read_manifest(file) {
            Ok(c) => c,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "unreadable manifest; skipped");
                continue;
            }
        };

        let mut in_require_block = false;
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with("require (") {
                in_require_block = true;
                continue;
            }
            if in_require_block {
                if line == ")" {
                    in_require_block = false;
                    continue;
                }
                record_requirement(&mut records, line, file);
            } else if let Some(rest) = line.strip_prefix("require ") {
                record_requirement(&mut records, rest, file);
            }
        }
    }

    Ok(records)
}

fn record_requirement(records: &mut PackageRecords, line: &str, file: &Path) {
    let line = line.split("//").next().unwrap_or("").trim();
    let mut parts = line.split_whitespace();
    let (Some(module), Some(version)) = (parts.next(), parts.next()) else {
        return;
    };
    // `// indirect` markers are stripped above; everything in go.mod is
    // part of the module graph, so treat all entries as direct.
    add_dependency(
        records,
        package_key(module),
        module,
        Some(version),
        DependencyScope::Direct,
        Some(file),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn block_and_single_requires() {
        let dir = tempfile::tempdir().unwrap();
        let gomod = dir.path().join("go.mod");
        fs::write(
            &gomod,
            "module example.com/demo\n\ngo 1.22\n\nrequire (\n\tgithub.com/gorilla/mux v1.8.1\n\tgolang.org/x/sync v0.6.0 // indirect\n)\n\nrequire github.com/stretchr/testify v1.9.0\n",
        )
        .unwrap();

        let records = scan(dir.path(), &[gomod]).unwrap();
        let keys: Vec<&str> = records.nodes.iter().map(|n| n.key.as_str()).collect();
        assert!(keys.contains(&"package:github.com/gorilla/mux"));
        assert!(keys.contains(&"package:golang.org/x/sync"));
        assert!(keys.contains(&"package:github.com/stretchr/testify"));

        let mux = records
            .edges
            .iter()
            .find(|e| e.target == "package:github.com/gorilla/mux")
            .unwrap();
        assert_eq!(mux.version.as_deref(), Some("v1.8.1"));
    }
}
