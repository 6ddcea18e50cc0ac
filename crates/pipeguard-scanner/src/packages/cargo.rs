use super::{add_dependency, read_manifest, with_project_root};
use crate::records::{DependencyScope, PackageManager, PackageRecords};
use pipeguard_core::{package_key, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

pub fn scan(root: &Path, files: &[PathBuf]) -> Result<PackageRecords> {
    let mut records = with_project_root(PackageManager::Cargo, root);

    for file in files {
        let content = match read_manifest(file) {
            Ok(c) => c,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "unreadable manifest; skipped");
                continue;
            }
        };
        let Ok(manifest) = content.parse::<toml::Value>() else {
            warn!(file = %file.display(), "invalid Cargo.toml; skipped");
            continue;
        };

        collect_table(&mut records, &manifest, "dependencies", DependencyScope::Direct, file);
        collect_table(
            &mut records,
            &manifest,
            "dev-dependencies",
            DependencyScope::Dev,
            file,
        );
    }

    Ok(records)
}

fn collect_table(
    records: &mut PackageRecords,
    manifest: &toml::Value,
    table: &str,
    scope: DependencyScope,
    file: &Path,
) {
    let Some(dependencies) = manifest.get(table).and_then(|t| t.as_table()) else {
        return;
    };
    for (name, spec) in dependencies {
        let version = match spec {
            toml::Value::String(v) => Some(v.as_str()),
            toml::Value::Table(t) => t.get("version").and_then(|v| v.as_str()),
            _ => None,
        };
        add_dependency(records, package_key(name), name, version, scope, Some(file));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn string_and_table_specs() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("Cargo.toml");
        fs::write(
            &manifest,
            "[package]\nname = \"demo\"\n\n[dependencies]\nserde = { version = \"1.0\", features = [\"derive\"] }\nregex = \"1.10\"\n\n[dev-dependencies]\ntempfile = \"3\"\n",
        )
        .unwrap();

        let records = scan(dir.path(), &[manifest]).unwrap();

        let serde_edge = records
            .edges
            .iter()
            .find(|e| e.target == "package:serde")
            .unwrap();
        assert_eq!(serde_edge.version.as_deref(), Some("1.0"));
        assert_eq!(serde_edge.scope, DependencyScope::Direct);

        let tempfile_edge = records
            .edges
            .iter()
            .find(|e| e.target == "package:tempfile")
            .unwrap();
        assert_eq!(tempfile_edge.scope, DependencyScope::Dev);
    }
}
