use super::{add_dependency, read_manifest, tool::run_tree_tool, with_project_root};
use crate::records::{DependencyScope, PackageEdgeRecord, PackageManager, PackageRecords};
use once_cell::sync::Lazy;
use pipeguard_core::Result;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

static DEPENDENCY_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<dependency>(.*?)</dependency>").expect("static pattern")
});

static GROUP_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<groupId>\s*([^<]+?)\s*</groupId>").expect("static pattern"));
static ARTIFACT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<artifactId>\s*([^<]+?)\s*</artifactId>").expect("static pattern"));
static VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<version>\s*([^<]+?)\s*</version>").expect("static pattern"));
static SCOPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<scope>\s*([^<]+?)\s*</scope>").expect("static pattern"));

/// `"g:a:jar:1.0[:scope]" -> "g:a:jar:2.0[:scope]"` lines in the dot
/// output of `mvn dependency:tree`.
static DOT_EDGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""([^"]+)"\s*->\s*"([^"]+)""#).expect("static pattern")
});

fn coordinate_key(group: &str, artifact: &str) -> String {
    format!("package:{}:{}", group, artifact)
}

pub async fn scan(root: &Path, files: &[PathBuf], timeout: Duration) -> Result<PackageRecords> {
    let mut records = with_project_root(PackageManager::Maven, root);

    for file in files {
        let content = match read_manifest(file) {
            Ok(c) => c,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "unreadable manifest; skipped");
                continue;
            }
        };

        for block in DEPENDENCY_BLOCK.captures_iter(&content) {
            let body = block.get(1).map(|m| m.as_str()).unwrap_or_default();
            let group = GROUP_ID.captures(body).and_then(|c| c.get(1));
            let artifact = ARTIFACT_ID.captures(body).and_then(|c| c.get(1));
            let (Some(group), Some(artifact)) = (group, artifact) else {
                continue;
            };
            let version = VERSION.captures(body).and_then(|c| c.get(1)).map(|m| m.as_str());
            let scope = SCOPE
                .captures(body)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str())
                .unwrap_or("compile");

            let dependency_scope = if scope == "test" {
                DependencyScope::Dev
            } else {
                DependencyScope::Direct
            };
            let name = format!("{}:{}", group.as_str(), artifact.as_str());
            add_dependency(
                &mut records,
                coordinate_key(group.as_str(), artifact.as_str()),
                &name,
                version,
                dependency_scope,
                Some(file),
            );
        }
    }

    if let Some(output) = run_tree_tool(
        "mvn",
        &["dependency:tree", "-DoutputType=dot", "-q"],
        root,
        timeout,
    )
    .await
    {
        ingest_dot_tree(&mut records, &output);
    }

    Ok(records)
}

/// Parse `g:a:packaging:version[:scope]` coordinates out of the dot
/// edge list and record the package→package closure.
fn ingest_dot_tree(records: &mut PackageRecords, output: &str) {
    for capture in DOT_EDGE.captures_iter(output) {
        let from = capture.get(1).map(|m| m.as_str()).and_then(parse_coordinate);
        let to = capture.get(2).map(|m| m.as_str()).and_then(parse_coordinate);
        let (Some(from), Some(to)) = (from, to) else {
            continue;
        };

        for coordinate in [&from, &to] {
            let name = format!("{}:{}", coordinate.group, coordinate.artifact);
            add_dependency(
                records,
                coordinate_key(&coordinate.group, &coordinate.artifact),
                &name,
                Some(coordinate.version.as_str()),
                DependencyScope::Transitive,
                None,
            );
        }
        records.push_edge(PackageEdgeRecord {
            source: coordinate_key(&from.group, &from.artifact),
            target: coordinate_key(&to.group, &to.artifact),
            scope: DependencyScope::Transitive,
            version: Some(to.version),
            declared_in: None,
        });
    }
}

struct Coordinate {
    group: String,
    artifact: String,
    version: String,
}

fn parse_coordinate(raw: &str) -> Option<Coordinate> {
    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() < 4 {
        return None;
    }
    Some(Coordinate {
        group: parts[0].to_string(),
        artifact: parts[1].to_string(),
        version: parts[3].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn pom_dependencies_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let pom = dir.path().join("pom.xml");
        fs::write(
            &pom,
            r#"<project>
  <dependencies>
    <dependency>
      <groupId>org.springframework</groupId>
      <artifactId>spring-core</artifactId>
      <version>6.1.0</version>
    </dependency>
    <dependency>
      <groupId>junit</groupId>
      <artifactId>junit</artifactId>
      <version>4.13.2</version>
      <scope>test</scope>
    </dependency>
  </dependencies>
</project>"#,
        )
        .unwrap();

        let records = scan(dir.path(), &[pom], Duration::from_millis(10))
            .await
            .unwrap();

        let spring = records
            .edges
            .iter()
            .find(|e| e.target == "package:org.springframework:spring-core")
            .unwrap();
        assert_eq!(spring.scope, DependencyScope::Direct);

        let junit = records
            .edges
            .iter()
            .find(|e| e.target == "package:junit:junit")
            .unwrap();
        assert_eq!(junit.scope, DependencyScope::Dev);
    }

    #[test]
    fn dot_output_yields_transitive_edges() {
        let mut records = with_project_root(PackageManager::Maven, Path::new("/p"));
        let dot = r#"digraph "demo" {
  "com.acme:app:jar:1.0" -> "org.slf4j:slf4j-api:jar:2.0.9:compile" ;
}"#;
        ingest_dot_tree(&mut records, dot);

        let edge = records
            .edges
            .iter()
            .find(|e| e.source == "package:com.acme:app")
            .unwrap();
        assert_eq!(edge.target, "package:org.slf4j:slf4j-api");
        assert_eq!(edge.version.as_deref(), Some("2.0.9"));
    }
}
