use crate::assembler::assemble;
use crate::metrics::{calculate_metrics, GraphMetrics};
use crate::visualize::{visualization_payload, VisualizationPayload};
use pipeguard_graph::DependencyGraph;
use pipeguard_scanner::{scan_code, scan_packages, ScanConfig};
use pipeguard_core::{PipeguardError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Structured dependency-analysis request, the shape external gates
/// submit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub repo_path: PathBuf,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default = "default_flag")]
    pub analyze_imports: bool,
    #[serde(default = "default_flag")]
    pub analyze_calls: bool,
    #[serde(default = "default_flag")]
    pub analyze_hierarchy: bool,
    #[serde(default = "default_flag")]
    pub analyze_packages: bool,
    #[serde(default = "default_jobs")]
    pub max_parallel_jobs: usize,
}

fn default_flag() -> bool {
    true
}

fn default_jobs() -> usize {
    4
}

impl AnalysisRequest {
    pub fn for_path(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            languages: Vec::new(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            max_depth: None,
            analyze_imports: true,
            analyze_calls: true,
            analyze_hierarchy: true,
            analyze_packages: true,
            max_parallel_jobs: default_jobs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    /// Serialized graph in the stable wire format.
    pub graph: Value,
    pub metrics: GraphMetrics,
    pub visualization: VisualizationPayload,
}

const PACKAGE_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// End-to-end analysis: scan sources and manifests, assemble the graph,
/// compute metrics and the layout payload.
pub async fn analyze_project(request: &AnalysisRequest) -> Result<(DependencyGraph, AnalysisResponse)> {
    if !request.repo_path.is_dir() {
        return Err(PipeguardError::Input(format!(
            "repository path is not a directory: {}",
            request.repo_path.display()
        )));
    }

    info!(repo = %request.repo_path.display(), "starting dependency analysis");

    let scan_config = ScanConfig {
        languages: request.languages.clone(),
        include_patterns: request.include_patterns.clone(),
        exclude_patterns: request.exclude_patterns.clone(),
        max_depth: request.max_depth,
        max_parallel_jobs: request.max_parallel_jobs,
        scan_imports: request.analyze_imports,
        scan_calls: request.analyze_calls,
        scan_classes: request.analyze_hierarchy,
    };

    // CPU-bound scan off the async runtime.
    let root = request.repo_path.clone();
    let code = tokio::task::spawn_blocking(move || scan_code(&root, &scan_config))
        .await
        .map_err(|e| PipeguardError::Runtime(format!("scan task: {}", e)))??;

    let packages = if request.analyze_packages {
        scan_packages(&request.repo_path, PACKAGE_TOOL_TIMEOUT).await
    } else {
        Vec::new()
    };

    let graph = assemble(&code, &packages);
    let metrics = calculate_metrics(&graph);
    let visualization = visualization_payload(&graph);
    let response = AnalysisResponse {
        graph: graph.to_value()?,
        metrics,
        visualization,
    };

    Ok((graph, response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn analyze_small_python_project() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("util.py"), "def helper():\n    return 1\n").unwrap();
        fs::write(
            dir.path().join("app.py"),
            "import util\n\nutil.helper()\n",
        )
        .unwrap();
        fs::write(dir.path().join("requirements.txt"), "requests==2.31.0\n").unwrap();

        let request = AnalysisRequest::for_path(dir.path());
        let (graph, response) = analyze_project(&request).await.unwrap();

        assert!(graph.contains_node("file:app.py"));
        assert!(graph.contains_node("file:util.py"));
        assert!(graph.contains_node("function:helper:util.py"));
        assert!(graph.contains_node("package:requests"));
        assert!(response.metrics.node_count >= 4);
        assert!(!response.visualization.nodes.is_empty());

        // wire format round-trips
        let restored = DependencyGraph::from_value(&response.graph).unwrap();
        assert_eq!(restored, graph);
    }

    #[tokio::test]
    async fn missing_directory_is_input_error() {
        let request = AnalysisRequest::for_path("/definitely/not/here");
        let err = analyze_project(&request).await.unwrap_err();
        assert_eq!(err.reason_code(), "invalid_input");
    }
}
