use crate::collect::{collect_files, CollectConfig};
use crate::lang::{scan_file, supported_extensions};
use crate::records::{CodeScan, FileScan};
use pipeguard_core::{Result, PipeguardError};
use rayon::prelude::*;
use std::path::Path;
use tracing::{info, warn};

/// Batch code-scan configuration: language set, discovery globs and
/// feature switches for each extraction dimension.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub languages: Vec<String>,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub max_depth: Option<usize>,
    pub max_parallel_jobs: usize,
    pub scan_imports: bool,
    pub scan_calls: bool,
    pub scan_classes: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            languages: Vec::new(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            max_depth: None,
            max_parallel_jobs: 4,
            scan_imports: true,
            scan_calls: true,
            scan_classes: true,
        }
    }
}

/// Scan every supported source file under `root`. Per-file failures are
/// logged and recorded; they never abort the batch.
pub fn scan_code(root: &Path, config: &ScanConfig) -> Result<CodeScan> {
    let collect_config = CollectConfig {
        include_patterns: config.include_patterns.clone(),
        exclude_patterns: config.exclude_patterns.clone(),
        max_depth: config.max_depth,
    };
    let extensions = supported_extensions(&config.languages);

    let files: Vec<_> = collect_files(root, &collect_config)?
        .into_iter()
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(|ext| extensions.contains(&ext))
                .unwrap_or(false)
        })
        .collect();

    info!(root = %root.display(), files = files.len(), "scanning source files");

    let jobs = config.max_parallel_jobs.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.min(num_cpus::get()))
        .build()
        .map_err(|e| PipeguardError::Runtime(format!("scanner pool: {}", e)))?;

    let outcomes: Vec<std::result::Result<FileScan, String>> = pool.install(|| {
        files
            .par_iter()
            .filter_map(|path| {
                let content = match std::fs::read_to_string(path) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(file = %path.display(), error = %e, "unreadable source; skipped");
                        return Some(Err(path.to_string_lossy().to_string()));
                    }
                };
                scan_file(root, path, &content).map(Ok)
            })
            .collect()
    });

    let mut scan = CodeScan::default();
    for outcome in outcomes {
        match outcome {
            Ok(mut file_scan) => {
                if !config.scan_imports {
                    file_scan.imports.clear();
                }
                if !config.scan_calls {
                    file_scan.calls.clear();
                }
                if !config.scan_classes {
                    file_scan.classes.clear();
                }
                scan.files.push(file_scan);
            }
            Err(path) => scan.failed.push(path),
        }
    }

    // Deterministic output independent of worker interleaving.
    scan.files.sort_by(|a, b| a.path.cmp(&b.path));
    scan.failed.sort();

    Ok(scan)
}
