use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use pipeguard_core::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File discovery configuration: glob include/exclude lists and an
/// optional depth limit relative to the project root.
#[derive(Debug, Clone, Default)]
pub struct CollectConfig {
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub max_depth: Option<usize>,
}

const DEFAULT_EXCLUDES: &[&str] = &[
    "**/target/**",
    "**/.git/**",
    "**/node_modules/**",
    "**/dist/**",
    "**/build/**",
    "**/coverage/**",
    "**/__pycache__/**",
    "**/.pytest_cache/**",
    "**/venv/**",
    "**/.venv/**",
];

fn build_globset(patterns: &[String]) -> Option<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    let mut added = 0;
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
                added += 1;
            }
            Err(e) => warn!(pattern = %pattern, error = %e, "ignoring invalid glob"),
        }
    }
    if added == 0 {
        return None;
    }
    builder.build().ok()
}

/// Walk `root` and return the matching file paths. Exclusions always
/// include the defaults above; an include set, when present, must match.
pub fn collect_files(root: &Path, config: &CollectConfig) -> Result<Vec<PathBuf>> {
    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.extend(config.exclude_patterns.iter().cloned());

    let exclude_set = build_globset(&excludes);
    let include_set = build_globset(&config.include_patterns);

    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .git_ignore(true)
        .git_exclude(true)
        .ignore(true);
    if let Some(depth) = config.max_depth {
        builder.max_depth(Some(depth));
    }

    let mut paths = Vec::new();
    for entry in builder.build() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "walker error");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        if let Some(excludes) = &exclude_set {
            if excludes.is_match(relative) || excludes.is_match(path) {
                continue;
            }
        }
        if let Some(includes) = &include_set {
            if !includes.is_match(relative) && !includes.is_match(path) {
                continue;
            }
        }

        paths.push(path.to_path_buf());
    }

    debug!(root = %root.display(), count = paths.len(), "collected files");
    Ok(paths)
}

/// Project-relative path with forward slashes, the form node keys use.
pub fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.to_string_lossy().replace('\\', "/")
}
