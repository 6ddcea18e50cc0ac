use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Runtime settings for every Pipeguard service. All directories default
/// under a single base so a deployment can relocate the whole data root
/// with one variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub base_dir: PathBuf,
    pub policy_dir: PathBuf,
    pub policy_archive_dir: PathBuf,
    pub policy_template_dir: PathBuf,
    pub compliance_report_dir: PathBuf,
    pub remediation_dir: PathBuf,
    #[serde(default = "Settings::default_max_parallel_jobs")]
    pub max_parallel_jobs: usize,
    #[serde(default = "Settings::default_remediation_timeout_secs")]
    pub remediation_timeout_secs: u64,
    #[serde(default = "Settings::default_database_rollback_timeout_secs")]
    pub database_rollback_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self::with_base(PathBuf::from("data"))
    }
}

impl Settings {
    fn default_max_parallel_jobs() -> usize {
        4
    }

    fn default_remediation_timeout_secs() -> u64 {
        600
    }

    fn default_database_rollback_timeout_secs() -> u64 {
        1800
    }

    /// Build settings rooted at `base`, with every sub-directory at its
    /// default location.
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            policy_dir: base.join("policies"),
            policy_archive_dir: base.join("policies/archive"),
            policy_template_dir: base.join("policies/templates"),
            compliance_report_dir: base.join("compliance/reports"),
            remediation_dir: base.join("remediation"),
            max_parallel_jobs: Self::default_max_parallel_jobs(),
            remediation_timeout_secs: Self::default_remediation_timeout_secs(),
            database_rollback_timeout_secs: Self::default_database_rollback_timeout_secs(),
            base_dir: base,
        }
    }

    /// Load settings from the environment. Unset variables fall back to
    /// the defaults under `PIPEGUARD_DATA_DIR` (or `data/`).
    pub fn from_env() -> Self {
        let base = env::var("PIPEGUARD_DATA_DIR").unwrap_or_else(|_| "data".to_string());
        let mut settings = Self::with_base(base);

        if let Ok(dir) = env::var("POLICY_DIR") {
            settings.policy_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("POLICY_ARCHIVE_DIR") {
            settings.policy_archive_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("POLICY_TEMPLATE_DIR") {
            settings.policy_template_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("COMPLIANCE_REPORT_DIR") {
            settings.compliance_report_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("REMEDIATION_DIR") {
            settings.remediation_dir = PathBuf::from(dir);
        }
        if let Ok(jobs) = env::var("MAX_PARALLEL_JOBS") {
            if let Ok(jobs) = jobs.parse::<usize>() {
                if jobs > 0 {
                    settings.max_parallel_jobs = jobs;
                }
            }
        }

        settings
    }

    pub fn plans_dir(&self) -> PathBuf {
        self.remediation_dir.join("plans")
    }

    pub fn actions_dir(&self) -> PathBuf {
        self.remediation_dir.join("actions")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.remediation_dir.join("results")
    }

    pub fn workflows_dir(&self) -> PathBuf {
        self.remediation_dir.join("workflows")
    }

    pub fn approvals_dir(&self) -> PathBuf {
        self.remediation_dir.join("approvals")
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.remediation_dir.join("snapshots")
    }

    pub fn rollbacks_dir(&self) -> PathBuf {
        self.remediation_dir.join("rollbacks")
    }

    /// Sandbox root that snapshot restores resolve against.
    pub fn sandbox_dir(&self, workflow_id: &str) -> PathBuf {
        self.remediation_dir.join("sandbox").join(workflow_id)
    }

    pub fn policy_archive_dir_for(&self, policy_id: &str) -> PathBuf {
        self.policy_archive_dir.join(policy_id)
    }

    pub fn policy_path(&self, policy_id: &str) -> PathBuf {
        self.policy_dir.join(format!("{}.yaml", policy_id))
    }
}

/// True when `candidate` stays inside `root` without `..` escapes. Both
/// paths are taken lexically; callers reject symlinked components before
/// restoring through this check.
pub fn path_within(root: &Path, candidate: &Path) -> bool {
    use std::path::Component;

    if candidate.is_absolute() {
        return false;
    }
    let mut depth: i64 = 0;
    for component in candidate.components() {
        match component {
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    let _ = root;
    true
}
