use crate::model::{
    RemediationStatus, RollbackOperation, RollbackStatus, RollbackType, Snapshot, WorkflowStatus,
};
use crate::store::ArtifactStore;
use chrono::Utc;
use pipeguard_core::{fsutil, ids, path_within, AttrMap, PipeguardError, Result};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{error, info, warn};

/// Snapshots, rollback operations and post-rollback verification.
///
/// Snapshot paths are sandbox-relative: absolute paths and `..`
/// escapes are rejected at creation, and restores re-validate against
/// the per-workflow sandbox root, refusing symlinked components.
pub struct RollbackService {
    store: ArtifactStore,
}

impl RollbackService {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    fn sandbox_root(&self, workflow_id: &str) -> PathBuf {
        self.store.settings().sandbox_dir(workflow_id)
    }

    pub async fn create_snapshot(
        &self,
        workflow_id: &str,
        action_id: &str,
        path: &str,
        content: Vec<u8>,
        metadata: AttrMap,
    ) -> Result<Snapshot> {
        validate_snapshot_path(path)?;

        let now = Utc::now();
        let snapshot = Snapshot {
            id: ids::artifact_id("SNAPSHOT"),
            workflow_id: workflow_id.to_string(),
            action_id: action_id.to_string(),
            path: path.to_string(),
            content,
            created_at: now,
            updated_at: now,
            metadata,
        };
        self.store.save_snapshot(&snapshot).await?;
        info!(
            snapshot_id = %snapshot.id,
            workflow_id = %workflow_id,
            path = path,
            bytes = snapshot.content.len(),
            "created snapshot"
        );
        Ok(snapshot)
    }

    pub async fn get_snapshot(&self, snapshot_id: &str) -> Result<Snapshot> {
        self.store.load_snapshot(snapshot_id).await
    }

    pub async fn create_rollback_operation(
        &self,
        workflow_id: &str,
        action_id: &str,
        snapshot_id: &str,
        rollback_type: RollbackType,
        metadata: AttrMap,
    ) -> Result<RollbackOperation> {
        // The snapshot must exist; rollback references exactly one.
        let snapshot = self.store.load_snapshot(snapshot_id).await?;
        if snapshot.workflow_id != workflow_id {
            return Err(PipeguardError::Input(format!(
                "snapshot '{}' belongs to workflow '{}'",
                snapshot_id, snapshot.workflow_id
            )));
        }

        let now = Utc::now();
        let operation = RollbackOperation {
            id: ids::artifact_id("ROLLBACK"),
            workflow_id: workflow_id.to_string(),
            action_id: action_id.to_string(),
            snapshot_id: snapshot_id.to_string(),
            rollback_type,
            status: RollbackStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            verified_at: None,
            metadata,
        };
        self.store.save_rollback(&operation).await?;
        info!(operation_id = %operation.id, snapshot_id = %snapshot_id, "created rollback operation");
        Ok(operation)
    }

    pub async fn get_rollback_operation(&self, operation_id: &str) -> Result<RollbackOperation> {
        self.store.load_rollback(operation_id).await
    }

    /// Execute a pending rollback: restore the snapshot bytes to the
    /// recorded path inside the workflow sandbox. Failures are captured
    /// on the operation instead of propagating.
    pub async fn perform_rollback(&self, operation_id: &str) -> Result<RollbackOperation> {
        let mut operation = self.store.load_rollback(operation_id).await?;
        if operation.status != RollbackStatus::Pending {
            return Err(PipeguardError::state(
                "rollback_not_pending",
                format!("rollback '{}' is {:?}", operation_id, operation.status),
            ));
        }

        operation.status = RollbackStatus::Running;
        operation.updated_at = Utc::now();
        self.store.save_rollback(&operation).await?;

        let timeout_secs = if operation
            .metadata
            .get("class")
            .and_then(|v| v.as_str())
            .map(|class| class == "database")
            .unwrap_or(false)
        {
            self.store.settings().database_rollback_timeout_secs
        } else {
            self.store.settings().remediation_timeout_secs
        };

        let restore = self.restore_snapshot(&operation);
        let outcome =
            match tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), restore).await
            {
                Ok(result) => result,
                Err(_) => Err(PipeguardError::Timeout(format!(
                    "rollback '{}' exceeded {}s",
                    operation_id, timeout_secs
                ))),
            };

        match outcome {
            Ok(()) => {
                operation.status = RollbackStatus::Completed;
                operation.completed_at = Some(Utc::now());
                operation.error = None;
                info!(operation_id = %operation_id, "rollback completed");
            }
            Err(e) => {
                operation.status = RollbackStatus::Failed;
                operation.error = Some(e.to_string());
                error!(operation_id = %operation_id, error = %e, "rollback failed");
            }
        }
        operation.updated_at = Utc::now();
        self.store.save_rollback(&operation).await?;
        Ok(operation)
    }

    async fn restore_snapshot(&self, operation: &RollbackOperation) -> Result<()> {
        let snapshot = self.store.load_snapshot(&operation.snapshot_id).await?;
        let root = self.sandbox_root(&operation.workflow_id);
        let relative = Path::new(&snapshot.path);
        validate_snapshot_path(&snapshot.path)?;
        if !path_within(&root, relative) {
            return Err(PipeguardError::Input(format!(
                "snapshot path escapes sandbox: {}",
                snapshot.path
            )));
        }

        fs::create_dir_all(&root).await?;
        reject_symlinked_components(&root, relative).await?;

        let destination = root.join(relative);
        fsutil::write_bytes(&destination, &snapshot.content).await?;
        Ok(())
    }

    /// Idempotent post-check: the restored file must match the snapshot
    /// bytes. Success marks the operation `verified` and moves the
    /// owning plan (and workflow) to `rolled_back`.
    pub async fn verify_rollback(&self, operation_id: &str) -> Result<RollbackOperation> {
        let mut operation = self.store.load_rollback(operation_id).await?;
        match operation.status {
            RollbackStatus::Verified => return Ok(operation),
            RollbackStatus::Completed => {}
            other => {
                return Err(PipeguardError::state(
                    "rollback_not_completed",
                    format!("rollback '{}' is {:?}", operation_id, other),
                ));
            }
        }

        let snapshot = self.store.load_snapshot(&operation.snapshot_id).await?;
        let restored_path = self
            .sandbox_root(&operation.workflow_id)
            .join(&snapshot.path);
        let restored = fs::read(&restored_path).await.map_err(|e| {
            PipeguardError::Resource(format!(
                "restored file unreadable at {}: {}",
                restored_path.display(),
                e
            ))
        })?;
        if restored != snapshot.content {
            return Err(PipeguardError::Runtime(format!(
                "restored content does not match snapshot '{}'",
                snapshot.id
            )));
        }

        operation.status = RollbackStatus::Verified;
        operation.verified_at = Some(Utc::now());
        operation.updated_at = Utc::now();
        self.store.save_rollback(&operation).await?;
        info!(operation_id = %operation_id, "rollback verified");

        self.mark_rolled_back(&operation).await;
        Ok(operation)
    }

    /// A verified rollback transitions the owning workflow and plan to
    /// `rolled_back`. Missing records are tolerated; verification has
    /// already succeeded.
    async fn mark_rolled_back(&self, operation: &RollbackOperation) {
        match self.store.load_workflow(&operation.workflow_id).await {
            Ok(mut workflow) => {
                workflow.status = WorkflowStatus::RolledBack;
                workflow.updated_at = Utc::now();
                if let Err(e) = self.store.save_workflow(&workflow).await {
                    warn!(workflow_id = %workflow.id, error = %e, "cannot persist rolled_back workflow");
                    return;
                }
                match self.store.load_plan(&workflow.plan_id).await {
                    Ok(mut plan) => {
                        plan.status = RemediationStatus::RolledBack;
                        plan.updated_at = Utc::now();
                        if let Err(e) = self.store.save_plan(&plan).await {
                            warn!(plan_id = %plan.id, error = %e, "cannot persist rolled_back plan");
                        }
                    }
                    Err(e) => {
                        warn!(workflow_id = %workflow.id, error = %e, "plan missing for rolled back workflow")
                    }
                }
            }
            Err(e) => warn!(
                workflow_id = %operation.workflow_id,
                error = %e,
                "workflow missing for verified rollback"
            ),
        }
    }
}

/// Reject absolute paths and any `..` segment outright.
fn validate_snapshot_path(path: &str) -> Result<()> {
    let candidate = Path::new(path);
    if path.is_empty() {
        return Err(PipeguardError::Input("snapshot path is empty".to_string()));
    }
    if candidate.is_absolute() {
        return Err(PipeguardError::Input(format!(
            "snapshot path must be relative: {}",
            path
        )));
    }
    for component in candidate.components() {
        match component {
            Component::ParentDir => {
                return Err(PipeguardError::Input(format!(
                    "snapshot path contains a parent-directory segment: {}",
                    path
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PipeguardError::Input(format!(
                    "snapshot path must be relative: {}",
                    path
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Refuse to restore through symlinked directories inside the sandbox.
async fn reject_symlinked_components(root: &Path, relative: &Path) -> Result<()> {
    let mut current = root.to_path_buf();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            current.push(part);
            match fs::symlink_metadata(&current).await {
                Ok(metadata) if metadata.file_type().is_symlink() => {
                    return Err(PipeguardError::Input(format!(
                        "snapshot path traverses a symlink: {}",
                        current.display()
                    )));
                }
                _ => {}
            }
        }
    }
    Ok(())
}
