use crate::model::{
    ApprovalRequest, RemediationAction, RemediationPlan, RemediationResult, RemediationWorkflow,
    RollbackOperation, Snapshot,
};
use pipeguard_core::{fsutil, PipeguardError, Result, Settings};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use tokio::fs;
use tracing::warn;

/// JSON artifact store for every remediation record type. One file per
/// record under the type's directory; the persisted form is the
/// authority across restarts.
#[derive(Clone)]
pub struct ArtifactStore {
    settings: Settings,
}

impl ArtifactStore {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    async fn save<T: Serialize>(&self, dir: PathBuf, id: &str, record: &T) -> Result<()> {
        fsutil::write_json(&dir.join(format!("{}.json", id)), record).await
    }

    async fn load<T: DeserializeOwned>(&self, dir: PathBuf, id: &str, kind: &str) -> Result<T> {
        let path = dir.join(format!("{}.json", id));
        if !path.is_file() {
            return Err(PipeguardError::NotFound(format!("{} '{}'", kind, id)));
        }
        fsutil::read_json(&path).await
    }

    async fn list<T: DeserializeOwned>(&self, dir: PathBuf) -> Result<Vec<T>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fsutil::read_json(&path).await {
                Ok(record) => records.push(record),
                Err(e) => warn!(file = %path.display(), error = %e, "skipping unreadable record"),
            }
        }
        Ok(records)
    }

    pub async fn save_plan(&self, plan: &RemediationPlan) -> Result<()> {
        self.save(self.settings.plans_dir(), &plan.id, plan).await
    }

    pub async fn load_plan(&self, id: &str) -> Result<RemediationPlan> {
        self.load(self.settings.plans_dir(), id, "plan").await
    }

    pub async fn save_action(&self, action: &RemediationAction) -> Result<()> {
        self.save(self.settings.actions_dir(), &action.id, action).await
    }

    pub async fn load_action(&self, id: &str) -> Result<RemediationAction> {
        self.load(self.settings.actions_dir(), id, "action").await
    }

    pub async fn save_result(&self, result: &RemediationResult) -> Result<()> {
        self.save(self.settings.results_dir(), &result.id, result).await
    }

    pub async fn list_results(&self) -> Result<Vec<RemediationResult>> {
        self.list(self.settings.results_dir()).await
    }

    pub async fn save_workflow(&self, workflow: &RemediationWorkflow) -> Result<()> {
        self.save(self.settings.workflows_dir(), &workflow.id, workflow)
            .await
    }

    pub async fn load_workflow(&self, id: &str) -> Result<RemediationWorkflow> {
        self.load(self.settings.workflows_dir(), id, "workflow").await
    }

    pub async fn save_approval(&self, request: &ApprovalRequest) -> Result<()> {
        self.save(self.settings.approvals_dir(), &request.id, request)
            .await
    }

    pub async fn load_approval(&self, id: &str) -> Result<ApprovalRequest> {
        self.load(self.settings.approvals_dir(), id, "approval request")
            .await
    }

    pub async fn list_approvals(&self) -> Result<Vec<ApprovalRequest>> {
        self.list(self.settings.approvals_dir()).await
    }

    pub async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.save(self.settings.snapshots_dir(), &snapshot.id, snapshot)
            .await
    }

    pub async fn load_snapshot(&self, id: &str) -> Result<Snapshot> {
        self.load(self.settings.snapshots_dir(), id, "snapshot").await
    }

    pub async fn save_rollback(&self, operation: &RollbackOperation) -> Result<()> {
        self.save(self.settings.rollbacks_dir(), &operation.id, operation)
            .await
    }

    pub async fn load_rollback(&self, id: &str) -> Result<RollbackOperation> {
        self.load(self.settings.rollbacks_dir(), id, "rollback operation")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RemediationStatus, WorkflowStatus};
    use chrono::Utc;
    use pipeguard_core::AttrMap;

    #[tokio::test]
    async fn records_survive_a_store_reload() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::with_base(dir.path());

        let plan = RemediationPlan {
            id: "PLAN-20250302-abcd1234".into(),
            repository_url: "https://github.com/test/repo".into(),
            commit_sha: "abcdef123456".into(),
            actions: vec![],
            status: RemediationStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            metadata: AttrMap::new(),
        };

        {
            let store = ArtifactStore::new(settings.clone());
            store.save_plan(&plan).await.unwrap();
        }

        // a fresh store instance reads the persisted authority
        let store = ArtifactStore::new(settings);
        let loaded = store.load_plan(&plan.id).await.unwrap();
        assert_eq!(loaded, plan);
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(Settings::with_base(dir.path()));
        let err = store.load_workflow("nope").await.unwrap_err();
        assert_eq!(err.reason_code(), "not_found");
    }

    #[tokio::test]
    async fn workflow_round_trip_preserves_steps() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(Settings::with_base(dir.path()));

        let workflow = RemediationWorkflow {
            id: "WF-1".into(),
            plan_id: "PLAN-1".into(),
            steps: vec![],
            current_step_index: 0,
            status: WorkflowStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            metadata: AttrMap::new(),
        };
        store.save_workflow(&workflow).await.unwrap();
        let loaded = store.load_workflow("WF-1").await.unwrap();
        assert_eq!(loaded, workflow);
    }
}
