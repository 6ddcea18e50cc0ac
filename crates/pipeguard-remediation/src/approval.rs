use crate::model::{ApprovalRequest, ApprovalStatus};
use crate::store::ArtifactStore;
use chrono::Utc;
use pipeguard_core::{ids, AttrMap, Result};
use pipeguard_policy::{Policy, PolicyEngine};
use serde_json::Value;
use tracing::{info, warn};

/// Decision attribution recorded when an auto-approval policy accepts
/// a request.
pub const SYSTEM_APPROVER: &str = "system";

/// Creates and routes approval requests. Multiple requests may exist
/// for the same workflow step; the workflow runtime only reacts to the
/// first decision.
pub struct ApprovalService {
    store: ArtifactStore,
    engine: PolicyEngine,
}

impl ApprovalService {
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            store,
            engine: PolicyEngine::new(),
        }
    }

    /// Create a request, `pending` by default. When an auto-approve
    /// policy is supplied and matches the request metadata, the request
    /// is created already approved and attributed to `system`.
    pub async fn create_approval_request(
        &self,
        workflow_id: &str,
        step_id: &str,
        action_id: &str,
        required_roles: Vec<String>,
        auto_approve_policy: Option<&Policy>,
        metadata: AttrMap,
    ) -> Result<ApprovalRequest> {
        let now = Utc::now();
        let mut request = ApprovalRequest {
            id: ids::artifact_id("APPROVAL"),
            workflow_id: workflow_id.to_string(),
            step_id: step_id.to_string(),
            action_id: action_id.to_string(),
            required_roles,
            status: ApprovalStatus::Pending,
            approver: None,
            comments: None,
            created_at: now,
            updated_at: now,
            decided_at: None,
            metadata,
        };

        if let Some(policy) = auto_approve_policy {
            let target = Value::Object(request.metadata.clone().into_iter().collect());
            let evaluation = self.engine.evaluate_policy(policy, &target);
            if evaluation.passed && !evaluation.was_skipped() {
                info!(
                    request_id = %request.id,
                    policy_id = %policy.id,
                    "auto-approval policy matched"
                );
                request.status = ApprovalStatus::Approved;
                request.approver = Some(SYSTEM_APPROVER.to_string());
                request.comments = Some(format!("auto-approved by policy {}", policy.id));
                request.decided_at = Some(now);
            }
        }

        self.store.save_approval(&request).await?;
        info!(
            request_id = %request.id,
            workflow_id = %workflow_id,
            step_id = %step_id,
            status = ?request.status,
            "created approval request"
        );
        Ok(request)
    }

    pub async fn get_request(&self, request_id: &str) -> Result<ApprovalRequest> {
        self.store.load_approval(request_id).await
    }

    pub async fn list_requests(&self) -> Result<Vec<ApprovalRequest>> {
        self.store.list_approvals().await
    }

    /// Approve a pending request. A request that is no longer pending
    /// is left untouched and reported with `false`.
    pub async fn approve_request(
        &self,
        request_id: &str,
        approver: &str,
        comments: &str,
    ) -> Result<(bool, ApprovalRequest)> {
        self.decide(request_id, approver, comments, ApprovalStatus::Approved)
            .await
    }

    pub async fn reject_request(
        &self,
        request_id: &str,
        approver: &str,
        comments: &str,
    ) -> Result<(bool, ApprovalRequest)> {
        self.decide(request_id, approver, comments, ApprovalStatus::Rejected)
            .await
    }

    async fn decide(
        &self,
        request_id: &str,
        approver: &str,
        comments: &str,
        decision: ApprovalStatus,
    ) -> Result<(bool, ApprovalRequest)> {
        let mut request = self.store.load_approval(request_id).await?;
        if request.status != ApprovalStatus::Pending {
            warn!(
                request_id = %request_id,
                status = ?request.status,
                "decision on non-pending approval request ignored"
            );
            return Ok((false, request));
        }

        request.status = decision;
        request.approver = Some(approver.to_string());
        request.comments = Some(comments.to_string());
        request.decided_at = Some(Utc::now());
        request.updated_at = request.decided_at.unwrap_or(request.updated_at);
        self.store.save_approval(&request).await?;

        info!(
            request_id = %request_id,
            approver = approver,
            decision = ?decision,
            "approval request decided"
        );
        Ok((true, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeguard_core::Settings;
    use serde_json::json;

    fn service(dir: &tempfile::TempDir) -> ApprovalService {
        ApprovalService::new(ArtifactStore::new(Settings::with_base(dir.path())))
    }

    #[tokio::test]
    async fn request_starts_pending() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir);
        let request = service
            .create_approval_request(
                "WF-1",
                "STEP-1",
                "ACTION-1",
                vec!["security_admin".into(), "developer".into()],
                None,
                AttrMap::new(),
            )
            .await
            .unwrap();
        assert_eq!(request.status, ApprovalStatus::Pending);
        assert!(request.approver.is_none());
    }

    #[tokio::test]
    async fn approve_then_second_decision_is_inert() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir);
        let request = service
            .create_approval_request("WF-1", "STEP-1", "ACTION-1", vec![], None, AttrMap::new())
            .await
            .unwrap();

        let (ok, approved) = service
            .approve_request(&request.id, "alice", "looks good")
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(approved.status, ApprovalStatus::Approved);
        assert_eq!(approved.approver.as_deref(), Some("alice"));
        assert!(approved.decided_at.is_some());

        // first decision wins; later decisions are recorded as no-ops
        let (ok, still_approved) = service
            .reject_request(&request.id, "mallory", "too late")
            .await
            .unwrap();
        assert!(!ok);
        assert_eq!(still_approved.status, ApprovalStatus::Approved);
        assert_eq!(still_approved.approver.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn reject_sets_status_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir);
        let request = service
            .create_approval_request("WF-1", "STEP-1", "ACTION-1", vec![], None, AttrMap::new())
            .await
            .unwrap();

        let (ok, rejected) = service
            .reject_request(&request.id, "bob", "needs review")
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(rejected.status, ApprovalStatus::Rejected);
        assert_eq!(rejected.comments.as_deref(), Some("needs review"));
    }

    #[tokio::test]
    async fn auto_approval_policy_attributes_system() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir);

        let engine = PolicyEngine::new();
        let policy = engine
            .load_policy_from_yaml(
                r#"
id: auto-approve-dev
name: Auto approve development remediations
type: operational
enforcement_mode: audit
rules:
  - id: rule-env
    name: development environment only
    severity: info
    condition:
      operator: and
      conditions:
        - field: environment
          operator: equals
          value: development
"#,
            )
            .unwrap();

        let mut metadata = AttrMap::new();
        metadata.insert("environment".to_string(), json!("development"));
        let request = service
            .create_approval_request("WF-1", "STEP-1", "ACTION-1", vec![], Some(&policy), metadata)
            .await
            .unwrap();
        assert_eq!(request.status, ApprovalStatus::Approved);
        assert_eq!(request.approver.as_deref(), Some(SYSTEM_APPROVER));

        // non-matching metadata stays pending
        let mut metadata = AttrMap::new();
        metadata.insert("environment".to_string(), json!("production"));
        let request = service
            .create_approval_request("WF-1", "STEP-2", "ACTION-1", vec![], Some(&policy), metadata)
            .await
            .unwrap();
        assert_eq!(request.status, ApprovalStatus::Pending);
    }
}
