use chrono::{DateTime, Utc};
use pipeguard_core::{ids::uuid_id, AttrMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemediationStrategy {
    Automated,
    Assisted,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionSource {
    Template,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    RolledBack,
}

/// Vulnerability record handed in by external scanners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: String,
    pub severity: String,
    /// Affected component (package or file).
    pub component: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_version: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
}

impl Vulnerability {
    /// Classifier used for template matching: the id prefix before the
    /// first dash (`CVE-2023-0001` → `CVE`).
    pub fn kind(&self) -> &str {
        self.id.split('-').next().unwrap_or(self.id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationRequest {
    pub repository_url: String,
    pub commit_sha: String,
    pub vulnerabilities: Vec<Vulnerability>,
    #[serde(default)]
    pub auto_apply: bool,
    #[serde(default)]
    pub metadata: AttrMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateType {
    DependencyUpdate,
    CodePatch,
    ConfigChange,
}

/// One concrete (or prototype) remediation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub action: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default = "default_variable_type")]
    pub value_type: String,
    #[serde(default)]
    pub required: bool,
}

fn default_variable_type() -> String {
    "string".to_string()
}

/// Template for generating remediation actions. Step prototypes carry
/// `${var}` placeholders described by the variable schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub template_type: TemplateType,
    pub vulnerability_types: Vec<String>,
    pub steps: Vec<ActionStep>,
    pub variables: BTreeMap<String, VariableSpec>,
    pub strategy: RemediationStrategy,
}

/// An atomic remediation unit targeting one vulnerability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationAction {
    pub id: String,
    pub vulnerability_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub strategy: RemediationStrategy,
    pub source: ActionSource,
    pub steps: Vec<ActionStep>,
    pub status: RemediationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: AttrMap,
}

/// Ordered bundle of actions remediating one request against
/// `repo@sha`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationPlan {
    pub id: String,
    pub repository_url: String,
    pub commit_sha: String,
    pub actions: Vec<RemediationAction>,
    pub status: RemediationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: AttrMap,
}

impl RemediationPlan {
    pub fn target(&self) -> String {
        format!("{}@{}", self.repository_url, self.commit_sha)
    }
}

/// Outcome record for one executed action step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationResult {
    #[serde(default = "uuid_id")]
    pub id: String,
    pub action_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub details: AttrMap,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStepKind {
    Remediation,
    Verification,
    Approval,
    Rollback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    WaitingForApproval,
    ApprovalRejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    RolledBack,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::RolledBack
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: WorkflowStepKind,
    pub action_id: String,
    pub status: StepStatus,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub approval_roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_approve_policy: Option<Value>,
    #[serde(default)]
    pub result: AttrMap,
    #[serde(default)]
    pub metadata: AttrMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ordered execution of a plan's steps. `current_step_index` advances
/// monotonically and only on step completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationWorkflow {
    pub id: String,
    pub plan_id: String,
    pub steps: Vec<WorkflowStep>,
    pub current_step_index: usize,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: AttrMap,
}

impl RemediationWorkflow {
    pub fn current_step(&self) -> Option<&WorkflowStep> {
        self.steps.get(self.current_step_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub workflow_id: String,
    pub step_id: String,
    pub action_id: String,
    pub required_roles: Vec<String>,
    pub status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    /// Always present once loaded; absent in old records deserializes
    /// to an empty map.
    #[serde(default)]
    pub metadata: AttrMap,
}

/// Captured pre-mutation content enabling rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub workflow_id: String,
    pub action_id: String,
    /// Sandbox-relative path the content came from (and restores to).
    pub path: String,
    pub content: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: AttrMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackType {
    Full,
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Verified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackOperation {
    pub id: String,
    pub workflow_id: String,
    pub action_id: String,
    pub snapshot_id: String,
    pub rollback_type: RollbackType,
    pub status: RollbackStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: AttrMap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vulnerability_kind_is_id_prefix() {
        let vulnerability = Vulnerability {
            id: "CVE-2023-0001".into(),
            severity: "high".into(),
            component: "example-dependency".into(),
            file_path: None,
            current_version: None,
            fixed_version: None,
            references: vec![],
        };
        assert_eq!(vulnerability.kind(), "CVE");
    }

    #[test]
    fn approval_metadata_defaults_to_empty() {
        let raw = r#"{
            "id": "req-1", "workflow_id": "wf-1", "step_id": "s-1",
            "action_id": "a-1", "required_roles": ["security_admin"],
            "status": "pending",
            "created_at": "2025-03-02T10:00:00Z",
            "updated_at": "2025-03-02T10:00:00Z"
        }"#;
        let request: ApprovalRequest = serde_json::from_str(raw).unwrap();
        assert!(request.metadata.is_empty());
        assert!(request.decided_at.is_none());
    }

    #[test]
    fn workflow_terminal_states() {
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::Failed.is_terminal());
        assert!(WorkflowStatus::RolledBack.is_terminal());
        assert!(!WorkflowStatus::Running.is_terminal());
    }
}
