use crate::approval::ApprovalService;
use crate::model::{
    ApprovalStatus, RemediationAction, RemediationPlan, RemediationStatus, RemediationResult,
    RemediationWorkflow, StepStatus, WorkflowStatus, WorkflowStep, WorkflowStepKind,
};
use crate::rollback::RollbackService;
use crate::store::ArtifactStore;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use pipeguard_core::{ids, AttrMap, PipeguardError, Result};
use pipeguard_policy::Policy;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info, warn};

/// Seam for applying and verifying remediation actions. Deployment
/// execution against real targets is out of scope; the default
/// executor records result artifacts.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &RemediationAction) -> Result<AttrMap>;
    async fn verify(&self, action: &RemediationAction) -> Result<AttrMap>;
}

/// Default executor: records a `RemediationResult` per invocation.
pub struct RecordingExecutor {
    store: ArtifactStore,
}

impl RecordingExecutor {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    async fn record(&self, action: &RemediationAction, phase: &str) -> Result<AttrMap> {
        let mut details = AttrMap::new();
        details.insert("phase".to_string(), json!(phase));
        details.insert("steps_executed".to_string(), json!(action.steps.len()));

        let result = RemediationResult {
            id: ids::artifact_id("RESULT"),
            action_id: action.id.clone(),
            workflow_id: None,
            success: true,
            details: details.clone(),
            created_at: Utc::now(),
        };
        self.store.save_result(&result).await?;
        details.insert("result_id".to_string(), json!(result.id));
        Ok(details)
    }
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn execute(&self, action: &RemediationAction) -> Result<AttrMap> {
        self.record(action, "remediation").await
    }

    async fn verify(&self, action: &RemediationAction) -> Result<AttrMap> {
        self.record(action, "verification").await
    }
}

/// Approval requirements the external policy gate injects at workflow
/// generation time.
#[derive(Debug, Clone, Default)]
pub struct WorkflowGate {
    pub requires_approval: bool,
    pub approval_roles: Vec<String>,
    pub auto_approve_policy: Option<Policy>,
}

/// Outcome of driving one workflow step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub success: bool,
    pub step: WorkflowStep,
    pub workflow: RemediationWorkflow,
}

/// Executes workflows step by step. Each workflow is driven under its
/// own async mutex, so concurrent calls against one workflow serialize
/// while distinct workflows proceed independently. The persisted
/// record is reloaded inside the lock and is the only authority.
pub struct WorkflowRuntime {
    store: ArtifactStore,
    locks: DashMap<String, Arc<Mutex<()>>>,
    /// Bounds step bodies running at once across all workflows.
    execution_slots: Arc<Semaphore>,
}

impl WorkflowRuntime {
    pub fn new(store: ArtifactStore) -> Self {
        let max_parallel_jobs = store.settings().max_parallel_jobs.max(1);
        Self {
            store,
            locks: DashMap::new(),
            execution_slots: Arc::new(Semaphore::new(max_parallel_jobs)),
        }
    }

    fn lock_for(&self, workflow_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(workflow_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Generate the workflow for a plan: for every action a
    /// `remediation` step followed by a `verification` step. The gate
    /// marks remediation steps that need human sign-off.
    pub async fn create_workflow_for_plan(
        &self,
        plan: &RemediationPlan,
        gate: &WorkflowGate,
    ) -> Result<RemediationWorkflow> {
        let now = Utc::now();
        let mut steps = Vec::with_capacity(plan.actions.len() * 2);

        for action in &plan.actions {
            steps.push(WorkflowStep {
                id: ids::artifact_id("STEP"),
                name: format!("Remediate {}", action.vulnerability_id),
                description: format!("Apply remediation action {}", action.id),
                kind: WorkflowStepKind::Remediation,
                action_id: action.id.clone(),
                status: StepStatus::Pending,
                requires_approval: gate.requires_approval,
                approval_roles: gate.approval_roles.clone(),
                auto_approve_policy: gate
                    .auto_approve_policy
                    .as_ref()
                    .map(serde_json::to_value)
                    .transpose()?,
                result: AttrMap::new(),
                metadata: AttrMap::new(),
                created_at: now,
                updated_at: now,
            });
            steps.push(WorkflowStep {
                id: ids::artifact_id("STEP"),
                name: format!("Verify {}", action.vulnerability_id),
                description: format!("Verify remediation action {}", action.id),
                kind: WorkflowStepKind::Verification,
                action_id: action.id.clone(),
                status: StepStatus::Pending,
                requires_approval: false,
                approval_roles: Vec::new(),
                auto_approve_policy: None,
                result: AttrMap::new(),
                metadata: AttrMap::new(),
                created_at: now,
                updated_at: now,
            });
        }

        let workflow = RemediationWorkflow {
            id: ids::artifact_id("WORKFLOW"),
            plan_id: plan.id.clone(),
            steps,
            current_step_index: 0,
            status: WorkflowStatus::Pending,
            created_at: now,
            updated_at: now,
            metadata: AttrMap::new(),
        };
        self.store.save_workflow(&workflow).await?;
        info!(
            workflow_id = %workflow.id,
            plan_id = %plan.id,
            steps = workflow.steps.len(),
            "created workflow"
        );
        Ok(workflow)
    }

    pub async fn get_workflow(&self, workflow_id: &str) -> Result<RemediationWorkflow> {
        self.store.load_workflow(workflow_id).await
    }

    /// Append a rollback step referencing an existing rollback
    /// operation and point the workflow at it.
    pub async fn append_rollback_step(
        &self,
        workflow_id: &str,
        action_id: &str,
        rollback_operation_id: &str,
    ) -> Result<RemediationWorkflow> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().await;

        let mut workflow = self.store.load_workflow(workflow_id).await?;
        let now = Utc::now();
        let mut metadata = AttrMap::new();
        metadata.insert(
            "rollback_operation_id".to_string(),
            json!(rollback_operation_id),
        );
        workflow.steps.push(WorkflowStep {
            id: ids::artifact_id("STEP"),
            name: format!("Rollback {}", action_id),
            description: format!("Roll back remediation for {}", action_id),
            kind: WorkflowStepKind::Rollback,
            action_id: action_id.to_string(),
            status: StepStatus::Pending,
            requires_approval: false,
            approval_roles: Vec::new(),
            auto_approve_policy: None,
            result: AttrMap::new(),
            metadata,
            created_at: now,
            updated_at: now,
        });
        workflow.current_step_index = workflow.steps.len() - 1;
        if workflow.status.is_terminal() {
            workflow.status = WorkflowStatus::Running;
        }
        workflow.updated_at = now;
        self.store.save_workflow(&workflow).await?;
        Ok(workflow)
    }

    /// Drive the step at `current_step_index`.
    ///
    /// Steps gated on approval suspend the workflow by entering
    /// `waiting_for_approval` (no in-process wait); the workflow
    /// resumes through [`handle_approval_result`]. The index advances
    /// only on completion.
    pub async fn execute_workflow_step(
        &self,
        workflow_id: &str,
        executor: &dyn ActionExecutor,
        approvals: &ApprovalService,
        rollbacks: &RollbackService,
    ) -> Result<StepOutcome> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().await;

        let mut workflow = self.store.load_workflow(workflow_id).await?;
        if workflow.status.is_terminal() {
            return Err(PipeguardError::state(
                "workflow_terminal",
                format!("workflow '{}' is {:?}", workflow_id, workflow.status),
            ));
        }
        let index = workflow.current_step_index;
        if index >= workflow.steps.len() {
            return Err(PipeguardError::state(
                "workflow_exhausted",
                format!("workflow '{}' has no step at index {}", workflow_id, index),
            ));
        }

        match workflow.steps[index].status {
            StepStatus::Pending => {}
            StepStatus::WaitingForApproval => {
                return Err(PipeguardError::state(
                    "step_waiting_for_approval",
                    format!("workflow '{}' step {} awaits approval", workflow_id, index),
                ));
            }
            other => {
                return Err(PipeguardError::state(
                    "step_not_pending",
                    format!(
                        "workflow '{}' step {} is {:?}",
                        workflow_id, index, other
                    ),
                ));
            }
        }

        workflow.status = WorkflowStatus::Running;
        workflow.steps[index].status = StepStatus::Running;
        workflow.steps[index].updated_at = Utc::now();

        // Approval gate: create the request and suspend, unless an
        // auto-approve policy already decided it.
        if workflow.steps[index].requires_approval
            || workflow.steps[index].kind == WorkflowStepKind::Approval
        {
            let policy = match &workflow.steps[index].auto_approve_policy {
                Some(value) => Some(serde_json::from_value::<Policy>(value.clone())?),
                None => None,
            };
            let step_snapshot = workflow.steps[index].clone();
            let request = approvals
                .create_approval_request(
                    &workflow.id,
                    &step_snapshot.id,
                    &step_snapshot.action_id,
                    step_snapshot.approval_roles.clone(),
                    policy.as_ref(),
                    step_snapshot.metadata.clone(),
                )
                .await?;

            workflow.steps[index]
                .result
                .insert("approval_request_id".to_string(), json!(request.id));

            if request.status != ApprovalStatus::Approved {
                workflow.steps[index].status = StepStatus::WaitingForApproval;
                workflow.steps[index].updated_at = Utc::now();
                workflow.updated_at = Utc::now();
                self.store.save_workflow(&workflow).await?;
                info!(
                    workflow_id = %workflow_id,
                    step_id = %workflow.steps[index].id,
                    request_id = %request.id,
                    "step suspended awaiting approval"
                );
                return Ok(StepOutcome {
                    success: true,
                    step: workflow.steps[index].clone(),
                    workflow,
                });
            }
            // Auto-approved: fall through and run the body now.
        }

        self.run_step_body(&mut workflow, index, executor, rollbacks)
            .await
    }

    /// Resume a step that suspended for approval. The first decision
    /// drives the workflow; decisions against a step that is no longer
    /// waiting are recorded by the approval service but change nothing
    /// here.
    pub async fn handle_approval_result(
        &self,
        workflow_id: &str,
        step_id: &str,
        approved: bool,
        approver: &str,
        comments: &str,
        executor: &dyn ActionExecutor,
        rollbacks: &RollbackService,
    ) -> Result<StepOutcome> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().await;

        let mut workflow = self.store.load_workflow(workflow_id).await?;
        let Some(index) = workflow.steps.iter().position(|s| s.id == step_id) else {
            return Err(PipeguardError::NotFound(format!(
                "step '{}' in workflow '{}'",
                step_id, workflow_id
            )));
        };

        if workflow.steps[index].status != StepStatus::WaitingForApproval {
            warn!(
                workflow_id = %workflow_id,
                step_id = %step_id,
                status = ?workflow.steps[index].status,
                "approval decision for a step that is not waiting; ignored"
            );
            let mut step = workflow.steps[index].clone();
            step.result.insert("ignored_decision".to_string(), json!(true));
            return Ok(StepOutcome {
                success: true,
                step,
                workflow,
            });
        }

        workflow.steps[index]
            .result
            .insert("approver".to_string(), json!(approver));
        workflow.steps[index]
            .result
            .insert("approval_comments".to_string(), json!(comments));

        if !approved {
            workflow.steps[index].status = StepStatus::ApprovalRejected;
            workflow.steps[index].updated_at = Utc::now();
            workflow.status = WorkflowStatus::Failed;
            workflow.updated_at = Utc::now();
            self.store.save_workflow(&workflow).await?;
            info!(
                workflow_id = %workflow_id,
                step_id = %step_id,
                approver = approver,
                "approval rejected; workflow failed"
            );
            return Ok(StepOutcome {
                success: false,
                step: workflow.steps[index].clone(),
                workflow,
            });
        }

        workflow.steps[index].status = StepStatus::Running;
        workflow.steps[index].updated_at = Utc::now();
        self.run_step_body(&mut workflow, index, executor, rollbacks)
            .await
    }

    /// Execute the body of a running step under its timeout, then
    /// settle step and workflow state. Every exit persists the record.
    async fn run_step_body(
        &self,
        workflow: &mut RemediationWorkflow,
        index: usize,
        executor: &dyn ActionExecutor,
        rollbacks: &RollbackService,
    ) -> Result<StepOutcome> {
        let _slot = self
            .execution_slots
            .acquire()
            .await
            .map_err(|e| PipeguardError::Runtime(format!("execution slots closed: {}", e)))?;

        let step_kind = workflow.steps[index].kind;
        let timeout_secs = match step_kind {
            WorkflowStepKind::Rollback => {
                self.store.settings().database_rollback_timeout_secs
            }
            _ => self.store.settings().remediation_timeout_secs,
        };

        let body = self.step_body(workflow, index, executor, rollbacks);
        let outcome = match tokio::time::timeout(Duration::from_secs(timeout_secs), body).await {
            Ok(result) => result,
            Err(_) => Err(PipeguardError::Timeout(format!(
                "step '{}' exceeded {}s",
                workflow.steps[index].id, timeout_secs
            ))),
        };

        let now = Utc::now();
        match outcome {
            Ok(details) => {
                let step = &mut workflow.steps[index];
                step.status = StepStatus::Completed;
                step.result.extend(details);
                step.updated_at = now;

                // Advance only on completion.
                if index == workflow.current_step_index {
                    workflow.current_step_index += 1;
                }
                if workflow.current_step_index >= workflow.steps.len() {
                    workflow.status = WorkflowStatus::Completed;
                }
                workflow.updated_at = now;
                self.store.save_workflow(workflow).await?;
                info!(
                    workflow_id = %workflow.id,
                    step_id = %workflow.steps[index].id,
                    workflow_status = ?workflow.status,
                    "step completed"
                );
                Ok(StepOutcome {
                    success: true,
                    step: workflow.steps[index].clone(),
                    workflow: workflow.clone(),
                })
            }
            Err(e) => {
                let step = &mut workflow.steps[index];
                step.status = StepStatus::Failed;
                step.result.insert("error".to_string(), json!(e.to_string()));
                step.result
                    .insert("error_kind".to_string(), json!(e.reason_code()));
                step.updated_at = now;
                workflow.status = WorkflowStatus::Failed;
                workflow.updated_at = now;
                self.store.save_workflow(workflow).await?;
                error!(
                    workflow_id = %workflow.id,
                    step_id = %workflow.steps[index].id,
                    error = %e,
                    "step failed; workflow failed"
                );
                Ok(StepOutcome {
                    success: false,
                    step: workflow.steps[index].clone(),
                    workflow: workflow.clone(),
                })
            }
        }
    }

    async fn step_body(
        &self,
        workflow: &RemediationWorkflow,
        index: usize,
        executor: &dyn ActionExecutor,
        rollbacks: &RollbackService,
    ) -> Result<AttrMap> {
        let step = &workflow.steps[index];
        match step.kind {
            WorkflowStepKind::Remediation => {
                let mut action = self.store.load_action(&step.action_id).await?;
                action.status = RemediationStatus::InProgress;
                action.updated_at = Utc::now();
                self.store.save_action(&action).await?;

                let details = executor.execute(&action).await?;

                action.status = RemediationStatus::Completed;
                action.updated_at = Utc::now();
                self.store.save_action(&action).await?;
                Ok(details)
            }
            WorkflowStepKind::Verification => {
                let action = self.store.load_action(&step.action_id).await?;
                executor.verify(&action).await
            }
            WorkflowStepKind::Approval => {
                // Approval-kind steps carry no body; reaching here means
                // the gate already decided.
                Ok(AttrMap::new())
            }
            WorkflowStepKind::Rollback => {
                let operation_id = step
                    .metadata
                    .get("rollback_operation_id")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        PipeguardError::Input(format!(
                            "rollback step '{}' has no rollback_operation_id",
                            step.id
                        ))
                    })?;
                let operation = rollbacks.perform_rollback(operation_id).await?;
                if operation.status != crate::model::RollbackStatus::Completed {
                    return Err(PipeguardError::Runtime(
                        operation
                            .error
                            .unwrap_or_else(|| format!("rollback '{}' failed", operation_id)),
                    ));
                }
                let mut details = AttrMap::new();
                details.insert("rollback_operation_id".to_string(), json!(operation.id));
                details.insert("rollback_status".to_string(), json!("completed"));
                Ok(details)
            }
        }
    }
}
