use pipeguard_core::{AttrMap, Settings};
use pipeguard_remediation::{
    ApprovalService, ApprovalStatus, ArtifactStore, RecordingExecutor, RemediationPlanner,
    RemediationRequest, RemediationStatus, RemediationTemplateService, RollbackService,
    RollbackStatus, RollbackType, StepStatus, Vulnerability, WorkflowGate, WorkflowRuntime,
    WorkflowStatus, WorkflowStepKind,
};
use serde_json::json;

struct Harness {
    _dir: tempfile::TempDir,
    store: ArtifactStore,
    planner: RemediationPlanner,
    runtime: WorkflowRuntime,
    approvals: ApprovalService,
    rollbacks: RollbackService,
    executor: RecordingExecutor,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::with_base(dir.path());
    let store = ArtifactStore::new(settings);
    Harness {
        planner: RemediationPlanner::new(RemediationTemplateService::new(), store.clone()),
        runtime: WorkflowRuntime::new(store.clone()),
        approvals: ApprovalService::new(store.clone()),
        rollbacks: RollbackService::new(store.clone()),
        executor: RecordingExecutor::new(store.clone()),
        store,
        _dir: dir,
    }
}

fn sample_request() -> RemediationRequest {
    RemediationRequest {
        repository_url: "https://github.com/test/repo".into(),
        commit_sha: "abcdef123456".into(),
        vulnerabilities: vec![Vulnerability {
            id: "CVE-2023-0001".into(),
            severity: "high".into(),
            component: "example-dependency".into(),
            file_path: Some("package.json".into()),
            current_version: Some("1.0.0".into()),
            fixed_version: Some("1.1.0".into()),
            references: vec![],
        }],
        auto_apply: false,
        metadata: AttrMap::new(),
    }
}

#[tokio::test]
async fn workflow_steps_pair_remediation_and_verification() {
    let h = harness();
    let plan = h.planner.create_plan(&sample_request()).await.unwrap();
    let workflow = h
        .runtime
        .create_workflow_for_plan(&plan, &WorkflowGate::default())
        .await
        .unwrap();

    assert_eq!(workflow.status, WorkflowStatus::Pending);
    assert_eq!(workflow.steps.len(), plan.actions.len() * 2);
    for (i, action) in plan.actions.iter().enumerate() {
        let remediation = &workflow.steps[i * 2];
        let verification = &workflow.steps[i * 2 + 1];
        assert_eq!(remediation.kind, WorkflowStepKind::Remediation);
        assert_eq!(remediation.action_id, action.id);
        assert_eq!(remediation.status, StepStatus::Pending);
        assert_eq!(verification.kind, WorkflowStepKind::Verification);
        assert_eq!(verification.action_id, action.id);
    }
}

#[tokio::test]
async fn unattended_workflow_runs_to_completion() {
    let h = harness();
    let plan = h.planner.create_plan(&sample_request()).await.unwrap();
    let workflow = h
        .runtime
        .create_workflow_for_plan(&plan, &WorkflowGate::default())
        .await
        .unwrap();

    for _ in 0..workflow.steps.len() {
        let outcome = h
            .runtime
            .execute_workflow_step(&workflow.id, &h.executor, &h.approvals, &h.rollbacks)
            .await
            .unwrap();
        assert!(outcome.success);
    }

    let finished = h.runtime.get_workflow(&workflow.id).await.unwrap();
    assert_eq!(finished.status, WorkflowStatus::Completed);
    assert_eq!(finished.current_step_index, finished.steps.len());

    let action = h.store.load_action(&plan.actions[0].id).await.unwrap();
    assert_eq!(action.status, RemediationStatus::Completed);
}

#[tokio::test]
async fn approval_suspends_then_resumes_workflow() {
    let h = harness();
    let plan = h.planner.create_plan(&sample_request()).await.unwrap();
    let gate = WorkflowGate {
        requires_approval: true,
        approval_roles: vec!["security_admin".into(), "developer".into()],
        auto_approve_policy: None,
    };
    let workflow = h.runtime.create_workflow_for_plan(&plan, &gate).await.unwrap();

    // executing the gated step suspends the workflow
    let outcome = h
        .runtime
        .execute_workflow_step(&workflow.id, &h.executor, &h.approvals, &h.rollbacks)
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.step.status, StepStatus::WaitingForApproval);
    let request_id = outcome.step.result["approval_request_id"]
        .as_str()
        .unwrap()
        .to_string();

    let suspended = h.runtime.get_workflow(&workflow.id).await.unwrap();
    assert_eq!(suspended.current_step_index, 0);

    // while waiting, the step cannot be driven again
    let err = h
        .runtime
        .execute_workflow_step(&workflow.id, &h.executor, &h.approvals, &h.rollbacks)
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), "step_waiting_for_approval");

    // approve and resume
    let (ok, request) = h
        .approvals
        .approve_request(&request_id, "test-approver", "approved for testing")
        .await
        .unwrap();
    assert!(ok);
    assert_eq!(request.status, ApprovalStatus::Approved);

    let outcome = h
        .runtime
        .handle_approval_result(
            &workflow.id,
            &request.step_id,
            true,
            "test-approver",
            "approved for testing",
            &h.executor,
            &h.rollbacks,
        )
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.step.status, StepStatus::Completed);
    assert_eq!(outcome.workflow.current_step_index, 1);
}

#[tokio::test]
async fn rejection_fails_workflow_and_blocks_further_steps() {
    let h = harness();
    let plan = h.planner.create_plan(&sample_request()).await.unwrap();
    let gate = WorkflowGate {
        requires_approval: true,
        approval_roles: vec!["security_admin".into()],
        auto_approve_policy: None,
    };
    let workflow = h.runtime.create_workflow_for_plan(&plan, &gate).await.unwrap();

    let outcome = h
        .runtime
        .execute_workflow_step(&workflow.id, &h.executor, &h.approvals, &h.rollbacks)
        .await
        .unwrap();
    let request_id = outcome.step.result["approval_request_id"]
        .as_str()
        .unwrap()
        .to_string();

    let (ok, request) = h
        .approvals
        .reject_request(&request_id, "test-approver", "rejected for testing")
        .await
        .unwrap();
    assert!(ok);

    let outcome = h
        .runtime
        .handle_approval_result(
            &workflow.id,
            &request.step_id,
            false,
            "test-approver",
            "rejected for testing",
            &h.executor,
            &h.rollbacks,
        )
        .await
        .unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.step.status, StepStatus::ApprovalRejected);
    assert_eq!(outcome.workflow.status, WorkflowStatus::Failed);

    // no subsequent step executes
    let err = h
        .runtime
        .execute_workflow_step(&workflow.id, &h.executor, &h.approvals, &h.rollbacks)
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), "workflow_terminal");
}

#[tokio::test]
async fn second_decision_does_not_drive_the_workflow() {
    let h = harness();
    let plan = h.planner.create_plan(&sample_request()).await.unwrap();
    let gate = WorkflowGate {
        requires_approval: true,
        approval_roles: vec!["security_admin".into()],
        auto_approve_policy: None,
    };
    let workflow = h.runtime.create_workflow_for_plan(&plan, &gate).await.unwrap();

    let outcome = h
        .runtime
        .execute_workflow_step(&workflow.id, &h.executor, &h.approvals, &h.rollbacks)
        .await
        .unwrap();
    let step_id = outcome.step.id.clone();

    h.runtime
        .handle_approval_result(
            &workflow.id,
            &step_id,
            true,
            "first-approver",
            "go",
            &h.executor,
            &h.rollbacks,
        )
        .await
        .unwrap();

    // a late rejection is recorded but inert
    let outcome = h
        .runtime
        .handle_approval_result(
            &workflow.id,
            &step_id,
            false,
            "late-approver",
            "no",
            &h.executor,
            &h.rollbacks,
        )
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.step.result["ignored_decision"], json!(true));

    let current = h.runtime.get_workflow(&workflow.id).await.unwrap();
    assert_eq!(current.steps[0].status, StepStatus::Completed);
    assert_ne!(current.status, WorkflowStatus::Failed);
}

#[tokio::test]
async fn full_lifecycle_with_approval_and_rollback() {
    let h = harness();
    let plan = h.planner.create_plan(&sample_request()).await.unwrap();
    assert_eq!(plan.actions.len(), 1);
    let action_id = plan.actions[0].id.clone();

    let gate = WorkflowGate {
        requires_approval: true,
        approval_roles: vec!["security_admin".into(), "developer".into()],
        auto_approve_policy: None,
    };
    let workflow = h.runtime.create_workflow_for_plan(&plan, &gate).await.unwrap();

    // remediation step suspends for approval
    let outcome = h
        .runtime
        .execute_workflow_step(&workflow.id, &h.executor, &h.approvals, &h.rollbacks)
        .await
        .unwrap();
    assert_eq!(outcome.step.status, StepStatus::WaitingForApproval);
    let request_id = outcome.step.result["approval_request_id"]
        .as_str()
        .unwrap()
        .to_string();
    let request = h.approvals.get_request(&request_id).await.unwrap();
    assert_eq!(request.status, ApprovalStatus::Pending);

    // approve; workflow advances to verification
    h.approvals
        .approve_request(&request_id, "test-approver", "ship it")
        .await
        .unwrap();
    let outcome = h
        .runtime
        .handle_approval_result(
            &workflow.id,
            &request.step_id,
            true,
            "test-approver",
            "ship it",
            &h.executor,
            &h.rollbacks,
        )
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.workflow.current_step_index, 1);

    // verification completes the workflow
    let outcome = h
        .runtime
        .execute_workflow_step(&workflow.id, &h.executor, &h.approvals, &h.rollbacks)
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.workflow.status, WorkflowStatus::Completed);

    // snapshot, rollback operation, perform and verify
    let snapshot = h
        .rollbacks
        .create_snapshot(
            &workflow.id,
            &action_id,
            "package.json",
            br#"{"dependencies": {"example-dependency": "1.0.0"}}"#.to_vec(),
            AttrMap::new(),
        )
        .await
        .unwrap();
    let operation = h
        .rollbacks
        .create_rollback_operation(
            &workflow.id,
            &action_id,
            &snapshot.id,
            RollbackType::Full,
            AttrMap::new(),
        )
        .await
        .unwrap();

    let performed = h.rollbacks.perform_rollback(&operation.id).await.unwrap();
    assert_eq!(performed.status, RollbackStatus::Completed);

    let verified = h.rollbacks.verify_rollback(&operation.id).await.unwrap();
    assert_eq!(verified.status, RollbackStatus::Verified);

    // verified rollback rolls the plan (and workflow) back
    let plan = h.planner.get_plan(&plan.id).await.unwrap();
    assert_eq!(plan.status, RemediationStatus::RolledBack);
    let workflow = h.runtime.get_workflow(&workflow.id).await.unwrap();
    assert_eq!(workflow.status, WorkflowStatus::RolledBack);
}

#[tokio::test]
async fn rollback_step_inside_a_workflow() {
    let h = harness();
    let plan = h.planner.create_plan(&sample_request()).await.unwrap();
    let action_id = plan.actions[0].id.clone();
    let workflow = h
        .runtime
        .create_workflow_for_plan(&plan, &WorkflowGate::default())
        .await
        .unwrap();

    let snapshot = h
        .rollbacks
        .create_snapshot(&workflow.id, &action_id, "package.json", b"{}".to_vec(), AttrMap::new())
        .await
        .unwrap();
    let operation = h
        .rollbacks
        .create_rollback_operation(
            &workflow.id,
            &action_id,
            &snapshot.id,
            RollbackType::Full,
            AttrMap::new(),
        )
        .await
        .unwrap();

    h.runtime
        .append_rollback_step(&workflow.id, &action_id, &operation.id)
        .await
        .unwrap();

    let outcome = h
        .runtime
        .execute_workflow_step(&workflow.id, &h.executor, &h.approvals, &h.rollbacks)
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.step.kind, WorkflowStepKind::Rollback);
    assert_eq!(outcome.step.status, StepStatus::Completed);

    let operation = h.rollbacks.get_rollback_operation(&operation.id).await.unwrap();
    assert_eq!(operation.status, RollbackStatus::Completed);
}

#[tokio::test]
async fn auto_approval_policy_runs_step_without_waiting() {
    let h = harness();
    let engine = pipeguard_policy::PolicyEngine::new();
    let policy = engine
        .load_policy_from_yaml(
            r#"
id: auto-approve-all
name: Auto approve everything
type: operational
enforcement_mode: audit
rules: []
"#,
        )
        .unwrap();

    let plan = h.planner.create_plan(&sample_request()).await.unwrap();
    let gate = WorkflowGate {
        requires_approval: true,
        approval_roles: vec!["security_admin".into()],
        auto_approve_policy: Some(policy),
    };
    let workflow = h.runtime.create_workflow_for_plan(&plan, &gate).await.unwrap();

    let outcome = h
        .runtime
        .execute_workflow_step(&workflow.id, &h.executor, &h.approvals, &h.rollbacks)
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.step.status, StepStatus::Completed);
    assert_eq!(outcome.workflow.current_step_index, 1);

    let requests = h.approvals.list_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].approver.as_deref(), Some("system"));
}
