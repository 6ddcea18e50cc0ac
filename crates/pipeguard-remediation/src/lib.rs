pub mod approval;
pub mod model;
pub mod planner;
pub mod rollback;
pub mod store;
pub mod templates;
pub mod workflow;

pub use approval::{ApprovalService, SYSTEM_APPROVER};
pub use model::*;
pub use planner::RemediationPlanner;
pub use rollback::RollbackService;
pub use store::ArtifactStore;
pub use templates::RemediationTemplateService;
pub use workflow::{
    ActionExecutor, RecordingExecutor, StepOutcome, WorkflowGate, WorkflowRuntime,
};
