pub mod api;
pub mod assembler;
pub mod metrics;
pub mod planner;
pub mod visualize;

pub use api::{analyze_project, AnalysisRequest, AnalysisResponse};
pub use assembler::assemble;
pub use metrics::{calculate_metrics, GraphMetrics};
pub use planner::{affected_nodes, parallel_opportunities, plan_build, BuildPlan};
pub use visualize::{visualization_payload, VisualizationPayload};
