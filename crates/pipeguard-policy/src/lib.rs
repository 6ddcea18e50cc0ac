pub mod compliance;
pub mod engine;
pub mod model;
pub mod store;
pub mod templates;
pub mod validator;

pub use compliance::{build_report, ComplianceReport, ComplianceStatus, RequirementAssessment};
pub use engine::{EnforcementOutcome, PolicyEngine};
pub use model::*;
pub use store::{increment_version, version_tuple, PolicyStore, PolicyVersionInfo, VersionDiff};
pub use templates::{PolicyTemplate, PolicyTemplater, TemplateParameter};
pub use validator::{
    DraftTemplate, ImpactReport, PolicyValidator, ScenarioReport, ScenarioSpec,
    SimulationOutcome, ValidationReport,
};
