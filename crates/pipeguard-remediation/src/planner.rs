use crate::model::{
    RemediationPlan, RemediationRequest, RemediationStatus, Vulnerability,
};
use crate::store::ArtifactStore;
use crate::templates::RemediationTemplateService;
use chrono::Utc;
use pipeguard_core::{ids, Result};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Matches vulnerabilities to remediation templates and bundles the
/// resulting actions into a plan.
pub struct RemediationPlanner {
    templates: RemediationTemplateService,
    store: ArtifactStore,
}

impl RemediationPlanner {
    pub fn new(templates: RemediationTemplateService, store: ArtifactStore) -> Self {
        Self { templates, store }
    }

    pub fn templates(&self) -> &RemediationTemplateService {
        &self.templates
    }

    /// Create a remediation plan for a request. Duplicate vulnerability
    /// ids are collapsed; a vulnerability with no applicable template or
    /// with a missing required variable contributes no action.
    pub async fn create_plan(&self, request: &RemediationRequest) -> Result<RemediationPlan> {
        let mut seen = std::collections::HashSet::new();
        let mut actions = Vec::new();

        for vulnerability in &request.vulnerabilities {
            if !seen.insert(vulnerability.id.as_str()) {
                continue;
            }

            let candidates = self
                .templates
                .find_templates_for_vulnerability(vulnerability.kind());
            let Some(template) = candidates.first() else {
                warn!(
                    vulnerability_id = %vulnerability.id,
                    kind = vulnerability.kind(),
                    "no remediation template; skipping"
                );
                continue;
            };

            let variables = template_variables(vulnerability);
            match self
                .templates
                .create_action_from_template(template, &vulnerability.id, &variables)
            {
                Ok(action) => {
                    self.store.save_action(&action).await?;
                    actions.push(action);
                }
                Err(e) => {
                    warn!(
                        vulnerability_id = %vulnerability.id,
                        template_id = %template.id,
                        error = %e,
                        "cannot materialise action; skipping"
                    );
                }
            }
        }

        let now = Utc::now();
        let mut metadata = request.metadata.clone();
        metadata.insert("auto_apply".to_string(), json!(request.auto_apply));

        let plan = RemediationPlan {
            id: ids::artifact_id("PLAN"),
            repository_url: request.repository_url.clone(),
            commit_sha: request.commit_sha.clone(),
            actions,
            status: RemediationStatus::Pending,
            created_at: now,
            updated_at: now,
            metadata,
        };
        self.store.save_plan(&plan).await?;

        info!(
            plan_id = %plan.id,
            target = %plan.target(),
            actions = plan.actions.len(),
            "created remediation plan"
        );
        Ok(plan)
    }

    pub async fn get_plan(&self, plan_id: &str) -> Result<RemediationPlan> {
        self.store.load_plan(plan_id).await
    }

    pub async fn set_plan_status(
        &self,
        plan_id: &str,
        status: RemediationStatus,
    ) -> Result<RemediationPlan> {
        let mut plan = self.store.load_plan(plan_id).await?;
        plan.status = status;
        plan.updated_at = Utc::now();
        self.store.save_plan(&plan).await?;
        Ok(plan)
    }
}

/// Template variables drawn from the vulnerability record; absent
/// fields stay absent so required-variable checks can skip the action.
fn template_variables(vulnerability: &Vulnerability) -> BTreeMap<String, Value> {
    let mut variables = BTreeMap::new();
    variables.insert(
        "dependency_name".to_string(),
        json!(vulnerability.component),
    );
    if let Some(file_path) = &vulnerability.file_path {
        variables.insert("file_path".to_string(), json!(file_path));
    }
    if let Some(current) = &vulnerability.current_version {
        variables.insert("current_version".to_string(), json!(current));
    }
    if let Some(fixed) = &vulnerability.fixed_version {
        variables.insert("fixed_version".to_string(), json!(fixed));
    }
    variables
}
