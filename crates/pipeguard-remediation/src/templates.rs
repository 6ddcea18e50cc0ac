use crate::model::{
    ActionSource, ActionStep, RemediationAction, RemediationStatus, RemediationStrategy,
    RemediationTemplate, TemplateType, VariableSpec,
};
use chrono::Utc;
use pipeguard_core::{ids, AttrMap, PipeguardError, Result};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Registry of remediation templates plus template→action
/// instantiation.
#[derive(Debug, Clone)]
pub struct RemediationTemplateService {
    templates: Vec<RemediationTemplate>,
}

impl Default for RemediationTemplateService {
    fn default() -> Self {
        Self::new()
    }
}

impl RemediationTemplateService {
    pub fn new() -> Self {
        Self {
            templates: builtin_templates(),
        }
    }

    pub fn with_templates(templates: Vec<RemediationTemplate>) -> Self {
        Self { templates }
    }

    pub fn list_templates(&self) -> &[RemediationTemplate] {
        &self.templates
    }

    pub fn get_template(&self, template_id: &str) -> Option<&RemediationTemplate> {
        self.templates.iter().find(|t| t.id == template_id)
    }

    pub fn register_template(&mut self, template: RemediationTemplate) {
        self.templates.retain(|t| t.id != template.id);
        self.templates.push(template);
    }

    /// Templates declaring support for the given vulnerability type, in
    /// registration order.
    pub fn find_templates_for_vulnerability(&self, vulnerability_type: &str) -> Vec<&RemediationTemplate> {
        self.templates
            .iter()
            .filter(|t| {
                t.vulnerability_types
                    .iter()
                    .any(|supported| supported == vulnerability_type)
            })
            .collect()
    }

    /// Materialise an action from a template by substituting `${var}`
    /// placeholders. A missing required variable is an input error; the
    /// planner treats it as "skip this action".
    pub fn create_action_from_template(
        &self,
        template: &RemediationTemplate,
        vulnerability_id: &str,
        variables: &BTreeMap<String, Value>,
    ) -> Result<RemediationAction> {
        for (name, spec) in &template.variables {
            if spec.required && !variables.contains_key(name) {
                return Err(PipeguardError::Input(format!(
                    "template '{}' requires variable '{}'",
                    template.id, name
                )));
            }
        }

        let mut steps = template.steps.clone();
        for step in &mut steps {
            step.name = render_text(&step.name, variables)?;
            step.description = render_text(&step.description, variables)?;
            for (_, parameter) in step.parameters.iter_mut() {
                render_value(parameter, variables)?;
            }
        }

        let now = Utc::now();
        let mut metadata = AttrMap::new();
        metadata.insert("template_id".to_string(), json!(template.id));
        metadata.insert("template_name".to_string(), json!(template.name));
        metadata.insert(
            "template_type".to_string(),
            serde_json::to_value(template.template_type)?,
        );
        metadata.insert("variables".to_string(), json!(variables));

        let action = RemediationAction {
            id: ids::artifact_id("ACTION"),
            vulnerability_id: vulnerability_id.to_string(),
            name: format!("Remediate {}", vulnerability_id),
            description: format!(
                "Remediation for {} using template {}",
                vulnerability_id, template.name
            ),
            strategy: template.strategy,
            source: ActionSource::Template,
            steps,
            status: RemediationStatus::Pending,
            created_at: now,
            updated_at: now,
            metadata,
        };
        debug!(action_id = %action.id, template_id = %template.id, "created action from template");
        Ok(action)
    }
}

fn render_text(text: &str, variables: &BTreeMap<String, Value>) -> Result<String> {
    if !text.contains("${") {
        return Ok(text.to_string());
    }
    let mut rendered = text.to_string();
    for (name, value) in variables {
        let placeholder = format!("${{{}}}", name);
        if rendered.contains(&placeholder) {
            let rendering = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            rendered = rendered.replace(&placeholder, &rendering);
        }
    }
    if rendered.contains("${") {
        return Err(PipeguardError::Input(format!(
            "unresolved placeholder in '{}'",
            rendered
        )));
    }
    Ok(rendered)
}

fn render_value(value: &mut Value, variables: &BTreeMap<String, Value>) -> Result<()> {
    match value {
        Value::String(text) => {
            if let Some(name) = text
                .strip_prefix("${")
                .and_then(|rest| rest.strip_suffix('}'))
                .filter(|name| !name.contains('}') && !name.contains("${"))
            {
                let replacement = variables.get(name).ok_or_else(|| {
                    PipeguardError::Input(format!("no value for placeholder '${{{}}}'", name))
                })?;
                *value = replacement.clone();
            } else {
                *value = Value::String(render_text(text, variables)?);
            }
        }
        Value::Array(items) => {
            for item in items {
                render_value(item, variables)?;
            }
        }
        Value::Object(entries) => {
            for (_, entry) in entries.iter_mut() {
                render_value(entry, variables)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn builtin_templates() -> Vec<RemediationTemplate> {
    vec![
        RemediationTemplate {
            id: "TEMPLATE-DEPENDENCY-UPDATE".to_string(),
            name: "Dependency Update".to_string(),
            description: "Update a dependency to a fixed version".to_string(),
            template_type: TemplateType::DependencyUpdate,
            vulnerability_types: vec!["CVE".to_string(), "DEPENDENCY".to_string()],
            steps: vec![
                ActionStep {
                    name: "Identify dependency file".to_string(),
                    description: "Identify the file containing the dependency".to_string(),
                    action: "IDENTIFY".to_string(),
                    parameters: BTreeMap::from([(
                        "file_path".to_string(),
                        json!("${file_path}"),
                    )]),
                },
                ActionStep {
                    name: "Update dependency version".to_string(),
                    description: "Update the dependency to the fixed version".to_string(),
                    action: "UPDATE".to_string(),
                    parameters: BTreeMap::from([
                        ("file_path".to_string(), json!("${file_path}")),
                        ("dependency_name".to_string(), json!("${dependency_name}")),
                        ("current_version".to_string(), json!("${current_version}")),
                        ("fixed_version".to_string(), json!("${fixed_version}")),
                    ]),
                },
            ],
            variables: BTreeMap::from([
                (
                    "file_path".to_string(),
                    VariableSpec {
                        description: "Path to the dependency file".to_string(),
                        value_type: "string".to_string(),
                        required: true,
                    },
                ),
                (
                    "dependency_name".to_string(),
                    VariableSpec {
                        description: "Name of the dependency".to_string(),
                        value_type: "string".to_string(),
                        required: true,
                    },
                ),
                (
                    "current_version".to_string(),
                    VariableSpec {
                        description: "Current version of the dependency".to_string(),
                        value_type: "string".to_string(),
                        required: true,
                    },
                ),
                (
                    "fixed_version".to_string(),
                    VariableSpec {
                        description: "Fixed version of the dependency".to_string(),
                        value_type: "string".to_string(),
                        required: true,
                    },
                ),
            ]),
            strategy: RemediationStrategy::Automated,
        },
        RemediationTemplate {
            id: "TEMPLATE-CONFIG-CHANGE".to_string(),
            name: "Configuration Change".to_string(),
            description: "Apply a configuration value change".to_string(),
            template_type: TemplateType::ConfigChange,
            vulnerability_types: vec!["CONFIG".to_string(), "MISCONFIGURATION".to_string()],
            steps: vec![ActionStep {
                name: "Set configuration value".to_string(),
                description: "Set ${setting} in ${file_path}".to_string(),
                action: "SET".to_string(),
                parameters: BTreeMap::from([
                    ("file_path".to_string(), json!("${file_path}")),
                    ("setting".to_string(), json!("${setting}")),
                    ("value".to_string(), json!("${value}")),
                ]),
            }],
            variables: BTreeMap::from([
                (
                    "file_path".to_string(),
                    VariableSpec {
                        description: "Configuration file to edit".to_string(),
                        value_type: "string".to_string(),
                        required: true,
                    },
                ),
                (
                    "setting".to_string(),
                    VariableSpec {
                        description: "Setting name".to_string(),
                        value_type: "string".to_string(),
                        required: true,
                    },
                ),
                (
                    "value".to_string(),
                    VariableSpec {
                        description: "New value".to_string(),
                        value_type: "string".to_string(),
                        required: true,
                    },
                ),
            ]),
            strategy: RemediationStrategy::Automated,
        },
        RemediationTemplate {
            id: "TEMPLATE-CODE-PATCH".to_string(),
            name: "Code Patch".to_string(),
            description: "Apply a reviewed patch to a source file".to_string(),
            template_type: TemplateType::CodePatch,
            vulnerability_types: vec!["CWE".to_string()],
            steps: vec![ActionStep {
                name: "Apply patch".to_string(),
                description: "Apply the patch to ${file_path}".to_string(),
                action: "PATCH".to_string(),
                parameters: BTreeMap::from([
                    ("file_path".to_string(), json!("${file_path}")),
                    ("patch".to_string(), json!("${patch}")),
                ]),
            }],
            variables: BTreeMap::from([
                (
                    "file_path".to_string(),
                    VariableSpec {
                        description: "Source file to patch".to_string(),
                        value_type: "string".to_string(),
                        required: true,
                    },
                ),
                (
                    "patch".to_string(),
                    VariableSpec {
                        description: "Unified diff to apply".to_string(),
                        value_type: "string".to_string(),
                        required: true,
                    },
                ),
            ]),
            strategy: RemediationStrategy::Assisted,
        },
    ]
}
