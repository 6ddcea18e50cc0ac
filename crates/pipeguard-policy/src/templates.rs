use crate::model::{EnforcementMode, Environment, Policy, PolicyKind, PolicyStatus, Rule};
use chrono::Utc;
use pipeguard_core::{ids::uuid_id, AttrMap, PipeguardError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateParameter {
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// A parameterised policy prototype. Rule prototypes carry `${param}`
/// placeholders that instantiation replaces with supplied values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: PolicyKind,
    pub enforcement_mode: EnforcementMode,
    /// Rule prototypes as raw documents, so placeholders can live in
    /// any string position.
    pub rules: Value,
    pub parameters: BTreeMap<String, TemplateParameter>,
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PolicyTemplater {
    templates: Vec<PolicyTemplate>,
}

impl Default for PolicyTemplater {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyTemplater {
    pub fn new() -> Self {
        Self {
            templates: builtin_templates(),
        }
    }

    pub fn with_templates(templates: Vec<PolicyTemplate>) -> Self {
        Self { templates }
    }

    pub fn list_templates(&self) -> &[PolicyTemplate] {
        &self.templates
    }

    pub fn get_template(&self, template_id: &str) -> Option<&PolicyTemplate> {
        self.templates.iter().find(|t| t.id == template_id)
    }

    pub fn register_template(&mut self, template: PolicyTemplate) {
        self.templates.retain(|t| t.id != template.id);
        self.templates.push(template);
    }

    /// Instantiate a template into a concrete policy. Every required
    /// parameter must be supplied (or carry a default); unknown
    /// placeholders are an input error.
    pub fn instantiate(
        &self,
        template_id: &str,
        parameters: &BTreeMap<String, Value>,
    ) -> Result<Policy> {
        let template = self.get_template(template_id).ok_or_else(|| {
            PipeguardError::NotFound(format!("policy template '{}'", template_id))
        })?;

        let mut resolved: BTreeMap<String, Value> = BTreeMap::new();
        for (name, parameter) in &template.parameters {
            match parameters.get(name).or(parameter.default.as_ref()) {
                Some(value) => {
                    resolved.insert(name.clone(), value.clone());
                }
                None if parameter.required => {
                    return Err(PipeguardError::Input(format!(
                        "template '{}' requires parameter '{}'",
                        template_id, name
                    )));
                }
                None => {}
            }
        }

        let mut rules_value = template.rules.clone();
        substitute(&mut rules_value, &resolved)?;
        let mut rules: Vec<Rule> = serde_json::from_value(rules_value)?;
        for rule in &mut rules {
            if rule.id.is_empty() {
                rule.id = uuid_id();
            }
        }

        let now = Utc::now();
        let policy = Policy {
            id: format!("{}-{}", template.id, &uuid_id()[..8]),
            name: template.name.clone(),
            description: template.description.clone(),
            kind: template.kind,
            rules,
            enforcement_mode: template.enforcement_mode,
            status: PolicyStatus::Active,
            environments: vec![Environment::All],
            tags: template.tags.clone(),
            version: "1.0.0".to_string(),
            parent_policy_id: None,
            template_id: Some(template.id.clone()),
            created_at: now,
            updated_at: now,
            metadata: AttrMap::new(),
        };
        policy.validate()?;
        debug!(template_id = %template.id, policy_id = %policy.id, "instantiated policy template");
        Ok(policy)
    }
}

/// Replace `${name}` placeholders throughout a document. A string that
/// is exactly one placeholder takes the parameter's raw value (so
/// numbers and booleans survive); otherwise placeholders interpolate
/// into the surrounding text.
fn substitute(value: &mut Value, parameters: &BTreeMap<String, Value>) -> Result<()> {
    match value {
        Value::String(text) => {
            if let Some(name) = exact_placeholder(text) {
                let replacement = parameters.get(name).ok_or_else(|| {
                    PipeguardError::Input(format!("no value for placeholder '${{{}}}'", name))
                })?;
                *value = replacement.clone();
                return Ok(());
            }
            if text.contains("${") {
                let mut rendered = text.clone();
                for (name, parameter) in parameters {
                    let placeholder = format!("${{{}}}", name);
                    if rendered.contains(&placeholder) {
                        let rendering = match parameter {
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
                *value = Value::String(rendered);
            }
        }
        Value::Array(items) => {
            for item in items {
                substitute(item, parameters)?;
            }
        }
        Value::Object(entries) => {
            for (_, entry) in entries.iter_mut() {
                substitute(entry, parameters)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn exact_placeholder(text: &str) -> Option<&str> {
    let stripped = text.strip_prefix("${")?.strip_suffix('}')?;
    if stripped.contains("${") || stripped.contains('}') {
        return None;
    }
    Some(stripped)
}

fn builtin_templates() -> Vec<PolicyTemplate> {
    vec![
        PolicyTemplate {
            id: "container-security-baseline".to_string(),
            name: "Container security baseline".to_string(),
            description: "Containers must not run privileged or share the host network"
                .to_string(),
            kind: PolicyKind::Security,
            enforcement_mode: EnforcementMode::Blocking,
            rules: json!([
                {
                    "id": "",
                    "name": "no privileged containers",
                    "description": "container.privileged must be false",
                    "severity": "${severity}",
                    "condition": {
                        "operator": "and",
                        "conditions": [
                            {"field": "container.privileged", "operator": "equals", "value": false}
                        ]
                    }
                },
                {
                    "id": "",
                    "name": "no host network",
                    "description": "container.host_network must be false",
                    "severity": "${severity}",
                    "condition": {
                        "operator": "and",
                        "conditions": [
                            {"field": "container.host_network", "operator": "equals", "value": false}
                        ]
                    }
                }
            ]),
            parameters: BTreeMap::from([(
                "severity".to_string(),
                TemplateParameter {
                    description: "Severity assigned to both rules".to_string(),
                    required: false,
                    default: Some(json!("critical")),
                },
            )]),
            version: "1.0.0".to_string(),
            tags: vec!["container".to_string(), "baseline".to_string()],
        },
        PolicyTemplate {
            id: "approved-image-registry".to_string(),
            name: "Approved image registry".to_string(),
            description: "Images must come from the approved registry".to_string(),
            kind: PolicyKind::Compliance,
            enforcement_mode: EnforcementMode::Blocking,
            rules: json!([
                {
                    "id": "",
                    "name": "image registry allowed",
                    "description": "image must start with ${registry}",
                    "severity": "high",
                    "condition": {
                        "operator": "and",
                        "conditions": [
                            {"field": "image", "operator": "starts_with", "value": "${registry}"}
                        ]
                    }
                }
            ]),
            parameters: BTreeMap::from([(
                "registry".to_string(),
                TemplateParameter {
                    description: "Registry prefix images must carry".to_string(),
                    required: true,
                    default: None,
                },
            )]),
            version: "1.0.0".to_string(),
            tags: vec!["supply-chain".to_string()],
        },
        PolicyTemplate {
            id: "max-vulnerability-score".to_string(),
            name: "Maximum vulnerability score".to_string(),
            description: "Scan results must stay under the CVSS ceiling".to_string(),
            kind: PolicyKind::Operational,
            enforcement_mode: EnforcementMode::Warning,
            rules: json!([
                {
                    "id": "",
                    "name": "cvss ceiling",
                    "description": "scan.max_cvss must stay below ${max_cvss}",
                    "severity": "medium",
                    "condition": {
                        "operator": "and",
                        "conditions": [
                            {"field": "scan.max_cvss", "operator": "less_than", "value": "${max_cvss}"}
                        ]
                    }
                }
            ]),
            parameters: BTreeMap::from([(
                "max_cvss".to_string(),
                TemplateParameter {
                    description: "Highest acceptable CVSS score".to_string(),
                    required: true,
                    default: None,
                },
            )]),
            version: "1.0.0".to_string(),
            tags: vec!["vulnerability".to_string()],
        },
    ]
}
