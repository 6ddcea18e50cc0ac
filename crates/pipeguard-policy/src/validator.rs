use crate::engine::PolicyEngine;
use crate::model::{
    EnforcementMode, Policy, PolicyKind, RuleResult, Severity, Violation,
};
use pipeguard_core::{ids, PipeguardError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

const VALID_TYPES: &[&str] = &["security", "compliance", "operational"];
const VALID_MODES: &[&str] = &["blocking", "warning", "audit"];
const VALID_SEVERITIES: &[&str] = &["critical", "high", "medium", "low", "info"];
const VALID_OPERATORS: &[&str] = &[
    "equals",
    "not_equals",
    "contains",
    "not_contains",
    "starts_with",
    "ends_with",
    "greater_than",
    "less_than",
    "regex_match",
    "exists",
    "not_exists",
];

/// Outcome of a structural lint over a policy document. Every problem
/// is accumulated; a single run reports them all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationOutcome {
    pub policy_id: String,
    pub policy_name: String,
    pub policy_kind: PolicyKind,
    pub passed: bool,
    pub rule_results: Vec<RuleResult>,
    pub violations: Vec<Violation>,
    pub target: Value,
}

/// One dry-run scenario: a target and the evaluation outcome it is
/// expected to produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub target: Value,
    #[serde(default = "default_expected")]
    pub expected_result: bool,
}

fn default_expected() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub scenario: usize,
    pub description: String,
    pub passed: bool,
    pub expected_result: bool,
    pub actual_result: bool,
    pub rule_results: Vec<RuleResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub policy_id: String,
    pub policy_name: String,
    pub all_scenarios_passed: bool,
    pub scenarios_passed: usize,
    pub scenarios_failed: usize,
    pub scenario_results: Vec<ScenarioOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetImpact {
    pub target_id: String,
    pub target_type: String,
    pub passed: bool,
    pub violations: usize,
    pub rule_results: Vec<RuleResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleImpact {
    pub rule_id: String,
    pub rule_name: String,
    pub severity: Severity,
    pub targets_failed: usize,
    pub failure_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactReport {
    pub policy_id: String,
    pub policy_name: String,
    pub targets_evaluated: usize,
    pub targets_passed: usize,
    pub targets_failed: usize,
    pub pass_rate: f64,
    pub rule_impact: Vec<RuleImpact>,
    pub results: Vec<TargetImpact>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftTemplate {
    pub policy: Policy,
    pub yaml: String,
}

/// Pre-flight validation and dry-run tooling for policy documents:
/// lint, single-target simulation, batch scenario testing and impact
/// analysis across a target set.
#[derive(Debug, Default)]
pub struct PolicyValidator {
    engine: PolicyEngine,
}

impl PolicyValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulations honour the engine's registered exceptions.
    pub fn with_engine(engine: PolicyEngine) -> Self {
        Self { engine }
    }

    /// Lint a policy YAML document. Unlike `load_policy_from_yaml`,
    /// this does not stop at the first problem: missing fields, bad
    /// enum values and malformed condition trees are all collected
    /// into one report.
    pub fn validate_policy_yaml(&self, yaml_content: &str) -> ValidationReport {
        let document: Value = match serde_yaml::from_str(yaml_content) {
            Ok(value) => value,
            Err(e) => {
                return ValidationReport {
                    valid: false,
                    errors: vec![format!("Invalid YAML syntax: {}", e)],
                };
            }
        };
        let Some(policy) = document.as_object() else {
            return ValidationReport {
                valid: false,
                errors: vec!["YAML content must be a mapping".to_string()],
            };
        };

        let mut errors = Vec::new();

        if !policy.contains_key("name") {
            errors.push("Missing required field: name".to_string());
        }
        if !policy.contains_key("description") {
            errors.push("Missing required field: description".to_string());
        }
        match policy.get("type").and_then(Value::as_str) {
            None => errors.push("Missing required field: type".to_string()),
            Some(kind) if !VALID_TYPES.contains(&kind) => {
                errors.push(format!("Invalid policy type: {}", kind));
            }
            _ => {}
        }
        match policy.get("enforcement_mode").and_then(Value::as_str) {
            None => errors.push("Missing required field: enforcement_mode".to_string()),
            Some(mode) if !VALID_MODES.contains(&mode) => {
                errors.push(format!("Invalid enforcement mode: {}", mode));
            }
            _ => {}
        }

        match policy.get("rules").and_then(Value::as_array) {
            None => errors.push("Missing required field: rules (must be a list)".to_string()),
            Some(rules) if rules.is_empty() => {
                errors.push("Policy must have at least one rule".to_string());
            }
            Some(rules) => {
                for (index, rule) in rules.iter().enumerate() {
                    validate_rule(rule, index, &mut errors);
                }
            }
        }

        // Only when the lint is clean is the strict parser worth
        // consulting; it catches what the shape checks cannot.
        if errors.is_empty() {
            if let Err(e) = self.engine.load_policy_from_yaml(yaml_content) {
                errors.push(format!("Failed to parse policy: {}", e));
            }
        }

        debug!(errors = errors.len(), "validated policy document");
        ValidationReport {
            valid: errors.is_empty(),
            errors,
        }
    }

    fn load_validated(&self, policy_yaml: &str) -> Result<Policy> {
        let report = self.validate_policy_yaml(policy_yaml);
        if !report.valid {
            return Err(PipeguardError::Input(format!(
                "policy validation failed: {}",
                report.errors.join("; ")
            )));
        }
        self.engine.load_policy_from_yaml(policy_yaml)
    }

    /// Dry-run a policy document against one target without touching
    /// the store.
    pub fn simulate_policy_evaluation(
        &self,
        policy_yaml: &str,
        target: &Value,
    ) -> Result<SimulationOutcome> {
        let policy = self.load_validated(policy_yaml)?;
        let evaluation = self.engine.evaluate_policy(&policy, target);
        let violations = self.engine.violations(&policy, &evaluation);

        Ok(SimulationOutcome {
            policy_id: policy.id,
            policy_name: policy.name,
            policy_kind: policy.kind,
            passed: evaluation.passed,
            rule_results: evaluation.rule_results,
            violations,
            target: target.clone(),
        })
    }

    /// Evaluate a policy against a batch of expected-vs-actual
    /// scenarios. A scenario passes when the evaluation outcome equals
    /// its expectation.
    pub fn test_policy_with_scenarios(
        &self,
        policy_yaml: &str,
        scenarios: &[ScenarioSpec],
    ) -> Result<ScenarioReport> {
        let policy = self.load_validated(policy_yaml)?;

        let mut scenario_results = Vec::with_capacity(scenarios.len());
        for (index, scenario) in scenarios.iter().enumerate() {
            let evaluation = self.engine.evaluate_policy(&policy, &scenario.target);
            let passed = evaluation.passed == scenario.expected_result;
            scenario_results.push(ScenarioOutcome {
                scenario: index + 1,
                description: scenario
                    .description
                    .clone()
                    .unwrap_or_else(|| format!("Scenario {}", index + 1)),
                passed,
                expected_result: scenario.expected_result,
                actual_result: evaluation.passed,
                rule_results: evaluation.rule_results,
            });
        }

        let scenarios_passed = scenario_results.iter().filter(|r| r.passed).count();
        let scenarios_failed = scenario_results.len() - scenarios_passed;
        info!(
            policy_id = %policy.id,
            passed = scenarios_passed,
            failed = scenarios_failed,
            "scenario test run finished"
        );

        Ok(ScenarioReport {
            policy_id: policy.id,
            policy_name: policy.name,
            all_scenarios_passed: scenarios_failed == 0,
            scenarios_passed,
            scenarios_failed,
            scenario_results,
        })
    }

    /// Evaluate a policy across a target set and fold the outcomes into
    /// per-rule failure statistics, the shape a rollout review needs.
    pub fn analyze_policy_impact(
        &self,
        policy_yaml: &str,
        targets: &[Value],
    ) -> Result<ImpactReport> {
        let policy = self.load_validated(policy_yaml)?;

        let mut results = Vec::with_capacity(targets.len());
        for target in targets {
            let evaluation = self.engine.evaluate_policy(&policy, target);
            let violations = self.engine.violations(&policy, &evaluation);
            results.push(TargetImpact {
                target_id: target
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
                target_type: target
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
                passed: evaluation.passed,
                violations: violations.len(),
                rule_results: evaluation.rule_results,
            });
        }

        let targets_passed = results.iter().filter(|r| r.passed).count();
        let targets_failed = results.len() - targets_passed;

        let mut rule_impact = Vec::with_capacity(policy.rules.len());
        for rule in &policy.rules {
            let targets_hit = results
                .iter()
                .filter(|result| {
                    result
                        .rule_results
                        .iter()
                        .any(|r| r.rule_id == rule.id && !r.passed)
                })
                .count();
            rule_impact.push(RuleImpact {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                severity: rule.severity,
                targets_failed: targets_hit,
                failure_rate: if targets.is_empty() {
                    0.0
                } else {
                    targets_hit as f64 / targets.len() as f64
                },
            });
        }

        Ok(ImpactReport {
            policy_id: policy.id,
            policy_name: policy.name,
            targets_evaluated: targets.len(),
            targets_passed,
            targets_failed,
            pass_rate: if targets.is_empty() {
                0.0
            } else {
                targets_passed as f64 / targets.len() as f64
            },
            rule_impact,
            results,
        })
    }

    /// Generate a draft policy seeded with an example rule for the
    /// given kind. This is a starting point for authors, distinct from
    /// the fixed named templates in `PolicyTemplater`.
    pub fn generate_policy_template(
        &self,
        kind: PolicyKind,
        name: &str,
        description: &str,
        enforcement_mode: EnforcementMode,
    ) -> Result<DraftTemplate> {
        let stamp = ids::archive_timestamp();
        let rule_id = format!("rule-{}-1", stamp);

        let rule = match kind {
            PolicyKind::Security => json!({
                "id": rule_id,
                "name": "Require secure connections",
                "description": "Ensures that all connections use secure protocols",
                "severity": "high",
                "condition": {
                    "operator": "and",
                    "conditions": [
                        {"field": "artifact.protocols", "operator": "contains", "value": "https"},
                        {"field": "artifact.protocols", "operator": "not_contains", "value": "http"}
                    ]
                },
                "remediation_steps": [
                    "Configure your application to use HTTPS instead of HTTP",
                    "Update your infrastructure to redirect HTTP to HTTPS"
                ]
            }),
            PolicyKind::Compliance => json!({
                "id": rule_id,
                "name": "Data encryption at rest",
                "description": "Ensures that all data is encrypted at rest",
                "severity": "high",
                "condition": {
                    "operator": "and",
                    "conditions": [
                        {"field": "artifact.encryption.at_rest", "operator": "equals", "value": true}
                    ]
                },
                "remediation_steps": [
                    "Configure your storage to use encryption at rest",
                    "Update your application to use encrypted storage"
                ]
            }),
            PolicyKind::Operational => json!({
                "id": rule_id,
                "name": "Resource limits defined",
                "description": "Ensures that resource limits are defined",
                "severity": "medium",
                "condition": {
                    "operator": "and",
                    "conditions": [
                        {"field": "deployment.resources.limits", "operator": "exists"},
                        {"field": "deployment.resources.limits.cpu", "operator": "exists"},
                        {"field": "deployment.resources.limits.memory", "operator": "exists"}
                    ]
                },
                "remediation_steps": [
                    "Define resource limits in your deployment configuration",
                    "Set appropriate CPU and memory limits"
                ]
            }),
        };

        let document = json!({
            "id": format!("policy-{}", stamp),
            "name": name,
            "description": description,
            "type": kind,
            "enforcement_mode": enforcement_mode,
            "status": "draft",
            "environments": ["all"],
            "rules": [rule]
        });

        let policy: Policy = serde_json::from_value(document)?;
        policy.validate()?;
        let yaml = serde_yaml::to_string(&policy)?;
        Ok(DraftTemplate { policy, yaml })
    }
}

fn validate_rule(rule: &Value, index: usize, errors: &mut Vec<String>) {
    let Some(rule) = rule.as_object() else {
        errors.push(format!("Rule {}: must be a mapping", index));
        return;
    };

    if !rule.contains_key("name") {
        errors.push(format!("Rule {}: Missing required field: name", index));
    }
    if !rule.contains_key("description") {
        errors.push(format!("Rule {}: Missing required field: description", index));
    }
    match rule.get("severity").and_then(Value::as_str) {
        None => errors.push(format!("Rule {}: Missing required field: severity", index)),
        Some(severity) if !VALID_SEVERITIES.contains(&severity) => {
            errors.push(format!("Rule {}: Invalid severity: {}", index, severity));
        }
        _ => {}
    }

    match rule.get("condition") {
        None => errors.push(format!("Rule {}: Missing required field: condition", index)),
        Some(condition) => validate_condition(condition, &format!("Rule {}", index), errors),
    }
}

/// A node with an `and`/`or` operator is a group and needs a non-empty
/// `conditions` list; anything else is a leaf and needs `field`, a
/// known operator, and a value unless the operator tests existence.
fn validate_condition(condition: &Value, prefix: &str, errors: &mut Vec<String>) {
    let Some(entries) = condition.as_object() else {
        errors.push(format!("{}: condition must be a mapping", prefix));
        return;
    };

    let operator = entries.get("operator").and_then(Value::as_str);
    if matches!(operator, Some("and") | Some("or")) {
        match entries.get("conditions").and_then(Value::as_array) {
            None => errors.push(format!("{}: Condition group missing \"conditions\" list", prefix)),
            Some(children) if children.is_empty() => {
                errors.push(format!(
                    "{}: Condition group must have at least one condition",
                    prefix
                ));
            }
            Some(children) => {
                for (i, child) in children.iter().enumerate() {
                    let nested_operator = child.get("operator").and_then(Value::as_str);
                    if matches!(nested_operator, Some("and") | Some("or")) {
                        validate_condition(child, &format!("{}, Nested group {}", prefix, i), errors);
                    } else {
                        validate_leaf(child, &format!("{}, Condition {}", prefix, i), errors);
                    }
                }
            }
        }
    } else {
        validate_leaf(condition, prefix, errors);
    }
}

fn validate_leaf(condition: &Value, prefix: &str, errors: &mut Vec<String>) {
    let Some(entries) = condition.as_object() else {
        errors.push(format!("{}: condition must be a mapping", prefix));
        return;
    };

    if !entries.contains_key("field") {
        errors.push(format!("{}: Missing required field: field", prefix));
    }

    match entries.get("operator").and_then(Value::as_str) {
        None => errors.push(format!("{}: Missing required field: operator", prefix)),
        Some(operator) if !VALID_OPERATORS.contains(&operator) => {
            errors.push(format!("{}: Invalid operator: {}", prefix, operator));
        }
        Some(operator) => {
            let needs_value = operator != "exists" && operator != "not_exists";
            if needs_value && !entries.contains_key("value") {
                errors.push(format!(
                    "{}: Missing required field: value for operator {}",
                    prefix, operator
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PolicyException;
    use chrono::Utc;
    use serde_json::json;

    const VALID_YAML: &str = r#"
id: no-privileged
name: No privileged containers
description: Containers must not run privileged
type: security
enforcement_mode: blocking
rules:
  - id: rule-priv
    name: privileged flag must be false
    description: container.privileged must be false
    severity: critical
    condition:
      operator: and
      conditions:
        - field: container.privileged
          operator: equals
          value: false
"#;

    #[test]
    fn valid_document_produces_clean_report() {
        let report = PolicyValidator::new().validate_policy_yaml(VALID_YAML);
        assert!(report.valid, "unexpected errors: {:?}", report.errors);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn broken_yaml_reports_syntax_error() {
        let report = PolicyValidator::new().validate_policy_yaml("name: [unterminated");
        assert!(!report.valid);
        assert!(report.errors[0].starts_with("Invalid YAML syntax"));
    }

    #[test]
    fn errors_accumulate_instead_of_failing_fast() {
        let yaml = r#"
type: invented
enforcement_mode: shrug
rules:
  - severity: chartreuse
    condition:
      operator: and
      conditions:
        - field: x
          operator: fuzzy_match
          value: 1
        - operator: equals
"#;
        let report = PolicyValidator::new().validate_policy_yaml(yaml);
        assert!(!report.valid);
        let text = report.errors.join("\n");
        assert!(text.contains("Missing required field: name"));
        assert!(text.contains("Missing required field: description"));
        assert!(text.contains("Invalid policy type: invented"));
        assert!(text.contains("Invalid enforcement mode: shrug"));
        assert!(text.contains("Rule 0: Missing required field: name"));
        assert!(text.contains("Rule 0: Invalid severity: chartreuse"));
        assert!(text.contains("Invalid operator: fuzzy_match"));
        assert!(text.contains("Condition 1: Missing required field: field"));
        assert!(report.errors.len() >= 8);
    }

    #[test]
    fn empty_rules_and_missing_value_flagged() {
        let yaml = "name: p\ndescription: d\ntype: security\nenforcement_mode: audit\nrules: []\n";
        let report = PolicyValidator::new().validate_policy_yaml(yaml);
        assert_eq!(report.errors, vec!["Policy must have at least one rule"]);

        let yaml = r#"
name: p
description: d
type: security
enforcement_mode: audit
rules:
  - name: r
    description: d
    severity: low
    condition:
      field: a
      operator: equals
"#;
        let report = PolicyValidator::new().validate_policy_yaml(yaml);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("Missing required field: value for operator equals")));
    }

    #[test]
    fn exists_leaf_needs_no_value() {
        let yaml = r#"
name: p
description: d
type: operational
enforcement_mode: warning
rules:
  - name: r
    description: d
    severity: info
    condition:
      field: deployment.limits
      operator: exists
"#;
        let report = PolicyValidator::new().validate_policy_yaml(yaml);
        assert!(report.valid, "unexpected errors: {:?}", report.errors);
    }

    #[test]
    fn simulation_reports_rule_results_and_violations() {
        let validator = PolicyValidator::new();
        let target = json!({"container": {"privileged": true}});
        let outcome = validator
            .simulate_policy_evaluation(VALID_YAML, &target)
            .unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.policy_id, "no-privileged");
        assert_eq!(outcome.rule_results.len(), 1);
        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.violations[0].rule_id, "rule-priv");

        let passing = json!({"container": {"privileged": false}});
        let outcome = validator
            .simulate_policy_evaluation(VALID_YAML, &passing)
            .unwrap();
        assert!(outcome.passed);
        assert!(outcome.violations.is_empty());
    }

    #[test]
    fn simulation_rejects_invalid_document() {
        let err = PolicyValidator::new()
            .simulate_policy_evaluation("rules: []\n", &json!({}))
            .unwrap_err();
        assert_eq!(err.reason_code(), "invalid_input");
    }

    #[test]
    fn simulation_honours_registered_exceptions() {
        let mut engine = PolicyEngine::new();
        engine.register_exception(PolicyException {
            id: "exc-1".into(),
            policy_id: "no-privileged".into(),
            rule_ids: vec!["rule-priv".into()],
            reason: "migration window".into(),
            approved_by: "security-team".into(),
            approved_at: Utc::now(),
            expires_at: None,
            conditions: None,
        });
        let validator = PolicyValidator::with_engine(engine);

        let outcome = validator
            .simulate_policy_evaluation(VALID_YAML, &json!({"container": {"privileged": true}}))
            .unwrap();
        assert!(outcome.passed);
        assert!(outcome.violations.is_empty());
    }

    #[test]
    fn scenario_batch_compares_expected_and_actual() {
        let validator = PolicyValidator::new();
        let scenarios = vec![
            ScenarioSpec {
                description: Some("compliant container".into()),
                target: json!({"container": {"privileged": false}}),
                expected_result: true,
            },
            ScenarioSpec {
                description: Some("privileged container".into()),
                target: json!({"container": {"privileged": true}}),
                expected_result: false,
            },
            ScenarioSpec {
                description: None,
                target: json!({"container": {"privileged": true}}),
                expected_result: true, // wrong on purpose
            },
        ];

        let report = validator
            .test_policy_with_scenarios(VALID_YAML, &scenarios)
            .unwrap();
        assert!(!report.all_scenarios_passed);
        assert_eq!(report.scenarios_passed, 2);
        assert_eq!(report.scenarios_failed, 1);
        assert_eq!(report.scenario_results[2].scenario, 3);
        assert_eq!(report.scenario_results[2].description, "Scenario 3");
        assert!(!report.scenario_results[2].passed);
        assert!(report.scenario_results[0].actual_result);
    }

    #[test]
    fn impact_analysis_counts_per_rule_failures() {
        let validator = PolicyValidator::new();
        let targets = vec![
            json!({"id": "pipeline-1", "type": "pipeline", "container": {"privileged": false}}),
            json!({"id": "pipeline-2", "type": "pipeline", "container": {"privileged": true}}),
            json!({"id": "deploy-3", "type": "deployment", "container": {"privileged": true}}),
        ];

        let report = validator.analyze_policy_impact(VALID_YAML, &targets).unwrap();
        assert_eq!(report.targets_evaluated, 3);
        assert_eq!(report.targets_passed, 1);
        assert_eq!(report.targets_failed, 2);
        assert!((report.pass_rate - 1.0 / 3.0).abs() < 1e-9);

        assert_eq!(report.rule_impact.len(), 1);
        let rule = &report.rule_impact[0];
        assert_eq!(rule.rule_id, "rule-priv");
        assert_eq!(rule.targets_failed, 2);
        assert!((rule.failure_rate - 2.0 / 3.0).abs() < 1e-9);

        assert_eq!(report.results[0].target_id, "pipeline-1");
        assert_eq!(report.results[2].target_type, "deployment");
    }

    #[test]
    fn impact_analysis_with_no_targets_scores_zero() {
        let report = PolicyValidator::new()
            .analyze_policy_impact(VALID_YAML, &[])
            .unwrap();
        assert_eq!(report.targets_evaluated, 0);
        assert_eq!(report.pass_rate, 0.0);
        assert_eq!(report.rule_impact[0].failure_rate, 0.0);
    }

    #[test]
    fn generated_draft_passes_its_own_lint() {
        let validator = PolicyValidator::new();
        for kind in [
            PolicyKind::Security,
            PolicyKind::Compliance,
            PolicyKind::Operational,
        ] {
            let draft = validator
                .generate_policy_template(kind, "Draft policy", "Authoring aid", EnforcementMode::Warning)
                .unwrap();
            assert_eq!(draft.policy.kind, kind);
            assert_eq!(draft.policy.status, crate::model::PolicyStatus::Draft);
            assert_eq!(draft.policy.rules.len(), 1);
            assert!(draft.policy.id.starts_with("policy-"));

            let report = validator.validate_policy_yaml(&draft.yaml);
            assert!(report.valid, "{:?}: {:?}", kind, report.errors);
        }
    }

    #[test]
    fn security_draft_carries_protocol_rules() {
        let draft = PolicyValidator::new()
            .generate_policy_template(
                PolicyKind::Security,
                "TLS everywhere",
                "Connections must be encrypted",
                EnforcementMode::Blocking,
            )
            .unwrap();
        let rule = &draft.policy.rules[0];
        assert_eq!(rule.name, "Require secure connections");
        assert_eq!(rule.condition.conditions.len(), 2);
        assert!(rule.remediation_steps.is_some());
    }
}
