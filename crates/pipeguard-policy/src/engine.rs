use crate::model::{
    Condition, ConditionGroup, ConditionLeaf, ConditionOperator, EnforcementMode, Environment,
    EvaluationResult, LogicalOperator, Policy, PolicyException, PolicyStatus, RuleResult,
    Violation,
};
use chrono::Utc;
use pipeguard_core::{ids::uuid_id, AttrMap, Result};
use regex::Regex;
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Declarative policy evaluator. Evaluation is pure: the engine holds
/// only the registered exceptions and never mutates during evaluation,
/// so one loaded policy set may serve concurrent evaluations.
#[derive(Debug, Default)]
pub struct PolicyEngine {
    exceptions: FxHashMap<String, Vec<PolicyException>>,
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a policy document from YAML and run structural validation.
    pub fn load_policy_from_yaml(&self, content: &str) -> Result<Policy> {
        let policy: Policy = serde_yaml::from_str(content)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Parse a policy document from JSON and run structural validation.
    pub fn load_policy_from_json(&self, content: &str) -> Result<Policy> {
        let policy: Policy = serde_json::from_str(content)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn policy_to_yaml(&self, policy: &Policy) -> Result<String> {
        Ok(serde_yaml::to_string(policy)?)
    }

    pub fn register_exception(&mut self, exception: PolicyException) {
        self.exceptions
            .entry(exception.policy_id.clone())
            .or_default()
            .push(exception);
    }

    pub fn exceptions_for(&self, policy_id: &str) -> &[PolicyException] {
        self.exceptions
            .get(policy_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Evaluate one policy against a target dictionary.
    ///
    /// Inactive policies and policies that do not apply to the target's
    /// environment short-circuit to a skipped pass. Otherwise each rule
    /// either matches a live exception (pass, exception recorded) or has
    /// its condition tree evaluated. The policy passes iff every rule
    /// passes.
    pub fn evaluate_policy(&self, policy: &Policy, target: &Value) -> EvaluationResult {
        info!(
            policy_id = %policy.id,
            policy_name = %policy.name,
            "evaluating policy"
        );

        if policy.status != PolicyStatus::Active {
            debug!(policy_id = %policy.id, status = ?policy.status, "skipping inactive policy");
            return self.skipped_result(
                policy,
                target,
                format!("policy status is {:?}", policy.status).to_lowercase(),
            );
        }

        let environment = target
            .get("environment")
            .and_then(Value::as_str)
            .and_then(parse_environment)
            .unwrap_or(Environment::All);
        if !policy.applies_to_environment(environment) {
            debug!(policy_id = %policy.id, environment = ?environment, "policy does not apply to environment");
            return self.skipped_result(
                policy,
                target,
                format!("policy does not apply to environment {:?}", environment).to_lowercase(),
            );
        }

        let now = Utc::now();
        let mut rule_results = Vec::with_capacity(policy.rules.len());
        let mut exceptions_applied = Vec::new();

        for rule in &policy.rules {
            if let Some(exception) = self.find_applicable_exception(&policy.id, &rule.id, target) {
                debug!(
                    policy_id = %policy.id,
                    rule_id = %rule.id,
                    exception_id = %exception.id,
                    "exception applied to rule"
                );
                rule_results.push(RuleResult {
                    rule_id: rule.id.clone(),
                    rule_name: rule.name.clone(),
                    passed: true,
                    exception_applied: Some(exception.id.clone()),
                    severity: rule.severity,
                });
                exceptions_applied.push(exception.id.clone());
                continue;
            }

            let passed = evaluate_group(&rule.condition, target);
            rule_results.push(RuleResult {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                passed,
                exception_applied: None,
                severity: rule.severity,
            });
        }

        let passed = rule_results.iter().all(|r| r.passed);
        EvaluationResult {
            policy_id: policy.id.clone(),
            policy_name: policy.name.clone(),
            policy_kind: policy.kind,
            passed,
            rule_results,
            exceptions_applied,
            evaluation_time: now,
            target: target.clone(),
            metadata: AttrMap::new(),
        }
    }

    fn skipped_result(&self, policy: &Policy, target: &Value, reason: String) -> EvaluationResult {
        let mut metadata = AttrMap::new();
        metadata.insert("skipped".to_string(), json!(true));
        metadata.insert("reason".to_string(), json!(reason));
        EvaluationResult {
            policy_id: policy.id.clone(),
            policy_name: policy.name.clone(),
            policy_kind: policy.kind,
            passed: true,
            rule_results: Vec::new(),
            exceptions_applied: Vec::new(),
            evaluation_time: Utc::now(),
            target: target.clone(),
            metadata,
        }
    }

    /// A rule's exception applies when it names the rule, has not
    /// expired, and its own condition (if any) holds for the target.
    fn find_applicable_exception(
        &self,
        policy_id: &str,
        rule_id: &str,
        target: &Value,
    ) -> Option<&PolicyException> {
        let now = Utc::now();
        self.exceptions.get(policy_id)?.iter().find(|exception| {
            if !exception.rule_ids.iter().any(|r| r == rule_id) {
                return false;
            }
            if exception.is_expired(now) {
                return false;
            }
            match &exception.conditions {
                Some(conditions) => evaluate_group(conditions, target),
                None => true,
            }
        })
    }

    /// Extract a violation for every failed, non-excepted rule.
    pub fn violations(&self, policy: &Policy, result: &EvaluationResult) -> Vec<Violation> {
        result
            .rule_results
            .iter()
            .filter(|r| !r.passed && r.exception_applied.is_none())
            .map(|r| {
                let rule = policy.rules.iter().find(|rule| rule.id == r.rule_id);
                Violation {
                    id: uuid_id(),
                    policy_id: policy.id.clone(),
                    rule_id: r.rule_id.clone(),
                    severity: r.severity,
                    description: rule
                        .map(|rule| rule.description.clone())
                        .filter(|d| !d.is_empty())
                        .unwrap_or_else(|| format!("rule '{}' failed", r.rule_name)),
                    target: result.target.clone(),
                    detected_at: Utc::now(),
                    remediation_steps: rule.and_then(|rule| rule.remediation_steps.clone()),
                    metadata: AttrMap::new(),
                }
            })
            .collect()
    }

    /// Gate decision: blocked iff any failing policy enforces blocking.
    pub fn should_block(
        &self,
        policies: &[Policy],
        results: &[EvaluationResult],
    ) -> (bool, Vec<Violation>) {
        let mut blocked = false;
        let mut violations = Vec::new();

        for result in results {
            if result.passed {
                continue;
            }
            let Some(policy) = policies.iter().find(|p| p.id == result.policy_id) else {
                continue;
            };
            violations.extend(self.violations(policy, result));
            if policy.enforcement_mode == EnforcementMode::Blocking {
                blocked = true;
            }
        }

        (blocked, violations)
    }

    /// Evaluate a whole policy set and fold it into the gate outcome.
    pub fn enforce(&self, policies: &[Policy], target: &Value) -> EnforcementOutcome {
        let results: Vec<EvaluationResult> = policies
            .iter()
            .map(|policy| self.evaluate_policy(policy, target))
            .collect();
        let (blocked, violations) = self.should_block(policies, &results);
        EnforcementOutcome {
            blocked,
            violations,
            results,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnforcementOutcome {
    pub blocked: bool,
    pub violations: Vec<Violation>,
    pub results: Vec<EvaluationResult>,
}

fn parse_environment(raw: &str) -> Option<Environment> {
    match raw {
        "all" => Some(Environment::All),
        "development" => Some(Environment::Development),
        "testing" => Some(Environment::Testing),
        "staging" => Some(Environment::Staging),
        "production" => Some(Environment::Production),
        _ => None,
    }
}

fn evaluate_group(group: &ConditionGroup, target: &Value) -> bool {
    let mut results = group.conditions.iter().map(|condition| match condition {
        Condition::Group(nested) => evaluate_group(nested, target),
        Condition::Leaf(leaf) => evaluate_leaf(leaf, target),
    });
    match group.operator {
        LogicalOperator::And => results.all(|r| r),
        LogicalOperator::Or => results.any(|r| r),
    }
}

fn evaluate_leaf(leaf: &ConditionLeaf, target: &Value) -> bool {
    let field_value = resolve_field(target, &leaf.field);
    let expected = leaf.value.as_ref();

    match leaf.operator {
        ConditionOperator::Equals => match (field_value, expected) {
            (Some(actual), Some(expected)) => actual == expected,
            _ => false,
        },
        ConditionOperator::NotEquals => match (field_value, expected) {
            (Some(actual), Some(expected)) => actual != expected,
            (None, Some(_)) => true,
            _ => false,
        },
        ConditionOperator::Contains => contains(field_value, expected),
        ConditionOperator::NotContains => !contains(field_value, expected),
        ConditionOperator::StartsWith => match (field_value.and_then(Value::as_str), expected) {
            (Some(actual), Some(Value::String(prefix))) => actual.starts_with(prefix.as_str()),
            _ => false,
        },
        ConditionOperator::EndsWith => match (field_value.and_then(Value::as_str), expected) {
            (Some(actual), Some(Value::String(suffix))) => actual.ends_with(suffix.as_str()),
            _ => false,
        },
        ConditionOperator::GreaterThan => match (
            field_value.and_then(Value::as_f64),
            expected.and_then(|v| v.as_f64()),
        ) {
            (Some(actual), Some(expected)) => actual > expected,
            _ => false,
        },
        ConditionOperator::LessThan => match (
            field_value.and_then(Value::as_f64),
            expected.and_then(|v| v.as_f64()),
        ) {
            (Some(actual), Some(expected)) => actual < expected,
            _ => false,
        },
        ConditionOperator::RegexMatch => {
            let (Some(actual), Some(Value::String(pattern))) =
                (field_value.and_then(Value::as_str), expected)
            else {
                return false;
            };
            // Anchored at the start, like Python's re.match.
            match Regex::new(&format!("^(?:{})", pattern)) {
                Ok(regex) => regex.is_match(actual),
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "invalid regex in condition");
                    false
                }
            }
        }
        ConditionOperator::Exists => field_value.is_some(),
        ConditionOperator::NotExists => field_value.is_none(),
        ConditionOperator::Unknown => {
            warn!(field = %leaf.field, "unknown condition operator evaluates false");
            false
        }
    }
}

/// Substring for strings, membership for sequences; false otherwise.
fn contains(field_value: Option<&Value>, expected: Option<&Value>) -> bool {
    match (field_value, expected) {
        (Some(Value::String(haystack)), Some(Value::String(needle))) => {
            haystack.contains(needle.as_str())
        }
        (Some(Value::Array(items)), Some(expected)) => items.iter().any(|item| item == expected),
        _ => false,
    }
}

/// Dot-walk nested objects; any missing step resolves to absent.
fn resolve_field<'a>(target: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = target;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}
