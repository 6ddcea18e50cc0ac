use chrono::{DateTime, Utc};
use pipeguard_core::{ids::uuid_id, AttrMap, PipeguardError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Security,
    Compliance,
    Operational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementMode {
    /// Fails the pipeline gate.
    Blocking,
    /// Warns but lets the gate pass.
    Warning,
    /// Only records the violation.
    Audit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyStatus {
    Active,
    Inactive,
    Deprecated,
    Draft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    All,
    Development,
    Testing,
    Staging,
    Production,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    RegexMatch,
    Exists,
    NotExists,
    /// Anything unrecognized in a document lands here; it evaluates
    /// false instead of failing the whole evaluation.
    Unknown,
}

impl<'de> Deserialize<'de> for ConditionOperator {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "equals" => ConditionOperator::Equals,
            "not_equals" => ConditionOperator::NotEquals,
            "contains" => ConditionOperator::Contains,
            "not_contains" => ConditionOperator::NotContains,
            "starts_with" => ConditionOperator::StartsWith,
            "ends_with" => ConditionOperator::EndsWith,
            "greater_than" => ConditionOperator::GreaterThan,
            "less_than" => ConditionOperator::LessThan,
            "regex_match" => ConditionOperator::RegexMatch,
            "exists" => ConditionOperator::Exists,
            "not_exists" => ConditionOperator::NotExists,
            _ => ConditionOperator::Unknown,
        })
    }
}

impl ConditionOperator {
    pub fn requires_value(&self) -> bool {
        !matches!(
            self,
            ConditionOperator::Exists | ConditionOperator::NotExists | ConditionOperator::Unknown
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    And,
    Or,
}

impl Default for LogicalOperator {
    fn default() -> Self {
        LogicalOperator::And
    }
}

/// One comparison against a dot-notation field of the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionLeaf {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Boolean combination of nested conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    #[serde(default)]
    pub operator: LogicalOperator,
    pub conditions: Vec<Condition>,
}

/// A condition tree node: either a leaf comparison or a nested group.
/// The document form is disambiguated structurally (`conditions` vs
/// `field`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Group(ConditionGroup),
    Leaf(ConditionLeaf),
}

impl ConditionLeaf {
    /// `exists`/`not_exists` must not carry a value; every other
    /// operator must.
    pub fn validate(&self) -> Result<()> {
        match self.operator {
            ConditionOperator::Exists | ConditionOperator::NotExists => {
                if self.value.is_some() {
                    return Err(PipeguardError::Input(format!(
                        "operator {:?} on field '{}' must not carry a value",
                        self.operator, self.field
                    )));
                }
            }
            ConditionOperator::Unknown => {}
            _ => {
                if self.value.is_none() {
                    return Err(PipeguardError::Input(format!(
                        "operator {:?} on field '{}' requires a value",
                        self.operator, self.field
                    )));
                }
            }
        }
        Ok(())
    }
}

impl ConditionGroup {
    pub fn validate(&self) -> Result<()> {
        for condition in &self.conditions {
            match condition {
                Condition::Group(group) => group.validate()?,
                Condition::Leaf(leaf) => leaf.validate()?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default = "uuid_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub severity: Severity,
    pub condition: ConditionGroup,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation_steps: Option<Vec<String>>,
}

/// Scoped, time-bounded bypass of one or more policy rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyException {
    #[serde(default = "uuid_id")]
    pub id: String,
    pub policy_id: String,
    pub rule_ids: Vec<String>,
    pub reason: String,
    pub approved_by: String,
    #[serde(default = "Utc::now")]
    pub approved_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<ConditionGroup>,
}

impl PolicyException {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|t| t < now).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default = "uuid_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: PolicyKind,
    pub rules: Vec<Rule>,
    pub enforcement_mode: EnforcementMode,
    #[serde(default = "default_status")]
    pub status: PolicyStatus,
    #[serde(default = "default_environments")]
    pub environments: Vec<Environment>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_policy_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: AttrMap,
}

fn default_status() -> PolicyStatus {
    PolicyStatus::Active
}

fn default_environments() -> Vec<Environment> {
    vec![Environment::All]
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl Policy {
    /// Structural checks beyond what serde enforces: unique rule ids
    /// and operator/value pairing throughout every condition tree.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(PipeguardError::Input(format!(
                    "duplicate rule id '{}' in policy '{}'",
                    rule.id, self.id
                )));
            }
            rule.condition.validate()?;
        }
        Ok(())
    }

    pub fn applies_to_environment(&self, environment: Environment) -> bool {
        self.environments.contains(&environment) || self.environments.contains(&Environment::All)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule_id: String,
    pub rule_name: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_applied: Option<String>,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub policy_id: String,
    pub policy_name: String,
    pub policy_kind: PolicyKind,
    pub passed: bool,
    pub rule_results: Vec<RuleResult>,
    #[serde(default)]
    pub exceptions_applied: Vec<String>,
    pub evaluation_time: DateTime<Utc>,
    pub target: Value,
    #[serde(default)]
    pub metadata: AttrMap,
}

impl EvaluationResult {
    pub fn was_skipped(&self) -> bool {
        self.metadata
            .get("skipped")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    #[serde(default = "uuid_id")]
    pub id: String,
    pub policy_id: String,
    pub rule_id: String,
    pub severity: Severity,
    pub description: String,
    pub target: Value,
    #[serde(default = "Utc::now")]
    pub detected_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation_steps: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: AttrMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeRequestStatus {
    Pending,
    Approved,
    Rejected,
    Implemented,
}

/// A requested policy change moving through
/// `pending → approved → implemented` (or `pending → rejected`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRequest {
    #[serde(default = "uuid_id")]
    pub id: String,
    pub policy_id: String,
    pub requested_by: String,
    #[serde(default = "Utc::now")]
    pub requested_at: DateTime<Utc>,
    /// Field replacements, plus a `rules` entry with add/update/remove
    /// lists.
    pub changes: Value,
    pub reason: String,
    #[serde(default = "default_change_status")]
    pub status: ChangeRequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implemented_at: Option<DateTime<Utc>>,
}

fn default_change_status() -> ChangeRequestStatus {
    ChangeRequestStatus::Pending
}
