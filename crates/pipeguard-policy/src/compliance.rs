use crate::model::{EvaluationResult, Severity, Violation};
use chrono::{DateTime, Utc};
use pipeguard_core::ids::uuid_id;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    NonCompliant,
    NotApplicable,
    Unknown,
}

/// One requirement of one standard, assessed against the target. The
/// standards catalogue itself is inert data supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementAssessment {
    pub standard: String,
    pub requirement: String,
    pub status: ComplianceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub compliant: usize,
    pub non_compliant: usize,
    pub not_applicable: usize,
    pub unknown: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceSummary {
    pub standards_count: usize,
    pub requirements_count: usize,
    pub violations_count: usize,
    pub status_counts: StatusCounts,
    pub severity_counts: SeverityCounts,
    /// `compliant / (compliant + non_compliant) × 100`, two decimals;
    /// 0 when the denominator is 0.
    pub compliance_score: f64,
    pub overall_status: ComplianceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub id: String,
    pub generated_at: DateTime<Utc>,
    pub target: Value,
    pub standards: Vec<RequirementAssessment>,
    pub violations: Vec<Violation>,
    pub policy_evaluations: Vec<EvaluationResult>,
    pub summary: ComplianceSummary,
}

/// Assemble a compliance report from evaluated policies, detected
/// violations and per-requirement assessments.
pub fn build_report(
    target: Value,
    assessments: Vec<RequirementAssessment>,
    violations: Vec<Violation>,
    policy_evaluations: Vec<EvaluationResult>,
) -> ComplianceReport {
    let mut status_counts = StatusCounts::default();
    for assessment in &assessments {
        match assessment.status {
            ComplianceStatus::Compliant => status_counts.compliant += 1,
            ComplianceStatus::NonCompliant => status_counts.non_compliant += 1,
            ComplianceStatus::NotApplicable => status_counts.not_applicable += 1,
            ComplianceStatus::Unknown => status_counts.unknown += 1,
        }
    }

    let mut severity_counts = SeverityCounts::default();
    for violation in &violations {
        match violation.severity {
            Severity::Critical => severity_counts.critical += 1,
            Severity::High => severity_counts.high += 1,
            Severity::Medium => severity_counts.medium += 1,
            Severity::Low => severity_counts.low += 1,
            Severity::Info => severity_counts.info += 1,
        }
    }

    let denominator = status_counts.compliant + status_counts.non_compliant;
    let compliance_score = if denominator > 0 {
        let raw = status_counts.compliant as f64 / denominator as f64 * 100.0;
        (raw * 100.0).round() / 100.0
    } else {
        0.0
    };

    let overall_status = if status_counts.non_compliant > 0 {
        ComplianceStatus::NonCompliant
    } else if status_counts.compliant > 0 {
        ComplianceStatus::Compliant
    } else {
        ComplianceStatus::Unknown
    };

    let standards: BTreeSet<&str> = assessments.iter().map(|a| a.standard.as_str()).collect();

    let summary = ComplianceSummary {
        standards_count: standards.len(),
        requirements_count: assessments.len(),
        violations_count: violations.len(),
        status_counts,
        severity_counts,
        compliance_score,
        overall_status,
    };

    ComplianceReport {
        id: uuid_id(),
        generated_at: Utc::now(),
        target,
        standards: assessments,
        violations,
        policy_evaluations,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assessment(standard: &str, status: ComplianceStatus) -> RequirementAssessment {
        RequirementAssessment {
            standard: standard.to_string(),
            requirement: format!("{}-req", standard),
            status,
            severity: None,
        }
    }

    #[test]
    fn score_rounds_to_two_decimals() {
        let report = build_report(
            json!({}),
            vec![
                assessment("soc2", ComplianceStatus::Compliant),
                assessment("soc2", ComplianceStatus::Compliant),
                assessment("pci", ComplianceStatus::NonCompliant),
            ],
            vec![],
            vec![],
        );
        // 2 / 3 * 100 = 66.666... → 66.67
        assert_eq!(report.summary.compliance_score, 66.67);
        assert_eq!(report.summary.standards_count, 2);
        assert_eq!(report.summary.requirements_count, 3);
        assert_eq!(report.summary.overall_status, ComplianceStatus::NonCompliant);
    }

    #[test]
    fn zero_denominator_scores_zero() {
        let report = build_report(
            json!({}),
            vec![assessment("soc2", ComplianceStatus::NotApplicable)],
            vec![],
            vec![],
        );
        assert_eq!(report.summary.compliance_score, 0.0);
        assert_eq!(report.summary.overall_status, ComplianceStatus::Unknown);
    }

    #[test]
    fn all_compliant_is_compliant() {
        let report = build_report(
            json!({}),
            vec![assessment("soc2", ComplianceStatus::Compliant)],
            vec![],
            vec![],
        );
        assert_eq!(report.summary.compliance_score, 100.0);
        assert_eq!(report.summary.overall_status, ComplianceStatus::Compliant);
    }
}
