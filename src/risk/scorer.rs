//! Weighted risk aggregation.
//!
//! Each present input category gets a 0-100 sub-score; the final score is
//! the weighted mean over the categories that were actually supplied.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::reports::{AnomalyReport, VulnerabilityReport};
use crate::compliance::ComplianceResult;
use crate::core::errors::SentinelError;
use crate::core::severity::Severity;

const MAX_FACTORS: usize = 10;
const MAX_RECOMMENDATIONS: usize = 5;

pub const COMPLIANCE_RECOMMENDATION: &str = "Review and address policy violations";
pub const CRITICAL_VULNERABILITY_RECOMMENDATION: &str = "Address critical vulnerabilities immediately";
pub const HIGH_VULNERABILITY_RECOMMENDATION: &str = "Review and fix high-severity issues";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Convert a 0-100 score to a level
    pub fn from_score(score: u8) -> Self {
        if score < 10 {
            Self::Safe
        } else if score < 30 {
            Self::Low
        } else if score < 55 {
            Self::Medium
        } else if score < 80 {
            Self::High
        } else {
            Self::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskCategory {
    Compliance,
    Vulnerability,
    Anomaly,
}

impl RiskCategory {
    pub fn weight(&self) -> f64 {
        match self {
            Self::Compliance => 0.35,
            Self::Vulnerability => 0.40,
            Self::Anomaly => 0.25,
        }
    }
}

/// What a comprehensive report is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Contract,
    Transaction,
    Address,
}

impl FromStr for TargetKind {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "contract" => Ok(Self::Contract),
            "transaction" => Ok(Self::Transaction),
            "address" => Ok(Self::Address),
            other => Err(SentinelError::Configuration(format!("unknown target kind '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub score: u8,
    pub level: RiskLevel,
    /// Raw sub-score of each category that was supplied
    pub breakdown: BTreeMap<RiskCategory, u8>,
    pub factors: Vec<String>,
    pub recommendations: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComprehensiveRiskReport {
    pub target: String,
    pub target_type: TargetKind,
    pub risk_score: RiskScore,
    pub compliance_result: Option<ComplianceResult>,
    pub vulnerability_report: Option<VulnerabilityReport>,
    pub anomaly_report: Option<AnomalyReport>,
    pub timestamp: DateTime<Utc>,
}

/// Stateless; cheap to clone and share.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskScorer;

impl RiskScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn calculate_risk_score(
        &self,
        compliance: Option<&ComplianceResult>,
        vulnerability: Option<&VulnerabilityReport>,
        anomaly: Option<&AnomalyReport>,
    ) -> RiskScore {
        let mut breakdown = BTreeMap::new();
        let mut factors = Vec::new();
        let mut recommendations = Vec::new();

        if let Some(result) = compliance {
            breakdown.insert(RiskCategory::Compliance, Self::score_compliance(result));
            for violation in &result.violations {
                factors.push(factor(violation.severity, &violation.message));
            }
            if !result.violations.is_empty() {
                recommendations.push(COMPLIANCE_RECOMMENDATION.to_string());
            }
        }

        if let Some(report) = vulnerability {
            breakdown.insert(RiskCategory::Vulnerability, Self::score_vulnerabilities(report));
            for vuln in &report.vulnerabilities {
                factors.push(factor(vuln.severity, &vuln.title));
            }
            if report.critical_count() > 0 {
                recommendations.push(CRITICAL_VULNERABILITY_RECOMMENDATION.to_string());
            }
            if report.high_count() > 0 {
                recommendations.push(HIGH_VULNERABILITY_RECOMMENDATION.to_string());
            }
        }

        if let Some(report) = anomaly {
            breakdown.insert(RiskCategory::Anomaly, Self::score_anomalies(report));
            for finding in &report.findings {
                factors.push(factor(finding.severity, &finding.title));
                recommendations.extend(finding.recommendations.iter().cloned());
            }
        }

        let score = Self::weighted_score(&breakdown);
        RiskScore {
            score,
            level: RiskLevel::from_score(score),
            breakdown,
            factors: dedup_truncate(factors, MAX_FACTORS),
            recommendations: dedup_truncate(recommendations, MAX_RECOMMENDATIONS),
            timestamp: Utc::now(),
        }
    }

    pub fn create_comprehensive_report(
        &self,
        target: impl Into<String>,
        target_type: TargetKind,
        compliance_result: Option<ComplianceResult>,
        vulnerability_report: Option<VulnerabilityReport>,
        anomaly_report: Option<AnomalyReport>,
    ) -> ComprehensiveRiskReport {
        let risk_score = self.calculate_risk_score(
            compliance_result.as_ref(),
            vulnerability_report.as_ref(),
            anomaly_report.as_ref(),
        );
        ComprehensiveRiskReport {
            target: target.into(),
            target_type,
            risk_score,
            compliance_result,
            vulnerability_report,
            anomaly_report,
            timestamp: Utc::now(),
        }
    }

    /// `min(100, max_severity + min(5 * violations, 25))`
    pub fn score_compliance(result: &ComplianceResult) -> u8 {
        let Some(max) = result.violations.iter().map(|v| v.severity.score()).max() else {
            return 0;
        };
        let bonus = (result.violations.len() as u32).saturating_mul(5).min(25);
        cap(max + bonus)
    }

    pub fn score_vulnerabilities(report: &VulnerabilityReport) -> u8 {
        let Some(max) = report.vulnerabilities.iter().map(|v| v.severity.score()).max() else {
            return 0;
        };
        let bonus = report.critical_count() * 15
            + report.high_count() * 10
            + report.medium_count() * 5
            + report.low_count() * 2;
        cap(max + bonus.min(30) as u32)
    }

    /// Strongest confidence-weighted finding plus a count bonus
    pub fn score_anomalies(report: &AnomalyReport) -> u8 {
        let Some(max) = report
            .findings
            .iter()
            .map(|f| (f64::from(f.severity.score()) * clamp_confidence(f.confidence)).floor() as u32)
            .max()
        else {
            return 0;
        };
        let bonus = (report.findings.len() as u32).saturating_mul(5).min(20);
        cap(max + bonus)
    }

    fn weighted_score(breakdown: &BTreeMap<RiskCategory, u8>) -> u8 {
        let (total, weight) = breakdown.iter().fold((0.0, 0.0), |(total, weight), (category, score)| {
            (total + f64::from(*score) * category.weight(), weight + category.weight())
        });
        if weight <= 0.0 {
            return 0;
        }
        // rounded, not truncated: 29.58 scores 30 and lands in medium
        (total / weight).round().clamp(0.0, 100.0) as u8
    }
}

fn factor(severity: Severity, text: &str) -> String {
    format!("{}: {}", severity.as_str().to_uppercase(), text)
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

fn cap(score: u32) -> u8 {
    score.min(100) as u8
}

fn dedup_truncate(items: Vec<String>, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(item.clone())).take(limit).collect()
}
