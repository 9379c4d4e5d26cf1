//! Findings produced by analyzers that feed the risk scorer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::severity::Severity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub vulnerability_type: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub recommendation: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

/// Output of a module scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityReport {
    pub module_address: String,
    pub module_name: String,
    #[serde(default)]
    pub vulnerabilities: Vec<Vulnerability>,
    #[serde(default)]
    pub summary: String,
}

impl VulnerabilityReport {
    pub fn count(&self, severity: Severity) -> usize {
        self.vulnerabilities.iter().filter(|v| v.severity == severity).count()
    }

    pub fn critical_count(&self) -> usize {
        self.count(Severity::Critical)
    }

    pub fn high_count(&self) -> usize {
        self.count(Severity::High)
    }

    pub fn medium_count(&self) -> usize {
        self.count(Severity::Medium)
    }

    pub fn low_count(&self) -> usize {
        self.count(Severity::Low)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFinding {
    pub category: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    /// Expected in [0, 1]; the scorer clamps it
    pub confidence: f64,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// Output of a transaction / contract / pattern analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub analysis_type: String,
    pub target: String,
    #[serde(default)]
    pub findings: Vec<AnomalyFinding>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub risk_assessment: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl AnomalyReport {
    pub fn new(analysis_type: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            analysis_type: analysis_type.into(),
            target: target.into(),
            findings: Vec::new(),
            summary: String::new(),
            risk_assessment: String::new(),
            timestamp: Utc::now(),
        }
    }
}

fn default_confidence() -> f64 {
    1.0
}
