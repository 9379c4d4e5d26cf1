//! Risk aggregation and the analyzers that feed it.

pub mod heuristics;
pub mod reports;
pub mod scorer;

pub use heuristics::{AnomalyAnalyzer, HeuristicAnomalyDetector};
pub use reports::{AnomalyFinding, AnomalyReport, Vulnerability, VulnerabilityReport};
pub use scorer::{
    ComprehensiveRiskReport, RiskCategory, RiskLevel, RiskScore, RiskScorer, TargetKind,
};
