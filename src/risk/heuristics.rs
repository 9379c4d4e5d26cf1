//! Rule-based anomaly detection used when no model-backed analyzer is configured.

use async_trait::async_trait;

use super::reports::{AnomalyFinding, AnomalyReport};
use crate::core::errors::Result;
use crate::core::severity::Severity;
use crate::monitoring::TransactionEvent;

/// Gas above this is reported
pub const HIGH_GAS_THRESHOLD: u64 = 50_000;
/// Gas at or above this is reported as medium instead of low
pub const ELEVATED_GAS_THRESHOLD: u64 = 100_000;

/// Anything that turns a transaction into anomaly findings.
#[async_trait]
pub trait AnomalyAnalyzer: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze_transaction(&self, tx: &TransactionEvent) -> Result<AnomalyReport>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicAnomalyDetector;

impl HeuristicAnomalyDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn inspect(&self, tx: &TransactionEvent) -> AnomalyReport {
        let mut report = AnomalyReport::new("transaction", tx.hash.clone());

        if !tx.success {
            report.findings.push(AnomalyFinding {
                category: "Transaction Failure".to_string(),
                severity: Severity::Low,
                title: "Failed Transaction".to_string(),
                description: "Transaction failed to execute successfully.".to_string(),
                confidence: 1.0,
                evidence: vec![format!("Transaction hash: {}", tx.hash)],
                recommendations: Vec::new(),
            });
        }

        if tx.gas_used > HIGH_GAS_THRESHOLD {
            let severity =
                if tx.gas_used < ELEVATED_GAS_THRESHOLD { Severity::Low } else { Severity::Medium };
            report.findings.push(AnomalyFinding {
                category: "Resource Usage".to_string(),
                severity,
                title: "High Gas Usage".to_string(),
                description: format!("Transaction used {} gas units.", tx.gas_used),
                confidence: 0.8,
                evidence: vec![format!("Gas used: {}", tx.gas_used)],
                recommendations: Vec::new(),
            });
        }

        report.summary = "Basic rule-based analysis completed.".to_string();
        report
    }
}

#[async_trait]
impl AnomalyAnalyzer for HeuristicAnomalyDetector {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn analyze_transaction(&self, tx: &TransactionEvent) -> Result<AnomalyReport> {
        Ok(self.inspect(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(success: bool, gas_used: u64) -> TransactionEvent {
        TransactionEvent::from_json(&json!({
            "hash": "0xfeed",
            "version": "1",
            "success": success,
            "gas_used": gas_used.to_string(),
        }))
        .unwrap()
    }

    #[test]
    fn test_clean_transaction_has_no_findings() {
        let report = HeuristicAnomalyDetector.inspect(&event(true, 50_000));
        assert!(report.findings.is_empty());
        assert_eq!(report.target, "0xfeed");
        assert_eq!(report.analysis_type, "transaction");
    }

    #[test]
    fn test_failed_and_gas_heavy() {
        let report = HeuristicAnomalyDetector.inspect(&event(false, 50_001));
        assert_eq!(report.findings.len(), 2);
        assert_eq!(report.findings[0].title, "Failed Transaction");
        assert_eq!(report.findings[0].confidence, 1.0);
        assert_eq!(report.findings[1].severity, Severity::Low);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_elevated_gas_is_medium() {
        let report = HeuristicAnomalyDetector.analyze_transaction(&event(true, 100_000)).await.unwrap();
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].severity, Severity::Medium);
        assert_eq!(report.findings[0].confidence, 0.8);
    }
}
