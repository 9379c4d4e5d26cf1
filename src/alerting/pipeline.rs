//! Monitor → policy engine → risk scorer → alert sinks.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::sink::{AlertSink, TransactionAlert};
use crate::compliance::{ComplianceResult, PolicyEngine};
use crate::core::config::AlertConfig;
use crate::monitoring::{SentinelMetrics, TransactionEvent, TransactionMonitor};
use crate::risk::{AnomalyAnalyzer, AnomalyReport, HeuristicAnomalyDetector, RiskScore, RiskScorer};

/// Everything computed for one transaction
#[derive(Debug, Clone)]
pub struct TransactionAssessment {
    pub compliance: ComplianceResult,
    pub anomaly: Option<AnomalyReport>,
    pub risk: RiskScore,
}

pub struct AlertPipeline {
    engine: Arc<RwLock<PolicyEngine>>,
    scorer: RiskScorer,
    analyzer: Option<Arc<dyn AnomalyAnalyzer>>,
    sinks: Vec<Arc<dyn AlertSink>>,
    risk_threshold: u8,
    metrics: Option<Arc<SentinelMetrics>>,
}

impl AlertPipeline {
    pub fn new(engine: Arc<RwLock<PolicyEngine>>, config: &AlertConfig) -> Self {
        let analyzer: Option<Arc<dyn AnomalyAnalyzer>> = if config.heuristic_anomalies {
            Some(Arc::new(HeuristicAnomalyDetector::new()))
        } else {
            None
        };
        Self {
            engine,
            scorer: RiskScorer::new(),
            analyzer,
            sinks: Vec::new(),
            risk_threshold: config.risk_threshold,
            metrics: None,
        }
    }

    /// Replace the anomaly analyzer
    pub fn with_analyzer(mut self, analyzer: Arc<dyn AnomalyAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<SentinelMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn risk_threshold(&self) -> u8 {
        self.risk_threshold
    }

    pub fn should_alert(&self, assessment: &TransactionAssessment) -> bool {
        !assessment.compliance.passed || assessment.risk.score >= self.risk_threshold
    }

    /// Check and score one transaction without publishing anything.
    pub async fn assess(&self, tx: &TransactionEvent) -> TransactionAssessment {
        let transfer = tx.payload.transfer_details();
        let (receiver, value) = match &transfer {
            Some((receiver, value)) => (Some(receiver.as_str()), *value),
            None => (None, 0),
        };

        let compliance = {
            let engine = self.engine.read();
            engine.check_transaction(&tx.sender, receiver, value, tx.gas_used, Some(&tx.payload))
        };

        let anomaly = match &self.analyzer {
            Some(analyzer) => match analyzer.analyze_transaction(tx).await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(analyzer = analyzer.name(), hash = %tx.hash, error = %e, "Anomaly analysis failed");
                    None
                }
            },
            None => None,
        };

        let risk = self.scorer.calculate_risk_score(Some(&compliance), None, anomaly.as_ref());
        if let Some(metrics) = &self.metrics {
            metrics.transactions_checked.inc();
        }

        TransactionAssessment { compliance, anomaly, risk }
    }

    /// Assess a transaction and publish an alert when it fails compliance or
    /// scores at or above the threshold. Returns the alert, if any.
    pub async fn process(&self, tx: &TransactionEvent) -> Option<TransactionAlert> {
        let assessment = self.assess(tx).await;
        if !self.should_alert(&assessment) {
            debug!(hash = %tx.hash, score = assessment.risk.score, "Transaction below alert threshold");
            return None;
        }

        let alert = TransactionAlert {
            id: Uuid::new_v4(),
            transaction_hash: tx.hash.clone(),
            version: tx.version,
            sender: tx.sender.clone(),
            risk_score: assessment.risk.score,
            risk_level: assessment.risk.level,
            success: tx.success,
            gas_used: tx.gas_used,
            violations: assessment
                .compliance
                .violations
                .iter()
                .map(|v| format!("{}: {}", v.severity.as_str().to_uppercase(), v.message))
                .collect(),
            recommendations: assessment.risk.recommendations.clone(),
            timestamp: Utc::now(),
        };

        let mut delivered = true;
        for sink in &self.sinks {
            if let Err(e) = sink.publish(&alert).await {
                warn!(sink = sink.name(), alert_id = %alert.id, error = %e, "Alert delivery failed");
                delivered = false;
            }
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_alert(delivered);
        }

        Some(alert)
    }

    /// Register the pipeline as an asynchronous monitor consumer.
    pub fn attach(self: &Arc<Self>, monitor: &TransactionMonitor) {
        let pipeline = Arc::clone(self);
        monitor.on_transaction_async(move |event| {
            let pipeline = Arc::clone(&pipeline);
            async move {
                pipeline.process(&event).await;
                Ok(())
            }
        });
        info!(
            sinks = self.sinks.len(),
            threshold = self.risk_threshold,
            analyzer = self.analyzer.as_ref().map(|a| a.name()).unwrap_or("none"),
            "Alert pipeline attached to monitor"
        );
    }
}
