//! Alert payloads and the sinks that receive them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::core::errors::{Result, SentinelError};
use crate::risk::RiskLevel;

/// Alert raised for one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionAlert {
    pub id: Uuid,
    pub transaction_hash: String,
    pub version: u64,
    pub sender: String,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub success: bool,
    pub gas_used: u64,
    /// `"<SEVERITY>: <message>"` per violated policy
    pub violations: Vec<String>,
    pub recommendations: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl TransactionAlert {
    pub fn is_compliance_failure(&self) -> bool {
        !self.violations.is_empty()
    }
}

/// Destination for alerts
#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, alert: &TransactionAlert) -> Result<()>;
}

/// Writes alerts to the log at `warn`
#[derive(Debug, Default)]
pub struct LoggingAlertSink;

#[async_trait]
impl AlertSink for LoggingAlertSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn publish(&self, alert: &TransactionAlert) -> Result<()> {
        warn!(
            alert_id = %alert.id,
            hash = %alert.transaction_hash,
            version = alert.version,
            sender = %alert.sender,
            score = alert.risk_score,
            level = %alert.risk_level,
            violations = ?alert.violations,
            "Transaction alert"
        );
        Ok(())
    }
}

/// Forwards alerts over a bounded channel, e.g. to a push/broadcast layer
pub struct ChannelAlertSink {
    tx: mpsc::Sender<TransactionAlert>,
}

impl ChannelAlertSink {
    pub fn new(tx: mpsc::Sender<TransactionAlert>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiving end
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TransactionAlert>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl AlertSink for ChannelAlertSink {
    fn name(&self) -> &str {
        "channel"
    }

    async fn publish(&self, alert: &TransactionAlert) -> Result<()> {
        self.tx.send(alert.clone()).await.map_err(|_| SentinelError::Alert {
            sink: self.name().to_string(),
            message: "receiver dropped".to_string(),
        })
    }
}
