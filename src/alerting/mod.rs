//! Alert generation for monitored transactions.

pub mod pipeline;
pub mod sink;

pub use pipeline::{AlertPipeline, TransactionAssessment};
pub use sink::{AlertSink, ChannelAlertSink, LoggingAlertSink, TransactionAlert};
