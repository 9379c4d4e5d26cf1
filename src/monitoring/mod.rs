//! Transaction ingestion: polling, parsing, buffering and fan-out.

pub mod event;
pub mod metrics;
pub mod monitor;
pub mod ring_buffer;

pub use event::{TransactionEvent, TransactionPayload};
pub use metrics::SentinelMetrics;
pub use monitor::{
    AsyncTransactionConsumer, MonitorStatus, TransactionCallback, TransactionMonitor,
    RECENT_EVENT_CAPACITY,
};
pub use ring_buffer::RingBuffer;
