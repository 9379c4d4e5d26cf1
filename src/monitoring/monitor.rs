//! Continuous transaction monitor.
//!
//! Polls a [`LedgerClient`] for new ledger versions, parses and filters the
//! records, keeps the last [`RECENT_EVENT_CAPACITY`] events in a ring buffer
//! and fans every accepted event out to registered consumers.
//!
//! Async consumers each own a bounded queue. The poll loop waits for room in
//! every queue, so a slow consumer applies backpressure instead of losing
//! events. [`TransactionMonitor::subscribe`] receivers are best-effort
//! observers on a broadcast bus and may skip events when they fall behind.

use std::collections::HashSet;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::event::TransactionEvent;
use super::metrics::SentinelMetrics;
use super::ring_buffer::RingBuffer;
use crate::blockchain::LedgerClient;
use crate::core::address::{normalize_address, normalize_optional};
use crate::core::config::MonitorConfig;
use crate::core::errors::{Result, SentinelError};

/// Number of events kept for `recent_transactions`
pub const RECENT_EVENT_CAPACITY: usize = 100;

/// Consumer invoked inline from the poll loop
pub type TransactionCallback = Arc<dyn Fn(&TransactionEvent) -> anyhow::Result<()> + Send + Sync>;

/// Consumer driven from its own task off a dedicated queue
pub type AsyncTransactionConsumer =
    Arc<dyn Fn(TransactionEvent) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorStatus {
    pub is_running: bool,
    /// Sorted
    pub monitored_addresses: Vec<String>,
    pub recent_transaction_count: usize,
    pub last_version: Option<u64>,
}

struct MonitorState {
    last_version: Option<u64>,
    recent: RingBuffer<TransactionEvent>,
    monitored: HashSet<String>,
}

impl MonitorState {
    fn accepts(&self, sender: &str) -> bool {
        self.monitored.is_empty() || self.monitored.contains(&normalize_address(sender))
    }
}

struct LiveConsumers {
    runtime: Handle,
    queues: Vec<mpsc::Sender<TransactionEvent>>,
    tasks: Vec<JoinHandle<()>>,
}

impl LiveConsumers {
    fn spawn(
        &mut self,
        index: usize,
        consumer: AsyncTransactionConsumer,
        capacity: usize,
        metrics: Option<Arc<SentinelMetrics>>,
    ) {
        let (tx, rx) = mpsc::channel(capacity);
        self.queues.push(tx);
        self.tasks.push(self.runtime.spawn(drain_consumer(index, consumer, rx, metrics)));
    }
}

#[derive(Default)]
struct ConsumerRegistry {
    registered: Vec<AsyncTransactionConsumer>,
    live: Option<LiveConsumers>,
}

struct PollRun {
    token: CancellationToken,
    task: JoinHandle<()>,
}

struct Shared {
    client: Option<Arc<dyn LedgerClient>>,
    poll_interval: Duration,
    page_size: u32,
    queue_capacity: usize,
    state: Mutex<MonitorState>,
    callbacks: RwLock<Vec<TransactionCallback>>,
    consumers: Mutex<ConsumerRegistry>,
    bus: broadcast::Sender<TransactionEvent>,
    running: AtomicBool,
    metrics: Option<Arc<SentinelMetrics>>,
}

pub struct TransactionMonitor {
    shared: Arc<Shared>,
    lifecycle: tokio::sync::Mutex<Option<PollRun>>,
}

impl TransactionMonitor {
    /// A monitor without a client can still be configured and queried, but `start` fails.
    pub fn new(config: &MonitorConfig, client: Option<Arc<dyn LedgerClient>>) -> Self {
        Self::build(config, client, None)
    }

    pub fn with_metrics(
        config: &MonitorConfig,
        client: Option<Arc<dyn LedgerClient>>,
        metrics: Arc<SentinelMetrics>,
    ) -> Self {
        Self::build(config, client, Some(metrics))
    }

    fn build(
        config: &MonitorConfig,
        client: Option<Arc<dyn LedgerClient>>,
        metrics: Option<Arc<SentinelMetrics>>,
    ) -> Self {
        let queue_capacity = config.event_bus_capacity.max(1);
        let (bus, _) = broadcast::channel(queue_capacity);
        let monitored = config.monitored_addresses.iter().filter_map(|a| normalize_optional(Some(a.as_str()))).collect();

        let shared = Shared {
            client,
            poll_interval: config.poll_interval(),
            page_size: config.max_transactions_per_query.max(1),
            queue_capacity,
            state: Mutex::new(MonitorState {
                last_version: None,
                recent: RingBuffer::new(RECENT_EVENT_CAPACITY),
                monitored,
            }),
            callbacks: RwLock::new(Vec::new()),
            consumers: Mutex::new(ConsumerRegistry::default()),
            bus,
            running: AtomicBool::new(false),
            metrics,
        };

        Self { shared: Arc::new(shared), lifecycle: tokio::sync::Mutex::new(None) }
    }

    /// Start polling. A second call while running is a no-op.
    pub async fn start(&self) -> Result<()> {
        let client = self
            .shared
            .client
            .clone()
            .ok_or_else(|| SentinelError::NotConfigured("ledger client".to_string()))?;

        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            debug!("Transaction monitor already running");
            return Ok(());
        }

        let head = match client.ledger_head_version().await {
            Ok(version) => version,
            Err(e) => {
                warn!(error = %e, "Could not read ledger head, starting from version 0");
                0
            }
        };
        let seeded = {
            let mut state = self.shared.state.lock();
            // never move backwards across restarts
            let seeded = state.last_version.map_or(head, |last| last.max(head));
            state.last_version = Some(seeded);
            seeded
        };
        if let Some(metrics) = &self.shared.metrics {
            metrics.record_last_version(seeded);
        }

        // queues exist before the first event can be published
        self.shared.spawn_consumers();

        let token = CancellationToken::new();
        self.shared.running.store(true, Ordering::SeqCst);
        let task = tokio::spawn(run_poll_loop(Arc::clone(&self.shared), token.clone()));

        *lifecycle = Some(PollRun { token, task });
        info!(
            network = client.network_name(),
            from_version = seeded,
            interval_ms = self.shared.poll_interval.as_millis() as u64,
            "Transaction monitor started"
        );
        Ok(())
    }

    /// Stop polling and wait for consumers to finish everything already published.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(run) = lifecycle.take() else {
            return;
        };

        run.token.cancel();
        if let Err(e) = run.task.await {
            warn!(error = %e, "Poll task ended abnormally");
        }
        self.shared.running.store(false, Ordering::SeqCst);

        // dropping the queues lets each drain task finish its backlog and exit
        let tasks = self.shared.consumers.lock().live.take().map(|live| live.tasks).unwrap_or_default();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Consumer task ended abnormally");
            }
        }

        info!("Transaction monitor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Run one poll iteration and return the number of accepted events.
    ///
    /// Meant for hosts that drive the monitor themselves; do not mix with a
    /// running poll loop if strict delivery order matters.
    pub async fn poll_once(&self) -> Result<usize> {
        self.shared.poll_once().await
    }

    /// Register a consumer that runs inline, in registration order.
    pub fn on_transaction<F>(&self, callback: F)
    where
        F: Fn(&TransactionEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.callbacks.write().push(Arc::new(callback));
    }

    /// Register a consumer that runs in its own task, one event at a time.
    ///
    /// Every event accepted while the monitor runs is delivered, in ledger
    /// order. A consumer whose queue is full holds up the poll loop.
    pub fn on_transaction_async<F, Fut>(&self, consumer: F)
    where
        F: Fn(TransactionEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let consumer: AsyncTransactionConsumer = Arc::new(move |event| consumer(event).boxed());
        let mut registry = self.shared.consumers.lock();
        let index = registry.registered.len();
        registry.registered.push(Arc::clone(&consumer));

        if let Some(live) = registry.live.as_mut() {
            live.spawn(index, consumer, self.shared.queue_capacity, self.shared.metrics.clone());
        }
    }

    /// Best-effort observer of accepted events from now on.
    ///
    /// A receiver that falls more than `event_bus_capacity` events behind gets
    /// `RecvError::Lagged`; use [`Self::on_transaction_async`] for lossless delivery.
    pub fn subscribe(&self) -> broadcast::Receiver<TransactionEvent> {
        self.shared.bus.subscribe()
    }

    /// Blank input is ignored.
    pub fn add_monitored_address(&self, address: &str) {
        let Some(address) = normalize_optional(Some(address)) else {
            warn!("Ignoring empty monitored address");
            return;
        };
        if self.shared.state.lock().monitored.insert(address.clone()) {
            info!(%address, "Monitoring address");
        }
    }

    pub fn remove_monitored_address(&self, address: &str) {
        let address = normalize_address(address);
        if self.shared.state.lock().monitored.remove(&address) {
            info!(%address, "Stopped monitoring address");
        }
    }

    /// Buffered events, oldest first
    pub fn recent_transactions(&self) -> Vec<TransactionEvent> {
        self.shared.state.lock().recent.to_vec()
    }

    pub fn last_version(&self) -> Option<u64> {
        self.shared.state.lock().last_version
    }

    pub fn status(&self) -> MonitorStatus {
        let state = self.shared.state.lock();
        let mut monitored_addresses: Vec<String> = state.monitored.iter().cloned().collect();
        monitored_addresses.sort();
        MonitorStatus {
            is_running: self.is_running(),
            monitored_addresses,
            recent_transaction_count: state.recent.len(),
            last_version: state.last_version,
        }
    }
}

impl Drop for TransactionMonitor {
    fn drop(&mut self) {
        if let Ok(mut lifecycle) = self.lifecycle.try_lock() {
            if let Some(run) = lifecycle.take() {
                run.token.cancel();
            }
        }
    }
}

impl Shared {
    async fn poll_once(&self) -> Result<usize> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| SentinelError::NotConfigured("ledger client".to_string()))?;

        let start = self.state.lock().last_version.map_or(0, |v| v.saturating_add(1));
        let started = Instant::now();
        let fetched = client.get_transactions(start, self.page_size).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_poll(started.elapsed().as_secs_f64(), fetched.is_ok());
        }
        let records = fetched?;

        let mut accepted = 0;
        for raw in &records {
            let Some(version) = TransactionEvent::version_of(raw) else {
                warn!("Skipping transaction record without a numeric version");
                self.count(|m| m.parse_failures.inc());
                continue;
            };

            let event = {
                let mut state = self.state.lock();
                if state.last_version.is_some_and(|last| version <= last) {
                    continue;
                }
                state.last_version = Some(version);

                match TransactionEvent::from_json(raw) {
                    Ok(event) if state.accepts(&event.sender) => {
                        state.recent.push(event.clone());
                        Some(event)
                    }
                    Ok(_) => {
                        self.count(|m| m.transactions_filtered.inc());
                        None
                    }
                    Err(e) => {
                        warn!(version, error = %e, "Skipping malformed transaction");
                        self.count(|m| m.parse_failures.inc());
                        None
                    }
                }
            };
            if let Some(metrics) = &self.metrics {
                metrics.record_last_version(version);
            }

            if let Some(event) = event {
                self.dispatch(event).await;
                accepted += 1;
            }
        }

        debug!(start, fetched = records.len(), accepted, "Poll iteration complete");
        Ok(accepted)
    }

    async fn dispatch(&self, event: TransactionEvent) {
        debug!(hash = %event.hash, version = event.version, "Dispatching transaction");
        self.count(|m| m.transactions_accepted.inc());

        let callbacks = self.callbacks.read().clone();
        for (index, callback) in callbacks.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| callback(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(consumer = index, hash = %event.hash, error = %e, "Transaction consumer failed");
                    self.count(|m| m.consumer_failures.inc());
                }
                Err(_) => {
                    warn!(consumer = index, hash = %event.hash, "Transaction consumer panicked");
                    self.count(|m| m.consumer_failures.inc());
                }
            }
        }

        let queues = self.consumers.lock().live.as_ref().map(|live| live.queues.clone()).unwrap_or_default();
        for (index, queue) in queues.iter().enumerate() {
            let pending = match queue.try_send(event.clone()) {
                Ok(()) => continue,
                Err(TrySendError::Full(pending)) => pending,
                Err(TrySendError::Closed(_)) => {
                    warn!(consumer = index, hash = %event.hash, "Async consumer queue closed");
                    continue;
                }
            };
            debug!(consumer = index, version = event.version, "Async consumer queue full, waiting");
            self.count(|m| m.consumer_backpressure.inc());
            if queue.send(pending).await.is_err() {
                warn!(consumer = index, hash = %event.hash, "Async consumer queue closed");
            }
        }

        // no subscribers is fine
        let _ = self.bus.send(event);
    }

    fn spawn_consumers(&self) {
        let mut registry = self.consumers.lock();
        let mut live = LiveConsumers { runtime: Handle::current(), queues: Vec::new(), tasks: Vec::new() };
        for (index, consumer) in registry.registered.iter().enumerate() {
            live.spawn(index, Arc::clone(consumer), self.queue_capacity, self.metrics.clone());
        }
        registry.live = Some(live);
    }

    fn count(&self, f: impl FnOnce(&SentinelMetrics)) {
        if let Some(metrics) = &self.metrics {
            f(metrics);
        }
    }
}

async fn run_poll_loop(shared: Arc<Shared>, token: CancellationToken) {
    loop {
        match AssertUnwindSafe(shared.poll_once()).catch_unwind().await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "Poll iteration failed, retrying after interval"),
            Err(_) => {
                warn!("Poll iteration panicked, retrying after interval");
                shared.count(|m| m.poll_failures.inc());
            }
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(shared.poll_interval) => {}
        }
    }
    debug!("Poll loop exited");
}

async fn drain_consumer(
    index: usize,
    consumer: AsyncTransactionConsumer,
    mut rx: mpsc::Receiver<TransactionEvent>,
    metrics: Option<Arc<SentinelMetrics>>,
) {
    // ends once the queue is dropped and empty
    while let Some(event) = rx.recv().await {
        deliver(index, &consumer, event, metrics.as_deref()).await;
    }
    debug!(consumer = index, "Consumer drain task exited");
}

async fn deliver(
    index: usize,
    consumer: &AsyncTransactionConsumer,
    event: TransactionEvent,
    metrics: Option<&SentinelMetrics>,
) {
    let hash = event.hash.clone();
    let outcome = match catch_unwind(AssertUnwindSafe(|| consumer(event))) {
        Ok(fut) => tokio::spawn(fut).await.map_err(|e| e.to_string()),
        Err(_) => Err("panicked while building future".to_string()),
    };

    let failed = match outcome {
        Ok(Ok(())) => false,
        Ok(Err(e)) => {
            warn!(consumer = index, %hash, error = %e, "Async transaction consumer failed");
            true
        }
        Err(e) => {
            warn!(consumer = index, %hash, error = %e, "Async transaction consumer panicked");
            true
        }
    };
    if failed {
        if let Some(metrics) = metrics {
            metrics.consumer_failures.inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct FixedLedger {
        head: u64,
        page: Vec<Value>,
    }

    #[async_trait]
    impl LedgerClient for FixedLedger {
        async fn ledger_head_version(&self) -> Result<u64> {
            Ok(self.head)
        }

        async fn get_transactions(&self, start_version: u64, limit: u32) -> Result<Vec<Value>> {
            Ok(self
                .page
                .iter()
                .filter(|tx| TransactionEvent::version_of(tx).unwrap_or(0) >= start_version)
                .take(limit as usize)
                .cloned()
                .collect())
        }

        fn network_name(&self) -> &str {
            "unit"
        }
    }

    fn tx(version: u64, sender: &str) -> Value {
        json!({"hash": format!("0x{:x}", version), "version": version.to_string(), "sender": sender})
    }

    fn monitor_with(page: Vec<Value>) -> TransactionMonitor {
        let ledger: Arc<dyn LedgerClient> = Arc::new(FixedLedger { head: 0, page });
        TransactionMonitor::new(&MonitorConfig::default(), Some(ledger))
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_start_without_client_fails() {
        let monitor = TransactionMonitor::new(&MonitorConfig::default(), None);
        let err = monitor.start().await.unwrap_err();
        assert!(matches!(err, SentinelError::NotConfigured(_)));
        assert!(!monitor.is_running());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_poll_once_skips_seen_versions() {
        let monitor = monitor_with(vec![tx(1, "0xa"), tx(2, "0xb"), tx(3, "0xc")]);
        assert_eq!(monitor.poll_once().await.unwrap(), 3);
        assert_eq!(monitor.last_version(), Some(3));
        assert_eq!(monitor.poll_once().await.unwrap(), 0);
        assert_eq!(monitor.recent_transactions().len(), 3);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_filter_uses_normalized_sender() {
        let monitor = monitor_with(vec![tx(1, "0xAAA"), tx(2, "0xbbb")]);
        monitor.add_monitored_address("  AAA ");
        assert_eq!(monitor.poll_once().await.unwrap(), 1);
        let recent = monitor.recent_transactions();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].sender, "0xAAA");
        // filtered records still advance the cursor
        assert_eq!(monitor.last_version(), Some(2));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_status_reports_sorted_addresses() {
        let monitor = monitor_with(vec![]);
        monitor.add_monitored_address("0xbb");
        monitor.add_monitored_address("AA");
        monitor.remove_monitored_address("0xcc");
        let status = monitor.status();
        assert!(!status.is_running);
        assert_eq!(status.monitored_addresses, vec!["0xaa".to_string(), "0xbb".to_string()]);
        assert_eq!(status.recent_transaction_count, 0);
        assert_eq!(status.last_version, None);
    }
}
