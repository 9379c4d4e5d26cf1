use anyhow::Result;
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, IntGauge, Registry, TextEncoder};
use tracing::info;

/// Prometheus counters for the monitor and alert pipeline.
pub struct SentinelMetrics {
    registry: Registry,

    // Polling
    pub polls: Counter,
    pub poll_failures: Counter,
    pub poll_latency: Histogram,
    pub last_version: IntGauge,

    // Transactions
    pub transactions_accepted: Counter,
    pub transactions_filtered: Counter,
    pub parse_failures: Counter,
    pub consumer_failures: Counter,
    pub consumer_backpressure: Counter,

    // Alerts
    pub transactions_checked: Counter,
    pub alerts_raised: Counter,
    pub alert_delivery_failures: Counter,
}

impl SentinelMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let polls = Counter::new("sentinel_polls_total", "Total number of poll iterations")?;
        let poll_failures =
            Counter::new("sentinel_poll_failures_total", "Poll iterations that failed to fetch")?;
        let poll_latency = Histogram::with_opts(HistogramOpts::new(
            "sentinel_poll_latency_seconds",
            "Time spent fetching one transaction page",
        ))?;
        let last_version =
            IntGauge::new("sentinel_last_version", "Highest ledger version processed")?;

        let transactions_accepted = Counter::new(
            "sentinel_transactions_accepted_total",
            "Transactions delivered to consumers",
        )?;
        let transactions_filtered = Counter::new(
            "sentinel_transactions_filtered_total",
            "Transactions skipped by the address filter",
        )?;
        let parse_failures =
            Counter::new("sentinel_parse_failures_total", "Malformed transaction records")?;
        let consumer_failures =
            Counter::new("sentinel_consumer_failures_total", "Consumer invocations that failed")?;
        let consumer_backpressure = Counter::new(
            "sentinel_consumer_backpressure_total",
            "Dispatches that waited on a full async consumer queue",
        )?;

        let transactions_checked =
            Counter::new("sentinel_transactions_checked_total", "Transactions run through checks")?;
        let alerts_raised = Counter::new("sentinel_alerts_raised_total", "Alerts raised")?;
        let alert_delivery_failures =
            Counter::new("sentinel_alert_delivery_failures_total", "Alerts a sink rejected")?;

        registry.register(Box::new(polls.clone()))?;
        registry.register(Box::new(poll_failures.clone()))?;
        registry.register(Box::new(poll_latency.clone()))?;
        registry.register(Box::new(last_version.clone()))?;
        registry.register(Box::new(transactions_accepted.clone()))?;
        registry.register(Box::new(transactions_filtered.clone()))?;
        registry.register(Box::new(parse_failures.clone()))?;
        registry.register(Box::new(consumer_failures.clone()))?;
        registry.register(Box::new(consumer_backpressure.clone()))?;
        registry.register(Box::new(transactions_checked.clone()))?;
        registry.register(Box::new(alerts_raised.clone()))?;
        registry.register(Box::new(alert_delivery_failures.clone()))?;

        info!("Sentinel metrics initialized");

        Ok(Self {
            registry,
            polls,
            poll_failures,
            poll_latency,
            last_version,
            transactions_accepted,
            transactions_filtered,
            parse_failures,
            consumer_failures,
            consumer_backpressure,
            transactions_checked,
            alerts_raised,
            alert_delivery_failures,
        })
    }

    pub fn export_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    pub fn record_poll(&self, seconds: f64, succeeded: bool) {
        self.polls.inc();
        self.poll_latency.observe(seconds);
        if !succeeded {
            self.poll_failures.inc();
        }
    }

    pub fn record_last_version(&self, version: u64) {
        self.last_version.set(i64::try_from(version).unwrap_or(i64::MAX));
    }

    pub fn record_alert(&self, delivered: bool) {
        self.alerts_raised.inc();
        if !delivered {
            self.alert_delivery_failures.inc();
        }
    }
}
