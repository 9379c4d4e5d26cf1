// tests/util.rs
// Shared test helpers for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chain_sentinel::blockchain::LedgerClient;
use chain_sentinel::core::config::MonitorConfig;
use chain_sentinel::core::{Result, SentinelError};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// In-memory ledger whose contents and failures are driven by the test.
pub struct ScriptedLedger {
    head: AtomicUsize,
    head_fails: AtomicBool,
    fetch_failures: AtomicUsize,
    fetch_panics: AtomicUsize,
    ignore_start: AtomicBool,
    transactions: Mutex<Vec<Value>>,
    requests: Mutex<Vec<(u64, u32)>>,
}

impl ScriptedLedger {
    pub fn new(head: u64) -> Self {
        Self {
            head: AtomicUsize::new(head as usize),
            head_fails: AtomicBool::new(false),
            fetch_failures: AtomicUsize::new(0),
            fetch_panics: AtomicUsize::new(0),
            ignore_start: AtomicBool::new(false),
            transactions: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_transactions(head: u64, transactions: Vec<Value>) -> Self {
        let ledger = Self::new(head);
        *ledger.transactions.lock() = transactions;
        ledger
    }

    pub fn push(&self, tx: Value) {
        self.transactions.lock().push(tx);
    }

    pub fn fail_head(&self) {
        self.head_fails.store(true, Ordering::SeqCst);
    }

    /// Make the next `n` fetches fail with a transport error
    pub fn fail_next_fetches(&self, n: usize) {
        self.fetch_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` fetches panic
    pub fn panic_next_fetches(&self, n: usize) {
        self.fetch_panics.store(n, Ordering::SeqCst);
    }

    /// Return every stored record regardless of the requested start
    pub fn ignore_start_version(&self) {
        self.ignore_start.store(true, Ordering::SeqCst);
    }

    /// `(start, limit)` of every fetch so far
    pub fn requests(&self) -> Vec<(u64, u32)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl LedgerClient for ScriptedLedger {
    async fn ledger_head_version(&self) -> Result<u64> {
        if self.head_fails.load(Ordering::SeqCst) {
            return Err(SentinelError::Transport("head unavailable".to_string()));
        }
        Ok(self.head.load(Ordering::SeqCst) as u64)
    }

    async fn get_transactions(&self, start_version: u64, limit: u32) -> Result<Vec<Value>> {
        self.requests.lock().push((start_version, limit));
        let panics = self.fetch_panics.load(Ordering::SeqCst);
        if panics > 0 {
            self.fetch_panics.store(panics - 1, Ordering::SeqCst);
            panic!("node client bug");
        }
        let pending = self.fetch_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.fetch_failures.store(pending - 1, Ordering::SeqCst);
            return Err(SentinelError::Transport("connection reset".to_string()));
        }

        let ignore_start = self.ignore_start.load(Ordering::SeqCst);
        Ok(self
            .transactions
            .lock()
            .iter()
            .filter(|tx| {
                ignore_start || tx["version"].as_str().and_then(|v| v.parse::<u64>().ok()).unwrap_or(0) >= start_version
            })
            .take(limit as usize)
            .cloned()
            .collect())
    }

    fn network_name(&self) -> &str {
        "scripted"
    }
}

/// Minimal successful user transaction
pub fn tx(version: u64, sender: &str) -> Value {
    json!({
        "hash": format!("0x{:064x}", version),
        "version": version.to_string(),
        "sender": sender,
        "type": "user_transaction",
        "timestamp": "1700000000000000",
        "success": true,
        "gas_used": "10",
        "payload": {"type": "entry_function_payload", "function": "0x1::account::noop", "arguments": []}
    })
}

/// `0x1::coin::transfer` from `sender` to `receiver`
pub fn transfer(version: u64, sender: &str, receiver: &str, amount: u64) -> Value {
    let mut value = tx(version, sender);
    value["payload"] = json!({
        "type": "entry_function_payload",
        "function": "0x1::coin::transfer",
        "type_arguments": ["0x1::aptos_coin::AptosCoin"],
        "arguments": [receiver, amount.to_string()]
    });
    value
}

pub fn fast_monitor_config() -> MonitorConfig {
    MonitorConfig { poll_interval_ms: 10, ..MonitorConfig::default() }
}

/// Await `rx.recv()` with a generous upper bound
pub async fn recv_within<T: Clone>(rx: &mut tokio::sync::broadcast::Receiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("bus closed")
}
