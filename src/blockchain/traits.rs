use async_trait::async_trait;
use serde_json::Value;

use crate::core::errors::Result;

/// Read-only view of a ledger-versioned chain, as consumed by the monitor.
///
/// Records are handed over as raw JSON; turning them into events is the
/// monitor's job so that one malformed record never fails a whole page.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current ledger head version.
    async fn ledger_head_version(&self) -> Result<u64>;

    /// Up to `limit` transactions, oldest first, starting at `start_version` (inclusive).
    async fn get_transactions(&self, start_version: u64, limit: u32) -> Result<Vec<Value>>;

    /// Returns the name of the network (e.g. "testnet", "mainnet").
    fn network_name(&self) -> &str;
}

/// Coerce a JSON number or numeric string into `u64`.
///
/// Ledger REST APIs encode 64-bit integers as strings.
pub fn coerce_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}
