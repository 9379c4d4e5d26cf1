//! Transaction events produced by the monitor.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::blockchain::coerce_u64;
use crate::core::errors::{Result, SentinelError};

/// Entry functions whose first two arguments are `(receiver, amount)`
const TRANSFER_FUNCTIONS: [&str; 3] = [
    "0x1::aptos_account::transfer",
    "0x1::aptos_account::transfer_coins",
    "0x1::coin::transfer",
];

/// Transaction payload. Only `function` is interpreted; every other key is kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_arguments: Vec<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TransactionPayload {
    /// Build a payload from raw JSON. Anything that is not an object yields an empty payload.
    pub fn from_json(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };

        let mut extra = object.clone();
        let function = extra
            .remove("function")
            .and_then(|f| f.as_str().map(str::to_string));
        let type_arguments = take_array(&mut extra, "type_arguments");
        let arguments = take_array(&mut extra, "arguments");

        Self { function, type_arguments, arguments, extra }
    }

    /// Payload carrying only a function id
    pub fn with_function(function: impl Into<String>) -> Self {
        Self { function: Some(function.into()), ..Self::default() }
    }

    pub fn function(&self) -> Option<&str> {
        self.function.as_deref()
    }

    /// `(receiver, amount)` for well-known transfer entry functions
    pub fn transfer_details(&self) -> Option<(String, u64)> {
        let function = self.function()?.to_lowercase();
        if !TRANSFER_FUNCTIONS.contains(&function.as_str()) {
            return None;
        }
        let receiver = self.arguments.first()?.as_str()?.to_string();
        let amount = coerce_u64(self.arguments.get(1)?)?;
        Some((receiver, amount))
    }
}

fn take_array(object: &mut Map<String, Value>, key: &str) -> Vec<Value> {
    match object.remove(key) {
        Some(Value::Array(items)) => items,
        Some(other) => {
            // not an array; leave it in extra
            object.insert(key.to_string(), other);
            Vec::new()
        }
        None => Vec::new(),
    }
}

/// One committed transaction as seen by the monitor. Never mutated after parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub hash: String,
    pub version: u64,
    pub sender: String,
    #[serde(rename = "type")]
    pub tx_type: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub gas_used: u64,
    pub payload: TransactionPayload,
    #[serde(default)]
    pub changes: Vec<Value>,
    #[serde(default)]
    pub raw: Value,
}

impl TransactionEvent {
    /// Ledger version of a raw record, if it has a usable one
    pub fn version_of(raw: &Value) -> Option<u64> {
        raw.get("version").and_then(coerce_u64)
    }

    /// Parse a raw REST record.
    ///
    /// A missing hash or a non-numeric version / gas figure is an error. An
    /// unparseable timestamp falls back to the current time.
    pub fn from_json(raw: &Value) -> Result<Self> {
        let hash = raw
            .get("hash")
            .and_then(Value::as_str)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| SentinelError::MalformedTransaction("missing hash".to_string()))?
            .to_string();

        let version = Self::version_of(raw).ok_or_else(|| {
            SentinelError::MalformedTransaction(format!("{}: missing or non-numeric version", hash))
        })?;

        let gas_used = match raw.get("gas_used") {
            None | Some(Value::Null) => 0,
            Some(v) => coerce_u64(v).ok_or_else(|| {
                SentinelError::MalformedTransaction(format!("{}: non-numeric gas_used {}", hash, v))
            })?,
        };

        let timestamp = raw
            .get("timestamp")
            .and_then(coerce_u64)
            .and_then(micros_to_datetime)
            .unwrap_or_else(Utc::now);

        Ok(Self {
            hash,
            version,
            sender: raw.get("sender").and_then(Value::as_str).unwrap_or_default().to_string(),
            tx_type: raw.get("type").and_then(Value::as_str).unwrap_or("unknown").to_string(),
            timestamp,
            success: raw.get("success").and_then(Value::as_bool).unwrap_or(false),
            gas_used,
            payload: raw.get("payload").map(TransactionPayload::from_json).unwrap_or_default(),
            changes: raw.get("changes").and_then(Value::as_array).cloned().unwrap_or_default(),
            raw: raw.clone(),
        })
    }
}

fn micros_to_datetime(micros: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(micros / 1_000_000).ok()?;
    let nanos = ((micros % 1_000_000) * 1_000) as u32;
    Utc.timestamp_opt(secs, nanos).single()
}
