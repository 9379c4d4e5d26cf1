//! Aptos fullnode REST client
//!
//! Implements [`LedgerClient`] against `GET /` (ledger info) and
//! `GET /transactions?start=&limit=`.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use super::traits::{coerce_u64, LedgerClient};
use crate::core::config::LedgerConfig;
use crate::core::errors::{Result, SentinelError};

/// Longest error body (in characters) echoed back into an error message
const MAX_ERROR_BODY: usize = 256;

pub struct AptosRestClient {
    client: Client,
    base_url: String,
    network: String,
}

impl AptosRestClient {
    pub fn new(config: &LedgerConfig) -> Result<Self> {
        let base_url = config.node_url.trim().trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url).map_err(|e| {
            SentinelError::Configuration(format!("Invalid ledger node URL '{}': {}", base_url, e))
        })?;

        // Build a reqwest client with the configured timeout; allow proxy environment vars.
        let mut builder = Client::builder().timeout(config.request_timeout());
        if let Ok(proxy) = std::env::var("HTTPS_PROXY").or_else(|_| std::env::var("HTTP_PROXY")) {
            if let Ok(p) = reqwest::Proxy::all(proxy) {
                builder = builder.proxy(p);
            }
        }
        let client = builder
            .build()
            .map_err(|e| SentinelError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        info!(node = %base_url, network = %config.network, "Ledger REST client ready");
        Ok(Self { client, base_url, network: config.network.clone() })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.get(&url).query(query).send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SentinelError::RpcStatus { status: status.as_u16(), body: clip(&body) });
        }

        resp.json::<Value>()
            .await
            .map_err(|e| SentinelError::Transport(format!("invalid JSON from {}: {}", url, e)))
    }
}

#[async_trait]
impl LedgerClient for AptosRestClient {
    async fn ledger_head_version(&self) -> Result<u64> {
        let info = self.get_json("/", &[]).await?;
        info.get("ledger_version")
            .and_then(coerce_u64)
            .ok_or_else(|| SentinelError::Transport("ledger info has no ledger_version".to_string()))
    }

    async fn get_transactions(&self, start_version: u64, limit: u32) -> Result<Vec<Value>> {
        let body = self
            .get_json(
                "/transactions",
                &[("start", start_version.to_string()), ("limit", limit.to_string())],
            )
            .await?;

        match body {
            Value::Array(records) => {
                debug!(start_version, count = records.len(), "Fetched transaction page");
                Ok(records)
            }
            other => Err(SentinelError::Transport(format!(
                "expected a JSON array of transactions, got {}",
                json_kind(&other)
            ))),
        }
    }

    fn network_name(&self) -> &str {
        &self.network
    }
}

/// Cut a node-supplied body on a character boundary
fn clip(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY).collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
