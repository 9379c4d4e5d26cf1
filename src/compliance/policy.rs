//! Policy definitions, their persisted record form, and check results.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::blockchain::coerce_u64;
use crate::core::address::normalize_optional;
use crate::core::errors::{Result, SentinelError};
use crate::core::severity::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    TransactionValue,
    BlockedAddress,
    GasLimit,
    ContractInteraction,
    FunctionCall,
    Custom,
}

impl PolicyType {
    pub const ALL: [PolicyType; 6] = [
        PolicyType::TransactionValue,
        PolicyType::BlockedAddress,
        PolicyType::GasLimit,
        PolicyType::ContractInteraction,
        PolicyType::FunctionCall,
        PolicyType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyType::TransactionValue => "transaction_value",
            PolicyType::BlockedAddress => "blocked_address",
            PolicyType::GasLimit => "gas_limit",
            PolicyType::ContractInteraction => "contract_interaction",
            PolicyType::FunctionCall => "function_call",
            PolicyType::Custom => "custom",
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyType {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        PolicyType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| SentinelError::UnknownPolicyType(s.to_string()))
    }
}

/// Typed rule configuration, one variant per policy type.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyRule {
    /// Fires when the transferred value is above `max_value`
    TransactionValue { max_value: u64 },
    /// Addresses are kept normalized
    BlockedAddress { addresses: Vec<String> },
    GasLimit { max_gas: u64 },
    /// Case-insensitive substrings of the payload function id
    ContractInteraction { contracts: Vec<String> },
    /// Case-insensitive exact function ids
    FunctionCall { functions: Vec<String> },
    /// Delegates to the registered custom rule called `rule`
    Custom { rule: String, params: Map<String, Value> },
}

impl PolicyRule {
    pub fn blocked_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for address in addresses {
            let Some(address) = normalize_optional(Some(address.as_ref())) else {
                continue;
            };
            if !normalized.contains(&address) {
                normalized.push(address);
            }
        }
        PolicyRule::BlockedAddress { addresses: normalized }
    }

    pub fn policy_type(&self) -> PolicyType {
        match self {
            PolicyRule::TransactionValue { .. } => PolicyType::TransactionValue,
            PolicyRule::BlockedAddress { .. } => PolicyType::BlockedAddress,
            PolicyRule::GasLimit { .. } => PolicyType::GasLimit,
            PolicyRule::ContractInteraction { .. } => PolicyType::ContractInteraction,
            PolicyRule::FunctionCall { .. } => PolicyType::FunctionCall,
            PolicyRule::Custom { .. } => PolicyType::Custom,
        }
    }

    /// Persisted config object
    pub fn config(&self) -> Value {
        match self {
            PolicyRule::TransactionValue { max_value } => json!({ "max_value": max_value }),
            PolicyRule::BlockedAddress { addresses } => json!({ "addresses": addresses }),
            PolicyRule::GasLimit { max_gas } => json!({ "max_gas": max_gas }),
            PolicyRule::ContractInteraction { contracts } => json!({ "contracts": contracts }),
            PolicyRule::FunctionCall { functions } => json!({ "functions": functions }),
            PolicyRule::Custom { rule, params } => {
                let mut config = params.clone();
                config.insert("rule".to_string(), Value::String(rule.clone()));
                Value::Object(config)
            }
        }
    }

    /// Parse a persisted config object. Errors are plain messages; the caller adds the policy name.
    pub fn from_config(policy_type: PolicyType, config: &Value) -> std::result::Result<Self, String> {
        let object = match config {
            Value::Object(object) => object.clone(),
            Value::Null => Map::new(),
            other => return Err(format!("config must be an object, got {}", other)),
        };

        let rule = match policy_type {
            PolicyType::TransactionValue => {
                PolicyRule::TransactionValue { max_value: threshold(&object, "max_value")? }
            }
            PolicyType::BlockedAddress => {
                PolicyRule::blocked_addresses(string_list(&object, "addresses")?)
            }
            PolicyType::GasLimit => PolicyRule::GasLimit { max_gas: threshold(&object, "max_gas")? },
            PolicyType::ContractInteraction => {
                PolicyRule::ContractInteraction { contracts: string_list(&object, "contracts")? }
            }
            PolicyType::FunctionCall => {
                PolicyRule::FunctionCall { functions: string_list(&object, "functions")? }
            }
            PolicyType::Custom => {
                let mut params = object;
                let rule = match params.remove("rule") {
                    Some(Value::String(rule)) if !rule.trim().is_empty() => rule,
                    _ => return Err("custom policy needs a non-empty 'rule' name".to_string()),
                };
                PolicyRule::Custom { rule, params }
            }
        };
        Ok(rule)
    }
}

fn threshold(config: &Map<String, Value>, key: &str) -> std::result::Result<u64, String> {
    let value = config.get(key).ok_or_else(|| format!("missing '{}'", key))?;
    coerce_u64(value).ok_or_else(|| format!("'{}' must be a non-negative integer, got {}", key, value))
}

fn string_list(config: &Map<String, Value>, key: &str) -> std::result::Result<Vec<String>, String> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| format!("'{}' entries must be strings, got {}", key, item))
            })
            .collect(),
        Some(other) => Err(format!("'{}' must be a list, got {}", key, other)),
    }
}

/// A named compliance rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "PolicyRecord", try_from = "PolicyRecord")]
pub struct CompliancePolicy {
    pub name: String,
    pub rule: PolicyRule,
    pub severity: Severity,
    pub description: String,
    pub enabled: bool,
}

impl CompliancePolicy {
    pub fn new(
        name: impl Into<String>,
        rule: PolicyRule,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self { name: name.into(), rule, severity, description: description.into(), enabled: true }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn policy_type(&self) -> PolicyType {
        self.rule.policy_type()
    }
}

/// Persisted / wire form of a policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub name: String,
    pub policy_type: String,
    #[serde(default = "PolicyRecord::default_severity")]
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
    #[serde(default = "PolicyRecord::default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub config: Value,
}

impl PolicyRecord {
    fn default_severity() -> Severity { Severity::Medium }
    fn default_enabled() -> bool { true }
}

impl From<CompliancePolicy> for PolicyRecord {
    fn from(policy: CompliancePolicy) -> Self {
        Self {
            policy_type: policy.policy_type().as_str().to_string(),
            config: policy.rule.config(),
            name: policy.name,
            severity: policy.severity,
            description: policy.description,
            enabled: policy.enabled,
        }
    }
}

impl TryFrom<PolicyRecord> for CompliancePolicy {
    type Error = SentinelError;

    fn try_from(record: PolicyRecord) -> Result<Self> {
        if record.name.trim().is_empty() {
            return Err(SentinelError::InvalidPolicy {
                name: record.name,
                message: "policy name must not be empty".to_string(),
            });
        }
        let policy_type: PolicyType = record.policy_type.parse()?;
        let rule = PolicyRule::from_config(policy_type, &record.config)
            .map_err(|message| SentinelError::InvalidPolicy { name: record.name.clone(), message })?;

        Ok(Self {
            name: record.name,
            rule,
            severity: record.severity,
            description: record.description,
            enabled: record.enabled,
        })
    }
}

/// One policy firing against one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub policy_name: String,
    pub policy_type: PolicyType,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub details: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceResult {
    pub passed: bool,
    /// In policy registration order
    pub violations: Vec<PolicyViolation>,
    /// Enabled policies evaluated
    pub policies_checked: usize,
    pub timestamp: DateTime<Utc>,
}

impl ComplianceResult {
    pub fn new(violations: Vec<PolicyViolation>, policies_checked: usize) -> Self {
        Self { passed: violations.is_empty(), violations, policies_checked, timestamp: Utc::now() }
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.violations.iter().map(|v| v.severity).max()
    }
}
