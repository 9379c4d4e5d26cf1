//! Policy engine
//!
//! Ordered policy registry plus the blocked-address cache. Every policy is
//! evaluated independently and reports at most one violation per check.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::plugins::{CustomRule, RuleOutcome, SelfTransferRule, TransactionContext};
use super::policy::{CompliancePolicy, ComplianceResult, PolicyRule, PolicyType, PolicyViolation};
use crate::core::address::{normalize_address, normalize_optional};
use crate::core::config::PolicyConfig;
use crate::core::errors::{Result, SentinelError};
use crate::core::severity::Severity;
use crate::monitoring::TransactionPayload;

pub const MAX_TRANSACTION_VALUE_POLICY: &str = "max_transaction_value";
pub const HIGH_GAS_POLICY: &str = "high_gas_warning";
pub const BLOCKED_ADDRESSES_POLICY: &str = "blocked_addresses";
pub const SUSPICIOUS_CONTRACTS_POLICY: &str = "suspicious_contracts";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyStats {
    pub total_policies: usize,
    pub enabled_policies: usize,
    pub blocked_addresses_count: usize,
    /// Every severity, zero counts included
    pub by_severity: BTreeMap<Severity, usize>,
    /// Every policy type, zero counts included
    pub by_type: BTreeMap<PolicyType, usize>,
}

pub struct PolicyEngine {
    policies: Vec<CompliancePolicy>,
    blocked_cache: HashSet<String>,
    custom_rules: HashMap<String, Arc<dyn CustomRule>>,
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyEngine {
    /// Engine with the four built-in policies at their default thresholds.
    pub fn new() -> Self {
        let config = PolicyConfig::default();
        let mut engine = Self::empty();
        for policy in builtin_policies(&config) {
            engine.add_policy(policy);
        }
        engine
    }

    /// Engine with no policies. Custom rules that ship with the crate are registered.
    pub fn empty() -> Self {
        let mut engine =
            Self { policies: Vec::new(), blocked_cache: HashSet::new(), custom_rules: HashMap::new() };
        engine.register_custom_rule(Arc::new(SelfTransferRule));
        engine
    }

    /// Built-ins with configured thresholds, followed by the configured extra records.
    pub fn from_config(config: &PolicyConfig) -> Result<Self> {
        let mut engine = Self::empty();
        for policy in builtin_policies(config) {
            engine.add_policy(policy);
        }
        for record in &config.extra {
            engine.add_policy(CompliancePolicy::try_from(record.clone())?);
        }
        info!(
            policies = engine.policies.len(),
            blocked = engine.blocked_cache.len(),
            "Policy engine initialized"
        );
        Ok(engine)
    }

    pub fn register_custom_rule(&mut self, rule: Arc<dyn CustomRule>) {
        let name = rule.name().to_string();
        if self.custom_rules.insert(name.clone(), rule).is_some() {
            debug!(rule = %name, "Replaced custom rule");
        }
    }

    pub fn custom_rule_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.custom_rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Evaluate every enabled policy, in registration order.
    pub fn check_transaction(
        &self,
        sender: &str,
        receiver: Option<&str>,
        value: u64,
        gas_used: u64,
        payload: Option<&TransactionPayload>,
    ) -> ComplianceResult {
        let context = TransactionContext { sender, receiver, value, gas_used, payload };
        let mut checked = 0;
        let mut violations = Vec::new();

        for policy in self.policies.iter().filter(|p| p.enabled) {
            checked += 1;
            if let Some(violation) = self.evaluate(policy, &context) {
                debug!(policy = %policy.name, severity = %violation.severity, "Policy violated");
                violations.push(violation);
            }
        }

        ComplianceResult::new(violations, checked)
    }

    fn evaluate(
        &self,
        policy: &CompliancePolicy,
        context: &TransactionContext<'_>,
    ) -> Option<PolicyViolation> {
        let violation = |message: String, details: serde_json::Value| PolicyViolation {
            policy_name: policy.name.clone(),
            policy_type: policy.policy_type(),
            severity: policy.severity,
            message,
            details,
            timestamp: Utc::now(),
        };

        match &policy.rule {
            PolicyRule::TransactionValue { max_value } => (context.value > *max_value).then(|| {
                violation(
                    format!("Transaction value {} exceeds maximum {}", context.value, max_value),
                    json!({ "value": context.value, "max_value": max_value }),
                )
            }),
            PolicyRule::BlockedAddress { .. } => {
                let sender = context.normalized_sender();
                if self.blocked_cache.contains(&sender) {
                    return Some(violation(
                        format!("Sender {} is blocked", sender),
                        json!({ "blocked_address": sender, "role": "sender" }),
                    ));
                }
                let receiver = context.normalized_receiver()?;
                self.blocked_cache.contains(&receiver).then(|| {
                    violation(
                        format!("Receiver {} is blocked", receiver),
                        json!({ "blocked_address": receiver, "role": "receiver" }),
                    )
                })
            }
            PolicyRule::GasLimit { max_gas } => (context.gas_used > *max_gas).then(|| {
                violation(
                    format!("Gas usage {} exceeds threshold {}", context.gas_used, max_gas),
                    json!({ "gas_used": context.gas_used, "max_gas": max_gas }),
                )
            }),
            PolicyRule::ContractInteraction { contracts } => {
                let function = context.function()?;
                let lowered = function.to_lowercase();
                contracts
                    .iter()
                    .find(|c| !c.is_empty() && lowered.contains(&c.to_lowercase()))
                    .map(|contract| {
                        violation(
                            format!("Interaction with suspicious contract: {}", contract),
                            json!({ "contract": contract, "function": function }),
                        )
                    })
            }
            PolicyRule::FunctionCall { functions } => {
                let function = context.function()?;
                functions.iter().find(|f| f.eq_ignore_ascii_case(function)).map(|matched| {
                    violation(
                        format!("Call to restricted function: {}", function),
                        json!({ "function": function, "matched": matched }),
                    )
                })
            }
            PolicyRule::Custom { rule, params } => {
                let Some(plugin) = self.custom_rules.get(rule) else {
                    debug!(policy = %policy.name, %rule, "Custom rule not registered, skipping");
                    return None;
                };
                match plugin.evaluate(context, params) {
                    RuleOutcome::Pass => None,
                    RuleOutcome::Violation { message, details } => Some(violation(message, details)),
                }
            }
        }
    }

    /// Policies in registration order
    pub fn list_policies(&self) -> &[CompliancePolicy] {
        &self.policies
    }

    pub fn get_policy(&self, name: &str) -> Option<&CompliancePolicy> {
        self.policies.iter().find(|p| p.name == name)
    }

    /// Insert or replace by name. A replaced policy keeps its position.
    pub fn add_policy(&mut self, policy: CompliancePolicy) {
        let touches_blocklist = policy.policy_type() == PolicyType::BlockedAddress;
        match self.policies.iter_mut().find(|p| p.name == policy.name) {
            Some(existing) => {
                let was_blocklist = existing.policy_type() == PolicyType::BlockedAddress;
                info!(policy = %policy.name, "Updated compliance policy");
                *existing = policy;
                if touches_blocklist || was_blocklist {
                    self.rebuild_blocked_cache();
                }
            }
            None => {
                info!(policy = %policy.name, policy_type = %policy.policy_type(), "Added compliance policy");
                self.policies.push(policy);
                if touches_blocklist {
                    self.rebuild_blocked_cache();
                }
            }
        }
    }

    pub fn remove_policy(&mut self, name: &str) -> Result<CompliancePolicy> {
        let index = self
            .policies
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| SentinelError::PolicyNotFound(name.to_string()))?;
        let removed = self.policies.remove(index);
        if removed.policy_type() == PolicyType::BlockedAddress {
            self.rebuild_blocked_cache();
        }
        info!(policy = %name, "Removed compliance policy");
        Ok(removed)
    }

    /// Flip the enabled flag, returning the new state.
    pub fn toggle_policy(&mut self, name: &str) -> Result<bool> {
        let policy = self
            .policies
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| SentinelError::PolicyNotFound(name.to_string()))?;
        policy.enabled = !policy.enabled;
        info!(policy = %name, enabled = policy.enabled, "Toggled compliance policy");
        Ok(policy.enabled)
    }

    /// Add to the built-in blocked list, re-creating that policy if it was removed.
    /// Blank input is rejected.
    pub fn add_blocked_address(&mut self, address: &str) -> Result<()> {
        let address = normalize_optional(Some(address))
            .ok_or_else(|| SentinelError::Configuration("blocked address must not be empty".to_string()))?;
        let mut policy = match self.get_policy(BLOCKED_ADDRESSES_POLICY) {
            Some(policy) => policy.clone(),
            None => blocked_addresses_policy(&[]),
        };
        let found = policy.policy_type();
        match &mut policy.rule {
            PolicyRule::BlockedAddress { addresses } => {
                if !addresses.contains(&address) {
                    addresses.push(address.clone());
                }
            }
            _ => {
                return Err(SentinelError::InvalidPolicy {
                    name: BLOCKED_ADDRESSES_POLICY.to_string(),
                    message: format!("expected a blocked_address policy, found {}", found),
                })
            }
        }
        self.add_policy(policy);
        warn!(%address, "Address blocked");
        Ok(())
    }

    /// Drop an address from every blocked-address policy. Returns whether anything changed.
    pub fn remove_blocked_address(&mut self, address: &str) -> bool {
        let address = normalize_address(address);
        let mut changed = false;
        for policy in &mut self.policies {
            if let PolicyRule::BlockedAddress { addresses } = &mut policy.rule {
                let before = addresses.len();
                addresses.retain(|a| a != &address);
                changed |= addresses.len() != before;
            }
        }
        if changed {
            self.rebuild_blocked_cache();
            info!(%address, "Address unblocked");
        }
        changed
    }

    pub fn is_blocked(&self, address: &str) -> bool {
        self.blocked_cache.contains(&normalize_address(address))
    }

    /// Sorted snapshot of the blocked-address cache
    pub fn blocked_addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.blocked_cache.iter().cloned().collect();
        addresses.sort();
        addresses
    }

    pub fn get_policy_stats(&self) -> PolicyStats {
        let mut by_severity: BTreeMap<Severity, usize> = Severity::ALL.into_iter().map(|s| (s, 0)).collect();
        let mut by_type: BTreeMap<PolicyType, usize> = PolicyType::ALL.into_iter().map(|t| (t, 0)).collect();
        for policy in &self.policies {
            *by_severity.entry(policy.severity).or_default() += 1;
            *by_type.entry(policy.policy_type()).or_default() += 1;
        }

        PolicyStats {
            total_policies: self.policies.len(),
            enabled_policies: self.policies.iter().filter(|p| p.enabled).count(),
            blocked_addresses_count: self.blocked_cache.len(),
            by_severity,
            by_type,
        }
    }

    fn rebuild_blocked_cache(&mut self) {
        self.blocked_cache = self
            .policies
            .iter()
            .filter_map(|p| match &p.rule {
                PolicyRule::BlockedAddress { addresses } => Some(addresses),
                _ => None,
            })
            .flatten()
            .filter_map(|a| normalize_optional(Some(a.as_str())))
            .collect();
        debug!(size = self.blocked_cache.len(), "Rebuilt blocked-address cache");
    }
}

fn blocked_addresses_policy(addresses: &[String]) -> CompliancePolicy {
    CompliancePolicy::new(
        BLOCKED_ADDRESSES_POLICY,
        PolicyRule::blocked_addresses(addresses),
        Severity::Critical,
        "Transactions involving blocked addresses",
    )
}

fn builtin_policies(config: &PolicyConfig) -> Vec<CompliancePolicy> {
    vec![
        CompliancePolicy::new(
            MAX_TRANSACTION_VALUE_POLICY,
            PolicyRule::TransactionValue { max_value: config.max_transaction_value },
            Severity::High,
            "Transaction value above the configured ceiling",
        ),
        CompliancePolicy::new(
            HIGH_GAS_POLICY,
            PolicyRule::GasLimit { max_gas: config.max_gas },
            Severity::Medium,
            "Gas usage above the configured ceiling",
        ),
        blocked_addresses_policy(&config.blocked_addresses),
        CompliancePolicy::new(
            SUSPICIOUS_CONTRACTS_POLICY,
            PolicyRule::ContractInteraction { contracts: config.suspicious_contracts.clone() },
            Severity::High,
            "Interaction with known suspicious contracts",
        ),
    ]
}
