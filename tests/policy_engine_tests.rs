//! tests/policy_engine_tests.rs
//!
//! Policy evaluation semantics, registry management and the blocked-address cache.

use std::sync::Arc;

use chain_sentinel::compliance::engine::{
    BLOCKED_ADDRESSES_POLICY, HIGH_GAS_POLICY, MAX_TRANSACTION_VALUE_POLICY, SUSPICIOUS_CONTRACTS_POLICY,
};
use chain_sentinel::compliance::{
    CompliancePolicy, CustomRule, PolicyEngine, PolicyRecord, PolicyRule, PolicyType, RuleOutcome,
    TransactionContext,
};
use chain_sentinel::core::config::PolicyConfig;
use chain_sentinel::core::{SentinelError, Severity};
use chain_sentinel::monitoring::TransactionPayload;
use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};

fn blocked(name: &str, addresses: &[&str]) -> CompliancePolicy {
    CompliancePolicy::new(name, PolicyRule::blocked_addresses(addresses.iter().copied()), Severity::Critical, "")
}

#[test]
fn test_value_ceiling_is_exclusive() {
    let engine = PolicyEngine::new();
    let max = 1_000_000_000_000;

    assert!(engine.check_transaction("0x1", None, max, 0, None).passed);

    let result = engine.check_transaction("0x1", None, max + 1, 0, None);
    assert!(!result.passed);
    assert_eq!(result.violations.len(), 1);
    assert_eq!(result.violations[0].policy_name, MAX_TRANSACTION_VALUE_POLICY);
    assert_eq!(result.violations[0].severity, Severity::High);
    assert_eq!(result.violations[0].details, json!({"value": max + 1, "max_value": max}));
}

#[test]
fn test_gas_ceiling() {
    let engine = PolicyEngine::new();
    assert!(engine.check_transaction("0x1", None, 0, 100_000, None).passed);
    let result = engine.check_transaction("0x1", None, 0, 100_001, None);
    assert_eq!(result.violations[0].policy_name, HIGH_GAS_POLICY);
    assert_eq!(result.violations[0].message, "Gas usage 100001 exceeds threshold 100000");
}

#[test]
fn test_blocked_sender_wins_over_receiver() {
    let mut engine = PolicyEngine::new();
    engine.add_blocked_address("0xBAD1").unwrap();
    engine.add_blocked_address("bad2").unwrap();

    let result = engine.check_transaction("0xbad1", Some("0xBAD2"), 0, 0, None);
    assert_eq!(result.violations.len(), 1);
    assert_eq!(result.violations[0].details["role"], "sender");
    assert_eq!(result.violations[0].details["blocked_address"], "0xbad1");

    let result = engine.check_transaction("0xfine", Some("0xBAD2"), 0, 0, None);
    assert_eq!(result.violations.len(), 1);
    assert_eq!(result.violations[0].details["role"], "receiver");
    assert_eq!(result.violations[0].severity, Severity::Critical);
}

#[test]
fn test_blocked_cache_equals_union_after_removal() {
    let mut engine = PolicyEngine::empty();
    engine.add_policy(blocked("list_a", &["0xaa", "0xshared"]));
    engine.add_policy(blocked("list_b", &["0xbb", "0xSHARED"]));
    assert_eq!(engine.blocked_addresses(), vec!["0xaa", "0xbb", "0xshared"]);

    engine.remove_policy("list_a").unwrap();
    assert_eq!(engine.blocked_addresses(), vec!["0xbb", "0xshared"]);
    assert!(engine.is_blocked("0xShared"));
    assert!(!engine.is_blocked("0xaa"));

    // upsert replaces the list rather than merging
    engine.add_policy(blocked("list_b", &["0xcc"]));
    assert_eq!(engine.blocked_addresses(), vec!["0xcc"]);
}

#[test]
fn test_remove_blocked_address_from_every_list() {
    let mut engine = PolicyEngine::new();
    engine.add_policy(blocked("partner_list", &["0xdead"]));
    engine.add_blocked_address("0xDEAD").unwrap();

    assert!(engine.remove_blocked_address("dead"));
    assert!(!engine.is_blocked("0xdead"));
    assert!(!engine.remove_blocked_address("0xdead"));
}

#[test]
fn test_add_blocked_address_recreates_builtin() {
    let mut engine = PolicyEngine::new();
    engine.remove_policy(BLOCKED_ADDRESSES_POLICY).unwrap();
    assert!(engine.get_policy(BLOCKED_ADDRESSES_POLICY).is_none());

    engine.add_blocked_address("0xbad").unwrap();
    let policy = engine.get_policy(BLOCKED_ADDRESSES_POLICY).unwrap();
    assert_eq!(policy.rule, PolicyRule::BlockedAddress { addresses: vec!["0xbad".to_string()] });
    assert_eq!(policy.severity, Severity::Critical);
    assert_eq!(engine.list_policies().last().map(|p| p.name.as_str()), Some(BLOCKED_ADDRESSES_POLICY));
}

#[test]
fn test_blank_blocked_address_is_rejected() {
    let mut engine = PolicyEngine::new();
    for blank in ["", "   ", " 0x "] {
        let err = engine.add_blocked_address(blank).unwrap_err();
        assert!(err.is_configuration());
    }
    assert!(engine.blocked_addresses().is_empty());
    // a record without a sender must not match a bare prefix
    assert!(engine.check_transaction("", None, 0, 0, None).passed);
}

#[test]
fn test_blocked_list_skips_blank_entries() {
    assert_eq!(
        PolicyRule::blocked_addresses(["", "0xA", " ", "0x"]),
        PolicyRule::BlockedAddress { addresses: vec!["0xa".to_string()] }
    );

    let config = PolicyConfig { blocked_addresses: vec!["".to_string(), "0xBAD".to_string()], ..PolicyConfig::default() };
    let engine = PolicyEngine::from_config(&config).unwrap();
    assert_eq!(engine.blocked_addresses(), vec!["0xbad".to_string()]);
}

#[test]
fn test_contract_interaction_substring_first_match() {
    let config = PolicyConfig {
        suspicious_contracts: vec!["0xEVIL::".to_string(), "drain".to_string()],
        ..PolicyConfig::default()
    };
    let engine = PolicyEngine::from_config(&config).unwrap();
    let payload = TransactionPayload::with_function("0xevil::vault::drain_all");

    let result = engine.check_transaction("0x1", None, 0, 0, Some(&payload));
    assert_eq!(result.violations.len(), 1);
    assert_eq!(result.violations[0].policy_name, SUSPICIOUS_CONTRACTS_POLICY);
    assert_eq!(result.violations[0].details["contract"], "0xEVIL::");

    assert!(engine.check_transaction("0x1", None, 0, 0, None).passed);
    let benign = TransactionPayload::with_function("0x1::coin::transfer");
    assert!(engine.check_transaction("0x1", None, 0, 0, Some(&benign)).passed);
}

#[test]
fn test_function_call_policy_matches_exactly() {
    let mut engine = PolicyEngine::empty();
    engine.add_policy(CompliancePolicy::new(
        "no_swaps",
        PolicyRule::FunctionCall { functions: vec!["0xDEX::router::swap".to_string()] },
        Severity::High,
        "",
    ));

    let exact = TransactionPayload::with_function("0xdex::router::swap");
    let longer = TransactionPayload::with_function("0xdex::router::swap_exact");
    assert!(!engine.check_transaction("0x1", None, 0, 0, Some(&exact)).passed);
    assert!(engine.check_transaction("0x1", None, 0, 0, Some(&longer)).passed);
}

#[test]
fn test_violations_follow_registration_order() {
    let mut engine = PolicyEngine::new();
    engine.add_blocked_address("0xbad").unwrap();
    let result = engine.check_transaction("0xbad", None, u64::MAX, u64::MAX, None);

    let names: Vec<&str> = result.violations.iter().map(|v| v.policy_name.as_str()).collect();
    assert_eq!(names, vec![MAX_TRANSACTION_VALUE_POLICY, HIGH_GAS_POLICY, BLOCKED_ADDRESSES_POLICY]);
    assert_eq!(result.max_severity(), Some(Severity::Critical));
}

#[test]
fn test_disabled_policies_are_not_checked() {
    let mut engine = PolicyEngine::new();
    assert!(!engine.toggle_policy(HIGH_GAS_POLICY).unwrap());

    let result = engine.check_transaction("0x1", None, 0, u64::MAX, None);
    assert!(result.passed);
    assert_eq!(result.policies_checked, 3);
}

struct LargeTransferRule;

impl CustomRule for LargeTransferRule {
    fn name(&self) -> &str {
        "large_transfer"
    }

    fn evaluate(&self, context: &TransactionContext<'_>, params: &Map<String, Value>) -> RuleOutcome {
        let limit = params.get("limit").and_then(Value::as_u64).unwrap_or(u64::MAX);
        if context.value > limit {
            RuleOutcome::violation(format!("{} above {}", context.value, limit), json!({"limit": limit}))
        } else {
            RuleOutcome::Pass
        }
    }
}

#[test]
fn test_custom_rules_dispatch_by_name() {
    let mut engine = PolicyEngine::empty();
    let record = PolicyRecord {
        name: "whale_watch".into(),
        policy_type: "custom".into(),
        severity: Severity::Medium,
        description: String::new(),
        enabled: true,
        config: json!({"rule": "large_transfer", "limit": 1000}),
    };
    engine.add_policy(CompliancePolicy::try_from(record).unwrap());

    // not registered yet: never fires
    assert!(engine.check_transaction("0x1", None, 5000, 0, None).passed);

    engine.register_custom_rule(Arc::new(LargeTransferRule));
    let result = engine.check_transaction("0x1", None, 5000, 0, None);
    assert_eq!(result.violations.len(), 1);
    assert_eq!(result.violations[0].policy_type, PolicyType::Custom);
    assert_eq!(result.violations[0].message, "5000 above 1000");
    assert!(engine.check_transaction("0x1", None, 1000, 0, None).passed);
}

#[test]
fn test_builtin_self_transfer_rule() {
    let mut engine = PolicyEngine::empty();
    engine.add_policy(CompliancePolicy::new(
        "self_transfers",
        PolicyRule::Custom { rule: "self_transfer".into(), params: Map::new() },
        Severity::Low,
        "",
    ));
    assert!(!engine.check_transaction("0xA", Some("a"), 1, 0, None).passed);
    assert!(engine.check_transaction("0xa", Some("0xb"), 1, 0, None).passed);
}

#[test]
fn test_policy_stats_include_zero_counts() {
    let mut engine = PolicyEngine::new();
    engine.add_blocked_address("0x1").unwrap();
    engine.toggle_policy(SUSPICIOUS_CONTRACTS_POLICY).unwrap();
    let stats = engine.get_policy_stats();

    assert_eq!(stats.total_policies, 4);
    assert_eq!(stats.enabled_policies, 3);
    assert_eq!(stats.blocked_addresses_count, 1);
    assert_eq!(stats.by_severity.len(), 5);
    assert_eq!(stats.by_severity[&Severity::High], 2);
    assert_eq!(stats.by_severity[&Severity::Info], 0);
    assert_eq!(stats.by_type.len(), 6);
    assert_eq!(stats.by_type[&PolicyType::FunctionCall], 0);
    assert_eq!(stats.by_type[&PolicyType::GasLimit], 1);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["by_type"]["blocked_address"], 1);
    assert_eq!(json["by_severity"]["critical"], 1);
}

#[test]
fn test_remove_unknown_policy() {
    let mut engine = PolicyEngine::new();
    assert!(matches!(engine.remove_policy("ghost"), Err(SentinelError::PolicyNotFound(n)) if n == "ghost"));
}

#[test]
fn test_from_config_applies_thresholds_and_extra_records() {
    let config = PolicyConfig {
        max_transaction_value: 10,
        max_gas: 20,
        blocked_addresses: vec!["0xABC".into()],
        suspicious_contracts: vec![],
        extra: vec![PolicyRecord {
            name: "no_swaps".into(),
            policy_type: "function_call".into(),
            severity: Severity::High,
            description: "swaps disabled".into(),
            enabled: false,
            config: json!({"functions": ["0xdex::router::swap"]}),
        }],
    };
    let engine = PolicyEngine::from_config(&config).unwrap();

    assert_eq!(engine.list_policies().len(), 5);
    assert!(engine.is_blocked("abc"));
    assert!(!engine.get_policy("no_swaps").unwrap().enabled);
    assert_eq!(engine.check_transaction("0x1", None, 11, 21, None).violations.len(), 2);
}

#[test]
fn test_from_config_rejects_unknown_policy_type() {
    let config = PolicyConfig {
        extra: vec![PolicyRecord {
            name: "rate".into(),
            policy_type: "rate_limit".into(),
            severity: Severity::Low,
            description: String::new(),
            enabled: true,
            config: json!({}),
        }],
        ..PolicyConfig::default()
    };
    let err = PolicyEngine::from_config(&config).err().unwrap();
    assert!(matches!(err, SentinelError::UnknownPolicyType(_)));
    assert!(err.is_configuration());
}
