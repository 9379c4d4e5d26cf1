//! Custom rule plugins
//!
//! A `custom` policy names a rule; the engine looks it up among the
//! registered [`CustomRule`]s and hands it the transaction context plus the
//! policy's remaining config keys.

use serde_json::{Map, Value};

use crate::core::address::normalize_address;
use crate::monitoring::TransactionPayload;

/// Transaction attributes visible to policies
#[derive(Debug, Clone, Copy)]
pub struct TransactionContext<'a> {
    pub sender: &'a str,
    pub receiver: Option<&'a str>,
    pub value: u64,
    pub gas_used: u64,
    pub payload: Option<&'a TransactionPayload>,
}

impl<'a> TransactionContext<'a> {
    pub fn function(&self) -> Option<&'a str> {
        self.payload.and_then(TransactionPayload::function)
    }

    pub fn normalized_sender(&self) -> String {
        normalize_address(self.sender)
    }

    pub fn normalized_receiver(&self) -> Option<String> {
        self.receiver.map(normalize_address)
    }
}

/// Result of evaluating a custom rule
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    Pass,
    Violation { message: String, details: Value },
}

impl RuleOutcome {
    pub fn violation(message: impl Into<String>, details: Value) -> Self {
        RuleOutcome::Violation { message: message.into(), details }
    }
}

/// Rule plugin trait
pub trait CustomRule: Send + Sync {
    /// Name referenced by a custom policy's `rule` key
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn evaluate(&self, context: &TransactionContext<'_>, params: &Map<String, Value>) -> RuleOutcome;
}

/// Flags transfers whose receiver is the sender.
///
/// Optional `min_value` param ignores transfers below that value.
pub struct SelfTransferRule;

impl CustomRule for SelfTransferRule {
    fn name(&self) -> &str {
        "self_transfer"
    }

    fn description(&self) -> &str {
        "Sender transfers to itself"
    }

    fn evaluate(&self, context: &TransactionContext<'_>, params: &Map<String, Value>) -> RuleOutcome {
        let min_value = params.get("min_value").and_then(Value::as_u64).unwrap_or(0);
        match context.normalized_receiver() {
            Some(receiver) if receiver == context.normalized_sender() && context.value >= min_value => {
                RuleOutcome::violation(
                    format!("Sender {} transfers {} to itself", context.sender, context.value),
                    serde_json::json!({ "address": receiver, "value": context.value }),
                )
            }
            _ => RuleOutcome::Pass,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context<'a>(sender: &'a str, receiver: Option<&'a str>, value: u64) -> TransactionContext<'a> {
        TransactionContext { sender, receiver, value, gas_used: 0, payload: None }
    }

    #[test]
    fn test_self_transfer_matches_normalized() {
        let outcome = SelfTransferRule.evaluate(&context("0xABC", Some("abc"), 5), &Map::new());
        assert!(matches!(outcome, RuleOutcome::Violation { .. }));
    }

    #[test]
    fn test_self_transfer_respects_min_value() {
        let params = json!({"min_value": 10});
        let params = params.as_object().unwrap();
        assert_eq!(SelfTransferRule.evaluate(&context("0xa", Some("0xa"), 5), params), RuleOutcome::Pass);
        assert_eq!(SelfTransferRule.evaluate(&context("0xa", Some("0xb"), 50), params), RuleOutcome::Pass);
        assert_eq!(SelfTransferRule.evaluate(&context("0xa", None, 50), params), RuleOutcome::Pass);
    }
}
