//! Compliance policies and their evaluation.

pub mod engine;
pub mod plugins;
pub mod policy;

pub use engine::{PolicyEngine, PolicyStats};
pub use plugins::{CustomRule, RuleOutcome, SelfTransferRule, TransactionContext};
pub use policy::{
    CompliancePolicy, ComplianceResult, PolicyRecord, PolicyRule, PolicyType, PolicyViolation,
};
