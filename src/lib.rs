//! chain-sentinel: continuous compliance and risk scoring for ledger-versioned
//! blockchain transaction streams.

pub mod alerting;
pub mod blockchain;
pub mod cli;
pub mod compliance;
pub mod core;
pub mod monitoring;
pub mod risk;
