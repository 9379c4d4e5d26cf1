pub mod address;
pub mod config;
pub mod errors;
pub mod severity;

pub use address::normalize_address;
pub use config::SentinelConfig;
pub use errors::{Result, SentinelError};
pub use severity::Severity;
