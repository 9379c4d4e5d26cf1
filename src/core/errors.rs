//! Sentinel error types
//!
//! One error enum for the whole pipeline. Transport and parse failures are
//! recoverable inside the poll loop; configuration failures surface at the
//! API boundary.

use thiserror::Error;

/// Errors raised by the monitor, the policy engine and the ledger client.
#[derive(Debug, Error)]
pub enum SentinelError {
    /// Ledger node unreachable or the request could not be sent
    #[error("Transport error: {0}")]
    Transport(String),

    /// Ledger node answered with a non-2xx status
    #[error("RPC returned status {status}: {body}")]
    RpcStatus { status: u16, body: String },

    /// A raw transaction record could not be turned into an event
    #[error("Malformed transaction: {0}")]
    MalformedTransaction(String),

    /// Policy config does not match its declared type
    #[error("Invalid policy '{name}': {message}")]
    InvalidPolicy { name: String, message: String },

    #[error("Unknown policy type: {0}")]
    UnknownPolicyType(String),

    #[error("Policy not found: {0}")]
    PolicyNotFound(String),

    /// A required collaborator was never supplied
    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An alert sink refused or failed to deliver
    #[error("Alert delivery failed: {sink} - {message}")]
    Alert { sink: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Sentinel result type
pub type Result<T> = std::result::Result<T, SentinelError>;

impl SentinelError {
    /// Errors the poll loop swallows and retries on the next tick
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::RpcStatus { .. } | Self::MalformedTransaction(_)
        )
    }

    /// Errors that must be rejected synchronously at the API boundary
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidPolicy { .. }
                | Self::UnknownPolicyType(_)
                | Self::NotConfigured(_)
                | Self::Configuration(_)
        )
    }
}

impl From<reqwest::Error> for SentinelError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            SentinelError::RpcStatus { status: status.as_u16(), body: err.to_string() }
        } else {
            SentinelError::Transport(err.to_string())
        }
    }
}

impl From<toml::de::Error> for SentinelError {
    fn from(err: toml::de::Error) -> Self {
        SentinelError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SentinelError::Transport("connection refused".to_string());
        assert_eq!(err.to_string(), "Transport error: connection refused");

        let err = SentinelError::RpcStatus { status: 503, body: "unavailable".to_string() };
        assert_eq!(err.to_string(), "RPC returned status 503: unavailable");
    }

    #[test]
    fn test_error_is_recoverable() {
        assert!(SentinelError::Transport("x".into()).is_recoverable());
        assert!(SentinelError::MalformedTransaction("no hash".into()).is_recoverable());
        assert!(!SentinelError::NotConfigured("ledger client".into()).is_recoverable());
    }

    #[test]
    fn test_configuration_errors() {
        assert!(SentinelError::UnknownPolicyType("velocity".into()).is_configuration());
        assert!(SentinelError::InvalidPolicy {
            name: "max".into(),
            message: "missing max_value".into()
        }
        .is_configuration());
        assert!(!SentinelError::PolicyNotFound("x".into()).is_configuration());
    }

    #[test]
    fn test_from_serde_json() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: SentinelError = err.into();
        assert!(matches!(err, SentinelError::Serialization(_)));
    }
}
