//! Error types for the Ethernity SDK.
//!
//! Raw failures coming back from the node, the wallet or the flow itself are
//! represented by [`EthernityError`]. Before any of them reaches a caller of
//! the orchestrator it is funneled through the classifier and surfaces as
//! [`EthernityError::Transaction`] carrying a [`ClassifiedError`].

use std::time::Duration;

use alloy_primitives::B256;
use thiserror::Error;

use super::classify::ClassifiedError;
use crate::orchestrator::Phase;

/// Main error type for the Ethernity SDK.
#[derive(Error, Debug)]
pub enum EthernityError {
    /// Network-related errors (typically retryable)
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// JSON-RPC error payload returned by the node
    #[error("RPC error{}: {message}", .code.map(|c| format!(" ({c})")).unwrap_or_default())]
    Rpc { code: Option<i64>, message: String },

    /// Signer/wallet errors, including user rejection
    #[error("Wallet error: {message}")]
    Wallet {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A bounded request did not complete in time
    #[error("Timeout: {operation} timed out after {duration:?}")]
    Timeout {
        duration: Duration,
        operation: String,
    },

    /// A broadcast transaction was not mined inside the watch window
    #[error("Transaction {tx_hash} not confirmed after {waited:?}")]
    ConfirmationTimeout { tx_hash: B256, waited: Duration },

    /// Transaction was mined but its status is failure
    #[error("Transaction {tx_hash} reverted on-chain")]
    Reverted { tx_hash: B256, gas_used: u64 },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Configuration errors
    #[error("Config error: {message}")]
    Config { message: String },

    /// Parsing/decoding errors
    #[error("Parse error: {message}")]
    Parse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// `execute_all` (or a single step) was called while a flow is running
    #[error("A flow is already in progress (phase: {phase})")]
    FlowBusy { phase: Phase },

    /// The flow was reset while suspended; its remaining steps were dropped
    #[error("Flow {flow_id} was detached by reset")]
    FlowDetached { flow_id: u64 },

    /// Classified transaction failure, ready for display
    #[error(transparent)]
    Transaction(ClassifiedError),

    /// Internal errors (bugs)
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl EthernityError {
    /// Check if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Timeout { .. } => true,
            Self::Rpc { code, .. } => matches!(code, Some(-32603) | Some(-32005) | Some(429)),
            _ => false,
        }
    }

    /// Get error category for metrics.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Network { .. } => "network",
            Self::Rpc { .. } => "rpc",
            Self::Wallet { .. } => "wallet",
            Self::Timeout { .. } => "timeout",
            Self::ConfirmationTimeout { .. } => "confirmation_timeout",
            Self::Reverted { .. } => "reverted",
            Self::Validation { .. } => "validation",
            Self::Config { .. } => "config",
            Self::Parse { .. } => "parse",
            Self::FlowBusy { .. } => "flow_busy",
            Self::FlowDetached { .. } => "flow_detached",
            Self::Transaction(_) => "transaction",
            Self::Internal { .. } => "internal",
        }
    }

    /// The classified verdict, if this error already went through the classifier.
    #[must_use]
    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            Self::Transaction(classified) => Some(classified),
            _ => None,
        }
    }
}

// Convenience constructors
impl EthernityError {
    /// Create a network error with source.
    pub fn network<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a network error without source.
    pub fn network_simple(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create an RPC error from a JSON-RPC error payload.
    pub fn rpc(code: Option<i64>, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
        }
    }

    /// Create a wallet error without source.
    pub fn wallet(message: impl Into<String>) -> Self {
        Self::Wallet {
            message: message.into(),
            source: None,
        }
    }

    /// Create a wallet error with source.
    pub fn wallet_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Wallet {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration: Duration, operation: impl Into<String>) -> Self {
        Self::Timeout {
            duration,
            operation: operation.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a validation error naming the offending field.
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            source: None,
        }
    }

    /// Create a parse error with source.
    pub fn parse_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Parse {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }
}

impl From<ClassifiedError> for EthernityError {
    fn from(err: ClassifiedError) -> Self {
        Self::Transaction(err)
    }
}

// Manual Clone implementation since Box<dyn Error> doesn't implement Clone
impl Clone for EthernityError {
    fn clone(&self) -> Self {
        match self {
            Self::Network { message, .. } => Self::Network {
                message: message.clone(),
                source: None,
            },
            Self::Rpc { code, message } => Self::Rpc {
                code: *code,
                message: message.clone(),
            },
            Self::Wallet { message, .. } => Self::Wallet {
                message: message.clone(),
                source: None,
            },
            Self::Timeout {
                duration,
                operation,
            } => Self::Timeout {
                duration: *duration,
                operation: operation.clone(),
            },
            Self::ConfirmationTimeout { tx_hash, waited } => Self::ConfirmationTimeout {
                tx_hash: *tx_hash,
                waited: *waited,
            },
            Self::Reverted { tx_hash, gas_used } => Self::Reverted {
                tx_hash: *tx_hash,
                gas_used: *gas_used,
            },
            Self::Validation { message, field } => Self::Validation {
                message: message.clone(),
                field: field.clone(),
            },
            Self::Config { message } => Self::Config {
                message: message.clone(),
            },
            Self::Parse { message, .. } => Self::Parse {
                message: message.clone(),
                source: None,
            },
            Self::FlowBusy { phase } => Self::FlowBusy { phase: *phase },
            Self::FlowDetached { flow_id } => Self::FlowDetached { flow_id: *flow_id },
            Self::Transaction(classified) => Self::Transaction(classified.clone()),
            Self::Internal { message, .. } => Self::Internal {
                message: message.clone(),
                source: None,
            },
        }
    }
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, EthernityError>;

/// Alias for backward compatibility.
pub type Error = EthernityError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_display_includes_code() {
        let err = EthernityError::rpc(Some(-32603), "Internal JSON-RPC error");
        assert_eq!(err.to_string(), "RPC error (-32603): Internal JSON-RPC error");

        let err = EthernityError::rpc(None, "boom");
        assert_eq!(err.to_string(), "RPC error: boom");
    }

    #[test]
    fn test_retryable() {
        assert!(EthernityError::network_simple("reset").is_retryable());
        assert!(EthernityError::timeout(Duration::from_secs(1), "eth_call").is_retryable());
        assert!(!EthernityError::wallet("User rejected the request").is_retryable());
        assert!(!EthernityError::Reverted {
            tx_hash: B256::ZERO,
            gas_used: 21_000
        }
        .is_retryable());
    }

    #[test]
    fn test_clone_drops_source_keeps_message() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "socket closed");
        let err = EthernityError::network("send failed", io);
        let cloned = err.clone();
        assert_eq!(cloned.to_string(), "Network error: send failed");
        assert!(std::error::Error::source(&cloned).is_none());
        assert!(std::error::Error::source(&err).is_some());
    }
}
