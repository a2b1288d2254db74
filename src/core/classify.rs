//! Mapping of raw node/wallet/flow failures onto a closed taxonomy.
//!
//! Matching is done first on the structured [`EthernityError`] variant and then,
//! for free-form messages, on well-known substrings and JSON-RPC codes that
//! wallets and nodes emit. Anything unrecognized becomes [`TxErrorKind::Unknown`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::EthernityError;

/// EIP-1193 "user rejected request" provider error code.
const USER_REJECTED_CODE: i64 = 4001;

/// JSON-RPC "internal error" code.
const INTERNAL_ERROR_CODE: i64 = -32603;

/// Kind of a classified transaction failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxErrorKind {
    /// The user declined the signature request
    UserRejected,
    /// Token balance does not cover the required amount
    InsufficientToken,
    /// Native balance does not cover gas
    InsufficientGas,
    /// Allowance is lower than required after (or despite) an approval
    AllowanceStale,
    /// The node's dry run of the call reverted
    SimulationReverted,
    /// The transaction was mined with a failed status
    TransactionReverted,
    /// A node request timed out
    RpcTimeout,
    /// The receipt did not arrive inside the watch window
    ConfirmationTimeout,
    /// The node returned an internal error
    RpcInternalError,
    /// Wallet is on a different chain than the flow
    WrongNetwork,
    /// No active account, or the account changed mid-flow
    AccountUnavailable,
    /// Inputs rejected before any network call
    InvalidInput,
    /// Catch-all
    Unknown,
}

impl TxErrorKind {
    /// Remediation hint shown next to the error message.
    #[must_use]
    pub const fn hint(&self) -> &'static str {
        match self {
            Self::UserRejected => "The request was cancelled in the wallet. Start again to retry.",
            Self::InsufficientToken => "Add USDC to this account, or lower the amount.",
            Self::InsufficientGas => {
                "Add native currency (ETH) for gas fees, for example from a testnet faucet."
            }
            Self::AllowanceStale => {
                "The token allowance did not cover the amount. Approve again and retry."
            }
            Self::SimulationReverted => {
                "The contract rejected this call. Check the amount and the contract state."
            }
            Self::TransactionReverted => {
                "The transaction was mined but failed. Gas was spent; check the contract state before retrying."
            }
            Self::RpcTimeout => "The network node did not answer in time. Wait a moment and retry.",
            Self::ConfirmationTimeout => {
                "The transaction was sent but not yet confirmed. Check a block explorer before sending it again."
            }
            Self::RpcInternalError => {
                "The node reported an internal error, often caused by low gas balance or congestion. Retry shortly."
            }
            Self::WrongNetwork => "Switch the wallet to the supported network and retry.",
            Self::AccountUnavailable => "Connect a wallet account and retry.",
            Self::InvalidInput => "Enter a valid amount greater than zero.",
            Self::Unknown => "Something went wrong. Retry, and contact support if it persists.",
        }
    }

    /// Stable snake_case label for metrics and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UserRejected => "user_rejected",
            Self::InsufficientToken => "insufficient_token",
            Self::InsufficientGas => "insufficient_gas",
            Self::AllowanceStale => "allowance_stale",
            Self::SimulationReverted => "simulation_reverted",
            Self::TransactionReverted => "transaction_reverted",
            Self::RpcTimeout => "rpc_timeout",
            Self::ConfirmationTimeout => "confirmation_timeout",
            Self::RpcInternalError => "rpc_internal_error",
            Self::WrongNetwork => "wrong_network",
            Self::AccountUnavailable => "account_unavailable",
            Self::InvalidInput => "invalid_input",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TxErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure with its taxonomy kind, a display message and the original error.
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    kind: TxErrorKind,
    message: String,
    source: Option<Arc<EthernityError>>,
}

impl ClassifiedError {
    /// Build a classified error that has no underlying raw error
    /// (pre-flight verdicts such as an insufficient balance).
    pub fn new(kind: TxErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Build a classified error wrapping the raw error it came from.
    pub fn with_source(kind: TxErrorKind, message: impl Into<String>, source: EthernityError) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    #[must_use]
    pub fn kind(&self) -> TxErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn hint(&self) -> &'static str {
        self.kind.hint()
    }

    /// The raw error this verdict was derived from.
    #[must_use]
    pub fn raw(&self) -> Option<&EthernityError> {
        self.source.as_deref()
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl std::error::Error for ClassifiedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Classify a raw error. Already-classified errors pass through untouched.
#[must_use]
pub fn classify(err: EthernityError) -> ClassifiedError {
    let kind = match &err {
        EthernityError::Transaction(classified) => return classified.clone(),
        EthernityError::ConfirmationTimeout { .. } => TxErrorKind::ConfirmationTimeout,
        EthernityError::Reverted { .. } => TxErrorKind::TransactionReverted,
        EthernityError::Timeout { .. } => TxErrorKind::RpcTimeout,
        EthernityError::Validation { .. } => TxErrorKind::InvalidInput,
        EthernityError::Rpc { code, message } => classify_rpc(*code, message),
        EthernityError::Wallet { message, .. }
        | EthernityError::Network { message, .. }
        | EthernityError::Parse { message, .. }
        | EthernityError::Internal { message, .. } => classify_message(message),
        EthernityError::Config { .. }
        | EthernityError::FlowBusy { .. }
        | EthernityError::FlowDetached { .. } => TxErrorKind::Unknown,
    };

    let message = short_message(kind, &err);
    ClassifiedError::with_source(kind, message, err)
}

fn classify_rpc(code: Option<i64>, message: &str) -> TxErrorKind {
    match classify_message(message) {
        TxErrorKind::Unknown => match code {
            Some(USER_REJECTED_CODE) => TxErrorKind::UserRejected,
            Some(INTERNAL_ERROR_CODE) => TxErrorKind::RpcInternalError,
            _ => TxErrorKind::Unknown,
        },
        // A user rejection code always wins over whatever the text says
        _ if code == Some(USER_REJECTED_CODE) => TxErrorKind::UserRejected,
        kind => kind,
    }
}

/// Substring rules, most specific first.
fn classify_message(message: &str) -> TxErrorKind {
    let m = message.to_ascii_lowercase();

    if m.contains("user rejected") || m.contains("user denied") || m.contains("rejected the request")
    {
        TxErrorKind::UserRejected
    } else if m.contains("insufficient funds") {
        TxErrorKind::InsufficientGas
    } else if m.contains("insufficient allowance") || m.contains("exceeds allowance") {
        TxErrorKind::AllowanceStale
    } else if m.contains("exceeds balance") || m.contains("insufficient balance") {
        TxErrorKind::InsufficientToken
    } else if m.contains("execution reverted") || m.contains("revert") {
        TxErrorKind::SimulationReverted
    } else if m.contains("timeout") || m.contains("timed out") {
        TxErrorKind::RpcTimeout
    } else if m.contains("internal json-rpc error")
        || m.contains("underpriced")
        || m.contains("nonce too low")
    {
        TxErrorKind::RpcInternalError
    } else {
        TxErrorKind::Unknown
    }
}

fn short_message(kind: TxErrorKind, err: &EthernityError) -> String {
    match kind {
        TxErrorKind::UserRejected => "Transaction rejected by user".to_string(),
        TxErrorKind::InsufficientGas => "Insufficient ETH for gas fees".to_string(),
        TxErrorKind::ConfirmationTimeout | TxErrorKind::TransactionReverted => err.to_string(),
        TxErrorKind::RpcInternalError => format!("RPC error: {}", raw_text(err)),
        _ => raw_text(err),
    }
}

fn raw_text(err: &EthernityError) -> String {
    match err {
        EthernityError::Rpc { message, .. }
        | EthernityError::Wallet { message, .. }
        | EthernityError::Network { message, .. }
        | EthernityError::Validation { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;
    use std::time::Duration;

    #[test]
    fn test_user_rejection_by_text_and_code() {
        let by_text = classify(EthernityError::wallet(
            "User rejected the request.\n\nDetails: MetaMask Tx Signature: User denied transaction signature.",
        ));
        assert_eq!(by_text.kind(), TxErrorKind::UserRejected);

        let by_code = classify(EthernityError::rpc(Some(4001), "request failed"));
        assert_eq!(by_code.kind(), TxErrorKind::UserRejected);
        assert_eq!(by_code.message(), "Transaction rejected by user");
    }

    #[test]
    fn test_insufficient_funds_is_gas() {
        let c = classify(EthernityError::rpc(
            Some(-32000),
            "insufficient funds for gas * price + value",
        ));
        assert_eq!(c.kind(), TxErrorKind::InsufficientGas);
    }

    #[test]
    fn test_token_and_allowance_reverts() {
        let c = classify(EthernityError::rpc(
            Some(3),
            "execution reverted: ERC20: transfer amount exceeds balance",
        ));
        assert_eq!(c.kind(), TxErrorKind::InsufficientToken);

        let c = classify(EthernityError::rpc(
            Some(3),
            "execution reverted: ERC20: insufficient allowance",
        ));
        assert_eq!(c.kind(), TxErrorKind::AllowanceStale);

        let c = classify(EthernityError::rpc(Some(3), "execution reverted: Fund: too young"));
        assert_eq!(c.kind(), TxErrorKind::SimulationReverted);
    }

    #[test]
    fn test_internal_and_underpriced() {
        let c = classify(EthernityError::rpc(Some(-32603), "Internal JSON-RPC error."));
        assert_eq!(c.kind(), TxErrorKind::RpcInternalError);

        let c = classify(EthernityError::rpc(None, "replacement transaction underpriced"));
        assert_eq!(c.kind(), TxErrorKind::RpcInternalError);

        let c = classify(EthernityError::rpc(Some(-32603), "opaque"));
        assert_eq!(c.kind(), TxErrorKind::RpcInternalError);
    }

    #[test]
    fn test_timeouts_are_distinct() {
        let rpc = classify(EthernityError::timeout(Duration::from_secs(10), "eth_estimateGas"));
        assert_eq!(rpc.kind(), TxErrorKind::RpcTimeout);

        let confirm = classify(EthernityError::ConfirmationTimeout {
            tx_hash: B256::ZERO,
            waited: Duration::from_secs(120),
        });
        assert_eq!(confirm.kind(), TxErrorKind::ConfirmationTimeout);
        assert_ne!(confirm.kind(), TxErrorKind::SimulationReverted);
    }

    #[test]
    fn test_reverted_receipt() {
        let c = classify(EthernityError::Reverted {
            tx_hash: B256::repeat_byte(0xab),
            gas_used: 50_000,
        });
        assert_eq!(c.kind(), TxErrorKind::TransactionReverted);
    }

    #[test]
    fn test_unknown_keeps_source() {
        let c = classify(EthernityError::network_simple("connection reset by peer"));
        assert_eq!(c.kind(), TxErrorKind::Unknown);
        assert!(std::error::Error::source(&c).is_some());
        assert!(matches!(c.raw(), Some(EthernityError::Network { .. })));
        assert!(!c.hint().is_empty());
    }

    #[test]
    fn test_classified_passes_through() {
        let original = ClassifiedError::new(TxErrorKind::InsufficientToken, "Insufficient USDC balance");
        let again = classify(EthernityError::Transaction(original));
        assert_eq!(again.kind(), TxErrorKind::InsufficientToken);
        assert_eq!(again.message(), "Insufficient USDC balance");
        assert!(again.raw().is_none());
    }
}
