//! Value types exchanged between the orchestrator and its capabilities.

use std::time::SystemTime;

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::abi;

/// A fully-formed call, as handed to the gas oracle and the signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    /// Sender; `None` lets the signer fill it in
    pub from: Option<Address>,
    /// Contract being called
    pub to: Address,
    /// ABI-encoded calldata
    pub data: Bytes,
    /// Native value attached
    pub value: U256,
    /// Gas limit; `None` until the estimator ran
    pub gas_limit: Option<u64>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

impl CallRequest {
    #[must_use]
    pub fn new(to: Address, data: Bytes) -> Self {
        Self {
            from: None,
            to,
            data,
            value: U256::ZERO,
            gas_limit: None,
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
        }
    }

    #[must_use]
    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    #[must_use]
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    #[must_use]
    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    /// Apply a fee suggestion (EIP-1559 style).
    #[must_use]
    pub fn with_fees(mut self, fees: FeeSuggestion) -> Self {
        self.max_fee_per_gas = Some(fees.max_fee_per_gas);
        self.max_priority_fee_per_gas = Some(fees.max_priority_fee_per_gas);
        self
    }

    /// Function selector, if the calldata has one.
    #[must_use]
    pub fn selector(&self) -> Option<[u8; 4]> {
        self.data.get(..4).and_then(|s| s.try_into().ok())
    }
}

/// EIP-1559 fee caps suggested from the node's gas price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSuggestion {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// What a transaction intent is for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IntentKind {
    /// `approve(spender, amount)` on `token`
    Approval {
        token: Address,
        spender: Address,
        amount: U256,
    },
    /// The approval-gated target call
    Target { label: String },
}

/// Immutable description of one call to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionIntent {
    kind: IntentKind,
    call: CallRequest,
}

impl TransactionIntent {
    /// Intent to grant `spender` an allowance of `amount` on `token`.
    #[must_use]
    pub fn approval(token: Address, spender: Address, amount: U256) -> Self {
        Self {
            kind: IntentKind::Approval {
                token,
                spender,
                amount,
            },
            call: CallRequest::new(token, abi::encode_erc20_approve(spender, amount)),
        }
    }

    /// Intent for the target call of a flow.
    #[must_use]
    pub fn target(label: impl Into<String>, call: CallRequest) -> Self {
        Self {
            kind: IntentKind::Target {
                label: label.into(),
            },
            call,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &IntentKind {
        &self.kind
    }

    #[must_use]
    pub fn call(&self) -> &CallRequest {
        &self.call
    }

    #[must_use]
    pub fn is_approval(&self) -> bool {
        matches!(self.kind, IntentKind::Approval { .. })
    }

    /// Same intent with the gas and fee fields filled in.
    #[must_use]
    pub fn finalized(mut self, from: Address, gas_limit: u64, fees: Option<FeeSuggestion>) -> Self {
        let mut call = self.call.with_from(from).with_gas_limit(gas_limit);
        if let Some(fees) = fees {
            call = call.with_fees(fees);
        }
        self.call = call;
        self
    }
}

/// An intent that has been broadcast and is waiting for inclusion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub intent: TransactionIntent,
    pub hash: B256,
    pub submitted_at: SystemTime,
}

/// One event log emitted by a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// Terminal on-chain outcome of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub tx_hash: B256,
    /// `true` when the transaction executed without reverting
    pub success: bool,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    pub logs: Vec<LogEntry>,
}

/// Data a successful target call produced that the caller needs next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Artifact {
    /// Address of a contract created by the call
    ContractAddress(Address),
}

/// Result of looking for an [`Artifact`] in a receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactExtraction {
    /// The action does not produce an artifact
    NotExpected,
    Found(Artifact),
    /// An artifact was expected but the logs did not have the expected shape
    Unparsed { reason: String },
}

impl ArtifactExtraction {
    #[must_use]
    pub fn artifact(&self) -> Option<Artifact> {
        match self {
            Self::Found(artifact) => Some(*artifact),
            _ => None,
        }
    }
}

/// Pre-flight verdict on balances and allowance.
///
/// A balance that could not be read is `None` and counts as insufficient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    pub has_enough_token: bool,
    pub has_enough_gas: bool,
    pub has_enough_allowance: bool,
    pub token_balance: Option<U256>,
    pub native_balance: Option<U256>,
    pub allowance: Option<U256>,
    pub required: U256,
    /// Token amount still missing (`required` when the balance is unknown)
    pub shortfall: U256,
}

impl Validation {
    /// Token and gas both covered. Allowance is not part of this: it is the gate's call.
    #[must_use]
    pub fn can_proceed(&self) -> bool {
        self.has_enough_token && self.has_enough_gas
    }
}

/// Recoverable condition reported alongside a successful flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FlowWarning {
    /// Gas estimation failed; the static ceiling was used
    GasEstimateFallback { gas_limit: u64, reason: String },
    /// Fee suggestion was unavailable; the signer picks fees
    FeeSuggestionUnavailable { reason: String },
    /// The call succeeded on-chain but its artifact could not be parsed
    ArtifactUnparsed { tx_hash: B256, reason: String },
}

impl std::fmt::Display for FlowWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GasEstimateFallback { gas_limit, reason } => {
                write!(f, "Gas estimation failed ({reason}); using {gas_limit} gas")
            }
            Self::FeeSuggestionUnavailable { reason } => {
                write!(f, "No fee suggestion ({reason}); the wallet will choose fees")
            }
            Self::ArtifactUnparsed { tx_hash, reason } => write!(
                f,
                "Transaction {tx_hash} succeeded on-chain but its result could not be parsed: {reason}"
            ),
        }
    }
}
