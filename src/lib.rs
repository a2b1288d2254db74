//! # Ethernity SDK
//!
//! Approval-gated ERC-20 transaction orchestration for the Ethernity
//! retirement fund contracts.
//!
//! Every fund operation follows the same shape: make sure the account holds
//! enough USDC and gas, grant the target contract an allowance if the current
//! one does not cover the amount, then submit the target call and wait for
//! its receipt. [`TransactionOrchestrator`] drives that sequence as an
//! observable state machine.
//!
//! ## Features
//!
//! - **Pre-flight checks** - token balance, native gas balance and allowance read concurrently
//! - **Approval gating** - approvals only when the allowance is short, re-read after mining
//! - **Gas handling** - buffered node estimates with a static ceiling fallback
//! - **Error classification** - every failure maps to one [`TxErrorKind`] with a hint
//! - **Live adapters** - alloy HTTP provider with a local signer (feature `rpc`)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ethernity_sdk::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = RpcConfig::for_chain(ARBITRUM_SEPOLIA_CHAIN_ID)
//!         .with_private_key(std::env::var(PRIVATE_KEY_ENV).unwrap_or_default());
//!     let chain = Arc::new(AlloyChain::connect(config).await?);
//!
//!     let deposit = FundDeposit::extra(fund, TokenAmount::parse_usdc("25")?);
//!     let orchestrator = TransactionOrchestrator::new(
//!         deposit,
//!         NetworkContext::for_chain(ARBITRUM_SEPOLIA_CHAIN_ID)?,
//!         AlloyChain::capabilities(chain),
//!         OrchestratorConfig::default(),
//!     );
//!     let outcome = orchestrator.execute_all().await?;
//!     println!("deposit mined in {}", outcome.target_hash);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`core`] - Errors, failure classification and network configuration
//! - [`amount`] - Token amounts and the protocol fee split
//! - [`abi`] - Calldata encoding for ERC-20 and fund calls
//! - [`types`] - Calls, receipts, validation results and warnings
//! - [`chain`] - Capability traits for wallet, node and receipts
//! - [`verify`], [`allowance`], [`gas`], [`tx`] - The individual flow steps
//! - [`actions`] - Fund creation, deposits and generic contract calls
//! - [`orchestrator`] - The approval-gated state machine
//! - [`rpc`] - Live adapters (feature `rpc`)

#![cfg_attr(docsrs, feature(doc_cfg))]

// Core infrastructure
pub mod core;

// Domain values and encoding
pub mod abi;
pub mod amount;
pub mod types;

// Capabilities and flow steps
pub mod allowance;
pub mod chain;
pub mod gas;
pub mod tx;
pub mod verify;

// Actions and the state machine
pub mod actions;
pub mod orchestrator;

// Live adapters
#[cfg(feature = "rpc")]
#[cfg_attr(docsrs, doc(cfg(feature = "rpc")))]
pub mod rpc;

// Prelude for convenient imports
pub mod prelude;

// ============================================================================
// Core Re-exports
// ============================================================================

pub use crate::core::{
    classify, ClassifiedError, Error, EthernityError, NetworkContext, Result, TxErrorKind,
    ARBITRUM_SEPOLIA_CHAIN_ID, DEFAULT_CHAIN_ID, USDC_DECIMALS,
};

// ============================================================================
// Type Re-exports
// ============================================================================

pub use amount::{FeeSplit, TokenAmount};
pub use types::{
    Artifact, ArtifactExtraction, CallRequest, FlowWarning, PendingTransaction, Receipt,
    TransactionIntent, Validation,
};

// ============================================================================
// Flow Re-exports
// ============================================================================

pub use actions::{
    ContractCall, CreateFund, DepositKind, FundDeposit, RetirementPlan, TargetAction,
};
pub use allowance::{ApprovalAmount, ApprovalDecision};
pub use chain::{BalanceReader, GasOracle, ReceiptSource, ReceiptWatcher, TxSubmitter, WalletSession};
pub use orchestrator::{
    Capabilities, FlowObserver, FlowOutcome, FlowSnapshot, OrchestratorConfig, Phase,
    TransactionOrchestrator,
};
pub use tx::PollingReceiptWatcher;

// ============================================================================
// RPC Re-exports
// ============================================================================

#[cfg(feature = "rpc")]
pub use rpc::{AlloyChain, RpcConfig, PRIVATE_KEY_ENV};
