//! Commonly used types for quick imports.
//!
//! # Example
//!
//! ```rust,ignore
//! use ethernity_sdk::prelude::*;
//!
//! let plan = RetirementPlan { /* ... */ };
//! let orchestrator = TransactionOrchestrator::new(
//!     CreateFund::new(plan),
//!     NetworkContext::for_chain(ARBITRUM_SEPOLIA_CHAIN_ID)?,
//!     capabilities,
//!     OrchestratorConfig::default(),
//! );
//! ```

pub use std::sync::Arc;

pub use alloy_primitives::{Address, B256, U256};

// Core
pub use crate::core::{
    ClassifiedError, Error, EthernityError, NetworkContext, Result, TxErrorKind,
    ARBITRUM_SEPOLIA_CHAIN_ID,
};

// Values
pub use crate::amount::{FeeSplit, TokenAmount};
pub use crate::types::{Artifact, FlowWarning, Receipt, Validation};

// Actions
pub use crate::actions::{ContractCall, CreateFund, DepositKind, FundDeposit, RetirementPlan};

// Orchestration
pub use crate::allowance::ApprovalAmount;
pub use crate::orchestrator::{
    Capabilities, FlowObserver, FlowOutcome, FlowSnapshot, OrchestratorConfig, Phase,
    TransactionOrchestrator,
};

// Live adapters (if enabled)
#[cfg(feature = "rpc")]
pub use crate::rpc::{AlloyChain, RpcConfig, PRIVATE_KEY_ENV};
