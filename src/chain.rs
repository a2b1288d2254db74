//! Capabilities the orchestrator consumes from the outside world.
//!
//! Each trait is narrow and object-safe so the orchestrator can hold
//! `Arc<dyn Trait>` and tests can swap in in-memory fakes. The live
//! implementations live in [`crate::rpc`].

use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;

use crate::core::Result;
use crate::types::{CallRequest, Receipt};

/// Connected wallet: the active account and the chain it is on.
///
/// Both values may change or disappear at any time; the orchestrator
/// re-reads them before every submission.
pub trait WalletSession: Send + Sync {
    /// Currently selected account, `None` when disconnected.
    fn active_account(&self) -> Option<Address>;

    /// Chain the wallet is connected to.
    fn chain_id(&self) -> Option<u64>;
}

/// Read-only view of balances and allowances.
#[async_trait]
pub trait BalanceReader: Send + Sync {
    /// ERC-20 `balanceOf(owner)` on `token`.
    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256>;

    /// Native-currency balance of `owner`.
    async fn native_balance(&self, owner: Address) -> Result<U256>;

    /// ERC-20 `allowance(owner, spender)` on `token`.
    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256>;
}

/// Gas estimation and pricing from the node.
#[async_trait]
pub trait GasOracle: Send + Sync {
    /// Simulate `call` and return the gas it would use.
    async fn estimate_gas(&self, call: &CallRequest) -> Result<u64>;

    /// Current gas price in wei.
    async fn gas_price(&self) -> Result<u128>;
}

/// Requests a signature for a call and broadcasts it.
#[async_trait]
pub trait TxSubmitter: Send + Sync {
    /// Returns the transaction hash once the node accepted the transaction.
    async fn sign_and_broadcast(&self, call: &CallRequest) -> Result<B256>;
}

/// Single receipt lookup; `None` while the transaction is not mined.
#[async_trait]
pub trait ReceiptSource: Send + Sync {
    async fn fetch_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>>;
}

/// Waits for a transaction to be mined.
#[async_trait]
pub trait ReceiptWatcher: Send + Sync {
    /// Resolve with the receipt, or fail with
    /// [`EthernityError::ConfirmationTimeout`](crate::core::EthernityError::ConfirmationTimeout)
    /// once `timeout` elapsed.
    async fn wait_for_receipt(&self, tx_hash: B256, timeout: Duration) -> Result<Receipt>;
}

#[async_trait]
impl<T: ReceiptSource + ?Sized> ReceiptSource for std::sync::Arc<T> {
    async fn fetch_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>> {
        (**self).fetch_receipt(tx_hash).await
    }
}
