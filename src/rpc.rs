//! Live chain access through an alloy HTTP provider and a local signer.
//!
//! [`AlloyChain`] implements every capability trait in [`crate::chain`]
//! except [`ReceiptWatcher`](crate::chain::ReceiptWatcher); pair it with a
//! [`PollingReceiptWatcher`] through [`AlloyChain::capabilities`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use ethernity_sdk::rpc::{AlloyChain, RpcConfig};
//!
//! let config = RpcConfig::for_chain(ARBITRUM_SEPOLIA_CHAIN_ID)
//!     .with_private_key(std::env::var(PRIVATE_KEY_ENV)?);
//! let chain = Arc::new(AlloyChain::connect(config).await?);
//! let capabilities = AlloyChain::capabilities(chain);
//! ```

use std::fmt;
use std::future::{Future, IntoFuture};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use alloy_network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::{TransactionReceipt, TransactionRequest};
use alloy_signer_local::PrivateKeySigner;
use alloy_transport::TransportError;
use async_trait::async_trait;
use governor::{Quota, RateLimiter as GovRateLimiter};
use tracing::{debug, info, instrument};

use crate::abi::{decode_uint256, encode_erc20_allowance_query, encode_erc20_balance_of};
use crate::chain::{BalanceReader, GasOracle, ReceiptSource, TxSubmitter, WalletSession};
use crate::core::{rpc_url, EthernityError, Result, DEFAULT_CHAIN_ID};
use crate::orchestrator::Capabilities;
use crate::tx::{PollingReceiptWatcher, DEFAULT_POLL_INTERVAL};
use crate::types::{CallRequest, LogEntry, Receipt};

type RateLimiter = GovRateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Environment variable conventionally holding the signer key.
pub const PRIVATE_KEY_ENV: &str = "ETHERNITY_PRIVATE_KEY";

// ============================================================================
// Configuration
// ============================================================================

/// Live node configuration
#[derive(Clone)]
pub struct RpcConfig {
    /// JSON-RPC endpoint
    pub url: String,
    /// Chain the signer operates on
    pub chain_id: u64,
    /// Per-request timeout
    pub timeout: Duration,
    /// Requests per second sent to the node
    pub rate_limit_per_second: u32,
    /// Receipt polling interval
    pub poll_interval: Duration,
    /// Hex-encoded secp256k1 key
    pub private_key: Option<String>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self::for_chain(DEFAULT_CHAIN_ID)
    }
}

impl fmt::Debug for RpcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcConfig")
            .field("url", &self.url)
            .field("chain_id", &self.chain_id)
            .field("timeout", &self.timeout)
            .field("rate_limit_per_second", &self.rate_limit_per_second)
            .field("poll_interval", &self.poll_interval)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RpcConfig {
    /// Configuration for `chain_id`, with the endpoint taken from
    /// [`rpc_url`] (environment override, then public default).
    #[must_use]
    pub fn for_chain(chain_id: u64) -> Self {
        Self {
            url: rpc_url(chain_id),
            chain_id,
            timeout: Duration::from_secs(30),
            rate_limit_per_second: 10,
            poll_interval: DEFAULT_POLL_INTERVAL,
            private_key: None,
        }
    }

    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> Self {
        Self::default()
    }

    /// Set node URL
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set rate limit
    #[must_use]
    pub fn with_rate_limit(mut self, requests_per_second: u32) -> Self {
        self.rate_limit_per_second = requests_per_second;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set signer key
    #[must_use]
    pub fn with_private_key(mut self, key: impl Into<String>) -> Self {
        self.private_key = Some(key.into());
        self
    }

    fn signer(&self) -> Result<PrivateKeySigner> {
        let key = self
            .private_key
            .as_deref()
            .ok_or_else(|| EthernityError::config("No private key configured"))?;
        key.trim()
            .parse::<PrivateKeySigner>()
            .map_err(|e| EthernityError::config(format!("Invalid private key: {e}")))
    }
}

// ============================================================================
// AlloyChain
// ============================================================================

/// Node access backed by alloy, signing locally with one key.
pub struct AlloyChain {
    provider: DynProvider,
    account: Address,
    chain_id: u64,
    config: RpcConfig,
    rate_limiter: Arc<RateLimiter>,
}

impl fmt::Debug for AlloyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlloyChain")
            .field("account", &self.account)
            .field("chain_id", &self.chain_id)
            .field("url", &self.config.url)
            .finish_non_exhaustive()
    }
}

impl AlloyChain {
    /// Build the provider and check that the node serves the configured chain.
    #[instrument(skip(config), fields(url = %config.url, chain_id = config.chain_id))]
    pub async fn connect(config: RpcConfig) -> Result<Self> {
        let chain = Self::new(config)?;
        let remote = chain.request("eth_chainId", chain.provider.get_chain_id()).await?;
        if remote != chain.chain_id {
            return Err(EthernityError::config(format!(
                "Node at {} serves chain {remote}, expected {}",
                chain.config.url, chain.chain_id
            )));
        }
        info!(account = %chain.account, "Connected to node");
        Ok(chain)
    }

    /// Build the provider without touching the network.
    pub fn new(config: RpcConfig) -> Result<Self> {
        let signer = config.signer()?;
        let account = signer.address();
        let url: url::Url = config
            .url
            .parse()
            .map_err(|e| EthernityError::config(format!("Invalid RPC URL {}: {e}", config.url)))?;

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();

        let quota = Quota::per_second(
            NonZeroU32::new(config.rate_limit_per_second).unwrap_or(NonZeroU32::MIN),
        );

        Ok(Self {
            provider,
            account,
            chain_id: config.chain_id,
            rate_limiter: Arc::new(GovRateLimiter::direct(quota)),
            config,
        })
    }

    /// All orchestrator capabilities, receipts polled at the configured interval.
    pub fn capabilities(chain: Arc<Self>) -> Capabilities {
        let watcher =
            PollingReceiptWatcher::new(chain.clone()).with_poll_interval(chain.config.poll_interval);
        Capabilities {
            wallet: chain.clone(),
            balances: chain.clone(),
            gas: chain.clone(),
            signer: chain,
            receipts: Arc::new(watcher),
        }
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    async fn wait_for_rate_limit(&self) {
        self.rate_limiter.until_ready().await;
    }

    /// Rate-limit, bound by the request timeout and map transport errors.
    async fn request<T>(
        &self,
        method: &'static str,
        fut: impl Future<Output = std::result::Result<T, TransportError>>,
    ) -> Result<T> {
        self.wait_for_rate_limit().await;
        match tokio::time::timeout(self.config.timeout, fut).await {
            Ok(result) => result.map_err(|e| map_transport_error(method, self.config.timeout, e)),
            Err(_) => Err(EthernityError::timeout(self.config.timeout, method)),
        }
    }

    async fn read_word(&self, to: Address, data: Bytes) -> Result<U256> {
        let tx = TransactionRequest::default().with_to(to).with_input(data);
        let output = self.request("eth_call", self.provider.call(tx).into_future()).await?;
        decode_uint256(&output)
    }

    fn to_request(&self, call: &CallRequest) -> TransactionRequest {
        let mut tx = TransactionRequest::default()
            .with_from(call.from.unwrap_or(self.account))
            .with_to(call.to)
            .with_input(call.data.clone())
            .with_value(call.value);
        if let Some(gas_limit) = call.gas_limit {
            tx = tx.with_gas_limit(gas_limit);
        }
        if let Some(max_fee) = call.max_fee_per_gas {
            tx = tx.with_max_fee_per_gas(max_fee);
        }
        if let Some(priority) = call.max_priority_fee_per_gas {
            tx = tx.with_max_priority_fee_per_gas(priority);
        }
        tx
    }
}

impl WalletSession for AlloyChain {
    fn active_account(&self) -> Option<Address> {
        Some(self.account)
    }

    fn chain_id(&self) -> Option<u64> {
        Some(self.chain_id)
    }
}

#[async_trait]
impl BalanceReader for AlloyChain {
    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256> {
        self.read_word(token, encode_erc20_balance_of(owner)).await
    }

    async fn native_balance(&self, owner: Address) -> Result<U256> {
        self.request("eth_getBalance", self.provider.get_balance(owner).into_future())
            .await
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        self.read_word(token, encode_erc20_allowance_query(owner, spender))
            .await
    }
}

#[async_trait]
impl GasOracle for AlloyChain {
    async fn estimate_gas(&self, call: &CallRequest) -> Result<u64> {
        let tx = self.to_request(call);
        self.request("eth_estimateGas", self.provider.estimate_gas(tx).into_future())
            .await
    }

    async fn gas_price(&self) -> Result<u128> {
        self.request("eth_gasPrice", self.provider.get_gas_price()).await
    }
}

#[async_trait]
impl TxSubmitter for AlloyChain {
    #[instrument(skip(self, call), fields(to = %call.to))]
    async fn sign_and_broadcast(&self, call: &CallRequest) -> Result<B256> {
        let tx = self.to_request(call);
        let pending = self
            .request("eth_sendTransaction", self.provider.send_transaction(tx))
            .await?;
        let tx_hash = *pending.tx_hash();
        debug!(tx_hash = %tx_hash, "Transaction broadcast");
        Ok(tx_hash)
    }
}

#[async_trait]
impl ReceiptSource for AlloyChain {
    async fn fetch_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>> {
        let receipt = self
            .request(
                "eth_getTransactionReceipt",
                self.provider.get_transaction_receipt(tx_hash),
            )
            .await?;
        Ok(receipt.as_ref().map(receipt_from_rpc))
    }
}

// ============================================================================
// Mapping
// ============================================================================

fn receipt_from_rpc(receipt: &TransactionReceipt) -> Receipt {
    let logs = receipt
        .inner
        .logs()
        .iter()
        .map(|log| LogEntry {
            address: log.inner.address,
            topics: log.inner.data.topics().to_vec(),
            data: log.inner.data.data.clone(),
        })
        .collect();

    Receipt {
        tx_hash: receipt.transaction_hash(),
        success: receipt.status(),
        block_number: receipt.block_number(),
        gas_used: receipt.gas_used(),
        logs,
    }
}

/// JSON-RPC error payloads keep their code; transport failures become
/// network or timeout errors.
fn map_transport_error(
    method: &'static str,
    timeout: Duration,
    err: TransportError,
) -> EthernityError {
    if let Some(payload) = err.as_error_resp() {
        return EthernityError::rpc(Some(payload.code), payload.message.to_string());
    }

    let text = err.to_string();
    let lower = text.to_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") {
        EthernityError::timeout(timeout, method)
    } else if lower.contains("connection refused")
        || lower.contains("dns error")
        || lower.contains("connection reset")
    {
        EthernityError::network(format!("{method} failed: node unreachable"), err)
    } else {
        EthernityError::network(format!("{method} failed"), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known anvil account #0.
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_config_defaults() {
        let config = RpcConfig::for_chain(421_614);
        assert_eq!(config.chain_id, 421_614);
        assert!(config.url.starts_with("http"));
        assert!(config.private_key.is_none());
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = RpcConfig::default().with_private_key(TEST_KEY);
        let debug = format!("{config:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("ac0974"));
    }

    #[test]
    fn test_transport_errors_mapped() {
        use crate::core::{classify, TxErrorKind};
        use alloy_transport::TransportErrorKind;

        let timeout = Duration::from_secs(5);
        let err = map_transport_error(
            "eth_call",
            timeout,
            TransportErrorKind::custom_str("request timed out"),
        );
        match &err {
            EthernityError::Timeout { duration, operation } => {
                assert_eq!(*duration, timeout);
                assert_eq!(operation, "eth_call");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(classify(err).kind(), TxErrorKind::RpcTimeout);

        let err = map_transport_error(
            "eth_getBalance",
            timeout,
            TransportErrorKind::custom_str("connection refused"),
        );
        assert!(matches!(err, EthernityError::Network { .. }));
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let err = AlloyChain::new(RpcConfig::default()).unwrap_err();
        assert!(matches!(err, EthernityError::Config { .. }));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let config = RpcConfig::default()
            .with_private_key(TEST_KEY)
            .with_url("not a url");
        let err = AlloyChain::new(config).unwrap_err();
        assert!(matches!(err, EthernityError::Config { .. }));
    }

    #[test]
    fn test_signer_address() {
        let config = RpcConfig::default()
            .with_private_key(TEST_KEY)
            .with_url("http://127.0.0.1:8545");
        let chain = AlloyChain::new(config).unwrap();
        assert_eq!(
            chain.account(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse::<Address>().unwrap()
        );
        assert_eq!(chain.active_account(), Some(chain.account()));
        assert_eq!(WalletSession::chain_id(&chain), Some(DEFAULT_CHAIN_ID));
    }
}
