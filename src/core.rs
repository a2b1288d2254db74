//! Core infrastructure: errors, failure classification and network configuration.

mod classify;
mod error;
mod network;

pub use classify::{classify, ClassifiedError, TxErrorKind};
pub use error::{Error, EthernityError, Result};
pub use network::{
    default_rpc_url, rpc_url, ContractAddresses, NetworkContext, ARBITRUM_SEPOLIA_CHAIN_ID,
    ARBITRUM_SEPOLIA_FUND_FACTORY, ARBITRUM_SEPOLIA_TREASURY, ARBITRUM_SEPOLIA_USDC,
    BASE_SEPOLIA_CHAIN_ID, BASE_SEPOLIA_USDC, DEFAULT_CHAIN_ID, ETHEREUM_SEPOLIA_CHAIN_ID,
    ETHEREUM_SEPOLIA_USDC, OPTIMISM_SEPOLIA_CHAIN_ID, OPTIMISM_SEPOLIA_USDC,
    POLYGON_AMOY_CHAIN_ID, POLYGON_AMOY_USDC, RPC_URL_ENV, USDC_DECIMALS,
};
