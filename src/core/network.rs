//! Per-network contract addresses and endpoint configuration.
//!
//! The orchestrator never reads ambient state for addresses: callers build a
//! [`NetworkContext`] once (explicitly or from the built-in address book) and
//! hand it to the orchestrator constructor.

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};

use super::error::{EthernityError, Result};

/// Environment variable overriding the node endpoint.
pub const RPC_URL_ENV: &str = "ETHERNITY_RPC_URL";

/// Arbitrum Sepolia, the network the fund contracts are deployed on.
pub const ARBITRUM_SEPOLIA_CHAIN_ID: u64 = 421_614;
/// Polygon Amoy testnet.
pub const POLYGON_AMOY_CHAIN_ID: u64 = 80_002;
/// Base Sepolia testnet.
pub const BASE_SEPOLIA_CHAIN_ID: u64 = 84_532;
/// Optimism Sepolia testnet.
pub const OPTIMISM_SEPOLIA_CHAIN_ID: u64 = 11_155_420;
/// Ethereum Sepolia testnet.
pub const ETHEREUM_SEPOLIA_CHAIN_ID: u64 = 11_155_111;

/// Default chain when none is given.
pub const DEFAULT_CHAIN_ID: u64 = ARBITRUM_SEPOLIA_CHAIN_ID;

/// Decimals of the USDC stablecoin on every supported network.
pub const USDC_DECIMALS: u8 = 6;

/// Circle USDC on Arbitrum Sepolia
pub const ARBITRUM_SEPOLIA_USDC: Address = address!("0x75faf114eafb1BDbe2F0316DF893fd58CE46AA4d");
/// PersonalFundFactory on Arbitrum Sepolia
pub const ARBITRUM_SEPOLIA_FUND_FACTORY: Address =
    address!("0xCC29838D66b4aFFB1A4127Cd7DBc60648BcC93d6");
/// Treasury on Arbitrum Sepolia
pub const ARBITRUM_SEPOLIA_TREASURY: Address =
    address!("0x2F1948D9FA3BB1942f51ebBdA265B1185c3c52dC");

/// Circle USDC on Polygon Amoy
pub const POLYGON_AMOY_USDC: Address = address!("0x41E94Eb019C0762f9Bfcf9Fb1E58725BfB0e7582");
/// Circle USDC on Base Sepolia
pub const BASE_SEPOLIA_USDC: Address = address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e");
/// Circle USDC on Optimism Sepolia
pub const OPTIMISM_SEPOLIA_USDC: Address = address!("0x5fd84259d66Cd46123540766Be93DFE6D43130D7");
/// Circle USDC on Ethereum Sepolia
pub const ETHEREUM_SEPOLIA_USDC: Address = address!("0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238");

/// Contract addresses the orchestrator needs on one network.
///
/// A zero address means "not deployed here" and is rejected at flow start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractAddresses {
    /// The ERC-20 token the flows spend (USDC)
    pub usdc: Address,
    /// PersonalFundFactory, the spender for fund creation
    pub personal_fund_factory: Address,
    /// Protocol treasury (fee receiver)
    pub treasury: Address,
}

impl ContractAddresses {
    const fn token_only(usdc: Address) -> Self {
        Self {
            usdc,
            personal_fund_factory: Address::ZERO,
            treasury: Address::ZERO,
        }
    }
}

/// Chain id plus resolved addresses, passed explicitly into the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkContext {
    pub chain_id: u64,
    pub addresses: ContractAddresses,
    /// Decimals of `addresses.usdc`
    pub token_decimals: u8,
}

impl NetworkContext {
    /// Build a context from explicit addresses.
    #[must_use]
    pub fn new(chain_id: u64, addresses: ContractAddresses) -> Self {
        Self {
            chain_id,
            addresses,
            token_decimals: USDC_DECIMALS,
        }
    }

    /// Resolve the built-in address book entry for `chain_id`.
    pub fn for_chain(chain_id: u64) -> Result<Self> {
        let addresses = match chain_id {
            ARBITRUM_SEPOLIA_CHAIN_ID => ContractAddresses {
                usdc: ARBITRUM_SEPOLIA_USDC,
                personal_fund_factory: ARBITRUM_SEPOLIA_FUND_FACTORY,
                treasury: ARBITRUM_SEPOLIA_TREASURY,
            },
            POLYGON_AMOY_CHAIN_ID => ContractAddresses::token_only(POLYGON_AMOY_USDC),
            BASE_SEPOLIA_CHAIN_ID => ContractAddresses::token_only(BASE_SEPOLIA_USDC),
            OPTIMISM_SEPOLIA_CHAIN_ID => ContractAddresses::token_only(OPTIMISM_SEPOLIA_USDC),
            ETHEREUM_SEPOLIA_CHAIN_ID => ContractAddresses::token_only(ETHEREUM_SEPOLIA_USDC),
            other => {
                return Err(EthernityError::config(format!(
                    "Unsupported chain id {other}"
                )))
            }
        };
        Ok(Self::new(chain_id, addresses))
    }

    /// Set token decimals (for non-USDC deployments)
    #[must_use]
    pub fn with_token_decimals(mut self, decimals: u8) -> Self {
        self.token_decimals = decimals;
        self
    }

    /// Token address, or an error when it is not deployed on this network.
    pub fn token(&self) -> Result<Address> {
        resolved(self.addresses.usdc, "usdc", self.chain_id)
    }

    /// Fund factory address, or an error when it is not deployed on this network.
    pub fn fund_factory(&self) -> Result<Address> {
        resolved(
            self.addresses.personal_fund_factory,
            "personalFundFactory",
            self.chain_id,
        )
    }
}

fn resolved(addr: Address, name: &str, chain_id: u64) -> Result<Address> {
    if addr.is_zero() {
        Err(EthernityError::validation_field(
            format!("Contract `{name}` is not deployed on chain {chain_id}"),
            name,
        ))
    } else {
        Ok(addr)
    }
}

/// Public RPC endpoint for a chain.
#[must_use]
pub fn default_rpc_url(chain_id: u64) -> &'static str {
    match chain_id {
        POLYGON_AMOY_CHAIN_ID => "https://rpc-amoy.polygon.technology",
        BASE_SEPOLIA_CHAIN_ID => "https://sepolia.base.org",
        OPTIMISM_SEPOLIA_CHAIN_ID => "https://sepolia.optimism.io",
        ETHEREUM_SEPOLIA_CHAIN_ID => "https://ethereum-sepolia-rpc.publicnode.com",
        _ => "https://sepolia-rollup.arbitrum.io/rpc",
    }
}

/// Node endpoint: `ETHERNITY_RPC_URL` if set, else the public default.
#[must_use]
pub fn rpc_url(chain_id: u64) -> String {
    std::env::var(RPC_URL_ENV)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default_rpc_url(chain_id).to_string())
}
