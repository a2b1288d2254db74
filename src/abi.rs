//! Calldata encoding for the contract surface the orchestrator drives.
//!
//! Only static argument types are needed (`address`, `uint256`, `bool`), so
//! calldata is a 4-byte selector followed by 32-byte big-endian words.

use alloy_primitives::{keccak256, Address, Bytes, U256};

use crate::core::{EthernityError, Result};

/// ERC20 approve function selector: keccak256("approve(address,uint256)")[:4]
pub const ERC20_APPROVE_SELECTOR: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];

/// ERC20 allowance function selector: keccak256("allowance(address,address)")[:4]
pub const ERC20_ALLOWANCE_SELECTOR: [u8; 4] = [0xdd, 0x62, 0xed, 0x3e];

/// ERC20 balanceOf function selector: keccak256("balanceOf(address)")[:4]
pub const ERC20_BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

/// A static ABI argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiValue {
    Address(Address),
    Uint(U256),
    Bool(bool),
}

impl AbiValue {
    fn word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        match self {
            Self::Address(addr) => word[12..].copy_from_slice(addr.as_slice()),
            Self::Uint(v) => word = v.to_be_bytes::<32>(),
            Self::Bool(b) => word[31] = u8::from(*b),
        }
        word
    }
}

impl From<Address> for AbiValue {
    fn from(addr: Address) -> Self {
        Self::Address(addr)
    }
}

impl From<U256> for AbiValue {
    fn from(v: U256) -> Self {
        Self::Uint(v)
    }
}

impl From<u64> for AbiValue {
    fn from(v: u64) -> Self {
        Self::Uint(U256::from(v))
    }
}

/// First four bytes of `keccak256(signature)`.
///
/// `signature` is the canonical form, e.g. `"depositExtra(uint256)"`.
#[must_use]
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Encode a call from a raw selector and static arguments.
#[must_use]
pub fn encode_with_selector(selector: [u8; 4], args: &[AbiValue]) -> Bytes {
    let mut calldata = Vec::with_capacity(4 + 32 * args.len());
    calldata.extend_from_slice(&selector);
    for arg in args {
        calldata.extend_from_slice(&arg.word());
    }
    Bytes::from(calldata)
}

/// Encode a call from its canonical signature.
///
/// The argument count must match the signature's parameter list.
pub fn encode_call(signature: &str, args: &[AbiValue]) -> Result<Bytes> {
    let params = signature
        .split_once('(')
        .and_then(|(_, rest)| rest.strip_suffix(')'))
        .ok_or_else(|| {
            EthernityError::validation(format!("Malformed function signature: {signature}"))
        })?;
    let expected = if params.is_empty() {
        0
    } else {
        params.split(',').count()
    };
    if expected != args.len() {
        return Err(EthernityError::validation(format!(
            "{signature} takes {expected} argument(s), got {}",
            args.len()
        )));
    }
    Ok(encode_with_selector(selector(signature), args))
}

/// Encode ERC20 approve function call
///
/// # Arguments
/// * `spender` - The address authorized to spend tokens
/// * `amount` - Amount to approve (use U256::MAX for unlimited)
#[must_use]
pub fn encode_erc20_approve(spender: Address, amount: U256) -> Bytes {
    encode_with_selector(
        ERC20_APPROVE_SELECTOR,
        &[AbiValue::Address(spender), AbiValue::Uint(amount)],
    )
}

/// Encode ERC20 allowance query function call
#[must_use]
pub fn encode_erc20_allowance_query(owner: Address, spender: Address) -> Bytes {
    encode_with_selector(
        ERC20_ALLOWANCE_SELECTOR,
        &[AbiValue::Address(owner), AbiValue::Address(spender)],
    )
}

/// Encode ERC20 balanceOf query function call
#[must_use]
pub fn encode_erc20_balance_of(owner: Address) -> Bytes {
    encode_with_selector(ERC20_BALANCE_OF_SELECTOR, &[AbiValue::Address(owner)])
}

/// Decode a single `uint256` return value.
pub fn decode_uint256(output: &[u8]) -> Result<U256> {
    if output.len() < 32 {
        return Err(EthernityError::parse(format!(
            "Expected a 32-byte uint256 return, got {} bytes",
            output.len()
        )));
    }
    Ok(U256::from_be_slice(&output[..32]))
}

/// Address stored in an indexed event topic (last 20 bytes).
#[must_use]
pub fn topic_to_address(topic: &[u8; 32]) -> Address {
    Address::from_slice(&topic[12..])
}
