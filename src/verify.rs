//! Pre-flight balance and allowance verification.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use tracing::{debug, instrument, warn};

use crate::amount::{shortfall, TokenAmount};
use crate::chain::BalanceReader;
use crate::core::{ClassifiedError, TxErrorKind};
use crate::types::Validation;

/// Minimum native balance assumed to cover one transaction (0.001 ETH).
pub const DEFAULT_MIN_NATIVE_BALANCE_WEI: u128 = 1_000_000_000_000_000;

/// What to verify: `owner` spends `required` of `token` through `spender`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyRequest {
    pub owner: Address,
    pub token: Address,
    pub spender: Address,
    pub required: U256,
}

/// Reads token balance, native balance and allowance and turns them into a
/// [`Validation`].
///
/// Has no side effects and may be called any number of times.
#[derive(Clone)]
pub struct BalanceVerifier {
    reader: Arc<dyn BalanceReader>,
    min_native_balance: U256,
}

impl std::fmt::Debug for BalanceVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceVerifier")
            .field("min_native_balance", &self.min_native_balance)
            .finish_non_exhaustive()
    }
}

impl BalanceVerifier {
    #[must_use]
    pub fn new(reader: Arc<dyn BalanceReader>) -> Self {
        Self {
            reader,
            min_native_balance: U256::from(DEFAULT_MIN_NATIVE_BALANCE_WEI),
        }
    }

    /// Set the native balance floor used as the "enough gas" check
    #[must_use]
    pub fn with_min_native_balance(mut self, wei: U256) -> Self {
        self.min_native_balance = wei;
        self
    }

    #[must_use]
    pub fn min_native_balance(&self) -> U256 {
        self.min_native_balance
    }

    /// Read the three values concurrently and evaluate them.
    #[instrument(skip_all, fields(owner = %req.owner, spender = %req.spender, required = %req.required))]
    pub async fn verify(&self, req: &VerifyRequest) -> Validation {
        let (token, native, allowance) = tokio::join!(
            self.reader.token_balance(req.token, req.owner),
            self.reader.native_balance(req.owner),
            self.reader.allowance(req.token, req.owner, req.spender),
        );

        let token_balance = readable("token balance", token);
        let native_balance = readable("native balance", native);
        let allowance = readable("allowance", allowance);

        let validation = evaluate(
            req.required,
            token_balance,
            native_balance,
            allowance,
            self.min_native_balance,
        );
        debug!(?validation, "Balances verified");
        validation
    }
}

fn readable(what: &str, value: crate::core::Result<U256>) -> Option<U256> {
    match value {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(error = %e, "Could not read {what}; treating it as insufficient");
            None
        }
    }
}

/// Pure verdict from already-read values.
#[must_use]
pub fn evaluate(
    required: U256,
    token_balance: Option<U256>,
    native_balance: Option<U256>,
    allowance: Option<U256>,
    min_native_balance: U256,
) -> Validation {
    Validation {
        has_enough_token: token_balance.is_some_and(|b| b >= required),
        has_enough_gas: native_balance.is_some_and(|b| b >= min_native_balance),
        has_enough_allowance: !crate::allowance::needs_approval(allowance, required),
        token_balance,
        native_balance,
        allowance,
        required,
        shortfall: shortfall(required, token_balance.unwrap_or(U256::ZERO)),
    }
}

/// First failing pre-flight check as a classified error, token before gas.
pub fn check(validation: &Validation, decimals: u8) -> Result<(), ClassifiedError> {
    if !validation.has_enough_token {
        let need = TokenAmount::from_raw(validation.required, decimals);
        let message = match validation.token_balance {
            Some(have) => format!(
                "Insufficient USDC balance: need {need}, have {}",
                TokenAmount::from_raw(have, decimals)
            ),
            None => format!("USDC balance could not be read; {need} required"),
        };
        return Err(ClassifiedError::new(TxErrorKind::InsufficientToken, message));
    }
    if !validation.has_enough_gas {
        let message = match validation.native_balance {
            Some(have) => format!(
                "Insufficient ETH for gas fees: have {} ETH",
                TokenAmount::from_raw(have, 18).format_fixed(6)
            ),
            None => "ETH balance could not be read".to_string(),
        };
        return Err(ClassifiedError::new(TxErrorKind::InsufficientGas, message));
    }
    Ok(())
}
