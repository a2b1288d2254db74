//! Fixed-point token amounts and fee arithmetic.
//!
//! All arithmetic is done on raw integer units (`U256`). Subtraction never
//! wraps: shortfalls saturate at zero and checked operations return `None`.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::core::{EthernityError, Result, USDC_DECIMALS};

/// Basis-point denominator (100% = 10_000 bps).
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Protocol fee taken on fund creation and deposits (3%).
pub const DEFAULT_FEE_BPS: u32 = 300;

/// Unsigned fixed-point token amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenAmount {
    raw: U256,
    decimals: u8,
}

impl TokenAmount {
    /// Wrap raw integer units.
    #[must_use]
    pub const fn from_raw(raw: U256, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    /// Zero with the given decimals.
    #[must_use]
    pub const fn zero(decimals: u8) -> Self {
        Self::from_raw(U256::ZERO, decimals)
    }

    /// USDC amount from raw units (6 decimals).
    #[must_use]
    pub fn usdc(raw: u64) -> Self {
        Self::from_raw(U256::from(raw), USDC_DECIMALS)
    }

    /// Parse a human decimal string (`"12.5"`) into raw units.
    ///
    /// Rejects empty input, signs, exponents, more than one dot and more
    /// fractional digits than `decimals`.
    pub fn parse(input: &str, decimals: u8) -> Result<Self> {
        let s = input.trim();
        if s.is_empty() {
            return Err(EthernityError::validation_field("Amount is empty", "amount"));
        }

        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid(input, "no digits"));
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid(input, "only digits and a single '.' are allowed"));
        }
        if frac_part.len() > usize::from(decimals) {
            return Err(invalid(
                input,
                &format!("at most {decimals} decimal places are allowed"),
            ));
        }

        let mut raw = U256::ZERO;
        let padding = usize::from(decimals) - frac_part.len();
        let digits = int_part
            .bytes()
            .chain(frac_part.bytes())
            .chain(std::iter::repeat(b'0').take(padding));
        for digit in digits {
            raw = raw
                .checked_mul(U256::from(10u8))
                .and_then(|r| r.checked_add(U256::from(digit - b'0')))
                .ok_or_else(|| invalid(input, "value too large"))?;
        }

        Ok(Self { raw, decimals })
    }

    /// Parse a USDC amount (6 decimals).
    pub fn parse_usdc(input: &str) -> Result<Self> {
        Self::parse(input, USDC_DECIMALS)
    }

    #[must_use]
    pub const fn raw(&self) -> U256 {
        self.raw
    }

    #[must_use]
    pub const fn decimals(&self) -> u8 {
        self.decimals
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }

    /// `self + other`, `None` on overflow or decimal mismatch.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        if self.decimals != other.decimals {
            return None;
        }
        self.raw
            .checked_add(other.raw)
            .map(|raw| Self::from_raw(raw, self.decimals))
    }

    /// `self - other`, `None` if it would go below zero or decimals differ.
    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        if self.decimals != other.decimals {
            return None;
        }
        self.raw
            .checked_sub(other.raw)
            .map(|raw| Self::from_raw(raw, self.decimals))
    }

    /// Render with exactly `places` fractional digits, rounding down.
    #[must_use]
    pub fn format_fixed(&self, places: u8) -> String {
        let (int, frac) = self.split();
        let mut frac = frac;
        let places = usize::from(places);
        if frac.len() >= places {
            frac.truncate(places);
        } else {
            frac.push_str(&"0".repeat(places - frac.len()));
        }
        if frac.is_empty() {
            int
        } else {
            format!("{int}.{frac}")
        }
    }

    fn split(&self) -> (String, String) {
        let unit = pow10(self.decimals);
        let int = self.raw / unit;
        let frac = self.raw % unit;
        let frac = if self.decimals == 0 {
            String::new()
        } else {
            format!("{:0>width$}", frac.to_string(), width = usize::from(self.decimals))
        };
        (int.to_string(), frac)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (int, frac) = self.split();
        let frac = frac.trim_end_matches('0');
        if frac.is_empty() {
            write!(f, "{int}")
        } else {
            write!(f, "{int}.{frac}")
        }
    }
}

impl FromStr for TokenAmount {
    type Err = EthernityError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_usdc(s)
    }
}

fn invalid(input: &str, reason: &str) -> EthernityError {
    EthernityError::validation_field(format!("Invalid amount '{input}': {reason}"), "amount")
}

fn pow10(decimals: u8) -> U256 {
    U256::from(10u8).pow(U256::from(decimals))
}

/// `true` if `input` parses to a strictly positive amount.
#[must_use]
pub fn is_valid_amount(input: &str, decimals: u8) -> bool {
    TokenAmount::parse(input, decimals).is_ok_and(|a| !a.is_zero())
}

/// Amount still missing to reach `required`; zero when `available` covers it.
#[must_use]
pub fn shortfall(required: U256, available: U256) -> U256 {
    required.saturating_sub(available)
}

/// Upper bound on the native cost of a transaction.
#[must_use]
pub fn transaction_cost(gas_limit: u64, max_fee_per_gas: u128) -> U256 {
    U256::from(gas_limit).saturating_mul(U256::from(max_fee_per_gas))
}

/// Fixed fee/net split of a gross amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    fee_bps: u32,
}

impl Default for FeeSplit {
    fn default() -> Self {
        Self {
            fee_bps: DEFAULT_FEE_BPS,
        }
    }
}

impl FeeSplit {
    /// Fee in basis points; values above 100% are rejected.
    pub fn new(fee_bps: u32) -> Result<Self> {
        if fee_bps > BPS_DENOMINATOR {
            return Err(EthernityError::validation_field(
                format!("Fee of {fee_bps} bps exceeds 100%"),
                "fee_bps",
            ));
        }
        Ok(Self { fee_bps })
    }

    #[must_use]
    pub const fn fee_bps(&self) -> u32 {
        self.fee_bps
    }

    /// `floor(x * bps / 10_000)`, computed without intermediate overflow.
    #[must_use]
    pub fn fee(&self, gross: U256) -> U256 {
        let denom = U256::from(BPS_DENOMINATOR);
        let bps = U256::from(self.fee_bps);
        let (q, r) = (gross / denom, gross % denom);
        q * bps + r * bps / denom
    }

    /// `x - fee(x)`, so that `fee(x) + net(x) == x`.
    #[must_use]
    pub fn net(&self, gross: U256) -> U256 {
        gross - self.fee(gross)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_usdc() {
        assert_eq!(TokenAmount::parse_usdc("500").unwrap().raw(), U256::from(500_000_000u64));
        assert_eq!(TokenAmount::parse_usdc("12.5").unwrap().raw(), U256::from(12_500_000u64));
        assert_eq!(TokenAmount::parse_usdc("0.000001").unwrap().raw(), U256::from(1u64));
        assert_eq!(TokenAmount::parse_usdc(".5").unwrap().raw(), U256::from(500_000u64));
        assert_eq!(TokenAmount::parse_usdc(" 7. ").unwrap().raw(), U256::from(7_000_000u64));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        for bad in ["", "  ", ".", "-1", "+1", "1e6", "1.2.3", "abc", "0.0000001"] {
            assert!(TokenAmount::parse_usdc(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_parse_overflow() {
        let huge = "9".repeat(90);
        assert!(TokenAmount::parse(&huge, 0).is_err());
    }

    #[test]
    fn test_is_valid_amount() {
        assert!(is_valid_amount("10", 6));
        assert!(is_valid_amount("0.01", 6));
        assert!(!is_valid_amount("0", 6));
        assert!(!is_valid_amount("0.000", 6));
        assert!(!is_valid_amount("1.1234567", 6));
    }

    #[test]
    fn test_display_and_fixed() {
        let a = TokenAmount::usdc(12_340_000);
        assert_eq!(a.to_string(), "12.34");
        assert_eq!(a.format_fixed(2), "12.34");
        assert_eq!(a.format_fixed(4), "12.3400");
        assert_eq!(TokenAmount::usdc(1_999_999).format_fixed(2), "1.99");
        assert_eq!(TokenAmount::usdc(5_000_000).to_string(), "5");
        assert_eq!(TokenAmount::zero(6).to_string(), "0");
        assert_eq!(TokenAmount::from_raw(U256::from(42u8), 0).format_fixed(2), "42.00");
    }

    #[test]
    fn test_checked_sub_never_goes_negative() {
        let small = TokenAmount::usdc(100);
        let big = TokenAmount::usdc(500);
        assert_eq!(small.checked_sub(big), None);
        assert_eq!(big.checked_sub(small), Some(TokenAmount::usdc(400)));
        assert_eq!(small.checked_sub(TokenAmount::zero(18)), None);
        assert_eq!(shortfall(U256::from(500u64), U256::from(100u64)), U256::from(400u64));
        assert_eq!(shortfall(U256::from(100u64), U256::from(500u64)), U256::ZERO);
    }

    #[test]
    fn test_fee_split_sums_to_gross() {
        let split = FeeSplit::default();
        for x in [0u64, 1, 33, 99, 100, 101, 12_345_678, 1_000_000_000, u64::MAX] {
            let gross = U256::from(x);
            let fee = split.fee(gross);
            let net = split.net(gross);
            assert_eq!(fee + net, gross, "x = {x}");
            assert!(fee <= gross);
        }
        assert_eq!(split.fee(U256::MAX) + split.net(U256::MAX), U256::MAX);
    }

    #[test]
    fn test_fee_three_percent() {
        let split = FeeSplit::default();
        assert_eq!(split.fee(U256::from(1_000_000u64)), U256::from(30_000u64));
        assert_eq!(split.net(U256::from(1_000_000u64)), U256::from(970_000u64));
        // 33 * 3% = 0.99, floored
        assert_eq!(split.fee(U256::from(33u64)), U256::ZERO);
    }

    #[test]
    fn test_fee_split_bounds() {
        assert!(FeeSplit::new(10_001).is_err());
        let all = FeeSplit::new(10_000).unwrap();
        assert_eq!(all.net(U256::from(77u64)), U256::ZERO);
    }

    #[test]
    fn test_transaction_cost() {
        assert_eq!(transaction_cost(21_000, 2_000_000_000), U256::from(42_000_000_000_000u64));
    }
}
