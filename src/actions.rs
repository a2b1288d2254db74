//! Approval-gated target calls.
//!
//! The orchestrator is generic over [`TargetAction`]: every action that spends
//! the token through a contract (fund creation, deposits, any other call)
//! describes itself through this trait and the same approve/execute/confirm
//! sequence drives it.

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::abi::{encode_call, AbiValue};
use crate::amount::{FeeSplit, TokenAmount};
use crate::core::{EthernityError, NetworkContext, Result};
use crate::tx::extract_created_address;
use crate::types::{ArtifactExtraction, Receipt};

/// Gas fallback for single-fund deposit calls.
pub const DEPOSIT_GAS_CEILING: u64 = 500_000;

/// Facts available when the target call is built, read after any approval.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    /// Account that signs the call
    pub account: Address,
    pub network: &'a NetworkContext,
    /// Contract being called
    pub target: Address,
    /// Allowance observed for the spender right before the call
    pub allowance: U256,
}

/// A call that needs `required_amount` of the token approved to `spender`.
pub trait TargetAction: Send + Sync {
    /// Short name for logs and intents.
    fn label(&self) -> &str;

    /// Contract the call goes to.
    fn target(&self, network: &NetworkContext) -> Result<Address>;

    /// Account that pulls the tokens; the target itself unless overridden.
    fn spender(&self, network: &NetworkContext) -> Result<Address> {
        self.target(network)
    }

    /// Token amount the call transfers.
    fn required_amount(&self) -> U256;

    /// Input checks that need no network access.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Calldata for the call.
    fn build_call(&self, ctx: &CallContext<'_>) -> Result<Bytes>;

    /// Native value attached to the call.
    fn value(&self) -> U256 {
        U256::ZERO
    }

    /// Gas fallback for this action; `None` uses the orchestrator default.
    fn gas_ceiling(&self) -> Option<u64> {
        None
    }

    /// Data the caller needs from the receipt; `target` is the contract the
    /// call went to.
    fn extract_artifact(&self, _receipt: &Receipt, _target: Address) -> ArtifactExtraction {
        ArtifactExtraction::NotExpected
    }
}

/// Parameters of a new personal retirement fund.
///
/// Token amounts are raw units of the network token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetirementPlan {
    pub principal: U256,
    pub monthly_deposit: U256,
    pub current_age: u32,
    pub retirement_age: u32,
    pub desired_monthly_income: U256,
    pub years_payments: u32,
    /// Annual interest in basis points (5% = 500)
    pub interest_rate_bps: u32,
    pub timelock_years: u32,
}

/// Gross/fee/net view of a deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdown {
    pub gross: U256,
    pub fee: U256,
    pub net: U256,
}

impl FeeBreakdown {
    #[must_use]
    pub fn new(gross: U256, split: &FeeSplit) -> Self {
        Self {
            gross,
            fee: split.fee(gross),
            net: split.net(gross),
        }
    }
}

impl RetirementPlan {
    /// Principal plus the first monthly deposit.
    pub fn initial_deposit(&self) -> Result<U256> {
        self.principal
            .checked_add(self.monthly_deposit)
            .ok_or_else(|| EthernityError::validation_field("Initial deposit overflows", "principal"))
    }

    /// Fee taken on the initial deposit and the part that reaches the fund.
    pub fn fee_breakdown(&self, split: &FeeSplit) -> Result<FeeBreakdown> {
        Ok(FeeBreakdown::new(self.initial_deposit()?, split))
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_deposit()?.is_zero() {
            return Err(EthernityError::validation_field(
                "Initial deposit must be greater than zero",
                "principal",
            ));
        }
        if self.retirement_age <= self.current_age {
            return Err(EthernityError::validation_field(
                format!(
                    "Retirement age {} must be greater than current age {}",
                    self.retirement_age, self.current_age
                ),
                "retirementAge",
            ));
        }
        if self.years_payments == 0 {
            return Err(EthernityError::validation_field(
                "Payment years must be at least one",
                "yearsPayments",
            ));
        }
        Ok(())
    }

    fn call_args(&self) -> [AbiValue; 8] {
        [
            self.principal.into(),
            self.monthly_deposit.into(),
            u64::from(self.current_age).into(),
            u64::from(self.retirement_age).into(),
            self.desired_monthly_income.into(),
            u64::from(self.years_payments).into(),
            u64::from(self.interest_rate_bps).into(),
            u64::from(self.timelock_years).into(),
        ]
    }
}

/// `createPersonalFund` on the fund factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateFund {
    pub plan: RetirementPlan,
}

impl CreateFund {
    pub const SIGNATURE: &'static str =
        "createPersonalFund(uint256,uint256,uint256,uint256,uint256,uint256,uint256,uint256)";

    #[must_use]
    pub fn new(plan: RetirementPlan) -> Self {
        Self { plan }
    }
}

impl TargetAction for CreateFund {
    fn label(&self) -> &str {
        "createPersonalFund"
    }

    fn target(&self, network: &NetworkContext) -> Result<Address> {
        network.fund_factory()
    }

    fn required_amount(&self) -> U256 {
        self.plan.initial_deposit().unwrap_or(U256::MAX)
    }

    fn validate(&self) -> Result<()> {
        self.plan.validate()
    }

    fn build_call(&self, _ctx: &CallContext<'_>) -> Result<Bytes> {
        encode_call(Self::SIGNATURE, &self.plan.call_args())
    }

    /// The factory emits the new fund's address as the first indexed topic.
    fn extract_artifact(&self, receipt: &Receipt, factory: Address) -> ArtifactExtraction {
        extract_created_address(receipt, factory)
    }
}

/// Which deposit entry point of a personal fund to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DepositKind {
    /// `deposit(uint256)`
    Regular,
    /// `depositMonthly()`, the fund knows the amount
    Monthly,
    /// `depositExtra(uint256)`
    Extra,
}

impl DepositKind {
    #[must_use]
    pub const fn signature(&self) -> &'static str {
        match self {
            Self::Regular => "deposit(uint256)",
            Self::Monthly => "depositMonthly()",
            Self::Extra => "depositExtra(uint256)",
        }
    }
}

/// A deposit into an existing personal fund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundDeposit {
    pub fund: Address,
    pub kind: DepositKind,
    /// Tokens the fund pulls; for monthly deposits, the plan's monthly amount
    pub amount: U256,
}

impl FundDeposit {
    #[must_use]
    pub fn new(fund: Address, kind: DepositKind, amount: U256) -> Self {
        Self { fund, kind, amount }
    }

    #[must_use]
    pub fn extra(fund: Address, amount: TokenAmount) -> Self {
        Self::new(fund, DepositKind::Extra, amount.raw())
    }
}

impl TargetAction for FundDeposit {
    fn label(&self) -> &str {
        match self.kind {
            DepositKind::Regular => "deposit",
            DepositKind::Monthly => "depositMonthly",
            DepositKind::Extra => "depositExtra",
        }
    }

    fn target(&self, _network: &NetworkContext) -> Result<Address> {
        if self.fund.is_zero() {
            return Err(EthernityError::validation_field(
                "Fund address is not set",
                "fund",
            ));
        }
        Ok(self.fund)
    }

    fn required_amount(&self) -> U256 {
        self.amount
    }

    fn validate(&self) -> Result<()> {
        if self.amount.is_zero() {
            return Err(EthernityError::validation_field(
                "Deposit amount must be greater than zero",
                "amount",
            ));
        }
        Ok(())
    }

    fn build_call(&self, _ctx: &CallContext<'_>) -> Result<Bytes> {
        match self.kind {
            DepositKind::Monthly => encode_call(self.kind.signature(), &[]),
            DepositKind::Regular | DepositKind::Extra => {
                encode_call(self.kind.signature(), &[self.amount.into()])
            }
        }
    }

    fn gas_ceiling(&self) -> Option<u64> {
        Some(DEPOSIT_GAS_CEILING)
    }
}

/// Any other approval-gated call with pre-encoded calldata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub label: String,
    pub target: Address,
    /// Spender when it differs from `target`
    pub spender: Option<Address>,
    pub data: Bytes,
    pub amount: U256,
    pub value: U256,
    pub gas_ceiling: Option<u64>,
}

impl ContractCall {
    pub fn new(label: impl Into<String>, target: Address, data: Bytes, amount: U256) -> Self {
        Self {
            label: label.into(),
            target,
            spender: None,
            data,
            amount,
            value: U256::ZERO,
            gas_ceiling: None,
        }
    }

    #[must_use]
    pub fn with_spender(mut self, spender: Address) -> Self {
        self.spender = Some(spender);
        self
    }

    #[must_use]
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    #[must_use]
    pub fn with_gas_ceiling(mut self, ceiling: u64) -> Self {
        self.gas_ceiling = Some(ceiling);
        self
    }
}

impl TargetAction for ContractCall {
    fn label(&self) -> &str {
        &self.label
    }

    fn target(&self, _network: &NetworkContext) -> Result<Address> {
        if self.target.is_zero() {
            return Err(EthernityError::validation_field("Target address is not set", "target"));
        }
        Ok(self.target)
    }

    fn spender(&self, network: &NetworkContext) -> Result<Address> {
        match self.spender {
            Some(spender) if !spender.is_zero() => Ok(spender),
            Some(_) => Err(EthernityError::validation_field("Spender address is zero", "spender")),
            None => self.target(network),
        }
    }

    fn required_amount(&self) -> U256 {
        self.amount
    }

    fn build_call(&self, _ctx: &CallContext<'_>) -> Result<Bytes> {
        Ok(self.data.clone())
    }

    fn value(&self) -> U256 {
        self.value
    }

    fn gas_ceiling(&self) -> Option<u64> {
        self.gas_ceiling
    }
}
