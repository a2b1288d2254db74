use std::time::Duration;

use alloy_primitives::U256;

use crate::allowance::{AllowanceRecheck, ApprovalAmount};
use crate::gas::{DEFAULT_GAS_BUFFER_PERCENT, DEFAULT_GAS_CEILING, DEFAULT_GAS_ESTIMATE_TIMEOUT};
use crate::tx::DEFAULT_RECEIPT_TIMEOUT;
use crate::verify::DEFAULT_MIN_NATIVE_BALANCE_WEI;

/// Orchestrator tuning
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Buffer on node gas estimates, in percent (120 = x1.2)
    pub gas_buffer_percent: u32,
    /// Gas limit used when estimation fails, unless the action sets its own
    pub gas_ceiling: u64,
    pub gas_estimate_timeout: Duration,
    /// Receipt watch window per transaction
    pub receipt_timeout: Duration,
    /// Native balance floor for the pre-flight gas check
    pub min_native_balance: U256,
    /// Pause after the approval is mined, before re-reading the allowance.
    /// Cosmetic: correctness comes from the re-read.
    pub approval_settle_delay: Duration,
    pub allowance_recheck: AllowanceRecheck,
    pub approval_amount: ApprovalAmount,
    /// Compare native balance with `gas_limit * max_fee` before each submission
    pub check_gas_cost: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            gas_buffer_percent: DEFAULT_GAS_BUFFER_PERCENT,
            gas_ceiling: DEFAULT_GAS_CEILING,
            gas_estimate_timeout: DEFAULT_GAS_ESTIMATE_TIMEOUT,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
            min_native_balance: U256::from(DEFAULT_MIN_NATIVE_BALANCE_WEI),
            approval_settle_delay: Duration::from_millis(1500),
            allowance_recheck: AllowanceRecheck::default(),
            approval_amount: ApprovalAmount::Exact,
            check_gas_cost: true,
        }
    }
}

impl OrchestratorConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> Self {
        Self::default()
    }

    /// Set gas estimate buffer in percent
    #[must_use]
    pub fn with_gas_buffer_percent(mut self, percent: u32) -> Self {
        self.gas_buffer_percent = percent;
        self
    }

    /// Set fallback gas ceiling
    #[must_use]
    pub fn with_gas_ceiling(mut self, ceiling: u64) -> Self {
        self.gas_ceiling = ceiling;
        self
    }

    #[must_use]
    pub fn with_gas_estimate_timeout(mut self, timeout: Duration) -> Self {
        self.gas_estimate_timeout = timeout;
        self
    }

    /// Set receipt watch window
    #[must_use]
    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    /// Set native balance floor (wei)
    #[must_use]
    pub fn with_min_native_balance(mut self, wei: U256) -> Self {
        self.min_native_balance = wei;
        self
    }

    #[must_use]
    pub fn with_approval_settle_delay(mut self, delay: Duration) -> Self {
        self.approval_settle_delay = delay;
        self
    }

    /// Set allowance re-read attempts and backoff
    #[must_use]
    pub fn with_allowance_recheck(mut self, attempts: u32, backoff: Duration) -> Self {
        self.allowance_recheck = AllowanceRecheck { attempts, backoff };
        self
    }

    /// Set approval amount policy
    #[must_use]
    pub fn with_approval_amount(mut self, amount: ApprovalAmount) -> Self {
        self.approval_amount = amount;
        self
    }

    #[must_use]
    pub fn with_gas_cost_check(mut self, enabled: bool) -> Self {
        self.check_gas_cost = enabled;
        self
    }
}
