//! Approval gate: whether an allowance grant must precede the target call.

use std::time::Duration;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::chain::BalanceReader;
use crate::core::{ClassifiedError, EthernityError, Result, TxErrorKind};

/// `true` when `current` does not cover `required`.
///
/// An unknown allowance counts as insufficient. A zero requirement never
/// needs an approval.
#[must_use]
pub fn needs_approval(current: Option<U256>, required: U256) -> bool {
    if required.is_zero() {
        return false;
    }
    current.map_or(true, |allowance| allowance < required)
}

/// How much to approve when an approval is needed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApprovalAmount {
    /// Exactly the required amount
    #[default]
    Exact,
    /// `U256::MAX`, so later flows skip the approval
    Unlimited,
}

impl ApprovalAmount {
    #[must_use]
    pub fn resolve(&self, required: U256) -> U256 {
        match self {
            Self::Exact => required,
            Self::Unlimited => U256::MAX,
        }
    }
}

/// Outcome of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    NotNeeded,
    Required { amount: U256 },
}

impl ApprovalDecision {
    #[must_use]
    pub fn is_required(&self) -> bool {
        matches!(self, Self::Required { .. })
    }
}

/// Applies [`needs_approval`] with an [`ApprovalAmount`] policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowanceGate {
    policy: ApprovalAmount,
}

impl AllowanceGate {
    #[must_use]
    pub fn new(policy: ApprovalAmount) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> ApprovalAmount {
        self.policy
    }

    #[must_use]
    pub fn decide(&self, current: Option<U256>, required: U256) -> ApprovalDecision {
        if needs_approval(current, required) {
            ApprovalDecision::Required {
                amount: self.policy.resolve(required),
            }
        } else {
            ApprovalDecision::NotNeeded
        }
    }
}

/// Re-read schedule for the allowance after an approval was mined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowanceRecheck {
    /// Total reads, at least one
    pub attempts: u32,
    /// Pause between reads
    pub backoff: Duration,
}

impl Default for AllowanceRecheck {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Read the allowance from the node until it covers `required`.
///
/// Read errors count as a failed attempt. When no read ever covers the amount
/// the result is an `AllowanceStale` classified error.
#[instrument(skip_all, fields(token = %token, owner = %owner, spender = %spender, required = %required))]
pub async fn confirm_allowance(
    reader: &dyn BalanceReader,
    token: Address,
    owner: Address,
    spender: Address,
    required: U256,
    recheck: AllowanceRecheck,
) -> Result<U256> {
    let attempts = recheck.attempts.max(1);
    let mut last_seen: Option<U256> = None;

    for attempt in 1..=attempts {
        match reader.allowance(token, owner, spender).await {
            Ok(current) if !needs_approval(Some(current), required) => {
                info!(current = %current, attempt, "Allowance confirmed");
                return Ok(current);
            }
            Ok(current) => {
                debug!(current = %current, attempt, "Allowance not yet visible");
                last_seen = Some(current);
            }
            Err(e) => {
                warn!(error = %e, attempt, "Allowance re-read failed");
            }
        }

        if attempt < attempts {
            tokio::time::sleep(recheck.backoff).await;
        }
    }

    let seen = last_seen.map_or_else(|| "unreadable".to_string(), |v| v.to_string());
    Err(EthernityError::Transaction(ClassifiedError::new(
        TxErrorKind::AllowanceStale,
        format!("Allowance is {seen} after approval, {required} required"),
    )))
}
