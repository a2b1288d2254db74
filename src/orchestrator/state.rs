//! Flow phases and the observable snapshot.

use std::fmt;

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::core::ClassifiedError;
use crate::types::{FlowWarning, PendingTransaction, Validation};

/// Phase of an approval-gated flow.
///
/// Phases only move forward along
/// `idle -> checking -> [approving -> approved ->] executing -> confirming -> success`,
/// with `error` reachable from every phase between `checking` and `confirming`.
/// `approve()` also takes `checking -> approved` directly when the existing
/// allowance already covers the amount. Only [`reset`](super::TransactionOrchestrator::reset) goes back to `idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Idle,
    Checking,
    Approving,
    Approved,
    Executing,
    Confirming,
    Success,
    Error,
}

impl Phase {
    /// Progress percentage shown for the phase.
    #[must_use]
    pub const fn progress(&self) -> u8 {
        match self {
            Self::Idle | Self::Error => 0,
            Self::Checking => 10,
            Self::Approving => 25,
            Self::Approved => 50,
            Self::Executing => 70,
            Self::Confirming => 90,
            Self::Success => 100,
        }
    }

    /// Success or error; only a reset leaves these.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }

    /// A flow is running (neither idle nor finished).
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::Idle) && !self.is_terminal()
    }

    /// Whether `next` is a forward edge of the phase graph.
    ///
    /// `checking -> approved` is the edge taken by a single-step approve when
    /// the existing allowance already covers the amount.
    #[must_use]
    pub const fn can_advance_to(&self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (*self, next),
            (Idle, Checking)
                | (Checking, Approving | Approved | Executing | Error)
                | (Approving, Approved | Error)
                | (Approved, Executing | Error)
                | (Executing, Confirming | Error)
                | (Confirming, Success | Error)
        )
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::Approving => "approving",
            Self::Approved => "approved",
            Self::Executing => "executing",
            Self::Confirming => "confirming",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a UI observes about the current flow.
#[derive(Debug, Clone)]
pub struct FlowSnapshot {
    /// Bumped by every reset
    pub flow_id: u64,
    pub phase: Phase,
    /// Always `phase.progress()`
    pub progress: u8,
    pub error: Option<ClassifiedError>,
    /// Account the flow was started with
    pub account: Option<Address>,
    pub approval_hash: Option<B256>,
    /// Gas used by the mined approval
    pub approval_gas_used: Option<u64>,
    pub target_hash: Option<B256>,
    /// The one transaction currently being tracked
    pub pending: Option<PendingTransaction>,
    pub validation: Option<Validation>,
    /// Allowance read back after the approval was mined
    pub confirmed_allowance: Option<U256>,
    pub warnings: Vec<FlowWarning>,
    /// Phases visited by this flow, starting with `Idle`
    pub history: Vec<Phase>,
}

impl FlowSnapshot {
    pub(crate) fn idle(flow_id: u64) -> Self {
        Self {
            flow_id,
            phase: Phase::Idle,
            progress: Phase::Idle.progress(),
            error: None,
            account: None,
            approval_hash: None,
            approval_gas_used: None,
            target_hash: None,
            pending: None,
            validation: None,
            confirmed_allowance: None,
            warnings: Vec::new(),
            history: vec![Phase::Idle],
        }
    }

    pub(crate) fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.progress = phase.progress();
        self.history.push(phase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Phase; 8] = [
        Phase::Idle,
        Phase::Checking,
        Phase::Approving,
        Phase::Approved,
        Phase::Executing,
        Phase::Confirming,
        Phase::Success,
        Phase::Error,
    ];

    #[test]
    fn test_progress_values() {
        let progress: Vec<u8> = ALL.iter().map(Phase::progress).collect();
        assert_eq!(progress, vec![0, 10, 25, 50, 70, 90, 100, 0]);
    }

    #[test]
    fn test_no_reentry_into_approving() {
        for from in [Phase::Approved, Phase::Executing, Phase::Confirming, Phase::Success] {
            assert!(!from.can_advance_to(Phase::Approving), "{from} -> approving");
        }
    }

    #[test]
    fn test_terminal_phases_have_no_exits() {
        for to in ALL {
            assert!(!Phase::Success.can_advance_to(to));
            assert!(!Phase::Error.can_advance_to(to));
        }
    }

    #[test]
    fn test_confirming_cannot_be_skipped() {
        assert!(!Phase::Executing.can_advance_to(Phase::Success));
        assert!(!Phase::Idle.can_advance_to(Phase::Error));
        assert!(Phase::Checking.can_advance_to(Phase::Error));
    }

    #[test]
    fn test_approve_can_skip_to_approved() {
        assert!(Phase::Checking.can_advance_to(Phase::Approved));
        assert!(Phase::Checking.can_advance_to(Phase::Executing));
        assert!(!Phase::Idle.can_advance_to(Phase::Approved));
    }

    #[test]
    fn test_active() {
        assert!(!Phase::Idle.is_active());
        assert!(Phase::Approved.is_active());
        assert!(!Phase::Error.is_active());
        assert_eq!(Phase::Confirming.to_string(), "confirming");
    }
}
