//! Callback surface for hosts that prefer push notifications over the watch channel.

use alloy_primitives::B256;

use super::state::Phase;
use crate::core::ClassifiedError;
use crate::types::{Artifact, FlowWarning};

/// Flow event callbacks. All methods default to no-ops.
///
/// Callbacks run synchronously on the task driving the flow and should not
/// block.
pub trait FlowObserver: Send + Sync {
    fn on_phase_change(&self, _flow_id: u64, _phase: Phase) {}

    /// The approval was mined and the allowance confirmed.
    fn on_approval_success(&self, _tx_hash: B256) {}

    fn on_transaction_success(&self, _tx_hash: B256, _artifact: Option<Artifact>) {}

    fn on_warning(&self, _warning: &FlowWarning) {}

    fn on_error(&self, _error: &ClassifiedError) {}
}
