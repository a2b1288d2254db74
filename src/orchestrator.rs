//! Approval-gated transaction orchestrator.
//!
//! One [`TransactionOrchestrator`] drives one logical user action (create a
//! fund, make a deposit, ...) through
//! `idle -> checking -> [approving -> approved ->] executing -> confirming -> success`.
//!
//! ## Cancellation
//!
//! [`TransactionOrchestrator::reset`] detaches, it does not abort. A
//! transaction that was already broadcast stays in the mempool and may still
//! be mined; the gas it spends and any tokens it moves are not recovered. The
//! orchestrator only stops tracking it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ethernity_sdk::prelude::*;
//!
//! let orchestrator = TransactionOrchestrator::new(
//!     CreateFund::new(plan),
//!     NetworkContext::for_chain(ARBITRUM_SEPOLIA_CHAIN_ID)?,
//!     AlloyChain::capabilities(chain),
//!     OrchestratorConfig::default(),
//! );
//! let mut updates = orchestrator.subscribe();
//! let outcome = orchestrator.execute_all().await?;
//! ```

mod config;
mod observer;
mod state;
#[cfg(test)]
mod tests;

pub use config::OrchestratorConfig;
pub use observer::FlowObserver;
pub use state::{FlowSnapshot, Phase};

use std::future::Future;
use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::actions::{CallContext, TargetAction};
use crate::allowance::{confirm_allowance, AllowanceGate, ApprovalDecision};
use crate::amount::transaction_cost;
use crate::chain::{BalanceReader, GasOracle, ReceiptWatcher, TxSubmitter, WalletSession};
use crate::core::{classify, ClassifiedError, EthernityError, NetworkContext, Result, TxErrorKind};
use crate::gas::{GasEstimate, GasEstimator, GasSource};
use crate::tx::{ensure_success, TransactionSubmitter};
use crate::types::{
    Artifact, ArtifactExtraction, CallRequest, FeeSuggestion, FlowWarning, PendingTransaction,
    Receipt, TransactionIntent,
};
use crate::verify::{self, BalanceVerifier, VerifyRequest};

/// The external capabilities a flow needs.
#[derive(Clone)]
pub struct Capabilities {
    pub wallet: Arc<dyn WalletSession>,
    pub balances: Arc<dyn BalanceReader>,
    pub gas: Arc<dyn GasOracle>,
    pub signer: Arc<dyn TxSubmitter>,
    pub receipts: Arc<dyn ReceiptWatcher>,
}

impl Capabilities {
    /// All capabilities backed by one object.
    pub fn from_chain<C>(chain: Arc<C>) -> Self
    where
        C: WalletSession + BalanceReader + GasOracle + TxSubmitter + ReceiptWatcher + 'static,
    {
        Self {
            wallet: chain.clone(),
            balances: chain.clone(),
            gas: chain.clone(),
            signer: chain.clone(),
            receipts: chain,
        }
    }
}

/// Result of a successful flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowOutcome {
    pub flow_id: u64,
    /// `None` when the existing allowance made the approval unnecessary
    pub approval_hash: Option<B256>,
    pub target_hash: B256,
    pub artifact: Option<Artifact>,
    /// Gas used by the approval (if any) and the target call
    pub gas_used: u64,
    pub receipt: Receipt,
    pub warnings: Vec<FlowWarning>,
}

/// Inputs resolved during `checking`.
#[derive(Debug, Clone, Copy)]
struct Prepared {
    account: Address,
    token: Address,
    spender: Address,
    target: Address,
    required: U256,
}

/// Generic approve-then-call state machine.
pub struct TransactionOrchestrator {
    action: Arc<dyn TargetAction>,
    network: NetworkContext,
    wallet: Arc<dyn WalletSession>,
    balances: Arc<dyn BalanceReader>,
    verifier: BalanceVerifier,
    gas: GasEstimator,
    gate: AllowanceGate,
    submitter: TransactionSubmitter,
    receipts: Arc<dyn ReceiptWatcher>,
    config: OrchestratorConfig,
    observer: Option<Arc<dyn FlowObserver>>,
    state: watch::Sender<FlowSnapshot>,
}

impl std::fmt::Debug for TransactionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionOrchestrator")
            .field("action", &self.action.label())
            .field("chain_id", &self.network.chain_id)
            .field("phase", &self.state.borrow().phase)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TransactionOrchestrator {
    pub fn new(
        action: impl TargetAction + 'static,
        network: NetworkContext,
        caps: Capabilities,
        config: OrchestratorConfig,
    ) -> Self {
        Self::with_action(Arc::new(action), network, caps, config)
    }

    /// Same as [`new`](Self::new) for an action that is already shared.
    pub fn with_action(
        action: Arc<dyn TargetAction>,
        network: NetworkContext,
        caps: Capabilities,
        config: OrchestratorConfig,
    ) -> Self {
        let verifier = BalanceVerifier::new(caps.balances.clone())
            .with_min_native_balance(config.min_native_balance);
        let gas = GasEstimator::new(caps.gas)
            .with_buffer_percent(config.gas_buffer_percent)
            .with_ceiling(config.gas_ceiling)
            .with_timeout(config.gas_estimate_timeout);
        let (state, _) = watch::channel(FlowSnapshot::idle(0));

        Self {
            action,
            network,
            wallet: caps.wallet,
            balances: caps.balances,
            verifier,
            gas,
            gate: AllowanceGate::new(config.approval_amount),
            submitter: TransactionSubmitter::new(caps.signer),
            receipts: caps.receipts,
            config,
            observer: None,
            state,
        }
    }

    /// Attach a callback observer
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn FlowObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Live view of the flow state.
    pub fn subscribe(&self) -> watch::Receiver<FlowSnapshot> {
        self.state.subscribe()
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> FlowSnapshot {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state.borrow().phase
    }

    #[must_use]
    pub fn progress(&self) -> u8 {
        self.state.borrow().progress
    }

    #[must_use]
    pub fn network(&self) -> &NetworkContext {
        &self.network
    }

    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Run the whole flow: verify, approve if needed, call, confirm.
    ///
    /// Fails with [`EthernityError::FlowBusy`] and no side effects unless idle.
    /// Every other failure is classified and leaves the orchestrator in
    /// [`Phase::Error`] until [`reset`](Self::reset).
    #[instrument(skip(self), fields(action = %self.action.label(), chain_id = self.network.chain_id))]
    pub async fn execute_all(&self) -> Result<FlowOutcome> {
        let flow_id = self.claim(|phase| (phase == Phase::Idle).then_some(Phase::Checking))?;
        let result = self.run_all(flow_id).await;
        self.settle(flow_id, result)
    }

    /// Single step: verify and approve, stopping at [`Phase::Approved`].
    ///
    /// Returns the approval hash, or `None` when the existing allowance
    /// already covers the amount and no transaction was sent.
    #[instrument(skip(self), fields(action = %self.action.label(), chain_id = self.network.chain_id))]
    pub async fn approve(&self) -> Result<Option<B256>> {
        let flow_id = self.claim(|phase| (phase == Phase::Idle).then_some(Phase::Checking))?;
        let result = self.run_approve_step(flow_id).await;
        self.settle(flow_id, result)
    }

    /// Single step: submit and confirm the target call.
    ///
    /// Runs from [`Phase::Approved`], or from [`Phase::Idle`] when no approval
    /// is needed. From idle with an insufficient allowance the flow fails with
    /// `AllowanceStale` before anything is sent. Balances are verified again
    /// on both paths.
    #[instrument(skip(self), fields(action = %self.action.label(), chain_id = self.network.chain_id))]
    pub async fn execute(&self) -> Result<FlowOutcome> {
        let mut resumed = false;
        let flow_id = self.claim(|phase| match phase {
            Phase::Idle => Some(Phase::Checking),
            Phase::Approved => {
                resumed = true;
                Some(Phase::Executing)
            }
            _ => None,
        })?;

        let result = if resumed {
            self.run_execute_resumed(flow_id).await
        } else {
            self.run_execute_fresh(flow_id).await
        };
        self.settle(flow_id, result)
    }

    /// Return to idle from any phase.
    ///
    /// A running flow is detached: it stops updating state, fires no more
    /// callbacks and resolves with [`EthernityError::FlowDetached`]. A
    /// transaction already broadcast is not cancelled; it is returned here so
    /// the caller can keep an eye on it.
    pub fn reset(&self) -> Option<PendingTransaction> {
        let mut detached = None;
        let mut flow_id = 0;
        self.state.send_modify(|s| {
            detached = s.pending.take();
            flow_id = s.flow_id.wrapping_add(1);
            *s = FlowSnapshot::idle(flow_id);
        });

        match &detached {
            Some(pending) => warn!(
                flow_id,
                tx_hash = %pending.hash,
                "Reset while a transaction was pending; it may still be mined"
            ),
            None => info!(flow_id, "Orchestrator reset"),
        }
        self.notify(|o| o.on_phase_change(flow_id, Phase::Idle));
        detached
    }

    // ------------------------------------------------------------------------
    // Steps
    // ------------------------------------------------------------------------

    async fn run_all(&self, flow_id: u64) -> Result<FlowOutcome> {
        let prepared = self.preflight(flow_id).await?;
        let allowance = match self.decision(flow_id, &prepared) {
            ApprovalDecision::Required { amount } => {
                self.run_approval(flow_id, &prepared, amount).await?
            }
            ApprovalDecision::NotNeeded => self.observed_allowance(),
        };
        self.advance(flow_id, Phase::Executing)?;
        self.run_target(flow_id, &prepared, allowance).await
    }

    async fn run_approve_step(&self, flow_id: u64) -> Result<Option<B256>> {
        let prepared = self.preflight(flow_id).await?;
        match self.decision(flow_id, &prepared) {
            ApprovalDecision::Required { amount } => {
                self.run_approval(flow_id, &prepared, amount).await?;
                Ok(self.state.borrow().approval_hash)
            }
            ApprovalDecision::NotNeeded => {
                let allowance = self.observed_allowance();
                self.advance_with(flow_id, Phase::Approved, |s| {
                    s.confirmed_allowance = Some(allowance);
                })?;
                Ok(None)
            }
        }
    }

    async fn run_execute_fresh(&self, flow_id: u64) -> Result<FlowOutcome> {
        let prepared = self.preflight(flow_id).await?;
        if self.decision(flow_id, &prepared).is_required() {
            return Err(ClassifiedError::new(
                TxErrorKind::AllowanceStale,
                "Token approval is required before this call",
            )
            .into());
        }
        self.advance(flow_id, Phase::Executing)?;
        self.run_target(flow_id, &prepared, self.observed_allowance())
            .await
    }

    /// Continue a flow that `approve()` left in `approved`. Balances and the
    /// allowance are read again since time may have passed.
    async fn run_execute_resumed(&self, flow_id: u64) -> Result<FlowOutcome> {
        let started_with = self.state.borrow().account;
        let account = started_with.ok_or_else(|| {
            EthernityError::internal(format!("Flow {flow_id} reached approved without an account"))
        })?;
        let prepared = Prepared {
            account: self.session_account(Some(account))?,
            token: self.network.token()?,
            spender: self.action.spender(&self.network)?,
            target: self.action.target(&self.network)?,
            required: self.action.required_amount(),
        };

        self.verify_balances(flow_id, &prepared).await?;
        let allowance = match self.decision(flow_id, &prepared) {
            ApprovalDecision::NotNeeded => self.observed_allowance(),
            ApprovalDecision::Required { .. } => {
                let read = self.state.borrow().validation.as_ref().and_then(|v| v.allowance);
                let message = match read {
                    Some(allowance) => format!(
                        "Allowance {allowance} no longer covers {}",
                        prepared.required
                    ),
                    None => format!("Allowance could not be read; {} required", prepared.required),
                };
                return Err(ClassifiedError::new(TxErrorKind::AllowanceStale, message).into());
            }
        };
        self.run_target(flow_id, &prepared, allowance).await
    }

    /// `checking`: input validation then balance verification. Nothing is
    /// signed or sent.
    async fn preflight(&self, flow_id: u64) -> Result<Prepared> {
        self.action.validate()?;
        let account = self.session_account(None)?;

        let required = self.action.required_amount();
        if required.is_zero() {
            return Err(EthernityError::validation_field(
                "Amount must be greater than zero",
                "amount",
            ));
        }
        let prepared = Prepared {
            account,
            token: self.network.token()?,
            spender: self.action.spender(&self.network)?,
            target: self.action.target(&self.network)?,
            required,
        };
        self.update(flow_id, |s| s.account = Some(account))?;

        self.verify_balances(flow_id, &prepared).await?;
        Ok(prepared)
    }

    /// Read token, native and allowance state, record it on the snapshot and
    /// fail on a short balance.
    async fn verify_balances(&self, flow_id: u64, prepared: &Prepared) -> Result<()> {
        let request = VerifyRequest {
            owner: prepared.account,
            token: prepared.token,
            spender: prepared.spender,
            required: prepared.required,
        };
        let validation = self
            .guarded(flow_id, async { Ok(self.verifier.verify(&request).await) })
            .await?;
        self.update(flow_id, |s| s.validation = Some(validation.clone()))?;

        verify::check(&validation, self.network.token_decimals)?;
        Ok(())
    }

    fn decision(&self, flow_id: u64, prepared: &Prepared) -> ApprovalDecision {
        let allowance = self
            .state
            .borrow()
            .validation
            .as_ref()
            .and_then(|v| v.allowance);
        let decision = self.gate.decide(allowance, prepared.required);
        debug!(
            flow_id,
            spender = %prepared.spender,
            required = %prepared.required,
            current = ?allowance,
            approval_required = decision.is_required(),
            "Approval decision"
        );
        decision
    }

    /// `approving -> approved`: submit `approve`, wait for it, then read the
    /// allowance back from the node. Returns the confirmed allowance.
    async fn run_approval(&self, flow_id: u64, prepared: &Prepared, amount: U256) -> Result<U256> {
        self.advance(flow_id, Phase::Approving)?;

        self.session_account(Some(prepared.account))?;
        let intent = TransactionIntent::approval(prepared.token, prepared.spender, amount);
        let intent = self
            .finalize(flow_id, prepared.account, intent, None)
            .await?;

        let pending = self.guarded(flow_id, self.submitter.submit(intent)).await?;
        let hash = pending.hash;
        self.update(flow_id, |s| {
            s.approval_hash = Some(hash);
            s.pending = Some(pending);
        })?;

        let receipt = self.confirm(flow_id, hash).await?;
        self.update(flow_id, |s| s.approval_gas_used = Some(receipt.gas_used))?;

        if !self.config.approval_settle_delay.is_zero() {
            self.guarded(flow_id, async {
                tokio::time::sleep(self.config.approval_settle_delay).await;
                Ok(())
            })
            .await?;
        }

        let allowance = self
            .guarded(
                flow_id,
                confirm_allowance(
                    self.balances.as_ref(),
                    prepared.token,
                    prepared.account,
                    prepared.spender,
                    prepared.required,
                    self.config.allowance_recheck,
                ),
            )
            .await?;

        self.advance_with(flow_id, Phase::Approved, |s| {
            s.confirmed_allowance = Some(allowance);
        })?;
        info!(flow_id, tx_hash = %hash, allowance = %allowance, "Approval confirmed");
        self.notify(|o| o.on_approval_success(hash));
        Ok(allowance)
    }

    /// `executing -> confirming -> success`. The caller has already entered
    /// `executing`; the calldata is built only now.
    async fn run_target(
        &self,
        flow_id: u64,
        prepared: &Prepared,
        allowance: U256,
    ) -> Result<FlowOutcome> {
        let account = self.session_account(Some(prepared.account))?;

        let ctx = CallContext {
            account,
            network: &self.network,
            target: prepared.target,
            allowance,
        };
        let data = self.action.build_call(&ctx)?;
        let call = CallRequest::new(prepared.target, data).with_value(self.action.value());
        let intent = TransactionIntent::target(self.action.label(), call);
        let intent = self
            .finalize(flow_id, account, intent, self.action.gas_ceiling())
            .await?;

        let pending = self.guarded(flow_id, self.submitter.submit(intent)).await?;
        let hash = pending.hash;
        self.update(flow_id, |s| {
            s.target_hash = Some(hash);
            s.pending = Some(pending);
        })?;
        self.advance(flow_id, Phase::Confirming)?;

        let receipt = self.confirm(flow_id, hash).await?;

        let artifact = match self.action.extract_artifact(&receipt, prepared.target) {
            ArtifactExtraction::Found(artifact) => Some(artifact),
            ArtifactExtraction::NotExpected => None,
            ArtifactExtraction::Unparsed { reason } => {
                self.warn(flow_id, FlowWarning::ArtifactUnparsed { tx_hash: hash, reason })?;
                None
            }
        };

        self.advance(flow_id, Phase::Success)?;
        info!(flow_id, tx_hash = %hash, artifact = ?artifact, "Flow succeeded");
        self.notify(|o| o.on_transaction_success(hash, artifact));

        let (approval_hash, approval_gas, warnings) = {
            let s = self.state.borrow();
            (
                s.approval_hash,
                s.approval_gas_used.unwrap_or(0),
                s.warnings.clone(),
            )
        };
        Ok(FlowOutcome {
            flow_id,
            approval_hash,
            target_hash: hash,
            artifact,
            gas_used: approval_gas.saturating_add(receipt.gas_used),
            receipt,
            warnings,
        })
    }

    /// Estimate gas and fees for an intent; `ceiling` overrides the fallback.
    async fn finalize(
        &self,
        flow_id: u64,
        account: Address,
        intent: TransactionIntent,
        ceiling: Option<u64>,
    ) -> Result<TransactionIntent> {
        let call = intent.call().clone().with_from(account);
        let estimate = self
            .guarded(flow_id, async { Ok(self.gas.estimate(&call, ceiling).await) })
            .await?;
        if let GasSource::Fallback { reason } = &estimate.source {
            self.warn(
                flow_id,
                FlowWarning::GasEstimateFallback {
                    gas_limit: estimate.gas_limit,
                    reason: reason.clone(),
                },
            )?;
        }

        let suggestion = self
            .guarded(flow_id, async { Ok(self.gas.suggest_fees().await) })
            .await?;
        let fees = match suggestion {
            Ok(fees) => Some(fees),
            Err(reason) => {
                self.warn(flow_id, FlowWarning::FeeSuggestionUnavailable { reason })?;
                None
            }
        };

        self.ensure_gas_cost(flow_id, account, &estimate, fees, call.value)
            .await?;
        Ok(intent.finalized(account, estimate.gas_limit, fees))
    }

    /// Precise gas check once a real estimate and fee are known. An
    /// unreadable balance counts as insufficient.
    async fn ensure_gas_cost(
        &self,
        flow_id: u64,
        account: Address,
        estimate: &GasEstimate,
        fees: Option<FeeSuggestion>,
        value: U256,
    ) -> Result<()> {
        let Some(fees) = fees else { return Ok(()) };
        if !self.config.check_gas_cost || estimate.is_fallback() {
            return Ok(());
        }

        let cost =
            transaction_cost(estimate.gas_limit, fees.max_fee_per_gas).saturating_add(value);
        match self
            .guarded(flow_id, self.balances.native_balance(account))
            .await
        {
            Ok(balance) if balance < cost => Err(ClassifiedError::new(
                TxErrorKind::InsufficientGas,
                format!("Insufficient ETH for gas fees: need {cost} wei, have {balance} wei"),
            )
            .into()),
            Ok(_) => Ok(()),
            Err(e @ EthernityError::FlowDetached { .. }) => Err(e),
            Err(e) => {
                warn!(flow_id, error = %e, "Native balance unavailable before submission");
                Err(ClassifiedError::new(
                    TxErrorKind::InsufficientGas,
                    format!("ETH balance could not be read; {cost} wei required"),
                )
                .into())
            }
        }
    }

    /// Wait for the tracked transaction, release it, and require success.
    async fn confirm(&self, flow_id: u64, hash: B256) -> Result<Receipt> {
        let receipt = self
            .guarded(
                flow_id,
                self.receipts
                    .wait_for_receipt(hash, self.config.receipt_timeout),
            )
            .await?;
        self.update(flow_id, |s| s.pending = None)?;
        ensure_success(receipt)
    }

    // ------------------------------------------------------------------------
    // Session and state helpers
    // ------------------------------------------------------------------------

    /// Active account, checked against the flow network and, when given,
    /// against the account the flow started with.
    fn session_account(&self, expected: Option<Address>) -> Result<Address> {
        let account = self.wallet.active_account().ok_or_else(|| {
            ClassifiedError::new(TxErrorKind::AccountUnavailable, "Wallet not connected")
        })?;
        if let Some(expected) = expected {
            if expected != account {
                return Err(ClassifiedError::new(
                    TxErrorKind::AccountUnavailable,
                    format!("Active account changed from {expected} to {account} during the flow"),
                )
                .into());
            }
        }
        match self.wallet.chain_id() {
            Some(chain_id) if chain_id == self.network.chain_id => Ok(account),
            Some(chain_id) => Err(ClassifiedError::new(
                TxErrorKind::WrongNetwork,
                format!(
                    "Wallet is on chain {chain_id}, expected chain {}",
                    self.network.chain_id
                ),
            )
            .into()),
            None => Err(ClassifiedError::new(
                TxErrorKind::WrongNetwork,
                "Wallet network is unknown",
            )
            .into()),
        }
    }

    fn observed_allowance(&self) -> U256 {
        self.state
            .borrow()
            .validation
            .as_ref()
            .and_then(|v| v.allowance)
            .unwrap_or(U256::ZERO)
    }

    /// Atomically start (or resume) a flow. `next` maps the current phase to
    /// the phase to enter, `None` meaning busy.
    fn claim(&self, mut next: impl FnMut(Phase) -> Option<Phase>) -> Result<u64> {
        let mut outcome = Err(EthernityError::internal("claim did not run"));
        self.state.send_if_modified(|s| match next(s.phase) {
            Some(phase) => {
                s.enter(phase);
                outcome = Ok((s.flow_id, phase));
                true
            }
            None => {
                outcome = Err(EthernityError::FlowBusy { phase: s.phase });
                false
            }
        });

        let (flow_id, phase) = outcome?;
        info!(flow_id, phase = %phase, "Flow started");
        self.notify(|o| o.on_phase_change(flow_id, phase));
        Ok(flow_id)
    }

    fn advance(&self, flow_id: u64, next: Phase) -> Result<()> {
        self.advance_with(flow_id, next, |_| {})
    }

    fn advance_with(
        &self,
        flow_id: u64,
        next: Phase,
        apply: impl FnOnce(&mut FlowSnapshot),
    ) -> Result<()> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|s| {
            if s.flow_id != flow_id {
                outcome = Err(EthernityError::FlowDetached { flow_id });
                return false;
            }
            if !s.phase.can_advance_to(next) {
                outcome = Err(EthernityError::internal(format!(
                    "Illegal phase transition {} -> {next}",
                    s.phase
                )));
                return false;
            }
            s.enter(next);
            apply(s);
            true
        });
        outcome?;

        info!(flow_id, phase = %next, progress = next.progress(), "Phase transition");
        self.notify(|o| o.on_phase_change(flow_id, next));
        Ok(())
    }

    /// Mutate the snapshot of `flow_id` without changing phase.
    fn update(&self, flow_id: u64, apply: impl FnOnce(&mut FlowSnapshot)) -> Result<()> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|s| {
            if s.flow_id != flow_id {
                outcome = Err(EthernityError::FlowDetached { flow_id });
                return false;
            }
            apply(s);
            true
        });
        outcome
    }

    fn warn(&self, flow_id: u64, warning: FlowWarning) -> Result<()> {
        warn!(flow_id, warning = %warning, "Recovered flow condition");
        let notice = warning.clone();
        self.update(flow_id, |s| s.warnings.push(warning))?;
        self.notify(|o| o.on_warning(&notice));
        Ok(())
    }

    /// Run `fut` unless the flow is detached first.
    async fn guarded<T>(&self, flow_id: u64, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let mut rx = self.state.subscribe();
        tokio::select! {
            res = fut => res,
            () = detached(&mut rx, flow_id) => Err(EthernityError::FlowDetached { flow_id }),
        }
    }

    /// Route a flow failure through the classifier into `error`.
    fn settle<T>(&self, flow_id: u64, result: Result<T>) -> Result<T> {
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err @ EthernityError::FlowDetached { .. }) => {
                debug!(flow_id, "Flow detached by reset");
                return Err(err);
            }
            Err(err) => err,
        };

        let classified = classify(err);
        let recorded = classified.clone();
        let mut moved = false;
        self.state.send_if_modified(|s| {
            if s.flow_id != flow_id || !s.phase.can_advance_to(Phase::Error) {
                return false;
            }
            s.enter(Phase::Error);
            s.pending = None;
            s.error = Some(recorded);
            moved = true;
            true
        });

        if moved {
            warn!(
                flow_id,
                kind = %classified.kind(),
                error = %classified,
                "Flow failed"
            );
            self.notify(|o| o.on_phase_change(flow_id, Phase::Error));
            self.notify(|o| o.on_error(&classified));
        }
        Err(EthernityError::Transaction(classified))
    }

    fn notify(&self, event: impl FnOnce(&dyn FlowObserver)) {
        if let Some(observer) = &self.observer {
            event(observer.as_ref());
        }
    }
}

/// Resolves once the snapshot belongs to another flow.
async fn detached(rx: &mut watch::Receiver<FlowSnapshot>, flow_id: u64) {
    loop {
        if rx.borrow_and_update().flow_id != flow_id {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone: the orchestrator itself was dropped
            std::future::pending::<()>().await;
        }
    }
}
