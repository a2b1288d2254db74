//! Flow tests against an in-memory chain.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use async_trait::async_trait;

use super::*;
use crate::abi::{selector, ERC20_APPROVE_SELECTOR};
use crate::actions::{ContractCall, CreateFund, FundDeposit, RetirementPlan, DEPOSIT_GAS_CEILING};
use crate::allowance::ApprovalAmount;
use crate::amount::TokenAmount;
use crate::chain::ReceiptSource;
use crate::core::{ContractAddresses, TxErrorKind};
use crate::tx::PollingReceiptWatcher;
use crate::types::LogEntry;

const CHAIN_ID: u64 = 421_614;

fn account() -> Address {
    Address::repeat_byte(0xaa)
}

fn usdc() -> Address {
    Address::repeat_byte(0x11)
}

fn factory() -> Address {
    Address::repeat_byte(0x22)
}

fn fund() -> Address {
    Address::repeat_byte(0x44)
}

fn usd(whole: u64) -> U256 {
    U256::from(whole) * U256::from(1_000_000u64)
}

fn network() -> NetworkContext {
    NetworkContext::new(
        CHAIN_ID,
        ContractAddresses {
            usdc: usdc(),
            personal_fund_factory: factory(),
            treasury: Address::repeat_byte(0x33),
        },
    )
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig::default()
        .with_approval_settle_delay(Duration::ZERO)
        .with_allowance_recheck(2, Duration::from_millis(10))
        .with_receipt_timeout(Duration::from_secs(30))
}

// ----------------------------------------------------------------------------
// Fake chain
// ----------------------------------------------------------------------------

struct ChainState {
    account: Option<Address>,
    chain_id: Option<u64>,
    token_balance: U256,
    native_balance: U256,
    allowance: U256,
    estimate: Option<u64>,
    gas_price: u128,
    reject_target: bool,
    revert_target: bool,
    never_mine: bool,
    approval_has_no_effect: bool,
    switch_account_on_approval: Option<Address>,
    switch_chain_on_approval: Option<u64>,
    /// Native balance reads that succeed before the node starts failing.
    native_reads_allowed: Option<usize>,
    native_reads: usize,
    target_logs: Vec<LogEntry>,
    submitted: Vec<CallRequest>,
    receipts: HashMap<B256, Receipt>,
}

struct FakeChain {
    state: Mutex<ChainState>,
}

impl FakeChain {
    fn new() -> Self {
        Self {
            state: Mutex::new(ChainState {
                account: Some(account()),
                chain_id: Some(CHAIN_ID),
                token_balance: usd(1_000),
                native_balance: U256::from(10u64).pow(U256::from(18u64)),
                allowance: U256::ZERO,
                estimate: Some(60_000),
                gas_price: 1_000_000_000,
                reject_target: false,
                revert_target: false,
                never_mine: false,
                approval_has_no_effect: false,
                switch_account_on_approval: None,
                switch_chain_on_approval: None,
                native_reads_allowed: None,
                native_reads: 0,
                target_logs: Vec::new(),
                submitted: Vec::new(),
                receipts: HashMap::new(),
            }),
        }
    }

    fn with(self, apply: impl FnOnce(&mut ChainState)) -> Self {
        apply(&mut self.state.lock().unwrap());
        self
    }

    fn submitted(&self) -> Vec<CallRequest> {
        self.state.lock().unwrap().submitted.clone()
    }

    fn allowance_now(&self) -> U256 {
        self.state.lock().unwrap().allowance
    }
}

impl WalletSession for FakeChain {
    fn active_account(&self) -> Option<Address> {
        self.state.lock().unwrap().account
    }

    fn chain_id(&self) -> Option<u64> {
        self.state.lock().unwrap().chain_id
    }
}

#[async_trait]
impl BalanceReader for FakeChain {
    async fn token_balance(&self, _token: Address, _owner: Address) -> Result<U256> {
        Ok(self.state.lock().unwrap().token_balance)
    }

    async fn native_balance(&self, _owner: Address) -> Result<U256> {
        let mut s = self.state.lock().unwrap();
        s.native_reads += 1;
        match s.native_reads_allowed {
            Some(allowed) if s.native_reads > allowed => {
                Err(EthernityError::network_simple("connection reset"))
            }
            _ => Ok(s.native_balance),
        }
    }

    async fn allowance(&self, _token: Address, _owner: Address, _spender: Address) -> Result<U256> {
        Ok(self.state.lock().unwrap().allowance)
    }
}

#[async_trait]
impl GasOracle for FakeChain {
    async fn estimate_gas(&self, _call: &CallRequest) -> Result<u64> {
        self.state
            .lock()
            .unwrap()
            .estimate
            .ok_or_else(|| EthernityError::rpc(Some(3), "execution reverted"))
    }

    async fn gas_price(&self) -> Result<u128> {
        Ok(self.state.lock().unwrap().gas_price)
    }
}

#[async_trait]
impl TxSubmitter for FakeChain {
    async fn sign_and_broadcast(&self, call: &CallRequest) -> Result<B256> {
        let mut s = self.state.lock().unwrap();
        let is_approval = call.selector() == Some(ERC20_APPROVE_SELECTOR);

        if !is_approval && s.reject_target {
            return Err(EthernityError::rpc(Some(4001), "User rejected the request."));
        }

        s.submitted.push(call.clone());
        let nonce = s.submitted.len() as u64;
        let hash = keccak256(nonce.to_be_bytes());

        let mut receipt = Receipt {
            tx_hash: hash,
            success: true,
            block_number: Some(100 + nonce),
            gas_used: 50_000,
            logs: Vec::new(),
        };
        if is_approval {
            if !s.approval_has_no_effect {
                s.allowance = U256::from_be_slice(&call.data[36..68]);
            }
            if let Some(next) = s.switch_account_on_approval {
                s.account = Some(next);
            }
            if let Some(next) = s.switch_chain_on_approval {
                s.chain_id = Some(next);
            }
        } else {
            receipt.success = !s.revert_target;
            receipt.logs = s.target_logs.clone();
        }
        if !s.never_mine {
            s.receipts.insert(hash, receipt);
        }
        Ok(hash)
    }
}

#[async_trait]
impl ReceiptSource for FakeChain {
    async fn fetch_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>> {
        Ok(self.state.lock().unwrap().receipts.get(&tx_hash).cloned())
    }
}

#[async_trait]
impl ReceiptWatcher for FakeChain {
    async fn wait_for_receipt(&self, tx_hash: B256, timeout: Duration) -> Result<Receipt> {
        let found = self.state.lock().unwrap().receipts.get(&tx_hash).cloned();
        match found {
            Some(receipt) => Ok(receipt),
            None => {
                tokio::time::sleep(timeout).await;
                Err(EthernityError::ConfirmationTimeout {
                    tx_hash,
                    waited: timeout,
                })
            }
        }
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl FlowObserver for Recorder {
    fn on_phase_change(&self, _flow_id: u64, phase: Phase) {
        self.events.lock().unwrap().push(phase.to_string());
    }

    fn on_approval_success(&self, _tx_hash: B256) {
        self.events.lock().unwrap().push("approval_success".to_string());
    }

    fn on_transaction_success(&self, _tx_hash: B256, artifact: Option<Artifact>) {
        let tag = if artifact.is_some() { "with_artifact" } else { "no_artifact" };
        self.events.lock().unwrap().push(format!("transaction_success:{tag}"));
    }

    fn on_warning(&self, _warning: &FlowWarning) {
        self.events.lock().unwrap().push("warning".to_string());
    }

    fn on_error(&self, error: &ClassifiedError) {
        self.events.lock().unwrap().push(format!("error:{}", error.kind()));
    }
}

fn deposit(amount: U256) -> ContractCall {
    ContractCall::new("deposit", fund(), Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]), amount)
}

fn orchestrator(chain: &Arc<FakeChain>, action: impl TargetAction + 'static) -> TransactionOrchestrator {
    TransactionOrchestrator::new(action, network(), Capabilities::from_chain(chain.clone()), config())
}

fn kind_of(err: &EthernityError) -> TxErrorKind {
    err.classified().map(ClassifiedError::kind).unwrap_or_else(|| {
        panic!("expected a classified error, got {err:?}");
    })
}

fn plan() -> RetirementPlan {
    RetirementPlan {
        principal: usd(100),
        monthly_deposit: usd(10),
        current_age: 35,
        retirement_age: 65,
        desired_monthly_income: usd(2_000),
        years_payments: 20,
        interest_rate_bps: 500,
        timelock_years: 1,
    }
}

fn creation_log(created: Address) -> LogEntry {
    LogEntry {
        address: factory(),
        topics: vec![keccak256("FundCreated(address,address)"), created.into_word()],
        data: Bytes::new(),
    }
}

// ----------------------------------------------------------------------------
// Full flow
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_execute_all_with_approval() {
    let chain = Arc::new(FakeChain::new());
    let orch = orchestrator(&chain, deposit(usd(100)));

    let outcome = orch.execute_all().await.unwrap();

    let snapshot = orch.snapshot();
    assert_eq!(
        snapshot.history,
        vec![
            Phase::Idle,
            Phase::Checking,
            Phase::Approving,
            Phase::Approved,
            Phase::Executing,
            Phase::Confirming,
            Phase::Success,
        ]
    );
    assert_eq!(snapshot.progress, 100);
    assert_eq!(snapshot.confirmed_allowance, Some(usd(100)));
    assert!(snapshot.pending.is_none());
    assert!(outcome.approval_hash.is_some());
    assert_eq!(snapshot.approval_hash, outcome.approval_hash);
    assert_eq!(snapshot.target_hash, Some(outcome.target_hash));
    assert_eq!(outcome.gas_used, 100_000);

    let sent = chain.submitted();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].selector(), Some(ERC20_APPROVE_SELECTOR));
    assert_eq!(sent[0].to, usdc());
    assert_eq!(sent[1].to, fund());
    assert_eq!(sent[1].from, Some(account()));
    // 60k estimate with the 20% buffer
    assert_eq!(sent[1].gas_limit, Some(72_000));
    assert_eq!(sent[1].max_priority_fee_per_gas, Some(100_000_000));
}

#[tokio::test]
async fn test_execute_all_skips_covered_approval() {
    let chain = Arc::new(FakeChain::new().with(|s| s.allowance = usd(500)));
    let orch = orchestrator(&chain, deposit(usd(100)));

    let outcome = orch.execute_all().await.unwrap();

    assert!(outcome.approval_hash.is_none());
    assert_eq!(
        orch.snapshot().history,
        vec![
            Phase::Idle,
            Phase::Checking,
            Phase::Executing,
            Phase::Confirming,
            Phase::Success,
        ]
    );
    assert_eq!(chain.submitted().len(), 1);
}

#[tokio::test]
async fn test_unlimited_approval_policy() {
    let chain = Arc::new(FakeChain::new());
    let orch = TransactionOrchestrator::new(
        deposit(usd(100)),
        network(),
        Capabilities::from_chain(chain.clone()),
        config().with_approval_amount(ApprovalAmount::Unlimited),
    );

    orch.execute_all().await.unwrap();
    assert_eq!(chain.allowance_now(), U256::MAX);
}

// ----------------------------------------------------------------------------
// Pre-flight failures
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_insufficient_token_sends_nothing() {
    let chain = Arc::new(FakeChain::new().with(|s| s.token_balance = usd(10)));
    let orch = orchestrator(&chain, deposit(usd(100)));

    let err = orch.execute_all().await.unwrap_err();

    assert_eq!(kind_of(&err), TxErrorKind::InsufficientToken);
    let snapshot = orch.snapshot();
    assert_eq!(snapshot.phase, Phase::Error);
    assert_eq!(snapshot.progress, 0);
    assert_eq!(snapshot.error.map(|e| e.kind()), Some(TxErrorKind::InsufficientToken));
    assert_eq!(snapshot.validation.map(|v| v.shortfall), Some(usd(90)));
    assert!(chain.submitted().is_empty());
}

#[tokio::test]
async fn test_insufficient_native_balance() {
    let chain = Arc::new(FakeChain::new().with(|s| s.native_balance = U256::ZERO));
    let orch = orchestrator(&chain, deposit(usd(100)));

    let err = orch.execute_all().await.unwrap_err();

    assert_eq!(kind_of(&err), TxErrorKind::InsufficientGas);
    assert!(chain.submitted().is_empty());
}

#[tokio::test]
async fn test_gas_cost_above_balance() {
    // Above the floor, below 72k gas at 1.2 gwei
    let chain = Arc::new(
        FakeChain::new().with(|s| s.native_balance = U256::from(2_000_000_000_000_000u64 / 100)),
    );
    let orch = TransactionOrchestrator::new(
        deposit(usd(100)),
        network(),
        Capabilities::from_chain(chain.clone()),
        config().with_min_native_balance(U256::from(1u64)),
    );

    let err = orch.execute_all().await.unwrap_err();

    assert_eq!(kind_of(&err), TxErrorKind::InsufficientGas);
    assert!(chain.submitted().is_empty());
}

#[tokio::test]
async fn test_zero_amount_is_invalid_input() {
    let chain = Arc::new(FakeChain::new());
    let orch = orchestrator(&chain, deposit(U256::ZERO));

    let err = orch.execute_all().await.unwrap_err();

    assert_eq!(kind_of(&err), TxErrorKind::InvalidInput);
    assert_eq!(orch.phase(), Phase::Error);
}

#[tokio::test]
async fn test_wrong_network() {
    let chain = Arc::new(FakeChain::new().with(|s| s.chain_id = Some(1)));
    let orch = orchestrator(&chain, deposit(usd(100)));

    let err = orch.execute_all().await.unwrap_err();

    assert_eq!(kind_of(&err), TxErrorKind::WrongNetwork);
    assert!(chain.submitted().is_empty());
}

#[tokio::test]
async fn test_disconnected_wallet() {
    let chain = Arc::new(FakeChain::new().with(|s| s.account = None));
    let orch = orchestrator(&chain, deposit(usd(100)));

    let err = orch.execute_all().await.unwrap_err();
    assert_eq!(kind_of(&err), TxErrorKind::AccountUnavailable);
}

// ----------------------------------------------------------------------------
// Failures after submission
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_user_rejects_target_after_approval() {
    let chain = Arc::new(FakeChain::new().with(|s| s.reject_target = true));
    let orch = orchestrator(&chain, deposit(usd(100)));

    let err = orch.execute_all().await.unwrap_err();

    assert_eq!(kind_of(&err), TxErrorKind::UserRejected);
    let snapshot = orch.snapshot();
    assert!(snapshot.approval_hash.is_some());
    assert!(snapshot.target_hash.is_none());
    assert!(snapshot.pending.is_none());
    assert_eq!(snapshot.phase, Phase::Error);
}

#[tokio::test]
async fn test_reverted_target() {
    let chain = Arc::new(
        FakeChain::new().with(|s| {
            s.allowance = usd(100);
            s.revert_target = true;
        }),
    );
    let orch = orchestrator(&chain, deposit(usd(100)));

    let err = orch.execute_all().await.unwrap_err();

    assert_eq!(kind_of(&err), TxErrorKind::TransactionReverted);
    assert!(orch.snapshot().target_hash.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_confirmation_timeout() {
    let chain = Arc::new(
        FakeChain::new().with(|s| {
            s.allowance = usd(100);
            s.never_mine = true;
        }),
    );
    let orch = orchestrator(&chain, deposit(usd(100)));

    let err = orch.execute_all().await.unwrap_err();

    assert_eq!(kind_of(&err), TxErrorKind::ConfirmationTimeout);
    assert!(orch.snapshot().pending.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_allowance_never_visible() {
    let chain = Arc::new(FakeChain::new().with(|s| s.approval_has_no_effect = true));
    let orch = orchestrator(&chain, deposit(usd(100)));

    let err = orch.execute_all().await.unwrap_err();

    assert_eq!(kind_of(&err), TxErrorKind::AllowanceStale);
    assert!(orch.snapshot().approval_hash.is_some());
    // Only the approval went out
    assert_eq!(chain.submitted().len(), 1);
}

#[tokio::test]
async fn test_account_switch_between_approval_and_call() {
    let other = Address::repeat_byte(0xbb);
    let chain = Arc::new(FakeChain::new().with(|s| s.switch_account_on_approval = Some(other)));
    let orch = orchestrator(&chain, deposit(usd(100)));

    let err = orch.execute_all().await.unwrap_err();

    assert_eq!(kind_of(&err), TxErrorKind::AccountUnavailable);
    assert_eq!(chain.submitted().len(), 1);
}

#[tokio::test]
async fn test_chain_switch_between_approval_and_call() {
    let chain = Arc::new(FakeChain::new().with(|s| s.switch_chain_on_approval = Some(1)));
    let orch = orchestrator(&chain, deposit(usd(100)));

    let err = orch.execute_all().await.unwrap_err();

    assert_eq!(kind_of(&err), TxErrorKind::WrongNetwork);
    assert_eq!(orch.phase(), Phase::Error);
    assert_eq!(chain.submitted().len(), 1);
}

#[tokio::test]
async fn test_unreadable_native_balance_before_submit() {
    // Pre-flight read succeeds; the read before the target call fails
    let chain = Arc::new(FakeChain::new().with(|s| {
        s.allowance = usd(500);
        s.native_reads_allowed = Some(1);
    }));
    let orch = orchestrator(&chain, deposit(usd(100)));

    let err = orch.execute_all().await.unwrap_err();

    assert_eq!(kind_of(&err), TxErrorKind::InsufficientGas);
    assert!(chain.submitted().is_empty());
}

// ----------------------------------------------------------------------------
// Busy, reset and detach
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_finished_flow_is_busy_until_reset() {
    let chain = Arc::new(FakeChain::new().with(|s| s.allowance = usd(500)));
    let orch = orchestrator(&chain, deposit(usd(100)));
    orch.execute_all().await.unwrap();

    let err = orch.execute_all().await.unwrap_err();
    assert!(matches!(err, EthernityError::FlowBusy { phase: Phase::Success }));
    assert_eq!(chain.submitted().len(), 1);

    assert!(orch.reset().is_none());
    orch.execute_all().await.unwrap();
    assert_eq!(chain.submitted().len(), 2);
}

#[tokio::test]
async fn test_reset_after_error_clears_state() {
    let chain = Arc::new(FakeChain::new().with(|s| s.token_balance = U256::ZERO));
    let orch = orchestrator(&chain, deposit(usd(100)));
    orch.execute_all().await.unwrap_err();

    orch.reset();

    let snapshot = orch.snapshot();
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(snapshot.progress, 0);
    assert!(snapshot.error.is_none());
    assert!(snapshot.validation.is_none());
    assert_eq!(snapshot.flow_id, 1);
    assert_eq!(snapshot.history, vec![Phase::Idle]);
}

#[tokio::test(start_paused = true)]
async fn test_reset_detaches_pending_flow() {
    let chain = Arc::new(
        FakeChain::new().with(|s| {
            s.allowance = usd(100);
            s.never_mine = true;
        }),
    );
    let orch = Arc::new(orchestrator(&chain, deposit(usd(100))));
    let mut updates = orch.subscribe();

    let running = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.execute_all().await })
    };
    updates
        .wait_for(|s| s.phase == Phase::Confirming)
        .await
        .unwrap();

    let busy = orch.execute_all().await.unwrap_err();
    assert!(matches!(busy, EthernityError::FlowBusy { phase: Phase::Confirming }));

    let detached = orch.reset().expect("target was pending");
    assert_eq!(detached.hash, keccak256(1u64.to_be_bytes()));
    assert!(!detached.intent.is_approval());

    let result = running.await.unwrap();
    assert!(matches!(result, Err(EthernityError::FlowDetached { flow_id: 0 })));

    // The stale flow must not have touched the new one
    let snapshot = orch.snapshot();
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(snapshot.flow_id, 1);
    assert!(snapshot.error.is_none());
}

// ----------------------------------------------------------------------------
// Single steps
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_approve_then_execute() {
    let chain = Arc::new(FakeChain::new());
    let orch = orchestrator(&chain, deposit(usd(100)));

    let approval = orch.approve().await.unwrap();
    assert!(approval.is_some());
    assert_eq!(orch.phase(), Phase::Approved);
    assert_eq!(orch.progress(), 50);

    // Approving twice is not allowed
    assert!(matches!(
        orch.approve().await,
        Err(EthernityError::FlowBusy { phase: Phase::Approved })
    ));

    let outcome = orch.execute().await.unwrap();
    assert_eq!(outcome.approval_hash, approval);
    assert_eq!(
        orch.snapshot().history,
        vec![
            Phase::Idle,
            Phase::Checking,
            Phase::Approving,
            Phase::Approved,
            Phase::Executing,
            Phase::Confirming,
            Phase::Success,
        ]
    );
    assert_eq!(chain.submitted().len(), 2);
}

#[tokio::test]
async fn test_approve_not_needed() {
    let chain = Arc::new(FakeChain::new().with(|s| s.allowance = usd(100)));
    let orch = orchestrator(&chain, deposit(usd(100)));

    assert_eq!(orch.approve().await.unwrap(), None);
    assert_eq!(orch.phase(), Phase::Approved);
    assert!(chain.submitted().is_empty());

    orch.execute().await.unwrap();
    assert_eq!(chain.submitted().len(), 1);
}

#[tokio::test]
async fn test_execute_from_idle_requires_allowance() {
    let chain = Arc::new(FakeChain::new());
    let orch = orchestrator(&chain, deposit(usd(100)));

    let err = orch.execute().await.unwrap_err();

    assert_eq!(kind_of(&err), TxErrorKind::AllowanceStale);
    assert!(chain.submitted().is_empty());
}

#[tokio::test]
async fn test_execute_from_idle_with_allowance() {
    let chain = Arc::new(FakeChain::new().with(|s| s.allowance = usd(100)));
    let orch = orchestrator(&chain, deposit(usd(100)));

    let outcome = orch.execute().await.unwrap();
    assert!(outcome.approval_hash.is_none());
    assert_eq!(orch.phase(), Phase::Success);
}

#[tokio::test]
async fn test_resumed_execute_rechecks_allowance() {
    let chain = Arc::new(FakeChain::new());
    let orch = orchestrator(&chain, deposit(usd(100)));
    orch.approve().await.unwrap();

    // Allowance spent elsewhere between the two steps
    chain.state.lock().unwrap().allowance = usd(5);

    let err = orch.execute().await.unwrap_err();
    assert_eq!(kind_of(&err), TxErrorKind::AllowanceStale);
    assert_eq!(chain.submitted().len(), 1);
}

#[tokio::test]
async fn test_resumed_execute_rechecks_balances() {
    let chain = Arc::new(FakeChain::new());
    let orch = orchestrator(&chain, deposit(usd(100)));
    orch.approve().await.unwrap();

    // Tokens spent elsewhere between the two steps
    chain.state.lock().unwrap().token_balance = U256::ZERO;

    let err = orch.execute().await.unwrap_err();
    assert_eq!(kind_of(&err), TxErrorKind::InsufficientToken);
    assert_eq!(chain.submitted().len(), 1);
    let validation = orch.snapshot().validation.unwrap();
    assert!(!validation.has_enough_token);
}

// ----------------------------------------------------------------------------
// Actions, warnings and observers
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_create_fund_returns_fund_address() {
    let chain = Arc::new(FakeChain::new().with(|s| s.target_logs = vec![creation_log(fund())]));
    let orch = orchestrator(&chain, CreateFund::new(plan()));

    let outcome = orch.execute_all().await.unwrap();

    assert_eq!(outcome.artifact, Some(Artifact::ContractAddress(fund())));
    let sent = chain.submitted();
    // Approves principal plus first monthly deposit to the factory
    assert_eq!(U256::from_be_slice(&sent[0].data[36..68]), usd(110));
    assert_eq!(sent[1].to, factory());
    assert_eq!(sent[1].selector(), Some(selector(CreateFund::SIGNATURE)));
}

#[tokio::test]
async fn test_create_fund_ignores_token_transfer_log() {
    // transferFrom inside the factory call logs a USDC Transfer first
    let transfer = LogEntry {
        address: usdc(),
        topics: vec![
            keccak256("Transfer(address,address,uint256)"),
            account().into_word(),
            factory().into_word(),
        ],
        data: Bytes::new(),
    };
    let chain = Arc::new(
        FakeChain::new().with(|s| s.target_logs = vec![transfer.clone(), creation_log(fund())]),
    );
    let orch = orchestrator(&chain, CreateFund::new(plan()));

    let outcome = orch.execute_all().await.unwrap();
    assert_eq!(outcome.artifact, Some(Artifact::ContractAddress(fund())));
    assert!(outcome.warnings.is_empty());

    orch.reset();
    chain.state.lock().unwrap().target_logs = vec![transfer];
    let outcome = orch.execute_all().await.unwrap();
    assert!(outcome.artifact.is_none());
    assert!(matches!(
        outcome.warnings.as_slice(),
        [FlowWarning::ArtifactUnparsed { .. }]
    ));
}

#[tokio::test]
async fn test_create_fund_without_event_warns() {
    let chain = Arc::new(FakeChain::new());
    let orch = orchestrator(&chain, CreateFund::new(plan()));

    let outcome = orch.execute_all().await.unwrap();

    assert!(outcome.artifact.is_none());
    assert_eq!(orch.phase(), Phase::Success);
    assert!(matches!(
        outcome.warnings.as_slice(),
        [FlowWarning::ArtifactUnparsed { tx_hash, .. }] if *tx_hash == outcome.target_hash
    ));
}

#[tokio::test]
async fn test_gas_fallback_uses_action_ceiling() {
    let chain = Arc::new(
        FakeChain::new().with(|s| {
            s.estimate = None;
            s.allowance = usd(50);
        }),
    );
    let orch = orchestrator(&chain, FundDeposit::extra(fund(), TokenAmount::usdc(25_000_000)));

    let outcome = orch.execute_all().await.unwrap();

    assert_eq!(chain.submitted()[0].gas_limit, Some(DEPOSIT_GAS_CEILING));
    assert!(matches!(
        outcome.warnings.as_slice(),
        [FlowWarning::GasEstimateFallback { gas_limit, .. }] if *gas_limit == DEPOSIT_GAS_CEILING
    ));
}

#[tokio::test]
async fn test_observer_sees_every_transition() {
    let chain = Arc::new(FakeChain::new());
    let recorder = Arc::new(Recorder::default());
    let orch = orchestrator(&chain, deposit(usd(100))).with_observer(recorder.clone());

    orch.execute_all().await.unwrap();

    assert_eq!(
        recorder.events(),
        vec![
            "checking",
            "approving",
            "approved",
            "approval_success",
            "executing",
            "confirming",
            "success",
            "transaction_success:no_artifact",
        ]
    );
}

#[tokio::test]
async fn test_observer_sees_error() {
    let chain = Arc::new(FakeChain::new().with(|s| s.token_balance = U256::ZERO));
    let recorder = Arc::new(Recorder::default());
    let orch = orchestrator(&chain, deposit(usd(100))).with_observer(recorder.clone());

    orch.execute_all().await.unwrap_err();

    assert_eq!(
        recorder.events(),
        vec!["checking", "error", "error:insufficient_token"]
    );
}

#[tokio::test]
async fn test_polling_watcher_capabilities() {
    let chain = Arc::new(FakeChain::new().with(|s| s.allowance = usd(100)));
    let caps = Capabilities {
        receipts: Arc::new(
            PollingReceiptWatcher::new(chain.clone()).with_poll_interval(Duration::from_millis(5)),
        ),
        ..Capabilities::from_chain(chain.clone())
    };
    let orch = TransactionOrchestrator::new(deposit(usd(100)), network(), caps, config());

    let outcome = orch.execute_all().await.unwrap();
    assert_eq!(outcome.receipt.block_number, Some(101));
}
