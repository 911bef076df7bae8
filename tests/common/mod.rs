//! In-memory port implementations shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use settlement_core::adapters::InMemoryLockStore;
use settlement_core::domain::provider::{
    AccountRequest, Bank, Channel, EmailNotification, PayoutReceipt, PayoutRequest,
    ProvisionedAccount, PushNotification, ReconcileResult,
};
use settlement_core::domain::{
    FeeConfig, FeeRule, PayerInfo, RetryRecord, SettlementAccount, SettlementEvent,
    SettlementParent, Transaction, TransactionMetadata, TransactionStatus, WalletTransaction,
};
use settlement_core::ports::{
    FeeConfigStore, LedgerStore, NotificationSender, PostingOutcome, ProviderError,
    ReceivingAccountProvider, RepositoryError, RepositoryResult, SettlementAccountStore,
    SettlementPosting, SettlementProvider, UpstreamLegProvider,
};
use settlement_core::services::{
    DistributedLock, LockOptions, ReconcilerSettings, RetryOrchestrator, RetrySettings,
    SettlementReconciler,
};

pub const SOURCE: &str = "USD";
pub const TARGET: &str = "NGN";
pub const COUNTRY: &str = "NG";
pub const FEE_PROVIDER: &str = "settlement";
pub const BANK_CODE: &str = "058";

// --- Ledger ---

#[derive(Default)]
struct LedgerState {
    transactions: HashMap<Uuid, Transaction>,
    /// (user, asset) -> (wallet id, balance)
    wallets: HashMap<(Uuid, String), (Uuid, i64)>,
    wallet_transactions: HashMap<Uuid, WalletTransaction>,
    credits: usize,
}

/// Holds one mutex for each write, which stands in for the row locks the
/// Postgres store takes.
#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub async fn insert(&self, tx: Transaction) {
        self.state.lock().await.transactions.insert(tx.id, tx);
    }

    pub async fn get(&self, id: Uuid) -> Option<Transaction> {
        self.state.lock().await.transactions.get(&id).cloned()
    }

    pub async fn children_of(&self, parent_id: Uuid) -> Vec<Transaction> {
        self.state
            .lock()
            .await
            .transactions
            .values()
            .filter(|tx| tx.parent_transaction_id == Some(parent_id))
            .cloned()
            .collect()
    }

    pub async fn balance(&self, user_id: Uuid, asset_code: &str) -> i64 {
        self.state
            .lock()
            .await
            .wallets
            .get(&(user_id, asset_code.to_string()))
            .map(|(_, balance)| *balance)
            .unwrap_or(0)
    }

    pub async fn set_balance(&self, user_id: Uuid, asset_code: &str, balance: i64) {
        self.state
            .lock()
            .await
            .wallets
            .insert((user_id, asset_code.to_string()), (Uuid::new_v4(), balance));
    }

    pub async fn wallet_entry(&self, transaction_id: Uuid) -> Option<WalletTransaction> {
        self.state
            .lock()
            .await
            .wallet_transactions
            .get(&transaction_id)
            .cloned()
    }

    /// Number of wallet credits applied so far.
    pub async fn credits(&self) -> usize {
        self.state.lock().await.credits
    }
}

fn find_child(state: &LedgerState, parent_id: Uuid, asset_code: &str) -> Option<Transaction> {
    state
        .transactions
        .values()
        .find(|tx| tx.parent_transaction_id == Some(parent_id) && tx.asset_code == asset_code)
        .cloned()
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn get_transaction(&self, id: Uuid) -> RepositoryResult<Option<Transaction>> {
        Ok(self.get(id).await)
    }

    async fn find_child(
        &self,
        parent_id: Uuid,
        asset_code: &str,
    ) -> RepositoryResult<Option<Transaction>> {
        let state = self.state.lock().await;
        Ok(find_child(&state, parent_id, asset_code))
    }

    async fn post_settlement(&self, posting: &SettlementPosting) -> RepositoryResult<PostingOutcome> {
        let mut state = self.state.lock().await;

        let parent = state
            .transactions
            .get(&posting.parent_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", posting.parent_id)))?;

        let (mut child, created) = match find_child(&state, parent.id, &posting.asset_code) {
            Some(child) if child.status.is_completed() => {
                return Ok(PostingOutcome::AlreadyCompleted(child))
            }
            Some(child) => (child, false),
            None => (
                Transaction::new_child(
                    &SettlementParent::from(&parent),
                    posting.asset_code.clone(),
                    posting.amount,
                    posting.reference.clone(),
                ),
                true,
            ),
        };

        let wallet_key = (child.user_id, child.asset_code.clone());
        let (wallet_id, balance) = state
            .wallets
            .get(&wallet_key)
            .copied()
            .unwrap_or_else(|| (Uuid::new_v4(), 0));

        // Nothing is stored unless the domain accepts the credit.
        child.complete_settlement(posting.amount, balance, posting.snapshot.clone())?;

        let entry = WalletTransaction::mirror(
            &child,
            wallet_id,
            state.wallet_transactions.get(&child.id),
            posting.provider_metadata.clone(),
        );
        state.wallets.insert(wallet_key, (wallet_id, child.balance_after));
        state.wallet_transactions.insert(child.id, entry);
        state.transactions.insert(child.id, child.clone());
        state.credits += 1;

        if created {
            Ok(PostingOutcome::Created(child))
        } else {
            Ok(PostingOutcome::Completed(child))
        }
    }

    async fn record_retry(
        &self,
        parent_id: Uuid,
        child_id: Option<Uuid>,
        record: &RetryRecord,
    ) -> RepositoryResult<Option<Transaction>> {
        let mut state = self.state.lock().await;

        let mut parent = state
            .transactions
            .get(&parent_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", parent_id)))?;
        let mut child = match child_id {
            Some(id) => Some(
                state
                    .transactions
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))?,
            ),
            None => None,
        };

        parent.metadata.record_retry(record.clone());
        state.transactions.insert(parent.id, parent);

        if let Some(child) = child.as_mut() {
            if child.mark_for_reconcile() {
                if let Some(entry) = state.wallet_transactions.get_mut(&child.id) {
                    entry.status = child.status;
                }
            }
            state.transactions.insert(child.id, child.clone());
        }

        Ok(child)
    }
}

// --- Settlement accounts and fees ---

#[derive(Default)]
pub struct InMemoryAccounts {
    accounts: Mutex<Vec<SettlementAccount>>,
}

impl InMemoryAccounts {
    pub async fn all(&self) -> Vec<SettlementAccount> {
        self.accounts.lock().await.clone()
    }
}

#[async_trait]
impl SettlementAccountStore for InMemoryAccounts {
    async fn find_by_account_number(
        &self,
        account_number: &str,
    ) -> RepositoryResult<Option<SettlementAccount>> {
        Ok(self
            .accounts
            .lock()
            .await
            .iter()
            .rev()
            .find(|account| account.account_number == account_number)
            .cloned())
    }

    async fn insert(&self, account: &SettlementAccount) -> RepositoryResult<SettlementAccount> {
        self.accounts.lock().await.push(account.clone());
        Ok(account.clone())
    }
}

#[derive(Default)]
pub struct InMemoryFeeConfigs {
    active: Mutex<Option<FeeConfig>>,
}

impl InMemoryFeeConfigs {
    pub async fn set(&self, config: Option<FeeConfig>) {
        *self.active.lock().await = config;
    }
}

#[async_trait]
impl FeeConfigStore for InMemoryFeeConfigs {
    async fn active_for(&self, provider: &str) -> RepositoryResult<Option<FeeConfig>> {
        Ok(self
            .active
            .lock()
            .await
            .clone()
            .filter(|config| config.provider == provider))
    }
}

pub fn percentage_fee_config(percent: i64) -> FeeConfig {
    FeeConfig {
        id: Uuid::new_v4(),
        provider: FEE_PROVIDER.to_string(),
        version: 1,
        disbursement_fee: FeeRule::percentage(BigDecimal::from(percent)),
        partner_fee: FeeRule::zero(),
        is_active: true,
    }
}

pub fn fixed_fee_config(value: i64) -> FeeConfig {
    FeeConfig {
        id: Uuid::new_v4(),
        provider: FEE_PROVIDER.to_string(),
        version: 2,
        disbursement_fee: FeeRule::fixed(BigDecimal::from(value)),
        partner_fee: FeeRule::zero(),
        is_active: true,
    }
}

// --- Providers ---

#[derive(Default)]
pub struct FakeUpstream {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl UpstreamLegProvider for FakeUpstream {
    async fn confirm_and_reconcile_balance(
        &self,
        _user_id: Uuid,
    ) -> Result<ReconcileResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Transport("upstream unavailable".to_string()));
        }
        Ok(ReconcileResult {
            confirmed: true,
            message: None,
        })
    }
}

pub struct FakeSettlementProvider {
    pub channels: Mutex<Vec<Channel>>,
    pub banks: Mutex<Vec<Bank>>,
    pub payouts: Mutex<Vec<PayoutRequest>>,
    pub fail_payout: AtomicBool,
}

pub fn bank_channel() -> Channel {
    Channel {
        id: "ch-bank".to_string(),
        channel_type: "bank".to_string(),
        ramp_type: "withdraw".to_string(),
        country: COUNTRY.to_string(),
        currency: TARGET.to_string(),
        status: "active".to_string(),
    }
}

pub fn bank(code: &str, channel_id: &str) -> Bank {
    Bank {
        id: format!("bank-{}", code),
        name: "Guaranty Trust".to_string(),
        code: code.to_string(),
        status: "active".to_string(),
        channel_ids: vec![channel_id.to_string()],
    }
}

impl Default for FakeSettlementProvider {
    fn default() -> Self {
        Self {
            channels: Mutex::new(vec![bank_channel()]),
            banks: Mutex::new(vec![bank(BANK_CODE, "ch-bank")]),
            payouts: Mutex::new(Vec::new()),
            fail_payout: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl SettlementProvider for FakeSettlementProvider {
    async fn list_channels(&self, country_code: &str) -> Result<Vec<Channel>, ProviderError> {
        Ok(self
            .channels
            .lock()
            .await
            .iter()
            .filter(|channel| channel.country == country_code)
            .cloned()
            .collect())
    }

    async fn list_banks(&self, _country_code: &str) -> Result<Vec<Bank>, ProviderError> {
        Ok(self.banks.lock().await.clone())
    }

    async fn create_payout(&self, request: &PayoutRequest) -> Result<PayoutReceipt, ProviderError> {
        if self.fail_payout.load(Ordering::SeqCst) {
            return Err(ProviderError::Rejected {
                status: 422,
                body: "destination rejected".to_string(),
            });
        }
        let mut payouts = self.payouts.lock().await;
        payouts.push(request.clone());
        Ok(PayoutReceipt {
            provider_reference: format!("pay-{}", payouts.len()),
            sequence_reference: format!("seq-{}", request.sequence_id),
            status: Some("pending".to_string()),
        })
    }
}

#[derive(Default)]
pub struct FakeAccountProvider {
    pub issued: AtomicUsize,
}

#[async_trait]
impl ReceivingAccountProvider for FakeAccountProvider {
    async fn create_account(
        &self,
        request: &AccountRequest,
    ) -> Result<ProvisionedAccount, ProviderError> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ProvisionedAccount {
            account_number: format!("99{:08}", n),
            account_name: format!("Settlement {}", request.reference),
            bank_name: "Guaranty Trust".to_string(),
            bank_code: BANK_CODE.to_string(),
            provider_reference: Some(format!("va-{}", n)),
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub pushes: Mutex<Vec<PushNotification>>,
    pub emails: Mutex<Vec<EmailNotification>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send_push(&self, notification: &PushNotification) -> Result<(), ProviderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Transport("push gateway down".to_string()));
        }
        self.pushes.lock().await.push(notification.clone());
        Ok(())
    }

    async fn send_email(&self, notification: &EmailNotification) -> Result<(), ProviderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Transport("mailer down".to_string()));
        }
        self.emails.lock().await.push(notification.clone());
        Ok(())
    }
}

// --- Harness ---

pub fn fast_lock() -> LockOptions {
    LockOptions {
        ttl: Duration::from_secs(5),
        retry_count: 400,
        retry_delay: Duration::from_millis(5),
    }
}

pub struct Harness {
    pub ledger: Arc<InMemoryLedger>,
    pub accounts: Arc<InMemoryAccounts>,
    pub fees: Arc<InMemoryFeeConfigs>,
    pub upstream: Arc<FakeUpstream>,
    pub settlement: Arc<FakeSettlementProvider>,
    pub account_provider: Arc<FakeAccountProvider>,
    pub notifier: Arc<RecordingNotifier>,
    pub lock_store: Arc<InMemoryLockStore>,
    pub reconciler: Arc<SettlementReconciler>,
    pub retry: Arc<RetryOrchestrator>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_lock(fast_lock()).await
    }

    pub async fn with_lock(lock_options: LockOptions) -> Self {
        let ledger = Arc::new(InMemoryLedger::default());
        let accounts = Arc::new(InMemoryAccounts::default());
        let fees = Arc::new(InMemoryFeeConfigs::default());
        fees.set(Some(percentage_fee_config(1))).await;
        let upstream = Arc::new(FakeUpstream::default());
        let settlement = Arc::new(FakeSettlementProvider::default());
        let account_provider = Arc::new(FakeAccountProvider::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let lock_store = Arc::new(InMemoryLockStore::new());
        let lock = DistributedLock::new(lock_store.clone());

        let reconciler = SettlementReconciler::new(
            ledger.clone(),
            accounts.clone(),
            fees.clone(),
            upstream.clone(),
            notifier.clone(),
            lock.clone(),
            ReconcilerSettings {
                target_asset: TARGET.to_string(),
                fee_provider: FEE_PROVIDER.to_string(),
                lock: lock_options,
            },
        );
        let retry = RetryOrchestrator::new(
            ledger.clone(),
            accounts.clone(),
            account_provider.clone(),
            settlement.clone(),
            lock,
            RetrySettings {
                source_asset: SOURCE.to_string(),
                target_asset: TARGET.to_string(),
                destination_country: COUNTRY.to_string(),
                lock: lock_options,
            },
        );

        Self {
            ledger,
            accounts,
            fees,
            upstream,
            settlement,
            account_provider,
            notifier,
            lock_store,
            reconciler: Arc::new(reconciler),
            retry: Arc::new(retry),
        }
    }

    /// A completed source leg of `amount` cents priced at `rate`, with a
    /// receiving account bound to it.
    pub async fn seed_parent(&self, amount: i64, rate: i64) -> (Transaction, SettlementAccount) {
        let now = Utc::now();
        let parent = Transaction {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            parent_transaction_id: None,
            asset_code: SOURCE.to_string(),
            amount,
            balance_before: amount,
            balance_after: 0,
            status: TransactionStatus::Completed,
            reference: format!("OFR-{}", Uuid::new_v4().simple()),
            external_reference: None,
            metadata: TransactionMetadata {
                rate_id: Some("rate-1".to_string()),
                rate_value: Some(BigDecimal::from(rate)),
                destination_country: Some(COUNTRY.to_string()),
                ..TransactionMetadata::default()
            },
            created_at: now,
            updated_at: now,
        };
        self.ledger.insert(parent.clone()).await;

        let account = SettlementAccount {
            id: Uuid::new_v4(),
            transaction_id: parent.id,
            account_number: format!("01{:08}", rand_suffix(parent.id)),
            account_name: "Ada Obi".to_string(),
            bank_name: "Guaranty Trust".to_string(),
            bank_code: BANK_CODE.to_string(),
            provider_reference: None,
            created_at: now,
        };
        self.accounts
            .insert(&account)
            .await
            .expect("in-memory insert");

        (parent, account)
    }

    /// An existing child leg in `status` carrying an estimated amount.
    pub async fn seed_child(
        &self,
        parent: &Transaction,
        amount: i64,
        status: TransactionStatus,
    ) -> Transaction {
        let mut child = Transaction::new_child(
            &SettlementParent::from(parent),
            TARGET.to_string(),
            amount,
            format!("{}:ngn", parent.reference),
        );
        child.status = status;
        self.ledger.insert(child.clone()).await;
        child
    }
}

fn rand_suffix(id: Uuid) -> u32 {
    (id.as_u128() % 100_000_000) as u32
}

pub fn event(account_number: &str, amount: i64, provider_reference: &str) -> SettlementEvent {
    SettlementEvent {
        settlement_account_id: account_number.to_string(),
        amount,
        provider_reference: provider_reference.to_string(),
        payer_info: PayerInfo {
            name: Some("Ada Obi".to_string()),
            account_number: Some("0123456789".to_string()),
            bank_name: Some("Guaranty Trust".to_string()),
        },
    }
}
