//! Ports: the seams between the settlement core and its collaborators.
//! Adapters implement these for Postgres, Redis and the HTTP providers.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::provider::{
    AccountRequest, Bank, Channel, EmailNotification, PayoutReceipt, PayoutRequest,
    ProvisionedAccount, PushNotification, ReconcileResult,
};
use crate::domain::{
    FeeConfig, LedgerRuleError, RetryRecord, SettlementAccount, SettlementSnapshot, Transaction,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Ledger rule violated: {0}")]
    Rule(#[from] LedgerRuleError),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row".to_string()),
            other => RepositoryError::Storage(other.to_string()),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Everything the ledger needs to credit one child leg.
#[derive(Debug, Clone)]
pub struct SettlementPosting {
    pub parent_id: Uuid,
    pub asset_code: String,
    /// Net payable in the target asset's smallest unit.
    pub amount: i64,
    /// Reference assigned to the child when the ledger has to create it.
    pub reference: String,
    pub snapshot: SettlementSnapshot,
    pub provider_metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PostingOutcome {
    /// A completed child already existed; nothing was written.
    AlreadyCompleted(Transaction),
    /// No child existed; one was created and completed.
    Created(Transaction),
    /// A pending, failed or reconcile child was updated and completed.
    Completed(Transaction),
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get_transaction(&self, id: Uuid) -> RepositoryResult<Option<Transaction>>;

    async fn find_child(
        &self,
        parent_id: Uuid,
        asset_code: &str,
    ) -> RepositoryResult<Option<Transaction>>;

    /// Credits the child leg inside one database transaction.
    ///
    /// The child is re-read under a row lock; a completed child short-circuits,
    /// an existing one is updated, and a missing one is created. The wallet
    /// entry and the wallet balance are written in the same transaction.
    async fn post_settlement(&self, posting: &SettlementPosting) -> RepositoryResult<PostingOutcome>;

    /// Appends retry bookkeeping to the parent and moves a failed child to
    /// reconcile, atomically. Returns the child as stored afterwards.
    async fn record_retry(
        &self,
        parent_id: Uuid,
        child_id: Option<Uuid>,
        record: &RetryRecord,
    ) -> RepositoryResult<Option<Transaction>>;
}

#[async_trait]
pub trait SettlementAccountStore: Send + Sync {
    /// Latest account issued under `account_number`.
    async fn find_by_account_number(
        &self,
        account_number: &str,
    ) -> RepositoryResult<Option<SettlementAccount>>;

    async fn insert(&self, account: &SettlementAccount) -> RepositoryResult<SettlementAccount>;
}

#[async_trait]
pub trait FeeConfigStore: Send + Sync {
    async fn active_for(&self, provider: &str) -> RepositoryResult<Option<FeeConfig>>;
}

#[derive(Debug, Error)]
#[error("Lock store error: {0}")]
pub struct LockStoreError(pub String);

/// Key/value store offering atomic set-if-absent and compare-and-delete.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Sets `key` to `token` with `ttl` only if the key is absent.
    async fn try_acquire(&self, key: &str, token: &str, ttl: Duration)
        -> Result<bool, LockStoreError>;

    /// Deletes `key` only while it still holds `token`.
    async fn release(&self, key: &str, token: &str) -> Result<bool, LockStoreError>;
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("Provider resource not found: {0}")]
    NotFound(String),

    #[error("Provider rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::InvalidResponse(e.to_string())
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

/// The leg that precedes settlement, e.g. the crypto-to-fiat off-ramp.
#[async_trait]
pub trait UpstreamLegProvider: Send + Sync {
    async fn confirm_and_reconcile_balance(
        &self,
        user_id: Uuid,
    ) -> Result<ReconcileResult, ProviderError>;
}

#[async_trait]
pub trait SettlementProvider: Send + Sync {
    async fn list_channels(&self, country_code: &str) -> Result<Vec<Channel>, ProviderError>;

    async fn list_banks(&self, country_code: &str) -> Result<Vec<Bank>, ProviderError>;

    async fn create_payout(&self, request: &PayoutRequest) -> Result<PayoutReceipt, ProviderError>;
}

/// Issues the receiving accounts that settlement webhooks correlate on.
#[async_trait]
pub trait ReceivingAccountProvider: Send + Sync {
    async fn create_account(
        &self,
        request: &AccountRequest,
    ) -> Result<ProvisionedAccount, ProviderError>;
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_push(&self, notification: &PushNotification) -> Result<(), ProviderError>;

    async fn send_email(&self, notification: &EmailNotification) -> Result<(), ProviderError>;
}
