//! Ledger transaction entities.
//! Framework-agnostic representation of a currency leg and its wallet entry.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::settlement::PayerInfo;

pub const METADATA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Initiated,
    Pending,
    Processing,
    Completed,
    Failed,
    Reconcile,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Initiated => "initiated",
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Reconcile => "reconcile",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TransactionStatus::Completed)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown transaction status: {0}")]
pub struct UnknownStatus(pub String);

/// Providers and legacy rows disagree on casing, so parsing is case-insensitive.
impl FromStr for TransactionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "initiated" => Ok(TransactionStatus::Initiated),
            "pending" => Ok(TransactionStatus::Pending),
            "processing" => Ok(TransactionStatus::Processing),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "reconcile" => Ok(TransactionStatus::Reconcile),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Fee and rate figures captured when a child leg is settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementSnapshot {
    pub source_amount: i64,
    pub rate: BigDecimal,
    pub gross: BigDecimal,
    pub disbursement_fee: BigDecimal,
    pub partner_fee: BigDecimal,
    pub fee_config_version: i32,
    pub provider_reference: String,
    pub payer: PayerInfo,
    pub settled_at: DateTime<Utc>,
}

/// One operator-triggered re-submission of a settlement leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryRecord {
    pub attempt: u32,
    pub at: DateTime<Utc>,
    pub settlement_account_id: Uuid,
    pub account_number: String,
    pub provider_reference: String,
    pub sequence_reference: String,
}

/// Typed audit side-record stored alongside a transaction.
///
/// Every field is optional so rows written before a field existed still
/// deserialize. Keys this release does not know land in `extra` and are
/// written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionMetadata {
    pub version: u32,
    pub rate_id: Option<String>,
    pub rate_value: Option<BigDecimal>,
    pub destination_country: Option<String>,
    pub old_amount: Option<i64>,
    pub settlement: Option<SettlementSnapshot>,
    pub retry_count: u32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub retries: Vec<RetryRecord>,
    pub previous_provider_references: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for TransactionMetadata {
    fn default() -> Self {
        Self {
            version: METADATA_VERSION,
            rate_id: None,
            rate_value: None,
            destination_country: None,
            old_amount: None,
            settlement: None,
            retry_count: 0,
            last_retry_at: None,
            retries: Vec::new(),
            previous_provider_references: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }
}

impl TransactionMetadata {
    /// Appends retry bookkeeping. The provider references of the superseded
    /// attempt are kept so late webhooks for it can still be traced.
    pub fn record_retry(&mut self, record: RetryRecord) {
        if let Some(last) = self.retries.last() {
            self.previous_provider_references
                .push(last.provider_reference.clone());
        }
        self.retry_count = record.attempt;
        self.last_retry_at = Some(record.at);
        self.retries.push(record);
        self.version = METADATA_VERSION;
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerRuleError {
    #[error("transaction {0} is already completed")]
    AlreadyCompleted(Uuid),
    #[error("balance overflow crediting {amount} onto {balance}")]
    BalanceOverflow { balance: i64, amount: i64 },
    #[error("settlement amount must not be negative, got {0}")]
    NegativeAmount(i64),
}

/// Domain entity representing one currency leg.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub parent_transaction_id: Option<Uuid>,
    pub asset_code: String,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub status: TransactionStatus,
    pub reference: String,
    pub external_reference: Option<String>,
    pub metadata: TransactionMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// A child leg as first written by the reconciler, before the credit posts.
    pub fn new_child(
        parent: &SettlementParent,
        asset_code: String,
        amount: i64,
        reference: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: parent.user_id,
            parent_transaction_id: Some(parent.id),
            asset_code,
            amount,
            balance_before: 0,
            balance_after: 0,
            status: TransactionStatus::Processing,
            reference,
            external_reference: None,
            metadata: TransactionMetadata::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_child(&self) -> bool {
        self.parent_transaction_id.is_some()
    }

    /// Completes the leg against a wallet whose balance was read under lock.
    ///
    /// The amount is replaced by the settled figure; a differing prior
    /// estimate is kept in `metadata.old_amount`. Balances are snapshotted
    /// here and never recomputed afterwards.
    pub fn complete_settlement(
        &mut self,
        amount: i64,
        wallet_balance: i64,
        snapshot: SettlementSnapshot,
    ) -> Result<(), LedgerRuleError> {
        if self.status.is_completed() {
            return Err(LedgerRuleError::AlreadyCompleted(self.id));
        }
        if amount < 0 {
            return Err(LedgerRuleError::NegativeAmount(amount));
        }
        let balance_after =
            wallet_balance
                .checked_add(amount)
                .ok_or(LedgerRuleError::BalanceOverflow {
                    balance: wallet_balance,
                    amount,
                })?;

        if self.amount != amount && self.amount != 0 {
            self.metadata.old_amount = Some(self.amount);
        }
        self.external_reference = Some(snapshot.provider_reference.clone());
        self.metadata.settlement = Some(snapshot);
        self.metadata.version = METADATA_VERSION;
        self.amount = amount;
        self.balance_before = wallet_balance;
        self.balance_after = balance_after;
        self.status = TransactionStatus::Completed;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// A failed leg awaiting a retried attempt's webhook.
    /// Returns whether the status changed.
    pub fn mark_for_reconcile(&mut self) -> bool {
        if self.status != TransactionStatus::Failed {
            return false;
        }
        self.status = TransactionStatus::Reconcile;
        self.updated_at = Utc::now();
        true
    }
}

/// The parent fields a child leg inherits.
#[derive(Debug, Clone, Copy)]
pub struct SettlementParent {
    pub id: Uuid,
    pub user_id: Uuid,
}

impl From<&Transaction> for SettlementParent {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id,
            user_id: tx.user_id,
        }
    }
}

/// Wallet-ledger twin of a [`Transaction`].
#[derive(Debug, Clone, PartialEq)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub wallet_id: Uuid,
    pub user_id: Uuid,
    pub asset_code: String,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub status: TransactionStatus,
    pub provider_reference: Option<String>,
    pub provider_metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WalletTransaction {
    /// Builds the wallet entry mirroring `tx`, reusing `existing`'s identity
    /// when the entry was written by an earlier attempt.
    pub fn mirror(
        tx: &Transaction,
        wallet_id: Uuid,
        existing: Option<&WalletTransaction>,
        provider_metadata: Option<serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: existing.map(|w| w.id).unwrap_or_else(Uuid::new_v4),
            transaction_id: tx.id,
            wallet_id,
            user_id: tx.user_id,
            asset_code: tx.asset_code.clone(),
            amount: tx.amount,
            balance_before: tx.balance_before,
            balance_after: tx.balance_after,
            status: tx.status,
            provider_reference: tx.external_reference.clone(),
            provider_metadata,
            created_at: existing.map(|w| w.created_at).unwrap_or(now),
            updated_at: now,
        }
    }
}
