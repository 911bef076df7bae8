//! Operator-triggered re-submission of a failed settlement leg.
//!
//! A retry mints a fresh receiving account, re-issues the payout, and only
//! then records the attempt on the ledger. It shares the reconciler's lock key,
//! so it never interleaves with a webhook for the same parent.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::provider::{AccountRequest, Bank, Channel, PayoutDestination, PayoutRequest};
use crate::domain::{RetryRecord, SettlementAccount, Transaction, TransactionStatus};
use crate::error::ErrorKind;
use crate::ports::{
    LedgerStore, ProviderError, ReceivingAccountProvider, RepositoryError, SettlementAccountStore,
    SettlementProvider,
};
use crate::services::lock::{settlement_lock_key, DistributedLock, LockError, LockOptions};

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("Parent transaction {0} not found")]
    ParentNotFound(Uuid),

    #[error("Transaction {id} cannot be retried: {reason}")]
    InvalidParent { id: Uuid, reason: String },

    #[error("No active payout channel for country {0}")]
    ChannelUnavailable(String),

    #[error("No active bank {bank_code} on channel {channel_id}")]
    BankUnavailable { bank_code: String, channel_id: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl RetryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RetryError::ParentNotFound(_)
            | RetryError::ChannelUnavailable(_)
            | RetryError::BankUnavailable { .. } => ErrorKind::NotFound,
            RetryError::InvalidParent { .. } => ErrorKind::InvariantViolation,
            RetryError::Provider(_) => ErrorKind::Provider,
            RetryError::Lock(LockError::Timeout { .. }) => ErrorKind::LockTimeout,
            RetryError::Lock(LockError::Store(_)) => ErrorKind::Storage,
            RetryError::Repository(RepositoryError::NotFound(_)) => ErrorKind::NotFound,
            RetryError::Repository(RepositoryError::Rule(_)) => ErrorKind::InvariantViolation,
            RetryError::Repository(_) => ErrorKind::Storage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryOutcome {
    pub new_account_id: Uuid,
    pub new_account_number: String,
    pub new_sequence_ref: String,
    pub attempt: u32,
    /// Status of the existing child after the retry, if one exists.
    pub child_status: Option<TransactionStatus>,
}

#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub source_asset: String,
    pub target_asset: String,
    pub destination_country: String,
    pub lock: LockOptions,
}

pub struct RetryOrchestrator {
    ledger: Arc<dyn LedgerStore>,
    accounts: Arc<dyn SettlementAccountStore>,
    account_provider: Arc<dyn ReceivingAccountProvider>,
    settlement: Arc<dyn SettlementProvider>,
    lock: DistributedLock,
    settings: RetrySettings,
}

impl RetryOrchestrator {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        accounts: Arc<dyn SettlementAccountStore>,
        account_provider: Arc<dyn ReceivingAccountProvider>,
        settlement: Arc<dyn SettlementProvider>,
        lock: DistributedLock,
        settings: RetrySettings,
    ) -> Self {
        Self {
            ledger,
            accounts,
            account_provider,
            settlement,
            lock,
            settings,
        }
    }

    #[instrument(skip(self))]
    pub async fn retry(&self, parent_id: Uuid) -> Result<RetryOutcome, RetryError> {
        self.lock
            .run_exclusive(&settlement_lock_key(parent_id), self.settings.lock, || {
                self.retry_locked(parent_id)
            })
            .await
    }

    async fn retry_locked(&self, parent_id: Uuid) -> Result<RetryOutcome, RetryError> {
        let parent = self
            .ledger
            .get_transaction(parent_id)
            .await?
            .ok_or(RetryError::ParentNotFound(parent_id))?;
        self.check_parent(&parent)?;

        let child = self
            .ledger
            .find_child(parent.id, &self.settings.target_asset)
            .await?;
        if child.as_ref().map_or(false, |c| c.status.is_completed()) {
            return Err(RetryError::InvalidParent {
                id: parent.id,
                reason: "settlement leg already completed".to_string(),
            });
        }

        let attempt = parent.metadata.retry_count + 1;
        let sequence_id = format!("{}-retry-{}", parent.reference, attempt);

        // The previous account stays in place for audit; webhooks for the new
        // attempt correlate on the new account only.
        let provisioned = self
            .account_provider
            .create_account(&AccountRequest {
                transaction_id: parent.id,
                user_id: parent.user_id,
                reference: sequence_id.clone(),
            })
            .await?;
        let account = self
            .accounts
            .insert(&SettlementAccount::new(parent.id, provisioned))
            .await?;
        tracing::info!(%parent_id, account_id = %account.id, attempt, "Minted settlement account for retry");

        let country = parent
            .metadata
            .destination_country
            .clone()
            .unwrap_or_else(|| self.settings.destination_country.clone());
        let (channel, bank) = self.resolve_route(&country, &account.bank_code).await?;

        let request = PayoutRequest {
            sequence_id,
            channel_id: channel.id.clone(),
            country,
            currency: parent.asset_code.clone(),
            amount: parent.amount,
            reason: "settlement retry".to_string(),
            destination: PayoutDestination {
                account_number: account.account_number.clone(),
                account_name: account.account_name.clone(),
                account_type: "bank".to_string(),
                bank_id: bank.id.clone(),
                bank_code: bank.code.clone(),
            },
        };
        let receipt = self.settlement.create_payout(&request).await?;
        tracing::info!(
            %parent_id,
            provider_reference = %receipt.provider_reference,
            sequence_reference = %receipt.sequence_reference,
            "Payout re-issued"
        );

        let record = RetryRecord {
            attempt,
            at: Utc::now(),
            settlement_account_id: account.id,
            account_number: account.account_number.clone(),
            provider_reference: receipt.provider_reference,
            sequence_reference: receipt.sequence_reference.clone(),
        };
        let child = self
            .ledger
            .record_retry(parent.id, child.map(|c| c.id), &record)
            .await?;

        if child.is_none() {
            tracing::info!(%parent_id, "No settlement leg yet; next webhook will create it");
        }

        Ok(RetryOutcome {
            new_account_id: account.id,
            new_account_number: account.account_number,
            new_sequence_ref: receipt.sequence_reference,
            attempt,
            child_status: child.map(|c| c.status),
        })
    }

    fn check_parent(&self, parent: &Transaction) -> Result<(), RetryError> {
        if parent.is_child() {
            return Err(RetryError::InvalidParent {
                id: parent.id,
                reason: "not an originating leg".to_string(),
            });
        }
        if !parent.asset_code.eq_ignore_ascii_case(&self.settings.source_asset) {
            return Err(RetryError::InvalidParent {
                id: parent.id,
                reason: format!(
                    "asset {} is not {}",
                    parent.asset_code, self.settings.source_asset
                ),
            });
        }
        if parent.status == TransactionStatus::Failed {
            return Err(RetryError::InvalidParent {
                id: parent.id,
                reason: "source leg failed; nothing to settle".to_string(),
            });
        }
        Ok(())
    }

    async fn resolve_route(
        &self,
        country: &str,
        bank_code: &str,
    ) -> Result<(Channel, Bank), RetryError> {
        let channel = self
            .settlement
            .list_channels(country)
            .await?
            .into_iter()
            .find(Channel::is_bank_payout)
            .ok_or_else(|| RetryError::ChannelUnavailable(country.to_string()))?;

        let bank = self
            .settlement
            .list_banks(country)
            .await?
            .into_iter()
            .find(|bank| bank.code == bank_code && bank.supports(&channel))
            .ok_or_else(|| RetryError::BankUnavailable {
                bank_code: bank_code.to_string(),
                channel_id: channel.id.clone(),
            })?;

        Ok((channel, bank))
    }
}
