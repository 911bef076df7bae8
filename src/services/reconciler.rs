//! Resolves settlement webhooks into exactly-once ledger credits.
//!
//! Every reconciliation for a parent runs under the `settlement:{parent}`
//! distributed lock; inside it the ledger re-reads the child under a row lock,
//! so duplicate and racing webhooks collapse onto a single credit.

use bigdecimal::BigDecimal;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::provider::{EmailNotification, PushNotification};
use crate::domain::{SettlementEvent, SettlementSnapshot, Transaction};
use crate::error::ErrorKind;
use crate::ports::{
    FeeConfigStore, LedgerStore, NotificationSender, PostingOutcome, RepositoryError,
    SettlementAccountStore, SettlementPosting, UpstreamLegProvider,
};
use crate::services::fees::{self, FeeError};
use crate::services::lock::{settlement_lock_key, DistributedLock, LockError, LockOptions};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Parent transaction {0} not found")]
    ParentNotFound(Uuid),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<FeeError> for ReconcileError {
    fn from(e: FeeError) -> Self {
        if e.is_configuration() {
            ReconcileError::Configuration(e.to_string())
        } else {
            ReconcileError::Invariant(e.to_string())
        }
    }
}

impl ReconcileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::ParentNotFound(_) => ErrorKind::NotFound,
            ReconcileError::Configuration(_) => ErrorKind::Configuration,
            ReconcileError::Invariant(_) => ErrorKind::InvariantViolation,
            ReconcileError::Lock(LockError::Timeout { .. }) => ErrorKind::LockTimeout,
            ReconcileError::Lock(LockError::Store(_)) => ErrorKind::Storage,
            ReconcileError::Repository(RepositoryError::NotFound(_)) => ErrorKind::NotFound,
            ReconcileError::Repository(RepositoryError::Rule(_)) => ErrorKind::InvariantViolation,
            ReconcileError::Repository(_) => ErrorKind::Storage,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// No settlement account matches the event; stale or foreign webhook.
    UnknownAccount,
    AlreadyCompleted { child_id: Uuid },
    Created(Transaction),
    Completed(Transaction),
}

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub target_asset: String,
    pub fee_provider: String,
    pub lock: LockOptions,
}

pub struct SettlementReconciler {
    ledger: Arc<dyn LedgerStore>,
    accounts: Arc<dyn SettlementAccountStore>,
    fee_configs: Arc<dyn FeeConfigStore>,
    upstream: Arc<dyn UpstreamLegProvider>,
    notifier: Arc<dyn NotificationSender>,
    lock: DistributedLock,
    settings: ReconcilerSettings,
}

impl SettlementReconciler {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        accounts: Arc<dyn SettlementAccountStore>,
        fee_configs: Arc<dyn FeeConfigStore>,
        upstream: Arc<dyn UpstreamLegProvider>,
        notifier: Arc<dyn NotificationSender>,
        lock: DistributedLock,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            ledger,
            accounts,
            fee_configs,
            upstream,
            notifier,
            lock,
            settings,
        }
    }

    #[instrument(
        skip(self, event),
        fields(account = %event.settlement_account_id, provider_reference = %event.provider_reference)
    )]
    pub async fn handle(&self, event: &SettlementEvent) -> Result<ReconcileOutcome, ReconcileError> {
        let account = match self
            .accounts
            .find_by_account_number(&event.settlement_account_id)
            .await?
        {
            Some(account) => account,
            None => {
                tracing::info!("No settlement account bound to webhook; ignoring");
                return Ok(ReconcileOutcome::UnknownAccount);
            }
        };

        let parent_id = account.transaction_id;
        let outcome = self
            .lock
            .run_exclusive(&settlement_lock_key(parent_id), self.settings.lock, || {
                self.reconcile_locked(parent_id, event)
            })
            .await?;

        match &outcome {
            ReconcileOutcome::Created(child) | ReconcileOutcome::Completed(child) => {
                self.notify(child).await;
            }
            ReconcileOutcome::AlreadyCompleted { child_id } => {
                tracing::info!(%parent_id, %child_id, "Duplicate settlement webhook; child already completed");
            }
            ReconcileOutcome::UnknownAccount => {}
        }

        Ok(outcome)
    }

    /// Retries lock timeouts up to `attempts` times; other errors return at once.
    pub async fn handle_with_retries(
        &self,
        event: &SettlementEvent,
        attempts: u32,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.handle(event).await {
                Err(e) if e.kind() == ErrorKind::LockTimeout && attempt < attempts => {
                    tracing::warn!(attempt, attempts, error = %e, "Settlement lock busy; retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn reconcile_locked(
        &self,
        parent_id: Uuid,
        event: &SettlementEvent,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let parent = self
            .ledger
            .get_transaction(parent_id)
            .await?
            .ok_or(ReconcileError::ParentNotFound(parent_id))?;

        if !parent.status.is_completed() {
            // The settlement webhook can outrun the upstream leg's own completion.
            match self
                .upstream
                .confirm_and_reconcile_balance(parent.user_id)
                .await
            {
                Ok(result) => tracing::info!(
                    %parent_id,
                    confirmed = result.confirmed,
                    "Upstream leg reconciled before settlement"
                ),
                Err(e) => tracing::warn!(
                    %parent_id,
                    error = %e,
                    "Upstream reconciliation failed; continuing with settlement"
                ),
            }
        }

        let target = &self.settings.target_asset;
        if let Some(child) = self.ledger.find_child(parent.id, target).await? {
            if child.status.is_completed() {
                return Ok(ReconcileOutcome::AlreadyCompleted { child_id: child.id });
            }
            tracing::info!(
                %parent_id,
                child_id = %child.id,
                status = %child.status,
                "Completing existing settlement leg"
            );
        }

        let posting = self.build_posting(&parent, event).await?;

        let outcome = match self.ledger.post_settlement(&posting).await? {
            PostingOutcome::AlreadyCompleted(child) => {
                ReconcileOutcome::AlreadyCompleted { child_id: child.id }
            }
            PostingOutcome::Created(child) => {
                tracing::info!(%parent_id, child_id = %child.id, amount = child.amount, "Settlement leg created and completed");
                ReconcileOutcome::Created(child)
            }
            PostingOutcome::Completed(child) => {
                tracing::info!(
                    %parent_id,
                    child_id = %child.id,
                    amount = child.amount,
                    old_amount = ?child.metadata.old_amount,
                    "Settlement leg completed"
                );
                ReconcileOutcome::Completed(child)
            }
        };

        Ok(outcome)
    }

    /// Recomputes the credit from the event's settled amount. All validation
    /// happens here, before anything is written.
    async fn build_posting(
        &self,
        parent: &Transaction,
        event: &SettlementEvent,
    ) -> Result<SettlementPosting, ReconcileError> {
        if event.amount <= 0 {
            return Err(ReconcileError::Invariant(format!(
                "settled amount must be positive, got {}",
                event.amount
            )));
        }

        let rate = parent.metadata.rate_value.clone().ok_or_else(|| {
            ReconcileError::Configuration(format!(
                "parent {} has no settlement rate in metadata",
                parent.id
            ))
        })?;

        let fee_config = self
            .fee_configs
            .active_for(&self.settings.fee_provider)
            .await?
            .filter(|config| config.is_active)
            .ok_or_else(|| {
                ReconcileError::Configuration(format!(
                    "no active fee config for provider {}",
                    self.settings.fee_provider
                ))
            })?;

        let breakdown = fees::compute_net(&BigDecimal::from(event.amount), &fee_config, &rate)?;

        let snapshot = SettlementSnapshot {
            source_amount: event.amount,
            rate,
            gross: breakdown.gross,
            disbursement_fee: breakdown.disbursement_fee,
            partner_fee: breakdown.partner_fee,
            fee_config_version: fee_config.version,
            provider_reference: event.provider_reference.clone(),
            payer: event.payer_info.clone(),
            settled_at: Utc::now(),
        };

        Ok(SettlementPosting {
            parent_id: parent.id,
            asset_code: self.settings.target_asset.clone(),
            amount: breakdown.net,
            reference: child_reference(&parent.reference, &self.settings.target_asset),
            snapshot,
            provider_metadata: serde_json::to_value(&event.payer_info).ok(),
        })
    }

    /// Best effort: runs after the lock is released and never fails the caller.
    async fn notify(&self, child: &Transaction) {
        let push = PushNotification {
            user_id: child.user_id,
            title: "Transfer received".to_string(),
            body: format!("{} {} has been credited to your wallet", child.asset_code, format_minor(child.amount)),
        };
        if let Err(e) = self.notifier.send_push(&push).await {
            tracing::warn!(child_id = %child.id, error = %e, "Settlement push notification failed");
        }

        let email = EmailNotification {
            user_id: child.user_id,
            template: "settlement_completed".to_string(),
            data: serde_json::json!({
                "transaction_id": child.id,
                "asset_code": child.asset_code,
                "amount": format_minor(child.amount),
                "reference": child.reference,
            }),
        };
        if let Err(e) = self.notifier.send_email(&email).await {
            tracing::warn!(child_id = %child.id, error = %e, "Settlement email notification failed");
        }
    }
}

/// Deterministic so a lost race re-derives the same reference.
pub fn child_reference(parent_reference: &str, asset_code: &str) -> String {
    format!("{}:{}", parent_reference, asset_code.to_ascii_lowercase())
}

fn format_minor(amount: i64) -> String {
    BigDecimal::new(amount.into(), 2).to_string()
}
