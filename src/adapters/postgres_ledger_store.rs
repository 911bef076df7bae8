//! Postgres implementation of LedgerStore.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::db::queries;
use crate::domain::{
    RetryRecord, SettlementParent, Transaction, TransactionStatus, WalletTransaction,
};
use crate::ports::{
    LedgerStore, PostingOutcome, RepositoryError, RepositoryResult, SettlementPosting,
};

/// Postgres-backed settlement ledger.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Finds the child under a row lock, creating it if absent. A lost insert
    /// race falls through to the row the winner created.
    async fn lock_or_create_child(
        &self,
        tx: &mut SqlxTransaction<'_, Postgres>,
        parent: &Transaction,
        posting: &SettlementPosting,
    ) -> RepositoryResult<(Transaction, bool)> {
        if let Some(row) =
            queries::find_child_for_update(tx, parent.id, &posting.asset_code).await?
        {
            return Ok((Transaction::try_from(row)?, false));
        }

        let child = Transaction::new_child(
            &SettlementParent::from(parent),
            posting.asset_code.clone(),
            posting.amount,
            posting.reference.clone(),
        );
        if let Some(row) = queries::create_child(tx, &child).await? {
            return Ok((Transaction::try_from(row)?, true));
        }

        tracing::info!(parent_id = %parent.id, "Child created concurrently; completing existing row");
        let row = queries::find_child_for_update(tx, parent.id, &posting.asset_code)
            .await?
            .ok_or_else(|| {
                RepositoryError::NotFound(format!("child of {} after insert conflict", parent.id))
            })?;
        Ok((Transaction::try_from(row)?, false))
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn get_transaction(&self, id: Uuid) -> RepositoryResult<Option<Transaction>> {
        queries::get_transaction(&self.pool, id)
            .await?
            .map(Transaction::try_from)
            .transpose()
    }

    async fn find_child(
        &self,
        parent_id: Uuid,
        asset_code: &str,
    ) -> RepositoryResult<Option<Transaction>> {
        queries::find_child(&self.pool, parent_id, asset_code)
            .await?
            .map(Transaction::try_from)
            .transpose()
    }

    async fn post_settlement(&self, posting: &SettlementPosting) -> RepositoryResult<PostingOutcome> {
        let mut tx = self.pool.begin().await?;

        // Serializes every writer for this parent, including ones that never
        // went through the distributed lock.
        let parent = queries::lock_transaction(&mut tx, posting.parent_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", posting.parent_id)))
            .and_then(Transaction::try_from)?;

        let (mut child, created) = self.lock_or_create_child(&mut tx, &parent, posting).await?;
        if child.status.is_completed() {
            tx.rollback().await?;
            return Ok(PostingOutcome::AlreadyCompleted(child));
        }

        let wallet = queries::lock_wallet(&mut tx, child.user_id, &child.asset_code).await?;
        child.complete_settlement(posting.amount, wallet.balance, posting.snapshot.clone())?;

        if queries::complete_child(&mut tx, &child).await? != 1 {
            return Err(RepositoryError::Storage(format!(
                "child {} changed while locked",
                child.id
            )));
        }
        queries::set_wallet_balance(&mut tx, wallet.id, child.balance_after).await?;

        let existing = queries::find_wallet_transaction(&mut tx, child.id)
            .await?
            .map(WalletTransaction::try_from)
            .transpose()?;
        let entry = WalletTransaction::mirror(
            &child,
            wallet.id,
            existing.as_ref(),
            posting.provider_metadata.clone(),
        );
        queries::upsert_wallet_transaction(&mut tx, &entry).await?;

        tx.commit().await?;

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
        let mut tx = self.pool.begin().await?;

        let mut parent = queries::lock_transaction(&mut tx, parent_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", parent_id)))
            .and_then(Transaction::try_from)?;
        parent.metadata.record_retry(record.clone());
        queries::update_metadata(&mut tx, &parent).await?;

        let child = match child_id {
            Some(id) => {
                let mut child = queries::lock_transaction(&mut tx, id)
                    .await?
                    .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))
                    .and_then(Transaction::try_from)?;
                if child.mark_for_reconcile() {
                    queries::update_status(&mut tx, child.id, TransactionStatus::Reconcile)
                        .await?;
                }
                Some(child)
            }
            None => None,
        };

        tx.commit().await?;
        Ok(child)
    }
}
