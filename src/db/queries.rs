use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Result, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::db::models::{
    FeeConfigRow, SettlementAccountRow, TransactionRow, WalletRow, WalletTransactionRow,
};
use crate::domain::{SettlementAccount, Transaction, TransactionStatus, WalletTransaction};

const TRANSACTION_COLUMNS: &str = "id, user_id, parent_transaction_id, asset_code, amount, \
     balance_before, balance_after, status, reference, external_reference, metadata, \
     created_at, updated_at";

// --- Transaction Queries ---

pub async fn get_transaction(pool: &PgPool, id: Uuid) -> Result<Option<TransactionRow>> {
    sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {} FROM transactions WHERE id = $1",
        TRANSACTION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn lock_transaction(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<TransactionRow>> {
    sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {} FROM transactions WHERE id = $1 FOR UPDATE",
        TRANSACTION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut **executor)
    .await
}

pub async fn find_child(
    pool: &PgPool,
    parent_id: Uuid,
    asset_code: &str,
) -> Result<Option<TransactionRow>> {
    sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {} FROM transactions WHERE parent_transaction_id = $1 AND asset_code = $2",
        TRANSACTION_COLUMNS
    ))
    .bind(parent_id)
    .bind(asset_code)
    .fetch_optional(pool)
    .await
}

/// Row-locking read; only meaningful inside a write transaction.
pub async fn find_child_for_update(
    executor: &mut SqlxTransaction<'_, Postgres>,
    parent_id: Uuid,
    asset_code: &str,
) -> Result<Option<TransactionRow>> {
    sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {} FROM transactions \
         WHERE parent_transaction_id = $1 AND asset_code = $2 \
         FOR UPDATE",
        TRANSACTION_COLUMNS
    ))
    .bind(parent_id)
    .bind(asset_code)
    .fetch_optional(&mut **executor)
    .await
}

/// Inserts a child leg. Returns `None` when a concurrent attempt already
/// created the child for this parent and asset.
pub async fn create_child(
    executor: &mut SqlxTransaction<'_, Postgres>,
    tx: &Transaction,
) -> Result<Option<TransactionRow>> {
    sqlx::query_as::<_, TransactionRow>(&format!(
        r#"
        INSERT INTO transactions (
            id, user_id, parent_transaction_id, asset_code, amount,
            balance_before, balance_after, status, reference, external_reference,
            metadata, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT (parent_transaction_id, asset_code)
            WHERE parent_transaction_id IS NOT NULL
            DO NOTHING
        RETURNING {}
        "#,
        TRANSACTION_COLUMNS
    ))
    .bind(tx.id)
    .bind(tx.user_id)
    .bind(tx.parent_transaction_id)
    .bind(&tx.asset_code)
    .bind(tx.amount)
    .bind(tx.balance_before)
    .bind(tx.balance_after)
    .bind(tx.status.as_str())
    .bind(&tx.reference)
    .bind(&tx.external_reference)
    .bind(Json(&tx.metadata))
    .bind(tx.created_at)
    .bind(tx.updated_at)
    .fetch_optional(&mut **executor)
    .await
}

/// Writes the settled amount, the balance snapshot and the metadata, and
/// marks the row completed. Refuses to touch a row that is already completed.
pub async fn complete_child(
    executor: &mut SqlxTransaction<'_, Postgres>,
    tx: &Transaction,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE transactions
        SET amount = $2, balance_before = $3, balance_after = $4,
            status = $5, external_reference = $6, metadata = $7, updated_at = $8
        WHERE id = $1 AND status <> 'completed'
        "#,
    )
    .bind(tx.id)
    .bind(tx.amount)
    .bind(tx.balance_before)
    .bind(tx.balance_after)
    .bind(TransactionStatus::Completed.as_str())
    .bind(&tx.external_reference)
    .bind(Json(&tx.metadata))
    .bind(tx.updated_at)
    .execute(&mut **executor)
    .await?;

    Ok(result.rows_affected())
}

pub async fn update_status(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    status: TransactionStatus,
) -> Result<()> {
    sqlx::query("UPDATE transactions SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(status.as_str())
        .execute(&mut **executor)
        .await?;

    sqlx::query(
        "UPDATE wallet_transactions SET status = $2, updated_at = NOW() WHERE transaction_id = $1",
    )
    .bind(id)
    .bind(status.as_str())
    .execute(&mut **executor)
    .await?;

    Ok(())
}

pub async fn update_metadata(
    executor: &mut SqlxTransaction<'_, Postgres>,
    tx: &Transaction,
) -> Result<()> {
    sqlx::query("UPDATE transactions SET metadata = $2, updated_at = NOW() WHERE id = $1")
        .bind(tx.id)
        .bind(Json(&tx.metadata))
        .execute(&mut **executor)
        .await?;
    Ok(())
}

// --- Wallet Queries ---

/// Locks the user's wallet for `asset_code`, creating an empty one first if
/// the user has never held the asset.
pub async fn lock_wallet(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
    asset_code: &str,
) -> Result<WalletRow> {
    sqlx::query(
        r#"
        INSERT INTO wallets (id, user_id, asset_code, balance)
        VALUES ($1, $2, $3, 0)
        ON CONFLICT (user_id, asset_code) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(asset_code)
    .execute(&mut **executor)
    .await?;

    sqlx::query_as::<_, WalletRow>(
        "SELECT id, user_id, asset_code, balance FROM wallets \
         WHERE user_id = $1 AND asset_code = $2 FOR UPDATE",
    )
    .bind(user_id)
    .bind(asset_code)
    .fetch_one(&mut **executor)
    .await
}

pub async fn set_wallet_balance(
    executor: &mut SqlxTransaction<'_, Postgres>,
    wallet_id: Uuid,
    balance: i64,
) -> Result<()> {
    sqlx::query("UPDATE wallets SET balance = $2, updated_at = NOW() WHERE id = $1")
        .bind(wallet_id)
        .bind(balance)
        .execute(&mut **executor)
        .await?;
    Ok(())
}

pub async fn find_wallet_transaction(
    executor: &mut SqlxTransaction<'_, Postgres>,
    transaction_id: Uuid,
) -> Result<Option<WalletTransactionRow>> {
    sqlx::query_as::<_, WalletTransactionRow>(
        "SELECT * FROM wallet_transactions WHERE transaction_id = $1 FOR UPDATE",
    )
    .bind(transaction_id)
    .fetch_optional(&mut **executor)
    .await
}

pub async fn upsert_wallet_transaction(
    executor: &mut SqlxTransaction<'_, Postgres>,
    entry: &WalletTransaction,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO wallet_transactions (
            id, transaction_id, wallet_id, user_id, asset_code, amount,
            balance_before, balance_after, status, provider_reference, provider_metadata,
            created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT (transaction_id) DO UPDATE SET
            wallet_id = EXCLUDED.wallet_id,
            amount = EXCLUDED.amount,
            balance_before = EXCLUDED.balance_before,
            balance_after = EXCLUDED.balance_after,
            status = EXCLUDED.status,
            provider_reference = EXCLUDED.provider_reference,
            provider_metadata = EXCLUDED.provider_metadata,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(entry.id)
    .bind(entry.transaction_id)
    .bind(entry.wallet_id)
    .bind(entry.user_id)
    .bind(&entry.asset_code)
    .bind(entry.amount)
    .bind(entry.balance_before)
    .bind(entry.balance_after)
    .bind(entry.status.as_str())
    .bind(&entry.provider_reference)
    .bind(&entry.provider_metadata)
    .bind(entry.created_at)
    .bind(entry.updated_at)
    .execute(&mut **executor)
    .await?;
    Ok(())
}

// --- Settlement Account Queries ---

pub async fn find_settlement_account(
    pool: &PgPool,
    account_number: &str,
) -> Result<Option<SettlementAccountRow>> {
    sqlx::query_as::<_, SettlementAccountRow>(
        "SELECT * FROM settlement_accounts WHERE account_number = $1 \
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(account_number)
    .fetch_optional(pool)
    .await
}

pub async fn insert_settlement_account(
    pool: &PgPool,
    account: &SettlementAccount,
) -> Result<SettlementAccountRow> {
    sqlx::query_as::<_, SettlementAccountRow>(
        r#"
        INSERT INTO settlement_accounts (
            id, transaction_id, account_number, account_name, bank_name, bank_code,
            provider_reference, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(account.id)
    .bind(account.transaction_id)
    .bind(&account.account_number)
    .bind(&account.account_name)
    .bind(&account.bank_name)
    .bind(&account.bank_code)
    .bind(&account.provider_reference)
    .bind(account.created_at)
    .fetch_one(pool)
    .await
}

// --- Fee Config Queries ---

pub async fn get_active_fee_config(pool: &PgPool, provider: &str) -> Result<Option<FeeConfigRow>> {
    sqlx::query_as::<_, FeeConfigRow>(
        r#"
        SELECT id, provider, version, disbursement_fee_value, disbursement_fee_is_percentage,
               partner_fee_value, partner_fee_is_percentage, is_active
        FROM fee_configs
        WHERE provider = $1 AND is_active
        ORDER BY version DESC
        LIMIT 1
        "#,
    )
    .bind(provider)
    .fetch_optional(pool)
    .await
}
