//! SQLx row types. Status and metadata are parsed into domain types here and
//! nowhere else.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::{
    FeeConfig, FeeRule, SettlementAccount, Transaction, TransactionMetadata, TransactionStatus,
    WalletTransaction,
};
use crate::ports::RepositoryError;

#[derive(Debug, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub parent_transaction_id: Option<Uuid>,
    pub asset_code: String,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub status: String,
    pub reference: String,
    pub external_reference: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = RepositoryError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let status = parse_status(&row.status, row.id)?;
        let metadata: TransactionMetadata = serde_json::from_value(row.metadata).map_err(|e| {
            RepositoryError::Corrupt(format!("transaction {} metadata: {}", row.id, e))
        })?;

        Ok(Transaction {
            id: row.id,
            user_id: row.user_id,
            parent_transaction_id: row.parent_transaction_id,
            asset_code: row.asset_code,
            amount: row.amount,
            balance_before: row.balance_before,
            balance_after: row.balance_after,
            status,
            reference: row.reference,
            external_reference: row.external_reference,
            metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct WalletRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub asset_code: String,
    pub balance: i64,
}

#[derive(Debug, FromRow)]
pub struct WalletTransactionRow {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub wallet_id: Uuid,
    pub user_id: Uuid,
    pub asset_code: String,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub status: String,
    pub provider_reference: Option<String>,
    pub provider_metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<WalletTransactionRow> for WalletTransaction {
    type Error = RepositoryError;

    fn try_from(row: WalletTransactionRow) -> Result<Self, Self::Error> {
        Ok(WalletTransaction {
            status: parse_status(&row.status, row.id)?,
            id: row.id,
            transaction_id: row.transaction_id,
            wallet_id: row.wallet_id,
            user_id: row.user_id,
            asset_code: row.asset_code,
            amount: row.amount,
            balance_before: row.balance_before,
            balance_after: row.balance_after,
            provider_reference: row.provider_reference,
            provider_metadata: row.provider_metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct SettlementAccountRow {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub account_number: String,
    pub account_name: String,
    pub bank_name: String,
    pub bank_code: String,
    pub provider_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<SettlementAccountRow> for SettlementAccount {
    fn from(row: SettlementAccountRow) -> Self {
        SettlementAccount {
            id: row.id,
            transaction_id: row.transaction_id,
            account_number: row.account_number,
            account_name: row.account_name,
            bank_name: row.bank_name,
            bank_code: row.bank_code,
            provider_reference: row.provider_reference,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct FeeConfigRow {
    pub id: Uuid,
    pub provider: String,
    pub version: i32,
    pub disbursement_fee_value: BigDecimal,
    pub disbursement_fee_is_percentage: bool,
    pub partner_fee_value: BigDecimal,
    pub partner_fee_is_percentage: bool,
    pub is_active: bool,
}

impl From<FeeConfigRow> for FeeConfig {
    fn from(row: FeeConfigRow) -> Self {
        FeeConfig {
            id: row.id,
            provider: row.provider,
            version: row.version,
            disbursement_fee: FeeRule {
                value: row.disbursement_fee_value,
                is_percentage: row.disbursement_fee_is_percentage,
            },
            partner_fee: FeeRule {
                value: row.partner_fee_value,
                is_percentage: row.partner_fee_is_percentage,
            },
            is_active: row.is_active,
        }
    }
}

fn parse_status(raw: &str, id: Uuid) -> Result<TransactionStatus, RepositoryError> {
    raw.parse()
        .map_err(|e| RepositoryError::Corrupt(format!("row {}: {}", id, e)))
}
