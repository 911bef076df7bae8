//! Domain layer. No sqlx, axum or redis types cross into this module.

pub mod fees;
pub mod provider;
pub mod settlement;
pub mod transaction;

pub use fees::{FeeConfig, FeeRule};
pub use settlement::{PayerInfo, SettlementAccount, SettlementEvent};
pub use transaction::{
    LedgerRuleError, RetryRecord, SettlementParent, SettlementSnapshot, Transaction,
    TransactionMetadata, TransactionStatus, WalletTransaction, METADATA_VERSION,
};
