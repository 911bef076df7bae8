//! Adapters implementing the ports for Postgres and Redis.

pub mod lock_store;
pub mod postgres_fee_configs;
pub mod postgres_ledger_store;
pub mod postgres_settlement_accounts;

pub use lock_store::{InMemoryLockStore, RedisLockStore};
pub use postgres_fee_configs::PostgresFeeConfigStore;
pub use postgres_ledger_store::PostgresLedgerStore;
pub use postgres_settlement_accounts::PostgresSettlementAccountStore;
