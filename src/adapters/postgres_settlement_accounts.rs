use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::queries;
use crate::domain::SettlementAccount;
use crate::ports::{RepositoryResult, SettlementAccountStore};

#[derive(Clone)]
pub struct PostgresSettlementAccountStore {
    pool: PgPool,
}

impl PostgresSettlementAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettlementAccountStore for PostgresSettlementAccountStore {
    async fn find_by_account_number(
        &self,
        account_number: &str,
    ) -> RepositoryResult<Option<SettlementAccount>> {
        let row = queries::find_settlement_account(&self.pool, account_number).await?;
        Ok(row.map(SettlementAccount::from))
    }

    async fn insert(&self, account: &SettlementAccount) -> RepositoryResult<SettlementAccount> {
        let row = queries::insert_settlement_account(&self.pool, account).await?;
        Ok(row.into())
    }
}
