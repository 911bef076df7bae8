use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::queries;
use crate::domain::FeeConfig;
use crate::ports::{FeeConfigStore, RepositoryResult};

/// Reads fee schedules; writes belong to configuration management.
#[derive(Clone)]
pub struct PostgresFeeConfigStore {
    pool: PgPool,
}

impl PostgresFeeConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FeeConfigStore for PostgresFeeConfigStore {
    async fn active_for(&self, provider: &str) -> RepositoryResult<Option<FeeConfig>> {
        let row = queries::get_active_fee_config(&self.pool, provider).await?;
        Ok(row.map(FeeConfig::from))
    }
}
