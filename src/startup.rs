use crate::adapters::{
    PostgresFeeConfigStore, PostgresLedgerStore, PostgresSettlementAccountStore, RedisLockStore,
};
use crate::config::Config;
use crate::ports::{
    FeeConfigStore, LedgerStore, NotificationSender, SettlementAccountStore,
};
use crate::providers::{
    HttpAccountProvider, HttpNotificationSender, HttpSettlementProvider, HttpUpstreamProvider,
    LogNotificationSender, ProviderClient,
};
use crate::services::{DistributedLock, RetryOrchestrator, SettlementReconciler};
use crate::AppState;
use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub redis: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.redis
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        println!("Redis Connectivity:    {}", status(self.redis));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  - {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "PASS" } else { "FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "OK" } else { "FAIL" }
}

pub async fn validate_environment(config: &Config, pool: &PgPool) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        redis: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Err(e) = validate_database(pool).await {
        report.database = false;
        report.errors.push(format!("Database: {}", e));
    }

    if let Err(e) = validate_redis(&config.redis_url).await {
        report.redis = false;
        report.errors.push(format!("Redis: {}", e));
    }

    Ok(report)
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.redis_url.is_empty() {
        anyhow::bail!("REDIS_URL is empty");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.webhook_lock_attempts == 0 {
        anyhow::bail!("WEBHOOK_LOCK_ATTEMPTS must be greater than 0");
    }
    if config.source_asset.eq_ignore_ascii_case(&config.target_asset) {
        anyhow::bail!("SOURCE_ASSET and TARGET_ASSET must differ");
    }

    url::Url::parse(&config.settlement_provider_url)
        .context("SETTLEMENT_PROVIDER_URL is not a valid URL")?;
    url::Url::parse(&config.account_provider_url)
        .context("ACCOUNT_PROVIDER_URL is not a valid URL")?;
    url::Url::parse(&config.upstream_provider_url)
        .context("UPSTREAM_PROVIDER_URL is not a valid URL")?;
    if let Some(notification_url) = &config.notification_url {
        url::Url::parse(notification_url).context("NOTIFICATION_URL is not a valid URL")?;
    }

    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

async fn validate_redis(redis_url: &str) -> Result<()> {
    let client = redis::Client::open(redis_url).context("Invalid Redis URL")?;

    let mut conn = client
        .get_multiplexed_tokio_connection()
        .await
        .context("Failed to connect to Redis")?;

    redis::cmd("PING")
        .query_async::<_, String>(&mut conn)
        .await
        .context("Redis PING failed")?;

    Ok(())
}

/// Wires the Postgres, Redis and HTTP adapters into the two services.
pub fn build_state(config: &Config, pool: PgPool) -> Result<AppState> {
    let ledger: Arc<dyn LedgerStore> = Arc::new(PostgresLedgerStore::new(pool.clone()));
    let accounts: Arc<dyn SettlementAccountStore> =
        Arc::new(PostgresSettlementAccountStore::new(pool.clone()));
    let fee_configs: Arc<dyn FeeConfigStore> = Arc::new(PostgresFeeConfigStore::new(pool.clone()));
    let lock = DistributedLock::new(Arc::new(RedisLockStore::new(&config.redis_url)?));

    let settlement = Arc::new(HttpSettlementProvider::new(ProviderClient::new(
        "settlement",
        config.settlement_provider_url.clone(),
        config.settlement_provider_api_key.clone(),
    )));
    let account_provider = Arc::new(HttpAccountProvider::new(ProviderClient::new(
        "accounts",
        config.account_provider_url.clone(),
        config.account_provider_api_key.clone(),
    )));
    let upstream = Arc::new(HttpUpstreamProvider::new(ProviderClient::new(
        "upstream",
        config.upstream_provider_url.clone(),
        config.upstream_provider_api_key.clone(),
    )));
    let notifier: Arc<dyn NotificationSender> = match &config.notification_url {
        Some(url) => Arc::new(HttpNotificationSender::new(ProviderClient::new(
            "notifications",
            url.clone(),
            None,
        ))),
        None => {
            tracing::info!("NOTIFICATION_URL not set; notifications will only be logged");
            Arc::new(LogNotificationSender)
        }
    };

    let reconciler = SettlementReconciler::new(
        ledger.clone(),
        accounts.clone(),
        fee_configs,
        upstream,
        notifier,
        lock.clone(),
        config.reconciler_settings(),
    );
    let retry = RetryOrchestrator::new(
        ledger,
        accounts,
        account_provider,
        settlement,
        lock,
        config.retry_settings(),
    );

    Ok(AppState {
        db: pool,
        redis_url: config.redis_url.clone(),
        reconciler: Arc::new(reconciler),
        retry: Arc::new(retry),
        webhook_lock_attempts: config.webhook_lock_attempts,
    })
}
