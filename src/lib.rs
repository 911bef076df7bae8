pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod ports;
pub mod providers;
pub mod services;
pub mod startup;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::services::{RetryOrchestrator, SettlementReconciler};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub redis_url: String,
    pub reconciler: Arc<SettlementReconciler>,
    pub retry: Arc<RetryOrchestrator>,
    /// Attempts per webhook delivery when the settlement lock is busy.
    pub webhook_lock_attempts: u32,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/webhooks/settlement",
            post(handlers::webhook::settlement_callback),
        )
        .route(
            "/admin/transactions/:id/retry",
            post(handlers::admin::retry_transaction),
        )
        .with_state(state)
}
