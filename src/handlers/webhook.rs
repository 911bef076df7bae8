use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::domain::SettlementEvent;
use crate::services::ReconcileOutcome;
use crate::AppState;

/// Settlement provider callback.
///
/// Always acknowledges with 200: the provider re-delivers on any other
/// status, and reconciliation is idempotent, so failures are logged and left
/// for the next delivery or an operator.
pub async fn settlement_callback(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    let event: SettlementEvent = match serde_json::from_value(payload) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed settlement webhook payload");
            return received();
        }
    };

    match state
        .reconciler
        .handle_with_retries(&event, state.webhook_lock_attempts)
        .await
    {
        Ok(ReconcileOutcome::Created(child)) | Ok(ReconcileOutcome::Completed(child)) => {
            tracing::info!(child_id = %child.id, amount = child.amount, "Settlement webhook reconciled");
        }
        Ok(ReconcileOutcome::AlreadyCompleted { child_id }) => {
            tracing::info!(%child_id, "Settlement webhook was a duplicate");
        }
        Ok(ReconcileOutcome::UnknownAccount) => {}
        Err(e) => {
            tracing::error!(
                kind = ?e.kind(),
                error = %e,
                account = %event.settlement_account_id,
                "Settlement webhook reconciliation failed"
            );
        }
    }

    received()
}

fn received() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "received": true })))
}
