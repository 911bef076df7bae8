use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::AppState;

/// Operator endpoint that re-issues a failed settlement leg.
pub async fn retry_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.retry.retry(id).await.map_err(|e| {
        tracing::error!(transaction_id = %id, kind = ?e.kind(), error = %e, "Settlement retry failed");
        AppError::from(e)
    })?;

    tracing::info!(
        transaction_id = %id,
        attempt = outcome.attempt,
        account_id = %outcome.new_account_id,
        "Settlement retry issued"
    );
    Ok((StatusCode::OK, Json(outcome)))
}
