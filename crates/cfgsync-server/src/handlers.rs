use std::time::Duration;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use cfgsync_core::{Digest, ReconcileOutcome, reconcile_until};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::ApiError;
use crate::server::AppState;

/// Upper bound on the slack reserved for writing the response once the
/// request deadline is reached.
const RESPONSE_MARGIN: Duration = Duration::from_secs(1);

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    pub status: &'a str,
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// Ready once the cached tier has been populated at least once.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let synced = state
        .snapshot
        .as_ref()
        .is_none_or(|snapshot| snapshot.last_synced().is_some());
    if synced {
        (StatusCode::OK, Json(HealthResponse { status: "ready" }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse { status: "syncing" }),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckParams {
    /// Requested digest, hex-encoded SHA-256.
    pub c: Option<String>,
}

/// `POST /sidecar/v1/config?c={digest}`
pub async fn check_config(
    State(state): State<AppState>,
    Query(params): Query<CheckParams>,
) -> Result<Json<ReconcileOutcome>, ApiError> {
    let requested = Digest::parse(params.c.as_deref().unwrap_or_default())?;
    let deadline = Instant::now() + request_budget(state.request_timeout);
    let outcome = reconcile_until(&state.ctx, &requested, deadline).await?;
    Ok(Json(outcome))
}

fn request_budget(request_timeout: Duration) -> Duration {
    let margin = RESPONSE_MARGIN.min(request_timeout / 10);
    request_timeout.saturating_sub(margin)
}
