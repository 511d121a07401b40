//! Mapping of reconciliation failures onto HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use cfgsync_core::{ErrorCategory, ReconcileError};
use serde_json::json;

/// Wrapper that renders a [`ReconcileError`] as a JSON error body.
#[derive(Debug)]
pub struct ApiError(pub ReconcileError);

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match (&self.0, self.0.category()) {
            (ReconcileError::LiveCallTimedOut { .. }, _) => StatusCode::GATEWAY_TIMEOUT,
            (_, ErrorCategory::Validation) => StatusCode::BAD_REQUEST,
            (_, ErrorCategory::Mismatch) => StatusCode::CONFLICT,
            (_, ErrorCategory::ControlPlane) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let err = &self.0;

        if status.is_server_error() {
            tracing::warn!(code = err.code(), error = %err, "config check failed");
        } else {
            tracing::info!(code = err.code(), error = %err, "config check rejected");
        }

        let mut body = json!({
            "error": {
                "code": err.code(),
                "category": err.category().to_string(),
                "message": err.to_string(),
            }
        });
        if let ReconcileError::Unresolvable {
            requested,
            canonical,
        } = err
        {
            body["requested_digest"] = json!(requested.as_str());
            body["canonical_digest"] = json!(canonical.as_str());
        }

        (status, Json(body)).into_response()
    }
}
