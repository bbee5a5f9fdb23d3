use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use restock_reconcile::ReconcileError;

pub fn reconcile_error_to_response(err: ReconcileError) -> axum::response::Response {
    let status = match &err {
        ReconcileError::Parse(_) | ReconcileError::Validation(_) => StatusCode::BAD_REQUEST,
        ReconcileError::NotFound(_) => StatusCode::NOT_FOUND,
        ReconcileError::Conflict(_)
        | ReconcileError::Duplicate(_)
        | ReconcileError::DuplicateCode(_) => StatusCode::CONFLICT,
        ReconcileError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }

    (
        status,
        axum::Json(json!({
            "error": err.code(),
            "message": err.to_string(),
            "retryable": err.is_retryable(),
        })),
    )
        .into_response()
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
            "retryable": false,
        })),
    )
        .into_response()
}
