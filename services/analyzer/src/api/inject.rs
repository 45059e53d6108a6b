//! Message injection and standalone validation.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use s2_protocol::{parse_message, raw_message_type};

use super::AppState;
use super::response::{internal_error, no_connection};
use crate::router::RouterError;

#[derive(Debug, Deserialize)]
pub struct InjectRequest {
    pub origin_id: String,
    pub dest_id: String,
    pub message: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct InjectParams {
    #[serde(default)]
    pub validate: Option<bool>,
}

/// `POST /backend/inject/` — originate a message as if it had arrived on an
/// existing half-connection.  With `?validate=true` an invalid message is
/// rejected before any routing happens.
pub async fn inject_message(
    State(state): State<AppState>,
    Query(params): Query<InjectParams>,
    Json(request): Json<InjectRequest>,
) -> Response {
    if params.validate.unwrap_or(false) {
        if let Err(details) = parse_message(&request.message) {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "code": "SCHEMA_INVALID",
                    "message": details.msg,
                    "errors": details.errors,
                })),
            )
                .into_response();
        }
    }

    info!(
        origin_id = %request.origin_id,
        dest_id = %request.dest_id,
        "injecting message"
    );
    match state
        .router
        .inject(request.origin_id, request.dest_id, request.message)
        .await
    {
        Ok(()) => Json(json!({"status": "injected"})).into_response(),
        Err(e @ RouterError::NoConnection(_, _)) => no_connection(e.to_string()),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub message: serde_json::Value,
}

/// `POST /backend/validate-message/` — pure parse + validate; no routing,
/// no persistence.
pub async fn validate_message(Json(request): Json<ValidateRequest>) -> Response {
    match parse_message(&request.message) {
        Ok(typed) => Json(json!({
            "valid": true,
            "message_type": typed.type_name(),
        }))
        .into_response(),
        Err(details) => Json(json!({
            "valid": false,
            "message_type": raw_message_type(&request.message),
            "message": details.msg,
            "errors": details.errors,
        }))
        .into_response(),
    }
}
