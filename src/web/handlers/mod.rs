pub mod alerts;
pub mod auth;
pub mod config;
pub mod indicators;
pub mod reviews;
pub mod users;

use axum::extract::rejection::JsonRejection;
use axum::Json;

use crate::error::NodeError;

/// Unwrap a JSON body, turning axum's rejection into our error envelope.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, NodeError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| NodeError::InvalidRequest(e.body_text()))
}
