// User handlers.
//
// POST /api/users/register         - self-service registration (public)
// GET  /api/users/pending          - accounts awaiting activation (admin)
// GET  /api/users/active           - activated accounts (admin)
// POST /api/users/{id}/activate    - (admin)
// POST /api/users/{id}/deactivate  - (admin)
//
// All of these answer 403 auth_not_enforced on an open node.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use super::json_body;
use crate::db::models::User;
use crate::error::NodeError;
use crate::web::AppState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
}

/// POST /api/users/register - the response carries the new key; it is the
/// only time the caller sees it.
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<User>, NodeError> {
    let body = json_body(payload)?;
    let user = state.registry.register(&body.name, &body.email).await?;
    Ok(Json(user))
}

pub async fn list_pending(State(state): State<AppState>) -> Result<Json<Vec<User>>, NodeError> {
    Ok(Json(state.registry.pending().await?))
}

pub async fn list_active(State(state): State<AppState>) -> Result<Json<Vec<User>>, NodeError> {
    Ok(Json(state.registry.active().await?))
}

/// POST /api/users/{id}/activate - answers with the updated account.
pub async fn activate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, NodeError> {
    Ok(Json(state.registry.activate(&id).await?))
}

pub async fn deactivate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, NodeError> {
    Ok(Json(state.registry.deactivate(&id).await?))
}
