// Alert handlers.
//
// POST /api/alerts - report a feed match seen by a client (user)
// GET  /api/alerts - reported alerts, newest first, `offset`/`limit` (admin)

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::Deserialize;

use super::json_body;
use crate::alerts::AlertReport;
use crate::db::models::Alert;
use crate::error::NodeError;
use crate::web::{AppState, AuthUser};

#[derive(Deserialize)]
pub struct AlertRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "match", default)]
    pub matched: String,
    pub indicator: String,
}

#[derive(Deserialize)]
pub struct AlertPage {
    #[serde(default)]
    pub offset: u64,
    /// Zero returns everything after `offset`.
    #[serde(default)]
    pub limit: u64,
}

pub async fn report_alert(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    payload: Result<Json<AlertRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, NodeError> {
    let body = json_body(payload)?;
    let alert = state
        .alerts
        .report(
            AlertReport {
                kind: body.kind,
                matched: body.matched,
                indicator: body.indicator,
            },
            caller.id(),
        )
        .await?;
    Ok(Json(serde_json::json!({ "id": alert.id })))
}

pub async fn list_alerts(
    State(state): State<AppState>,
    page: Result<Query<AlertPage>, QueryRejection>,
) -> Result<Json<Vec<Alert>>, NodeError> {
    let Query(page) = page.map_err(|e| NodeError::InvalidRequest(e.body_text()))?;
    Ok(Json(state.alerts.list(page.offset, page.limit).await?))
}
