// Indicator handlers.
//
// GET  /api/indicators            - enabled digests, last 6 months   (user)
// GET  /api/indicators/recent     - enabled digests, last 24 hours   (user)
// GET  /api/indicators/all        - enabled digests, all time        (user)
// GET  /api/indicators/pending    - full pending records             (admin)
// GET  /api/indicators/disabled   - full disabled records            (admin)
// POST /api/indicators            - submit a batch                   (submitter)
// POST /api/indicators/enable     - bulk status change               (admin)
// POST /api/indicators/disable    - bulk status change               (admin)
// GET  /api/indicators/{hash}     - one full record                  (admin)

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::{de, Deserialize, Deserializer, Serialize};

use super::json_body;
use crate::db::models::{Indicator, IndicatorKind, IndicatorStatus};
use crate::error::NodeError;
use crate::indicators::{Feed, FeedWindow, Submission};
use crate::web::{AppState, AuthUser};

#[derive(Deserialize)]
pub struct SubmitRequest {
    #[serde(rename = "type", default, deserialize_with = "blank_as_none")]
    pub kind: Option<IndicatorKind>,
    pub indicators: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Clients that leave the type unset often send `""`; treat it as absent.
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<IndicatorKind>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(kind) if !kind.trim().is_empty() => kind.parse().map(Some).map_err(de::Error::custom),
        _ => Ok(None),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub added_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleResponse {
    pub toggled_count: usize,
}

pub async fn feed_six_months(State(state): State<AppState>) -> Result<Json<Feed>, NodeError> {
    Ok(Json(state.store.feed(FeedWindow::SixMonths).await?))
}

pub async fn feed_recent(State(state): State<AppState>) -> Result<Json<Feed>, NodeError> {
    Ok(Json(state.store.feed(FeedWindow::Day).await?))
}

pub async fn feed_all(State(state): State<AppState>) -> Result<Json<Feed>, NodeError> {
    Ok(Json(state.store.feed(FeedWindow::AllTime).await?))
}

pub async fn list_pending(
    State(state): State<AppState>,
) -> Result<Json<Vec<Indicator>>, NodeError> {
    let pending = state
        .store
        .fetch(FeedWindow::AllTime, Some(IndicatorStatus::Pending))
        .await?;
    Ok(Json(pending))
}

pub async fn list_disabled(
    State(state): State<AppState>,
) -> Result<Json<Vec<Indicator>>, NodeError> {
    let disabled = state
        .store
        .fetch(FeedWindow::AllTime, Some(IndicatorStatus::Disabled))
        .await?;
    Ok(Json(disabled))
}

/// POST /api/indicators - items that can't be parsed are skipped, so a
/// partially bad batch still succeeds with a lower count.
pub async fn submit(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<SubmitResponse>, NodeError> {
    let body = json_body(payload)?;
    if body.indicators.is_empty() {
        return Err(NodeError::InvalidRequest("no indicators provided".to_string()));
    }

    let summary = state
        .store
        .add(&Submission {
            kind: body.kind,
            values: body.indicators,
            tags: body.tags,
            owner: caller.owner(),
            enabled: body.enabled,
        })
        .await;

    Ok(Json(SubmitResponse {
        added_count: summary.added,
    }))
}

pub async fn enable(
    State(state): State<AppState>,
    payload: Result<Json<Vec<String>>, JsonRejection>,
) -> Result<Json<ToggleResponse>, NodeError> {
    toggle(&state, json_body(payload)?, IndicatorStatus::Enabled).await
}

pub async fn disable(
    State(state): State<AppState>,
    payload: Result<Json<Vec<String>>, JsonRejection>,
) -> Result<Json<ToggleResponse>, NodeError> {
    toggle(&state, json_body(payload)?, IndicatorStatus::Disabled).await
}

pub async fn details(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<Indicator>, NodeError> {
    Ok(Json(state.store.details(&hash).await?))
}

async fn toggle(
    state: &AppState,
    hashes: Vec<String>,
    status: IndicatorStatus,
) -> Result<Json<ToggleResponse>, NodeError> {
    let toggled_count = state.store.set_status_many(&hashes, status).await?;
    Ok(Json(ToggleResponse { toggled_count }))
}
