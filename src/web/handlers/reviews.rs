// Review handlers.
//
// POST /api/reviews - ask the administrators to look at an indicator (user)
// GET  /api/reviews - all review requests, newest first (admin)
// GET  /api/reviews/{hash} - requests filed against one indicator (admin)

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;

use super::json_body;
use crate::db::models::Review;
use crate::error::NodeError;
use crate::web::{AppState, AuthUser};

#[derive(Deserialize)]
pub struct ReviewRequest {
    /// Digest of the indicator to review.
    pub indicator: String,
}

pub async fn request_review(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    payload: Result<Json<ReviewRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, NodeError> {
    let body = json_body(payload)?;
    let review = state.reviews.request(&body.indicator, caller.id()).await?;
    Ok(Json(serde_json::json!({ "id": review.id })))
}

pub async fn list_reviews(State(state): State<AppState>) -> Result<Json<Vec<Review>>, NodeError> {
    Ok(Json(state.reviews.list().await?))
}

pub async fn reviews_for(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<Vec<Review>>, NodeError> {
    Ok(Json(state.reviews.for_indicator(&hash).await?))
}
