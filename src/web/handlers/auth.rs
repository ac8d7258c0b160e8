// GET /api/auth - lets a client check its key without side effects.
//
// Public route: the key is always resolved here, even on an open node where
// the reader gate would let anyone through.

use axum::extract::{Request, State};
use axum::Json;

use crate::error::NodeError;
use crate::web::auth::extract_key;
use crate::web::AppState;

pub async fn check_auth(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<serde_json::Value>, NodeError> {
    let (_, key) = extract_key(request).await?;
    state.authority.resolve(key.as_deref()).await?;
    Ok(Json(serde_json::json!({})))
}
