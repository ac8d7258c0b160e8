// GET /api/config - node settings clients need before they authenticate.

use axum::extract::State;
use axum::Json;

use crate::config::PublicConfig;
use crate::web::AppState;

pub async fn get_config(State(state): State<AppState>) -> Json<PublicConfig> {
    Json(state.config.public())
}
