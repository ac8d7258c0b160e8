// Web server - Axum-based JSON API for the indicator feed.
//
// Routes are grouped by the minimum role they require; each group sits behind
// the matching gate middleware from `auth`. Public routes (health, node
// config, key check, registration) have no gate.
//
// Errors always use the same envelope: {"error": message, "code": code}.

use std::sync::Arc;

use anyhow::Result;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::alerts::AlertDesk;
use crate::authority::RoleAuthority;
use crate::config::Config;
use crate::db::models::User;
use crate::db::Database;
use crate::error::NodeError;
use crate::indicators::IndicatorStore;
use crate::reviews::ReviewDesk;
use crate::users::UserRegistry;

pub mod auth;
pub mod handlers;

/// Shared application state threaded through all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<IndicatorStore>,
    pub authority: Arc<RoleAuthority>,
    pub registry: Arc<UserRegistry>,
    pub reviews: Arc<ReviewDesk>,
    pub alerts: Arc<AlertDesk>,
}

impl AppState {
    /// Wire every service to the same store handle.
    pub fn new(config: Config, db: Arc<dyn Database>) -> Self {
        let enforce = config.enforce_user_auth;
        Self {
            config: Arc::new(config),
            store: Arc::new(IndicatorStore::new(db.clone())),
            authority: Arc::new(RoleAuthority::new(db.clone(), enforce)),
            registry: Arc::new(UserRegistry::new(db.clone(), enforce)),
            reviews: Arc::new(ReviewDesk::new(db.clone())),
            alerts: Arc::new(AlertDesk::new(db)),
        }
    }
}

/// Start the Axum web server and block until it exits.
pub async fn run_server(
    config: Config,
    db: Arc<dyn Database>,
    port: u16,
    bind: &str,
) -> Result<()> {
    let enforce = config.enforce_user_auth;
    let app = build_router(AppState::new(config, db));

    let addr = format!("{bind}:{port}");
    info!(enforce_user_auth = enforce, "phishnode listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    use handlers::{alerts, indicators, reviews, users};

    // Readers: any resolved user (or anyone, when the node is open)
    let user_api = Router::new()
        .route("/api/indicators", get(indicators::feed_six_months))
        .route("/api/indicators/recent", get(indicators::feed_recent))
        .route("/api/indicators/all", get(indicators::feed_all))
        .route("/api/reviews", post(reviews::request_review))
        .route("/api/alerts", post(alerts::report_alert))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_user,
        ));

    let submitter_api = Router::new()
        .route("/api/indicators", post(indicators::submit))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_submitter,
        ));

    let admin_api = Router::new()
        .route("/api/indicators/pending", get(indicators::list_pending))
        .route("/api/indicators/disabled", get(indicators::list_disabled))
        .route("/api/indicators/enable", post(indicators::enable))
        .route("/api/indicators/disable", post(indicators::disable))
        .route("/api/indicators/{hash}", get(indicators::details))
        .route("/api/users/pending", get(users::list_pending))
        .route("/api/users/active", get(users::list_active))
        .route("/api/users/{id}/activate", post(users::activate))
        .route("/api/users/{id}/deactivate", post(users::deactivate))
        .route("/api/reviews", get(reviews::list_reviews))
        .route("/api/reviews/{hash}", get(reviews::reviews_for))
        .route("/api/alerts", get(alerts::list_alerts))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    // Public routes (no auth)
    let public_api = Router::new()
        .route("/health", get(health))
        .route("/api/config", get(handlers::config::get_config))
        .route("/api/auth", get(handlers::auth::check_auth))
        .route("/api/users/register", post(users::register));

    Router::new()
        .merge(user_api)
        .merge(submitter_api)
        .merge(admin_api)
        .merge(public_api)
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness probe - always returns 200 OK.
async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({ "status": "ok" })),
    )
}

/// Typed JSON error response helper.
pub fn api_error(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        axum::Json(serde_json::json!({ "error": message, "code": code })),
    )
        .into_response()
}

impl NodeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            NodeError::InvalidRequest(_) | NodeError::UnrecognizedIndicatorFormat(_) => {
                StatusCode::BAD_REQUEST
            }
            NodeError::InvalidKeyFormat | NodeError::NotAuthorized => StatusCode::UNAUTHORIZED,
            NodeError::NotActivated | NodeError::AuthNotEnforced => StatusCode::FORBIDDEN,
            NodeError::NotFound(_) => StatusCode::NOT_FOUND,
            NodeError::AlreadyRegistered => StatusCode::CONFLICT,
            NodeError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        if let NodeError::StoreUnavailable(ref e) = self {
            error!(error = %format!("{e:#}"), "Store error while serving request");
        }
        api_error(self.status_code(), self.code(), &self.public_message())
    }
}

/// The caller resolved by the gate middleware. None when the route was open
/// to anonymous callers. Inserted into request extensions by the gates in
/// `auth`.
#[derive(Clone)]
pub struct AuthUser(pub Option<User>);

impl AuthUser {
    /// Name recorded as the owner of submitted indicators.
    pub fn owner(&self) -> String {
        self.0.as_ref().map(|u| u.name.clone()).unwrap_or_default()
    }

    pub fn id(&self) -> Option<&str> {
        self.0.as_ref().map(|u| u.id.as_str())
    }
}
