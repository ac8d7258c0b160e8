// Gate middleware - resolves the caller's API key and checks its role.
//
// The key can be presented three ways, tried in order:
//   1. `key` query parameter
//   2. `key` field of an application/x-www-form-urlencoded body
//   3. `key` field of a JSON object body
//
// Reading the body means buffering it; the middleware rebuilds the request
// from the buffered bytes so the handler still sees the original body.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use url::form_urlencoded;

use super::{AppState, AuthUser};
use crate::db::models::Role;
use crate::error::NodeError;

/// Largest body the gate will buffer while looking for a key.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Axum middleware: any resolved user (open when auth is not enforced).
pub async fn require_user(State(state): State<AppState>, request: Request, next: Next) -> Response {
    gate(state, request, next, Role::User).await
}

/// Axum middleware: submitters and admins.
pub async fn require_submitter(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    gate(state, request, next, Role::Submitter).await
}

/// Axum middleware: admins only.
pub async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    gate(state, request, next, Role::Admin).await
}

async fn gate(state: AppState, request: Request, next: Next, required: Role) -> Response {
    let (mut request, key) = match extract_key(request).await {
        Ok(found) => found,
        Err(e) => return e.into_response(),
    };

    match state.authority.authorize(key.as_deref(), Some(required)).await {
        Ok(user) => {
            request.extensions_mut().insert(AuthUser(user));
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Find the presented key, returning the request intact alongside it.
pub async fn extract_key(request: Request) -> Result<(Request, Option<String>), NodeError> {
    if let Some(key) = query_key(request.uri()) {
        return Ok((request, Some(key)));
    }

    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_lowercase();
    let is_form = content_type.starts_with("application/x-www-form-urlencoded");
    let is_json = content_type.starts_with("application/json");
    if !is_form && !is_json {
        return Ok((request, None));
    }

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| NodeError::InvalidRequest(format!("unreadable request body: {e}")))?;

    let key = if is_form {
        form_key(&bytes)
    } else {
        json_key(&bytes)
    };
    Ok((Request::from_parts(parts, Body::from(bytes)), key))
}

// --- Private helpers ---

fn query_key(uri: &Uri) -> Option<String> {
    form_key(uri.query()?.as_bytes())
}

fn form_key(bytes: &[u8]) -> Option<String> {
    form_urlencoded::parse(bytes)
        .find(|(name, _)| name == "key")
        .map(|(_, value)| value.into_owned())
}

fn json_key(bytes: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    value.get("key")?.as_str().map(str::to_string)
}
