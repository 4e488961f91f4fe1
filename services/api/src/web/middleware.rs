//! services/api/src/web/middleware.rs
//!
//! Caller identification for protected routes.

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tracing::warn;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Reads the caller's id from the `x-user-id` header and inserts it into the
/// request extensions. Missing or malformed ids get 401 Unauthorized.
pub async fn require_user(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let user_id = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)
        .and_then(|raw| {
            Uuid::parse_str(raw.trim()).map_err(|_| {
                warn!("Rejected malformed {} header", USER_ID_HEADER);
                StatusCode::UNAUTHORIZED
            })
        })?;

    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}
