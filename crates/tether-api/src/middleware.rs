use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::auth::{AppState, blocking};
use crate::error::ApiError;

/// Identity of the caller, inserted by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
}

/// Resolve the caller from `Authorization: Bearer <user-id>`.
///
/// The bearer value is the raw user id handed out by `POST /session`. It is
/// not signed and never expires; anything beyond a trusted network needs a
/// real credential in its place.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(ApiError::Unauthorized)?
        .to_string();

    let lookup = user_id.clone();
    if !blocking(&state, move |db| db.user_exists(&lookup)).await? {
        return Err(ApiError::Unauthorized);
    }

    req.extensions_mut().insert(AuthUser { id: user_id });
    Ok(next.run(req).await)
}
