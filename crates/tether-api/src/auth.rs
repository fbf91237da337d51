use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tracing::{error, info};
use uuid::Uuid;

use tether_db::Database;
use tether_types::api::{LoginRequest, LoginResponse};

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
}

/// Run a store call off the async runtime.
pub(crate) async fn blocking<F, T, E>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(Into::into)
}

/// Display names are 3 to 16 characters after trimming.
pub(crate) fn validate_name(raw: &str) -> Result<String, ApiError> {
    let name = raw.trim();
    let len = name.chars().count();
    if !(3..=16).contains(&len) {
        return Err(ApiError::bad_request("name must be between 3 and 16 characters"));
    }
    Ok(name.to_string())
}

/// POST /session: log in by name, registering on first use. The returned
/// identifier is the bearer credential for every other route.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = validate_name(&req.name)?;
    let photo = match req.photo.as_deref().filter(|p| !p.is_empty()) {
        Some(encoded) => Some(
            B64.decode(encoded)
                .map_err(|_| ApiError::bad_request("photo is not valid base64"))?,
        ),
        None => None,
    };

    let new_id = Uuid::new_v4().to_string();
    let (user, created) =
        blocking(&state, move |db| db.get_or_create_user(&new_id, &name, photo.as_deref())).await?;

    if created {
        info!("Registered user {} ({})", user.name, user.id);
    }

    Ok((StatusCode::CREATED, Json(LoginResponse { identifier: user.id })))
}
