use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::Multipart;
use tracing::info;

use tether_types::api::{SearchQuery, UpdateNameRequest, UserResponse};

use crate::auth::{AppState, blocking, validate_name};
use crate::convert;
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::uploads::{Form, MAX_PHOTO_SIZE, validate_photo};

pub async fn me(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = blocking(&state, move |db| db.get_user(&caller.id)).await?;
    Ok(Json(convert::user(user)))
}

pub async fn update_name(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<UpdateNameRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let name = validate_name(&req.name)?;
    let user = blocking(&state, move |db| db.update_user_name(&caller.id, &name)).await?;
    info!("User {} renamed to {}", user.id, user.name);
    Ok(Json(convert::user(user)))
}

/// PUT /users/me/photo: multipart field `photo`, JPEG or PNG.
pub async fn update_photo(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = Form::read(multipart, &[("photo", MAX_PHOTO_SIZE)]).await?;
    let photo = form
        .take_file("photo")
        .ok_or_else(|| ApiError::bad_request("photo is required"))?;
    validate_photo(&photo.bytes)?;

    blocking(&state, move |db| db.update_user_photo(&caller.id, &photo.bytes)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /users/search?username=: case-insensitive substring match on names.
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let needle = query.username.trim().to_string();
    if needle.is_empty() {
        return Err(ApiError::bad_request("username query is required"));
    }

    let users = blocking(&state, move |db| db.search_users(&needle)).await?;
    Ok(Json(users.into_iter().map(convert::user).collect()))
}
