use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::Multipart;
use tracing::info;
use uuid::Uuid;

use tether_db::{Database, StoreError, StoreResult};
use tether_types::api::{AddMemberRequest, ConversationCreated, GroupInfo, GroupSummary, UpdateNameRequest};

use crate::auth::{AppState, blocking, validate_name};
use crate::convert;
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::uploads::{Form, MAX_PHOTO_SIZE, validate_photo};

/// GroupNotFound if `group_id` is not a group, NotMember if the caller is
/// not in it.
fn require_group_member(db: &Database, group_id: &str, user_id: &str) -> StoreResult<()> {
    let group = db.group_info(group_id)?;
    if !group.members.iter().any(|m| m == user_id) {
        return Err(StoreError::NotMember);
    }
    Ok(())
}

/// GET /users/me/groups
pub async fn mine(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<Vec<GroupSummary>>, ApiError> {
    let rows = blocking(&state, move |db| db.my_groups(&caller.id)).await?;
    Ok(Json(rows.into_iter().map(convert::group).collect()))
}

/// POST /groups
///
/// Multipart fields `name`, `members` (a JSON array of user ids) and an
/// optional `image`. The caller is always a member.
pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = Form::read(multipart, &[("image", MAX_PHOTO_SIZE)]).await?;

    let name = validate_name(form.text("name").unwrap_or(""))?;
    let listed: Vec<String> = match form.text("members") {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|_| ApiError::bad_request("members must be a JSON array of user ids"))?,
        None => Vec::new(),
    };
    let image = form.take_file("image");
    if let Some(part) = &image {
        validate_photo(&part.bytes)?;
    }

    let mut members = vec![caller.id.clone()];
    for id in listed.into_iter().map(|id| id.trim().to_string()) {
        if !id.is_empty() && !members.contains(&id) {
            members.push(id);
        }
    }

    let group_id = Uuid::new_v4().to_string();
    let gid = group_id.clone();
    let member_count = members.len();
    blocking(&state, move |db| {
        db.create_group_conversation(&gid, &members, &name, image.as_ref().map(|p| p.bytes.as_slice()))
    })
    .await?;

    info!("Group {} created by {} with {} members", group_id, caller.id, member_count);
    Ok((StatusCode::CREATED, Json(ConversationCreated { conversation_id: group_id })))
}

/// GET /groups/{id}
pub async fn show(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> Result<Json<GroupInfo>, ApiError> {
    let row = blocking(&state, move |db| db.group_info(&group_id)).await?;
    Ok(Json(convert::group_info(row)))
}

/// PUT /groups/{id}/name
pub async fn rename(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<UpdateNameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = validate_name(&req.name)?;
    blocking(&state, move |db| {
        require_group_member(db, &group_id, &caller.id)?;
        db.update_group_name(&group_id, &name)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /groups/{id}/photo: multipart field `photo`, JPEG or PNG.
pub async fn update_photo(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Extension(caller): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = Form::read(multipart, &[("photo", MAX_PHOTO_SIZE)]).await?;
    let photo = form
        .take_file("photo")
        .ok_or_else(|| ApiError::bad_request("photo is required"))?;
    validate_photo(&photo.bytes)?;

    blocking(&state, move |db| {
        require_group_member(db, &group_id, &caller.id)?;
        db.update_group_photo(&group_id, &photo.bytes)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /groups/{id}/members: existing members may add others.
pub async fn add_member(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = req.user_id.trim().to_string();
    if user_id.is_empty() {
        return Err(ApiError::bad_request("userId is required"));
    }

    blocking(&state, move |db| {
        require_group_member(db, &group_id, &caller.id)?;
        db.add_member(&group_id, &user_id)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /groups/{id}/members/me
pub async fn leave(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Extension(caller): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, move |db| -> Result<_, StoreError> {
        db.group_info(&group_id)?;
        if !db.remove_member(&group_id, &caller.id)? {
            return Err(StoreError::NotMember);
        }
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
