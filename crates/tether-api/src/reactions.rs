use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use tether_db::StoreError;
use tether_types::api::CommentCreated;

use crate::auth::{AppState, blocking};
use crate::error::ApiError;
use crate::middleware::AuthUser;

/// POST /conversations/{id}/messages/{mid}/comments: one reaction per user
/// per message.
pub async fn add(
    State(state): State<AppState>,
    Path((conversation_id, message_id)): Path<(String, String)>,
    Extension(caller): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let comment_id = Uuid::new_v4().to_string();

    let comment = blocking(&state, move |db| -> Result<_, StoreError> {
        db.get_conversation(&conversation_id)?;
        if !db.is_member(&conversation_id, &caller.id)? {
            return Err(StoreError::NotMember);
        }
        let message = db.get_message(&message_id, &caller.id)?;
        if message.conversation_id != conversation_id {
            return Err(StoreError::MessageNotFound);
        }
        db.add_comment(&comment_id, &message.id, &caller.id)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(CommentCreated { comment_id: comment.id })))
}

/// DELETE /conversations/{id}/messages/{mid}/comments/{cid}: only the
/// author's own reaction can be removed.
pub async fn remove(
    State(state): State<AppState>,
    Path((conversation_id, message_id, comment_id)): Path<(String, String, String)>,
    Extension(caller): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, move |db| -> Result<_, StoreError> {
        let message = db.get_message(&message_id, &caller.id)?;
        if message.conversation_id != conversation_id {
            return Err(StoreError::MessageNotFound);
        }
        db.remove_comment(&comment_id, &message.id, &caller.id)
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
