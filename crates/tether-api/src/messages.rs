use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::Multipart;
use tracing::debug;
use uuid::Uuid;

use tether_db::StoreError;
use tether_db::models::NewMessage;
use tether_types::api::{ForwardMessageRequest, MessageResponse};

use crate::auth::{AppState, blocking};
use crate::convert;
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::uploads::{Form, MAX_ATTACHMENT_SIZE, validate_attachment};

/// POST /conversations/{id}/messages
///
/// Multipart fields `content`, `replyTo` and `attachment`. At least one of
/// content or attachment must be present. A reply must point at a message in
/// the same conversation.
pub async fn send(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Extension(caller): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = Form::read(multipart, &[("attachment", MAX_ATTACHMENT_SIZE)]).await?;

    let attachment = form.take_file("attachment");
    if let Some(part) = &attachment {
        validate_attachment(part)?;
    }
    let content = form.raw_text("content").unwrap_or("").to_string();
    if content.is_empty() && attachment.is_none() {
        return Err(ApiError::bad_request("content or attachment is required"));
    }
    let reply_to = form.text("replyTo").map(str::to_string);

    let message_id = Uuid::new_v4().to_string();
    let view = blocking(&state, move |db| -> Result<_, ApiError> {
        db.get_conversation(&conversation_id)?;
        if !db.is_member(&conversation_id, &caller.id)? {
            return Err(StoreError::NotMember.into());
        }

        if let Some(reply_id) = &reply_to {
            let in_conversation = match db.get_message(reply_id, &caller.id) {
                Ok(original) => original.conversation_id == conversation_id,
                Err(StoreError::MessageNotFound) => false,
                Err(e) => return Err(e.into()),
            };
            if !in_conversation {
                return Err(ApiError::bad_request("replyTo must reference a message in this conversation"));
            }
        }

        db.send_message(&NewMessage {
            id: &message_id,
            conversation_id: &conversation_id,
            sender_id: &caller.id,
            content: &content,
            attachment: attachment.as_ref().map(|a| a.bytes.as_slice()),
            reply_to: reply_to.as_deref(),
            forwarded_from: None,
        })?;
        Ok(db.message_view(&conversation_id, &message_id)?)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(convert::message(view))))
}

/// DELETE /conversations/{id}/messages/{mid}: sender only.
pub async fn delete(
    State(state): State<AppState>,
    Path((conversation_id, message_id)): Path<(String, String)>,
    Extension(caller): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let mid = message_id.clone();
    blocking(&state, move |db| db.delete_message(&conversation_id, &mid, &caller.id)).await?;
    debug!("Deleted message {}", message_id);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /conversations/{id}/messages/{mid}/forward
pub async fn forward(
    State(state): State<AppState>,
    Path((conversation_id, message_id)): Path<(String, String)>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<ForwardMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let target = req.target_conversation_id;
    let new_id = Uuid::new_v4().to_string();

    let view = blocking(&state, move |db| -> Result<_, StoreError> {
        // the source must be readable by the caller and live in the path's conversation
        let source = db.get_message(&message_id, &caller.id)?;
        if source.conversation_id != conversation_id {
            return Err(StoreError::MessageNotFound);
        }
        db.get_conversation(&target)?;
        db.forward_message(&source.id, &caller.id, &target, &new_id)?;
        db.message_view(&target, &new_id)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(convert::message(view))))
}
