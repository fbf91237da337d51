use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;
use uuid::Uuid;

use tether_db::StoreError;
use tether_types::api::{ConversationCreated, ConversationDetail, ConversationSummary, StartConversationRequest};

use crate::auth::{AppState, blocking};
use crate::convert;
use crate::error::ApiError;
use crate::middleware::AuthUser;

/// GET /users/me/conversations
pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let rows = blocking(&state, move |db| db.conversation_summaries(&caller.id)).await?;
    Ok(Json(rows.into_iter().map(convert::summary).collect()))
}

/// POST /conversations: find or create the direct conversation with
/// `recipientId`. 201 when a new one was created, 200 otherwise.
pub async fn start(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<StartConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let recipient = req.recipient_id.trim().to_string();
    if recipient.is_empty() {
        return Err(ApiError::bad_request("recipientId is required"));
    }
    if recipient == caller.id {
        return Err(ApiError::bad_request("cannot start a conversation with yourself"));
    }

    let new_id = Uuid::new_v4().to_string();
    let (conversation_id, created) = blocking(&state, move |db| -> Result<_, StoreError> {
        if !db.user_exists(&recipient)? {
            return Err(StoreError::UserNotFound);
        }
        db.get_or_create_direct_conversation(&new_id, &caller.id, &recipient)
    })
    .await?;

    let status = if created {
        debug!("Started direct conversation {}", conversation_id);
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ConversationCreated { conversation_id })))
}

/// GET /conversations/{id}: full history. Also marks the caller's receipts
/// in it as read.
pub async fn detail(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<ConversationDetail>, ApiError> {
    let row = blocking(&state, move |db| db.conversation_detail(&conversation_id, &caller.id)).await?;
    Ok(Json(convert::detail(row)))
}
