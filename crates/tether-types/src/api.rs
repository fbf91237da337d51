use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ConversationKind, DeliveryStatus};

// Binary fields (photos, attachments) travel as standard base64 strings.

// -- Session --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub name: String,
    #[serde(default)]
    pub photo: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub identifier: String,
}

// -- Users --

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub photo: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateNameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub username: String,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StartConversationRequest {
    pub recipient_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationCreated {
    pub conversation_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sender_name: String,
    pub attachment: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    pub created_at: DateTime<Utc>,
    pub photo: Option<String>,
    pub members: Vec<String>,
    pub last_message: Option<LastMessage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    pub created_at: DateTime<Utc>,
    pub photo: Option<String>,
    pub members: Vec<String>,
    pub messages: Vec<MessageResponse>,
}

// -- Messages --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyPreview {
    pub sender_name: String,
    pub content: String,
    pub attachment: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_photo: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub attachment: Option<String>,
    pub reply_to: Option<String>,
    pub reply_preview: Option<ReplyPreview>,
    pub forwarded_from: Option<String>,
    pub reaction_count: usize,
    pub reacting_user_names: Vec<String>,
    pub status: DeliveryStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ForwardMessageRequest {
    pub target_conversation_id: String,
}

// -- Comments --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentCreated {
    pub comment_id: String,
}

// -- Groups --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub id: String,
    pub name: String,
    pub photo: Option<String>,
    pub member_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub id: String,
    pub name: String,
    pub photo: Option<String>,
    pub members: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AddMemberRequest {
    pub user_id: String,
}
