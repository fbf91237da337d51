//! Database row types. These map directly to SQLite rows and stay distinct
//! from the tether-types API models; blobs are raw bytes here.

use chrono::{DateTime, Utc};
use tether_types::models::{ConversationKind, DeliveryStatus};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub photo: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub id: String,
    pub name: String,
    pub kind: ConversationKind,
    pub created_at: DateTime<Utc>,
    pub photo: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub attachment: Option<Vec<u8>>,
    pub reply_to: Option<String>,
    pub forwarded_from: Option<String>,
}

/// Input for a message write. The store assigns the timestamp.
#[derive(Debug, Clone, Copy)]
pub struct NewMessage<'a> {
    pub id: &'a str,
    pub conversation_id: &'a str,
    pub sender_id: &'a str,
    pub content: &'a str,
    pub attachment: Option<&'a [u8]>,
    pub reply_to: Option<&'a str>,
    pub forwarded_from: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct ReplyRow {
    pub message_id: String,
    pub sender_name: String,
    pub content: String,
    pub attachment: Option<Vec<u8>>,
}

/// A message enriched for display inside a conversation.
#[derive(Debug, Clone)]
pub struct MessageView {
    pub message: MessageRow,
    pub sender_name: String,
    pub sender_photo: Option<Vec<u8>>,
    pub reply: Option<ReplyRow>,
    pub reacting_user_names: Vec<String>,
    pub status: DeliveryStatus,
}

impl MessageView {
    pub fn reaction_count(&self) -> usize {
        self.reacting_user_names.len()
    }
}

#[derive(Debug, Clone)]
pub struct LastMessageRow {
    pub id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sender_name: String,
    pub attachment: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct ConversationSummaryRow {
    pub id: String,
    /// Other member's name for direct chats, the group name otherwise.
    pub name: String,
    pub kind: ConversationKind,
    pub created_at: DateTime<Utc>,
    pub photo: Option<Vec<u8>>,
    pub members: Vec<String>,
    pub last_message: Option<LastMessageRow>,
}

#[derive(Debug, Clone)]
pub struct ConversationDetailRow {
    /// Name and photo already resolved for the requesting user.
    pub conversation: ConversationRow,
    pub members: Vec<String>,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Clone)]
pub struct GroupRow {
    pub id: String,
    pub name: String,
    pub photo: Option<Vec<u8>>,
    pub member_count: usize,
}

#[derive(Debug, Clone)]
pub struct GroupInfoRow {
    pub id: String,
    pub name: String,
    pub photo: Option<Vec<u8>>,
    pub members: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ReceiptRow {
    pub message_id: String,
    pub user_id: String,
    pub delivered_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CommentRow {
    pub id: String,
    pub message_id: String,
    pub author_id: String,
}

/// Read a nullable BLOB column, treating a zero-length blob as absent.
pub(crate) fn blob_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<Vec<u8>>> {
    let bytes: Option<Vec<u8>> = row.get(idx)?;
    Ok(bytes.filter(|b| !b.is_empty()))
}
