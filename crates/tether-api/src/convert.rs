//! Store rows to wire DTOs. Blobs become standard base64 here and nowhere
//! else.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;

use tether_db::models::{
    ConversationDetailRow, ConversationSummaryRow, GroupInfoRow, GroupRow, MessageView, UserRow,
};
use tether_types::api::{
    ConversationDetail, ConversationSummary, GroupInfo, GroupSummary, LastMessage, MessageResponse,
    ReplyPreview, UserResponse,
};

fn encode(blob: Option<Vec<u8>>) -> Option<String> {
    blob.map(|b| B64.encode(b))
}

pub fn user(row: UserRow) -> UserResponse {
    UserResponse {
        id: row.id,
        name: row.name,
        photo: encode(row.photo),
    }
}

pub fn message(view: MessageView) -> MessageResponse {
    let reaction_count = view.reaction_count();
    let m = view.message;
    MessageResponse {
        id: m.id,
        conversation_id: m.conversation_id,
        sender_id: m.sender_id,
        sender_name: view.sender_name,
        sender_photo: encode(view.sender_photo),
        content: m.content,
        timestamp: m.timestamp,
        attachment: encode(m.attachment),
        reply_to: m.reply_to,
        reply_preview: view.reply.map(|r| ReplyPreview {
            sender_name: r.sender_name,
            content: r.content,
            attachment: encode(r.attachment),
        }),
        forwarded_from: m.forwarded_from,
        reaction_count,
        reacting_user_names: view.reacting_user_names,
        status: view.status,
    }
}

pub fn summary(row: ConversationSummaryRow) -> ConversationSummary {
    ConversationSummary {
        id: row.id,
        name: row.name,
        kind: row.kind,
        created_at: row.created_at,
        photo: encode(row.photo),
        members: row.members,
        last_message: row.last_message.map(|l| LastMessage {
            id: l.id,
            content: l.content,
            timestamp: l.timestamp,
            sender_name: l.sender_name,
            attachment: encode(l.attachment),
        }),
    }
}

pub fn detail(row: ConversationDetailRow) -> ConversationDetail {
    let c = row.conversation;
    ConversationDetail {
        id: c.id,
        name: c.name,
        kind: c.kind,
        created_at: c.created_at,
        photo: encode(c.photo),
        members: row.members,
        messages: row.messages.into_iter().map(message).collect(),
    }
}

pub fn group(row: GroupRow) -> GroupSummary {
    GroupSummary {
        id: row.id,
        name: row.name,
        photo: encode(row.photo),
        member_count: row.member_count,
    }
}

pub fn group_info(row: GroupInfoRow) -> GroupInfo {
    GroupInfo {
        id: row.id,
        name: row.name,
        photo: encode(row.photo),
        members: row.members,
    }
}
