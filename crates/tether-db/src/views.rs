//! Read-side assembly of conversation lists and conversation detail.
//!
//! Direct conversations are presented from the reader's side: their name
//! and photo are those of the other member. Groups use their own.

use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension};
use tether_types::models::ConversationKind;

use crate::clock::{format_ts, ts_column};
use crate::conversations::{kind_column, query_conversation, query_members};
use crate::error::{StoreError, StoreResult};
use crate::messages::{query_message_views, require_member};
use crate::models::{ConversationDetailRow, ConversationSummaryRow, LastMessageRow, blob_column};
use crate::receipts::mark_read;
use crate::Database;

impl Database {
    /// Every conversation the user belongs to, most recent activity first.
    /// Conversations without messages come last, newest first among
    /// themselves.
    pub fn conversation_summaries(&self, user_id: &str) -> StoreResult<Vec<ConversationSummaryRow>> {
        self.with_conn(|conn| {
            let mut members = query_members_of_user_conversations(conn, user_id)?;

            let mut stmt = conn.prepare(
                "WITH mine AS (
                     SELECT conversationId FROM conversation_members WHERE userId = ?1
                 ),
                 latest AS (
                     SELECT m.id, m.conversationId, m.content, m.timestamp, m.attachment,
                            u.name AS senderName,
                            ROW_NUMBER() OVER (
                                PARTITION BY m.conversationId
                                ORDER BY m.timestamp DESC, m.rowid DESC
                            ) AS rn
                     FROM messages m
                     JOIN users u ON u.id = m.senderId
                     WHERE m.conversationId IN (SELECT conversationId FROM mine)
                 ),
                 peer AS (
                     SELECT cm.conversationId, u.name, u.photo,
                            ROW_NUMBER() OVER (PARTITION BY cm.conversationId ORDER BY cm.rowid) AS rn
                     FROM conversation_members cm
                     JOIN users u ON u.id = cm.userId
                     WHERE cm.userId != ?1
                       AND cm.conversationId IN (SELECT conversationId FROM mine)
                 )
                 SELECT c.id,
                        CASE WHEN c.type = 'direct' THEN COALESCE(p.name, c.name) ELSE c.name END,
                        c.type,
                        c.created_at,
                        CASE WHEN c.type = 'direct' THEN COALESCE(p.photo, c.conversationPhoto)
                             ELSE c.conversationPhoto END,
                        l.id, l.content, l.timestamp, l.senderName, l.attachment
                 FROM conversations c
                 JOIN mine ON mine.conversationId = c.id
                 LEFT JOIN latest l ON l.conversationId = c.id AND l.rn = 1
                 LEFT JOIN peer p ON p.conversationId = c.id AND p.rn = 1
                 ORDER BY l.timestamp IS NULL, l.timestamp DESC, c.created_at DESC, c.rowid DESC",
            )?;

            let summaries = stmt
                .query_map([user_id], |row| {
                    let last_message = match row.get::<_, Option<String>>(5)? {
                        Some(id) => Some(LastMessageRow {
                            id,
                            content: row.get(6)?,
                            timestamp: ts_column(row, 7)?,
                            sender_name: row.get(8)?,
                            attachment: blob_column(row, 9)?,
                        }),
                        None => None,
                    };
                    Ok(ConversationSummaryRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        kind: kind_column(row, 2)?,
                        created_at: ts_column(row, 3)?,
                        photo: blob_column(row, 4)?,
                        members: Vec::new(),
                        last_message,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(summaries
                .into_iter()
                .map(|mut summary| {
                    summary.members = members.remove(&summary.id).unwrap_or_default();
                    summary
                })
                .collect())
        })
    }

    /// Full conversation for a member. Opening it marks every unread
    /// receipt the caller holds here as read, before the delivery glyphs
    /// are computed.
    pub fn conversation_detail(&self, conversation_id: &str, user_id: &str) -> StoreResult<ConversationDetailRow> {
        let now = format_ts(self.now());
        self.with_conn(|conn| {
            let mut conversation =
                query_conversation(conn, conversation_id)?.ok_or(StoreError::ConversationNotFound)?;
            require_member(conn, conversation_id, user_id)?;

            mark_read(conn, conversation_id, user_id, &now)?;

            if conversation.kind == ConversationKind::Direct {
                if let Some((name, photo)) = query_peer(conn, conversation_id, user_id)? {
                    conversation.name = name;
                    if photo.is_some() {
                        conversation.photo = photo;
                    }
                }
            }

            Ok(ConversationDetailRow {
                members: query_members(conn, conversation_id)?,
                messages: query_message_views(conn, conversation_id, None)?,
                conversation,
            })
        })
    }
}

/// Name and photo of the first member who is not `user_id`.
fn query_peer(
    conn: &Connection,
    conversation_id: &str,
    user_id: &str,
) -> StoreResult<Option<(String, Option<Vec<u8>>)>> {
    let peer = conn
        .query_row(
            "SELECT u.name, u.photo
             FROM conversation_members cm
             JOIN users u ON u.id = cm.userId
             WHERE cm.conversationId = ?1 AND cm.userId != ?2
             ORDER BY cm.rowid
             LIMIT 1",
            (conversation_id, user_id),
            |row| Ok((row.get(0)?, blob_column(row, 1)?)),
        )
        .optional()?;
    Ok(peer)
}

/// conversation id -> member ids, for every conversation `user_id` is in.
fn query_members_of_user_conversations(
    conn: &Connection,
    user_id: &str,
) -> StoreResult<HashMap<String, Vec<String>>> {
    let mut stmt = conn.prepare(
        "SELECT conversationId, userId
         FROM conversation_members
         WHERE conversationId IN (SELECT conversationId FROM conversation_members WHERE userId = ?1)
         ORDER BY rowid",
    )?;
    let rows = stmt.query_map([user_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for row in rows {
        let (conversation_id, member) = row?;
        map.entry(conversation_id).or_default().push(member);
    }
    Ok(map)
}
