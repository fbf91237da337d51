use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use tether_types::models::DeliveryStatus;

use crate::clock::{format_ts, ts_column};
use crate::conversations::{conversation_exists, is_member, query_members};
use crate::error::{StoreError, StoreResult};
use crate::models::{MessageRow, MessageView, NewMessage, ReplyRow, blob_column};
use crate::receipts::fan_out;
use crate::Database;

const MESSAGE_COLUMNS: &str =
    "m.id, m.conversationId, m.senderId, m.content, m.timestamp, m.attachment, m.replyTo, m.forwardedFrom";

impl Database {
    /// Appends a message. The conversation row is re-checked here; whether
    /// the sender is a member is the caller's concern.
    pub fn save_message(&self, msg: &NewMessage<'_>) -> StoreResult<MessageRow> {
        let timestamp = self.now();
        self.with_conn(|conn| {
            if !conversation_exists(conn, msg.conversation_id)? {
                return Err(StoreError::ConversationNotFound);
            }
            conn.execute(
                "INSERT INTO messages
                     (id, conversationId, senderId, content, timestamp, attachment, replyTo, forwardedFrom)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    msg.id,
                    msg.conversation_id,
                    msg.sender_id,
                    msg.content,
                    format_ts(timestamp),
                    msg.attachment,
                    msg.reply_to,
                    msg.forwarded_from,
                ],
            )?;

            Ok(MessageRow {
                id: msg.id.to_string(),
                conversation_id: msg.conversation_id.to_string(),
                sender_id: msg.sender_id.to_string(),
                content: msg.content.to_string(),
                timestamp,
                attachment: msg.attachment.filter(|a| !a.is_empty()).map(<[u8]>::to_vec),
                reply_to: msg.reply_to.map(str::to_string),
                forwarded_from: msg.forwarded_from.map(str::to_string),
            })
        })
    }

    /// [`Database::save_message`] followed by best-effort receipt fan-out to
    /// every other member. The message is committed even if some receipts
    /// are not.
    pub fn send_message(&self, msg: &NewMessage<'_>) -> StoreResult<MessageRow> {
        let saved = self.save_message(msg)?;
        let delivered_at = format_ts(saved.timestamp);

        let delivered = self.with_conn(|conn| {
            let recipients: Vec<String> = query_members(conn, &saved.conversation_id)?
                .into_iter()
                .filter(|m| *m != saved.sender_id)
                .collect();
            Ok(fan_out(conn, &saved.id, &delivered_at, &recipients))
        })?;

        debug!(
            "Message {} saved in {} with {} receipts",
            saved.id, saved.conversation_id, delivered
        );
        Ok(saved)
    }

    /// Fetches a message only if `user_id` is a member of its conversation.
    /// A non-member sees [`StoreError::MessageNotFound`], exactly as if the
    /// message did not exist.
    pub fn get_message(&self, message_id: &str, user_id: &str) -> StoreResult<MessageRow> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM messages m
                 JOIN conversation_members cm ON cm.conversationId = m.conversationId
                 WHERE m.id = ?1 AND cm.userId = ?2"
            );
            conn.query_row(&sql, (message_id, user_id), map_message)
                .optional()?
                .ok_or(StoreError::MessageNotFound)
        })
    }

    /// Hard delete by the sender. Comments and receipts go with it through
    /// the foreign-key cascade. Other members get `NotSender`; non-members
    /// get `MessageNotFound`, the same as for a message that does not exist.
    pub fn delete_message(&self, conversation_id: &str, message_id: &str, user_id: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            let sender_id: String = conn
                .query_row(
                    "SELECT senderId FROM messages WHERE conversationId = ?1 AND id = ?2",
                    (conversation_id, message_id),
                    |row| row.get(0),
                )
                .optional()?
                .ok_or(StoreError::MessageNotFound)?;

            if sender_id != user_id {
                // outsiders learn nothing about the message
                return Err(if is_member(conn, conversation_id, user_id)? {
                    StoreError::NotSender
                } else {
                    StoreError::MessageNotFound
                });
            }

            conn.execute(
                "DELETE FROM messages WHERE conversationId = ?1 AND id = ?2",
                (conversation_id, message_id),
            )?;
            Ok(())
        })
    }

    /// Copies a message the caller can read into another conversation the
    /// caller belongs to, then fans out receipts there.
    pub fn forward_message(
        &self,
        source_id: &str,
        user_id: &str,
        target_conversation_id: &str,
        new_id: &str,
    ) -> StoreResult<MessageRow> {
        let source = self.get_message(source_id, user_id)?;
        if !self.is_member(target_conversation_id, user_id)? {
            return Err(StoreError::NotMember);
        }

        self.send_message(&NewMessage {
            id: new_id,
            conversation_id: target_conversation_id,
            sender_id: user_id,
            content: &source.content,
            attachment: source.attachment.as_deref(),
            reply_to: None,
            forwarded_from: Some(&source.id),
        })
    }

    /// Every message in the conversation, oldest first, with sender identity,
    /// reply preview, reactions and delivery status attached.
    pub fn list_messages(&self, conversation_id: &str) -> StoreResult<Vec<MessageView>> {
        self.with_conn(|conn| query_message_views(conn, conversation_id, None))
    }

    /// The same enrichment as [`Database::list_messages`] for one message.
    pub fn message_view(&self, conversation_id: &str, message_id: &str) -> StoreResult<MessageView> {
        self.with_conn(|conn| {
            query_message_views(conn, conversation_id, Some(message_id))?
                .pop()
                .ok_or(StoreError::MessageNotFound)
        })
    }
}

pub(crate) fn map_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        timestamp: ts_column(row, 4)?,
        attachment: blob_column(row, 5)?,
        reply_to: row.get(6)?,
        forwarded_from: row.get(7)?,
    })
}

pub(crate) fn query_message_views(
    conn: &Connection,
    conversation_id: &str,
    only: Option<&str>,
) -> StoreResult<Vec<MessageView>> {
    let mut reactions = query_reacting_names(conn, conversation_id)?;

    // JOIN users for sender and reply author in a single pass
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS},
                u.name, u.photo,
                (SELECT COUNT(*) FROM conversation_members WHERE conversationId = m.conversationId) - 1,
                (SELECT COUNT(*) FROM read_receipts WHERE messageId = m.id AND readAt IS NOT NULL),
                r.id, r.content, ru.name, r.attachment
         FROM messages m
         JOIN users u ON u.id = m.senderId
         LEFT JOIN messages r ON r.id = m.replyTo
         LEFT JOIN users ru ON ru.id = r.senderId
         WHERE m.conversationId = ?1 AND (?2 IS NULL OR m.id = ?2)
         ORDER BY m.timestamp ASC, m.rowid ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut views = stmt
        .query_map((conversation_id, only), |row| {
            let message = map_message(row)?;
            let recipients: i64 = row.get(10)?;
            let read: i64 = row.get(11)?;
            let reply = match row.get::<_, Option<String>>(12)? {
                Some(reply_id) => Some(ReplyRow {
                    message_id: reply_id,
                    content: row.get(13)?,
                    sender_name: row.get::<_, Option<String>>(14)?.unwrap_or_default(),
                    attachment: blob_column(row, 15)?,
                }),
                None => None,
            };
            Ok(MessageView {
                message,
                sender_name: row.get(8)?,
                sender_photo: blob_column(row, 9)?,
                reply,
                reacting_user_names: Vec::new(),
                status: DeliveryStatus::from_counts(recipients, read),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for view in &mut views {
        if let Some(names) = reactions.remove(&view.message.id) {
            view.reacting_user_names = names;
        }
    }
    Ok(views)
}

/// message id -> names of users who reacted, in reaction order.
fn query_reacting_names(conn: &Connection, conversation_id: &str) -> StoreResult<HashMap<String, Vec<String>>> {
    let mut stmt = conn.prepare(
        "SELECT c.messageId, u.name
         FROM comments c
         JOIN messages m ON m.id = c.messageId
         JOIN users u ON u.id = c.authorId
         WHERE m.conversationId = ?1
         ORDER BY c.rowid",
    )?;
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    let rows = stmt.query_map([conversation_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (message_id, name) = row?;
        map.entry(message_id).or_default().push(name);
    }
    Ok(map)
}

/// Membership check that reads from an already-held connection.
pub(crate) fn require_member(conn: &Connection, conversation_id: &str, user_id: &str) -> StoreResult<()> {
    if is_member(conn, conversation_id, user_id)? {
        Ok(())
    } else {
        Err(StoreError::NotMember)
    }
}

#[cfg(test)]
mod tests {
    use tether_types::models::DeliveryStatus;

    use crate::error::StoreError;
    use crate::models::NewMessage;
    use crate::testing::{db, tick, user};
    use crate::Database;

    fn text<'a>(id: &'a str, conversation_id: &'a str, sender_id: &'a str, content: &'a str) -> NewMessage<'a> {
        NewMessage {
            id,
            conversation_id,
            sender_id,
            content,
            attachment: None,
            reply_to: None,
            forwarded_from: None,
        }
    }

    fn trio(db: &Database) {
        user(db, "a", "alice");
        user(db, "b", "bob");
        user(db, "c", "carol");
        let members: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        db.create_group_conversation("g", &members, "Trip", None).unwrap();
    }

    #[test]
    fn save_requires_existing_conversation() {
        let (db, _) = db();
        user(&db, "a", "alice");
        let err = db.save_message(&text("m", "nope", "a", "hi")).unwrap_err();
        assert!(matches!(err, StoreError::ConversationNotFound));
    }

    #[test]
    fn save_then_get_round_trips_for_members_only() {
        let (db, _) = db();
        trio(&db);
        user(&db, "x", "outsider");

        db.send_message(&text("m1", "g", "a", "first")).unwrap();
        let saved = db
            .send_message(&NewMessage {
                attachment: Some(&[0xFF, 0xD8, 0xFF]),
                reply_to: Some("m1"),
                ..text("m2", "g", "b", "second")
            })
            .unwrap();

        let fetched = db.get_message("m2", "b").unwrap();
        assert_eq!(fetched, saved);
        assert_eq!(fetched.attachment.as_deref(), Some(&[0xFF, 0xD8, 0xFF][..]));
        assert_eq!(fetched.reply_to.as_deref(), Some("m1"));

        assert!(matches!(db.get_message("m2", "x"), Err(StoreError::MessageNotFound)));
        assert!(matches!(db.get_message("missing", "b"), Err(StoreError::MessageNotFound)));
    }

    #[test]
    fn only_sender_can_delete_and_dependents_cascade() {
        let (db, _) = db();
        trio(&db);
        db.send_message(&text("m1", "g", "a", "hello")).unwrap();
        db.add_comment("r1", "m1", "b").unwrap();

        assert!(matches!(db.delete_message("g", "m1", "b"), Err(StoreError::NotSender)));
        assert!(matches!(db.delete_message("g", "zz", "a"), Err(StoreError::MessageNotFound)));

        user(&db, "d", "dave");
        assert!(matches!(db.delete_message("g", "m1", "d"), Err(StoreError::MessageNotFound)));

        db.delete_message("g", "m1", "a").unwrap();
        assert!(matches!(db.get_message("m1", "a"), Err(StoreError::MessageNotFound)));
        assert!(db.receipts_for_message("m1").unwrap().is_empty());
        assert!(db.comments_for_message("m1").unwrap().is_empty());
    }

    #[test]
    fn list_orders_by_insertion_even_with_equal_timestamps() {
        let (db, clock) = db();
        trio(&db);

        db.send_message(&text("m1", "g", "a", "one")).unwrap();
        db.send_message(&text("m2", "g", "b", "two")).unwrap();
        tick(&clock);
        db.send_message(&text("m3", "g", "c", "three")).unwrap();

        let ids: Vec<_> = db
            .list_messages("g")
            .unwrap()
            .into_iter()
            .map(|v| v.message.id)
            .collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn list_enriches_messages() {
        let (db, _) = db();
        trio(&db);
        db.update_user_photo("a", &[7]).unwrap();

        db.send_message(&NewMessage {
            attachment: Some(&[1, 2]),
            ..text("m1", "g", "a", "look")
        })
        .unwrap();
        db.send_message(&NewMessage {
            reply_to: Some("m1"),
            ..text("m2", "g", "b", "nice")
        })
        .unwrap();
        db.add_comment("r1", "m1", "b").unwrap();
        db.add_comment("r2", "m1", "c").unwrap();

        let views = db.list_messages("g").unwrap();
        let first = &views[0];
        assert_eq!(first.sender_name, "alice");
        assert_eq!(first.sender_photo, Some(vec![7]));
        assert_eq!(first.reaction_count(), 2);
        assert_eq!(first.reacting_user_names, vec!["bob", "carol"]);
        assert!(first.reply.is_none());

        let reply = views[1].reply.as_ref().unwrap();
        assert_eq!(reply.message_id, "m1");
        assert_eq!(reply.sender_name, "alice");
        assert_eq!(reply.content, "look");
        assert_eq!(reply.attachment, Some(vec![1, 2]));
        assert_eq!(views[1].reaction_count(), 0);
    }

    #[test]
    fn status_turns_read_once_every_recipient_read() {
        let (db, _) = db();
        trio(&db);
        db.send_message(&text("m1", "g", "a", "ping")).unwrap();

        assert_eq!(db.list_messages("g").unwrap()[0].status, DeliveryStatus::Sent);
        db.mark_read("g", "b").unwrap();
        assert_eq!(db.list_messages("g").unwrap()[0].status, DeliveryStatus::Sent);
        db.mark_read("g", "c").unwrap();
        assert_eq!(db.list_messages("g").unwrap()[0].status, DeliveryStatus::Read);
    }

    #[test]
    fn deleting_the_replied_message_clears_the_preview() {
        let (db, _) = db();
        trio(&db);
        db.send_message(&text("m1", "g", "a", "original")).unwrap();
        db.send_message(&NewMessage {
            reply_to: Some("m1"),
            ..text("m2", "g", "b", "reply")
        })
        .unwrap();

        db.delete_message("g", "m1", "a").unwrap();
        let views = db.list_messages("g").unwrap();
        assert_eq!(views.len(), 1);
        assert!(views[0].message.reply_to.is_none());
        assert!(views[0].reply.is_none());
    }

    #[test]
    fn forward_copies_into_target_and_records_lineage() {
        let (db, _) = db();
        trio(&db);
        user(&db, "d", "dave");
        db.create_direct_conversation("dm", "a", "d").unwrap();
        db.send_message(&NewMessage {
            attachment: Some(&[5]),
            ..text("m1", "g", "b", "forward me")
        })
        .unwrap();

        let copy = db.forward_message("m1", "a", "dm", "f1").unwrap();
        assert_eq!(copy.conversation_id, "dm");
        assert_eq!(copy.sender_id, "a");
        assert_eq!(copy.content, "forward me");
        assert_eq!(copy.attachment, Some(vec![5]));
        assert_eq!(copy.forwarded_from.as_deref(), Some("m1"));

        let receipts = db.receipts_for_message("f1").unwrap();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].user_id, "d");

        // dave cannot read the group message, carol is not in the DM
        assert!(matches!(db.forward_message("m1", "d", "dm", "f2"), Err(StoreError::MessageNotFound)));
        assert!(matches!(db.forward_message("m1", "c", "dm", "f3"), Err(StoreError::NotMember)));
    }
}
