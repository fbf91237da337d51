use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use tether_types::models::ConversationKind;

use crate::clock::{format_ts, ts_column};
use crate::error::{StoreError, StoreResult};
use crate::models::{ConversationRow, GroupInfoRow, GroupRow, blob_column};
use crate::users::user_exists;
use crate::Database;

impl Database {
    // -- Direct conversations --

    /// The direct conversation whose membership is exactly `{user_a, user_b}`.
    pub fn find_direct_conversation(&self, user_a: &str, user_b: &str) -> StoreResult<Option<String>> {
        self.with_conn(|conn| query_direct(conn, user_a, user_b))
    }

    /// Inserts the conversation row and both membership rows in one
    /// transaction. Callers are expected to have checked
    /// [`Database::find_direct_conversation`] first.
    pub fn create_direct_conversation(&self, id: &str, user_a: &str, user_b: &str) -> StoreResult<()> {
        let created_at = format_ts(self.now());
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            insert_direct(&tx, id, user_a, user_b, &created_at)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Lookup and insert under a single lock and transaction, so two racing
    /// requests for the same pair cannot both create a conversation.
    /// Returns the conversation id and whether it was newly created.
    pub fn get_or_create_direct_conversation(
        &self,
        new_id: &str,
        user_a: &str,
        user_b: &str,
    ) -> StoreResult<(String, bool)> {
        let created_at = format_ts(self.now());
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if let Some(existing) = query_direct(&tx, user_a, user_b)? {
                return Ok((existing, false));
            }
            insert_direct(&tx, new_id, user_a, user_b, &created_at)?;
            tx.commit()?;
            debug!("Created direct conversation {} for {} and {}", new_id, user_a, user_b);
            Ok((new_id.to_string(), true))
        })
    }

    // -- Groups --

    /// Creates a group and one membership row per distinct member. All rows
    /// land or none do.
    pub fn create_group_conversation(
        &self,
        id: &str,
        member_ids: &[String],
        name: &str,
        photo: Option<&[u8]>,
    ) -> StoreResult<()> {
        let created_at = format_ts(self.now());
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO conversations (id, name, type, created_at, conversationPhoto)
                 VALUES (?1, ?2, 'group', ?3, ?4)",
                rusqlite::params![id, name, created_at, photo],
            )?;
            for member_id in member_ids {
                if !user_exists(&tx, member_id)? {
                    return Err(StoreError::UserNotFound);
                }
                tx.execute(
                    "INSERT OR IGNORE INTO conversation_members (conversationId, userId) VALUES (?1, ?2)",
                    (id, member_id),
                )?;
            }
            tx.commit()?;
            debug!("Created group {} ({}) with {} members", id, name, member_ids.len());
            Ok(())
        })
    }

    pub fn update_group_name(&self, group_id: &str, name: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            let affected = conn.execute(
                "UPDATE conversations SET name = ?1 WHERE id = ?2 AND type = 'group'",
                (name, group_id),
            )?;
            if affected == 0 {
                return Err(StoreError::GroupNotFound);
            }
            Ok(())
        })
    }

    pub fn update_group_photo(&self, group_id: &str, photo: &[u8]) -> StoreResult<()> {
        self.with_conn(|conn| {
            let affected = conn.execute(
                "UPDATE conversations SET conversationPhoto = ?1 WHERE id = ?2 AND type = 'group'",
                rusqlite::params![photo, group_id],
            )?;
            if affected == 0 {
                return Err(StoreError::GroupNotFound);
            }
            Ok(())
        })
    }

    /// Groups the user belongs to, newest first.
    pub fn my_groups(&self, user_id: &str) -> StoreResult<Vec<GroupRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.name, c.conversationPhoto,
                        (SELECT COUNT(*) FROM conversation_members WHERE conversationId = c.id)
                 FROM conversations c
                 JOIN conversation_members cm ON cm.conversationId = c.id
                 WHERE cm.userId = ?1 AND c.type = 'group'
                 ORDER BY c.created_at DESC, c.rowid DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(GroupRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        photo: blob_column(row, 2)?,
                        member_count: row.get::<_, i64>(3)? as usize,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn group_info(&self, group_id: &str) -> StoreResult<GroupInfoRow> {
        self.with_conn(|conn| {
            let (id, name, photo) = conn
                .query_row(
                    "SELECT id, name, conversationPhoto FROM conversations
                     WHERE id = ?1 AND type = 'group'",
                    [group_id],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, blob_column(row, 2)?)),
                )
                .optional()?
                .ok_or(StoreError::GroupNotFound)?;
            let members = query_members(conn, &id)?;
            Ok(GroupInfoRow { id, name, photo, members })
        })
    }

    // -- Membership --

    /// The authorization gate for reading or writing a conversation's messages.
    pub fn is_member(&self, conversation_id: &str, user_id: &str) -> StoreResult<bool> {
        self.with_conn(|conn| is_member(conn, conversation_id, user_id))
    }

    /// Member ids in join order.
    pub fn conversation_members(&self, conversation_id: &str) -> StoreResult<Vec<String>> {
        self.with_conn(|conn| query_members(conn, conversation_id))
    }

    /// Adding someone who is already a member is a no-op.
    pub fn add_member(&self, conversation_id: &str, user_id: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            if !conversation_exists(conn, conversation_id)? {
                return Err(StoreError::ConversationNotFound);
            }
            if !user_exists(conn, user_id)? {
                return Err(StoreError::UserNotFound);
            }
            conn.execute(
                "INSERT OR IGNORE INTO conversation_members (conversationId, userId) VALUES (?1, ?2)",
                (conversation_id, user_id),
            )?;
            Ok(())
        })
    }

    /// Leave. The conversation itself is kept even if nobody remains.
    /// Returns false when the user was not a member.
    pub fn remove_member(&self, conversation_id: &str, user_id: &str) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let affected = conn.execute(
                "DELETE FROM conversation_members WHERE conversationId = ?1 AND userId = ?2",
                (conversation_id, user_id),
            )?;
            Ok(affected > 0)
        })
    }

    pub fn get_conversation(&self, conversation_id: &str) -> StoreResult<ConversationRow> {
        self.with_conn(|conn| {
            query_conversation(conn, conversation_id)?.ok_or(StoreError::ConversationNotFound)
        })
    }
}

fn query_direct(conn: &Connection, user_a: &str, user_b: &str) -> StoreResult<Option<String>> {
    let id = conn
        .query_row(
            "SELECT c.id
             FROM conversations c
             WHERE c.type = 'direct'
               AND c.id IN (
                   SELECT conversationId FROM conversation_members WHERE userId = ?1
                   INTERSECT
                   SELECT conversationId FROM conversation_members WHERE userId = ?2
               )
               AND (SELECT COUNT(*) FROM conversation_members WHERE conversationId = c.id) = 2
             ORDER BY c.created_at, c.rowid
             LIMIT 1",
            (user_a, user_b),
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

fn insert_direct(
    conn: &Connection,
    id: &str,
    user_a: &str,
    user_b: &str,
    created_at: &str,
) -> StoreResult<()> {
    for user in [user_a, user_b] {
        if !user_exists(conn, user)? {
            return Err(StoreError::UserNotFound);
        }
    }
    conn.execute(
        "INSERT INTO conversations (id, name, type, created_at) VALUES (?1, '', 'direct', ?2)",
        (id, created_at),
    )?;
    conn.execute(
        "INSERT INTO conversation_members (conversationId, userId) VALUES (?1, ?2), (?1, ?3)",
        (id, user_a, user_b),
    )?;
    Ok(())
}

pub(crate) fn is_member(conn: &Connection, conversation_id: &str, user_id: &str) -> StoreResult<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(
             SELECT 1 FROM conversation_members WHERE conversationId = ?1 AND userId = ?2
         )",
        (conversation_id, user_id),
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub(crate) fn conversation_exists(conn: &Connection, conversation_id: &str) -> StoreResult<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = ?1)",
        [conversation_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub(crate) fn query_members(conn: &Connection, conversation_id: &str) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT userId FROM conversation_members WHERE conversationId = ?1 ORDER BY rowid",
    )?;
    let members = stmt
        .query_map([conversation_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(members)
}

pub(crate) fn query_conversation(
    conn: &Connection,
    conversation_id: &str,
) -> StoreResult<Option<ConversationRow>> {
    let row = conn
        .query_row(
            "SELECT id, name, type, created_at, conversationPhoto FROM conversations WHERE id = ?1",
            [conversation_id],
            map_conversation,
        )
        .optional()?;
    Ok(row)
}

pub(crate) fn kind_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<ConversationKind> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn map_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: kind_column(row, 2)?,
        created_at: ts_column(row, 3)?,
        photo: blob_column(row, 4)?,
    })
}
