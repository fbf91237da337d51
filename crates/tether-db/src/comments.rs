use rusqlite::OptionalExtension;

use crate::error::{StoreError, StoreResult, is_unique_violation};
use crate::models::CommentRow;
use crate::Database;

impl Database {
    /// Records a reaction. A user may react to a given message at most once;
    /// the second attempt is [`StoreError::DuplicateReaction`].
    pub fn add_comment(&self, id: &str, message_id: &str, author_id: &str) -> StoreResult<CommentRow> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM messages WHERE id = ?1)",
                [message_id],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(StoreError::MessageNotFound);
            }

            match conn.execute(
                "INSERT INTO comments (id, messageId, authorId) VALUES (?1, ?2, ?3)",
                (id, message_id, author_id),
            ) {
                Ok(_) => Ok(CommentRow {
                    id: id.to_string(),
                    message_id: message_id.to_string(),
                    author_id: author_id.to_string(),
                }),
                Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateReaction),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Removes a reaction, but only the author's own on that message.
    pub fn remove_comment(&self, comment_id: &str, message_id: &str, author_id: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM comments WHERE id = ?1 AND messageId = ?2 AND authorId = ?3",
                (comment_id, message_id, author_id),
            )?;
            if deleted == 0 {
                return Err(StoreError::CommentNotFound);
            }
            Ok(())
        })
    }

    pub fn comments_for_message(&self, message_id: &str) -> StoreResult<Vec<CommentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, messageId, authorId FROM comments WHERE messageId = ?1 ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([message_id], |row| {
                    Ok(CommentRow {
                        id: row.get(0)?,
                        message_id: row.get(1)?,
                        author_id: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_comment(&self, comment_id: &str) -> StoreResult<CommentRow> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, messageId, authorId FROM comments WHERE id = ?1",
                [comment_id],
                |row| {
                    Ok(CommentRow {
                        id: row.get(0)?,
                        message_id: row.get(1)?,
                        author_id: row.get(2)?,
                    })
                },
            )
            .optional()?
            .ok_or(StoreError::CommentNotFound)
        })
    }
}
