use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::warn;

use crate::clock::{format_ts, parse_ts, ts_column};
use crate::error::StoreResult;
use crate::models::ReceiptRow;
use crate::Database;

impl Database {
    /// One delivery receipt per recipient. Each insert stands alone: a
    /// failure is logged and skipped, never returned. Returns how many rows
    /// were written.
    pub fn fan_out_receipts(
        &self,
        message_id: &str,
        delivered_at: DateTime<Utc>,
        recipients: &[String],
    ) -> StoreResult<usize> {
        let delivered_at = format_ts(delivered_at);
        self.with_conn(|conn| Ok(fan_out(conn, message_id, &delivered_at, recipients)))
    }

    /// Stamps `readAt` on every unread receipt the user holds in this
    /// conversation. Rows already read keep their original time, so calling
    /// this again changes nothing.
    pub fn mark_read(&self, conversation_id: &str, user_id: &str) -> StoreResult<usize> {
        let now = format_ts(self.now());
        self.with_conn(|conn| mark_read(conn, conversation_id, user_id, &now))
    }

    pub fn receipts_for_message(&self, message_id: &str) -> StoreResult<Vec<ReceiptRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT messageId, userId, deliveredAt, readAt
                 FROM read_receipts WHERE messageId = ?1 ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([message_id], |row| {
                    Ok(ReceiptRow {
                        message_id: row.get(0)?,
                        user_id: row.get(1)?,
                        delivered_at: ts_column(row, 2)?,
                        read_at: row
                            .get::<_, Option<String>>(3)?
                            .map(|raw| parse_ts(3, &raw))
                            .transpose()?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

pub(crate) fn fan_out(
    conn: &Connection,
    message_id: &str,
    delivered_at: &str,
    recipients: &[String],
) -> usize {
    let mut delivered = 0;
    for user_id in recipients {
        match conn.execute(
            "INSERT INTO read_receipts (messageId, userId, deliveredAt) VALUES (?1, ?2, ?3)",
            (message_id, user_id, delivered_at),
        ) {
            Ok(_) => delivered += 1,
            Err(e) => warn!(
                "Failed to insert delivery receipt for message {} to {}: {}",
                message_id, user_id, e
            ),
        }
    }
    delivered
}

pub(crate) fn mark_read(
    conn: &Connection,
    conversation_id: &str,
    user_id: &str,
    now: &str,
) -> StoreResult<usize> {
    let updated = conn.execute(
        "UPDATE read_receipts
         SET readAt = ?3
         WHERE messageId IN (SELECT id FROM messages WHERE conversationId = ?1)
           AND userId = ?2
           AND readAt IS NULL",
        (conversation_id, user_id, now),
    )?;
    Ok(updated)
}
