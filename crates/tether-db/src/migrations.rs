use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id      TEXT PRIMARY KEY,
                name    TEXT NOT NULL UNIQUE,
                photo   BLOB
            );

            CREATE TABLE conversations (
                id                  TEXT PRIMARY KEY,
                name                TEXT NOT NULL DEFAULT '',
                type                TEXT NOT NULL CHECK (type IN ('direct', 'group')),
                created_at          TEXT NOT NULL,
                conversationPhoto   BLOB
            );

            CREATE TABLE conversation_members (
                conversationId  TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                userId          TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                PRIMARY KEY (conversationId, userId)
            );

            CREATE INDEX idx_members_user ON conversation_members(userId);

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                conversationId  TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                senderId        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content         TEXT NOT NULL DEFAULT '',
                timestamp       TEXT NOT NULL,
                attachment      BLOB,
                replyTo         TEXT REFERENCES messages(id) ON DELETE SET NULL
            );

            CREATE INDEX idx_messages_conversation ON messages(conversationId, timestamp);

            CREATE TABLE comments (
                id          TEXT PRIMARY KEY,
                messageId   TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                authorId    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                UNIQUE (messageId, authorId)
            );

            CREATE TABLE read_receipts (
                messageId   TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                userId      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                deliveredAt TEXT NOT NULL,
                readAt      TEXT,
                PRIMARY KEY (messageId, userId)
            );

            CREATE INDEX idx_receipts_user ON read_receipts(userId, readAt);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (forwarded message lineage)");
        conn.execute_batch(
            "
            ALTER TABLE messages
                ADD COLUMN forwardedFrom TEXT REFERENCES messages(id) ON DELETE SET NULL;

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }
}
