use rusqlite::{Connection, OptionalExtension};

use crate::error::{StoreError, StoreResult, is_unique_violation};
use crate::models::{UserRow, blob_column};
use crate::Database;

impl Database {
    /// Login-or-register: returns the user owning `name`, creating it with
    /// `id` and `photo` when no such user exists yet. The bool is true when
    /// a row was inserted.
    pub fn get_or_create_user(
        &self,
        id: &str,
        name: &str,
        photo: Option<&[u8]>,
    ) -> StoreResult<(UserRow, bool)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if let Some(existing) = query_user_by_name(&tx, name)? {
                return Ok((existing, false));
            }
            tx.execute(
                "INSERT INTO users (id, name, photo) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, name, photo],
            )?;
            tx.commit()?;

            Ok((
                UserRow {
                    id: id.to_string(),
                    name: name.to_string(),
                    photo: photo.filter(|p| !p.is_empty()).map(<[u8]>::to_vec),
                },
                true,
            ))
        })
    }

    pub fn get_user(&self, id: &str) -> StoreResult<UserRow> {
        self.with_conn(|conn| query_user_by_id(conn, id)?.ok_or(StoreError::UserNotFound))
    }

    pub fn get_user_by_name(&self, name: &str) -> StoreResult<UserRow> {
        self.with_conn(|conn| query_user_by_name(conn, name)?.ok_or(StoreError::UserNotFound))
    }

    pub fn user_exists(&self, id: &str) -> StoreResult<bool> {
        self.with_conn(|conn| user_exists(conn, id))
    }

    pub fn update_user_name(&self, id: &str, name: &str) -> StoreResult<UserRow> {
        self.with_conn(|conn| {
            let affected = conn
                .execute("UPDATE users SET name = ?1 WHERE id = ?2", (name, id))
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        StoreError::NameTaken
                    } else {
                        e.into()
                    }
                })?;
            if affected == 0 {
                return Err(StoreError::UserNotFound);
            }
            query_user_by_id(conn, id)?.ok_or(StoreError::UserNotFound)
        })
    }

    pub fn update_user_photo(&self, id: &str, photo: &[u8]) -> StoreResult<()> {
        self.with_conn(|conn| {
            let affected = conn.execute(
                "UPDATE users SET photo = ?1 WHERE id = ?2",
                rusqlite::params![photo, id],
            )?;
            if affected == 0 {
                return Err(StoreError::UserNotFound);
            }
            Ok(())
        })
    }

    /// Case-insensitive (ASCII) substring search on the display name.
    /// `%` and `_` in `query` match literally.
    pub fn search_users(&self, query: &str) -> StoreResult<Vec<UserRow>> {
        let pattern = format!("%{}%", escape_like(query));
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, photo FROM users
                 WHERE name LIKE ?1 ESCAPE '\\'
                 ORDER BY name",
            )?;
            let rows = stmt
                .query_map([&pattern], map_user)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        photo: blob_column(row, 2)?,
    })
}

fn query_user_by_id(conn: &Connection, id: &str) -> StoreResult<Option<UserRow>> {
    let row = conn
        .query_row("SELECT id, name, photo FROM users WHERE id = ?1", [id], map_user)
        .optional()?;
    Ok(row)
}

fn query_user_by_name(conn: &Connection, name: &str) -> StoreResult<Option<UserRow>> {
    let row = conn
        .query_row("SELECT id, name, photo FROM users WHERE name = ?1", [name], map_user)
        .optional()?;
    Ok(row)
}

pub(crate) fn user_exists(conn: &Connection, id: &str) -> StoreResult<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )?;
    Ok(exists)
}
