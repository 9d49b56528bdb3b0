//! CRUD operations for [`Chat`] records and their participants.

use rusqlite::{params, Connection};

use huddle_shared::types::{ChatId, ChatKind};

use crate::database::{decode_timestamp, encode_timestamp, now, Database};
use crate::error::{not_found, Result, StoreError};
use crate::models::{Chat, GroupSummary};
use crate::users::require_user;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a chat and its participant rows in one transaction.
    ///
    /// Any unknown username rolls the whole creation back. Repeated
    /// usernames collapse to one participant row.
    pub fn create_chat(
        &mut self,
        name: Option<&str>,
        kind: ChatKind,
        usernames: &[String],
    ) -> Result<Chat> {
        let tx = self.conn_mut().transaction()?;

        let created_at = now();
        tx.execute(
            "INSERT INTO chats (kind, name, created_at) VALUES (?1, ?2, ?3)",
            params![kind.as_str(), name, encode_timestamp(created_at)],
        )?;
        let id = ChatId(tx.last_insert_rowid());

        for username in usernames {
            require_user(&tx, username)?;
            tx.execute(
                "INSERT OR IGNORE INTO chat_participants (chat_id, username) VALUES (?1, ?2)",
                params![id.0, username],
            )?;
        }

        tx.commit()?;

        tracing::info!(chat = %id, kind = %kind, participants = usernames.len(), "created chat");

        Ok(Chat {
            id,
            kind,
            name: name.map(str::to_string),
            created_at,
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single chat by id.
    pub fn get_chat(&self, id: ChatId) -> Result<Chat> {
        get_chat(self.conn(), id)
    }

    /// Participant usernames in the order they were added to the chat.
    pub fn chat_participants(&self, id: ChatId) -> Result<Vec<String>> {
        let mut stmt = self.conn().prepare(
            "SELECT username
             FROM chat_participants
             WHERE chat_id = ?1
             ORDER BY rowid ASC",
        )?;

        let rows = stmt.query_map(params![id.0], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// List every chat `username` participates in, newest first.
    pub fn list_chats_for_user(&self, username: &str) -> Result<Vec<Chat>> {
        let mut stmt = self.conn().prepare(
            "SELECT c.id, c.kind, c.name, c.created_at
             FROM chats c
             JOIN chat_participants cp ON cp.chat_id = c.id
             WHERE cp.username = ?1
             ORDER BY c.created_at DESC, c.id DESC",
        )?;

        let rows = stmt.query_map(params![username], row_to_chat)?;

        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }

    /// List the group chats `username` belongs to, each with its members.
    pub fn list_groups_for_user(&self, username: &str) -> Result<Vec<GroupSummary>> {
        let groups: Vec<Chat> = self
            .list_chats_for_user(username)?
            .into_iter()
            .filter(|chat| chat.kind == ChatKind::Group)
            .collect();

        let mut summaries = Vec::with_capacity(groups.len());
        for chat in groups {
            summaries.push(GroupSummary {
                participants: self.chat_participants(chat.id)?,
                id: chat.id,
                name: chat.name,
            });
        }
        Ok(summaries)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn get_chat(conn: &Connection, id: ChatId) -> Result<Chat> {
    conn.query_row(
        "SELECT id, kind, name, created_at
         FROM chats
         WHERE id = ?1",
        params![id.0],
        row_to_chat,
    )
    .map_err(not_found)
}

/// Fetch a chat and fail unless it has the expected kind.
pub(crate) fn require_chat_kind(conn: &Connection, id: ChatId, expected: ChatKind) -> Result<Chat> {
    let chat = get_chat(conn, id)?;
    if chat.kind != expected {
        return Err(StoreError::WrongChatKind { chat: id, expected });
    }
    Ok(chat)
}

/// Map a `rusqlite::Row` to a [`Chat`].
fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    let id: i64 = row.get(0)?;
    let kind_str: String = row.get(1)?;
    let name: Option<String> = row.get(2)?;
    let created_str: String = row.get(3)?;

    let kind = kind_str.parse::<ChatKind>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Chat {
        id: ChatId(id),
        kind,
        name,
        created_at: decode_timestamp(&created_str, 3)?,
    })
}
