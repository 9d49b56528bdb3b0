use rusqlite::{params, Connection};

use huddle_shared::types::{ChatId, ChatKind};

use crate::chats::require_chat_kind;
use crate::database::{decode_timestamp, encode_timestamp, now, Database};
use crate::error::{Result, StoreError};
use crate::models::{EncryptedMessage, PlainMessage};
use crate::users::require_user;

impl Database {
    /// Append a plaintext message to a group chat.
    pub fn insert_plain_message(
        &mut self,
        chat_id: ChatId,
        sender: &str,
        content: &str,
    ) -> Result<PlainMessage> {
        let tx = self.conn_mut().transaction()?;
        require_chat_kind(&tx, chat_id, ChatKind::Group)?;
        require_user(&tx, sender)?;
        let message = insert_plain_row(&tx, chat_id, sender, content)?;
        tx.commit()?;
        Ok(message)
    }

    /// Append an end-to-end encrypted message to a private chat.
    pub fn insert_encrypted_message(
        &mut self,
        chat_id: ChatId,
        sender: &str,
        iv: &str,
        ct: &str,
        tag: &str,
    ) -> Result<EncryptedMessage> {
        let tx = self.conn_mut().transaction()?;
        require_chat_kind(&tx, chat_id, ChatKind::Private)?;
        require_user(&tx, sender)?;

        let timestamp = now();
        tx.execute(
            "INSERT INTO encrypted_messages (chat_id, sender, iv, ct, tag, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![chat_id.0, sender, iv, ct, tag, encode_timestamp(timestamp)],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(EncryptedMessage {
            id,
            chat_id,
            sender: sender.to_string(),
            iv: iv.to_string(),
            ct: ct.to_string(),
            tag: tag.to_string(),
            timestamp,
        })
    }

    /// Plaintext history of a chat, oldest first. Rows sharing a timestamp
    /// keep insertion order.
    pub fn plain_messages_for_chat(&self, chat_id: ChatId) -> Result<Vec<PlainMessage>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, chat_id, sender, content, timestamp
             FROM plain_messages
             WHERE chat_id = ?1
             ORDER BY timestamp ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![chat_id.0], row_to_plain_message)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Encrypted history of a chat, oldest first.
    pub fn encrypted_messages_for_chat(&self, chat_id: ChatId) -> Result<Vec<EncryptedMessage>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, chat_id, sender, iv, ct, tag, timestamp
             FROM encrypted_messages
             WHERE chat_id = ?1
             ORDER BY timestamp ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![chat_id.0], row_to_encrypted_message)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

/// Insert a plaintext row inside the caller's transaction.
pub(crate) fn insert_plain_row(
    conn: &Connection,
    chat_id: ChatId,
    sender: &str,
    content: &str,
) -> Result<PlainMessage> {
    let timestamp = now();
    conn.execute(
        "INSERT INTO plain_messages (chat_id, sender, content, timestamp)
         VALUES (?1, ?2, ?3, ?4)",
        params![chat_id.0, sender, content, encode_timestamp(timestamp)],
    )?;

    Ok(PlainMessage {
        id: conn.last_insert_rowid(),
        chat_id,
        sender: sender.to_string(),
        content: content.to_string(),
        timestamp,
    })
}

fn row_to_plain_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<PlainMessage> {
    let ts_str: String = row.get(4)?;
    Ok(PlainMessage {
        id: row.get(0)?,
        chat_id: ChatId(row.get(1)?),
        sender: row.get(2)?,
        content: row.get(3)?,
        timestamp: decode_timestamp(&ts_str, 4)?,
    })
}

fn row_to_encrypted_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<EncryptedMessage> {
    let ts_str: String = row.get(6)?;
    Ok(EncryptedMessage {
        id: row.get(0)?,
        chat_id: ChatId(row.get(1)?),
        sender: row.get(2)?,
        iv: row.get(3)?,
        ct: row.get(4)?,
        tag: row.get(5)?,
        timestamp: decode_timestamp(&ts_str, 6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{seeded_db, usernames};

    #[test]
    fn plain_history_is_chronological() {
        let (mut db, _dir) = seeded_db(&["alice", "bob"]);
        let group = db
            .create_chat(Some("team"), ChatKind::Group, &usernames(&["alice", "bob"]))
            .unwrap();

        for (sender, text) in [("alice", "one"), ("bob", "two"), ("alice", "three")] {
            db.insert_plain_message(group.id, sender, text).unwrap();
        }

        let history = db.plain_messages_for_chat(group.id).unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
        assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn encrypted_parts_stored_verbatim() {
        let (mut db, _dir) = seeded_db(&["alice", "bob"]);
        let dm = db
            .create_chat(None, ChatKind::Private, &usernames(&["alice", "bob"]))
            .unwrap();

        let sent = db
            .insert_encrypted_message(dm.id, "alice", "iv==", "ct==", "tag==")
            .unwrap();

        let history = db.encrypted_messages_for_chat(dm.id).unwrap();
        assert_eq!(history, vec![sent]);
    }

    #[test]
    fn message_kind_must_match_chat_kind() {
        let (mut db, _dir) = seeded_db(&["alice", "bob"]);
        let dm = db
            .create_chat(None, ChatKind::Private, &usernames(&["alice", "bob"]))
            .unwrap();

        let err = db.insert_plain_message(dm.id, "alice", "hi").unwrap_err();
        assert!(matches!(err, StoreError::WrongChatKind { expected: ChatKind::Group, .. }));
        assert!(db.plain_messages_for_chat(dm.id).unwrap().is_empty());
    }

    #[test]
    fn unknown_chat_or_sender_rejected() {
        let (mut db, _dir) = seeded_db(&["alice"]);
        let group = db
            .create_chat(Some("solo"), ChatKind::Group, &usernames(&["alice"]))
            .unwrap();

        assert!(matches!(
            db.insert_plain_message(ChatId(999), "alice", "hi"),
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            db.insert_plain_message(group.id, "ghost", "hi"),
            Err(StoreError::UnknownUser(_))
        ));
    }
}
