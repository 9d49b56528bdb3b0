//! Registered users. Credential handling lives outside this crate; only the
//! username and the opaque public key are kept here.

use rusqlite::{params, Connection, OptionalExtension};

use crate::database::{decode_timestamp, encode_timestamp, now, Database};
use crate::error::{not_found, Result, StoreError};
use crate::models::User;

impl Database {
    pub fn create_user(&mut self, username: &str, public_key: &str) -> Result<User> {
        let tx = self.conn_mut().transaction()?;

        if user_exists(&tx, username)? {
            return Err(StoreError::DuplicateUsername(username.to_string()));
        }

        let created_at = now();
        tx.execute(
            "INSERT INTO users (username, public_key, created_at) VALUES (?1, ?2, ?3)",
            params![username, public_key, encode_timestamp(created_at)],
        )?;
        tx.commit()?;

        tracing::info!(username, "registered user");

        Ok(User {
            username: username.to_string(),
            public_key: public_key.to_string(),
            created_at,
        })
    }

    pub fn get_user(&self, username: &str) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT username, public_key, created_at FROM users WHERE username = ?1",
                params![username],
                |row| {
                    let created_str: String = row.get(2)?;
                    Ok(User {
                        username: row.get(0)?,
                        public_key: row.get(1)?,
                        created_at: decode_timestamp(&created_str, 2)?,
                    })
                },
            )
            .map_err(not_found)
    }

    pub fn user_exists(&self, username: &str) -> Result<bool> {
        user_exists(self.conn(), username)
    }

    /// Fail with [`StoreError::UnknownUser`] unless `username` is registered.
    pub fn require_user(&self, username: &str) -> Result<()> {
        require_user(self.conn(), username)
    }

    pub fn public_key(&self, username: &str) -> Result<String> {
        self.conn()
            .query_row(
                "SELECT public_key FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .map_err(not_found)
    }
}

pub(crate) fn user_exists(conn: &Connection, username: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM users WHERE username = ?1",
            params![username],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn require_user(conn: &Connection, username: &str) -> Result<()> {
    if user_exists(conn, username)? {
        Ok(())
    } else {
        Err(StoreError::UnknownUser(username.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("users.db")).unwrap();
        (db, dir)
    }

    #[test]
    fn register_and_fetch_public_key() {
        let (mut db, _dir) = test_db();
        db.create_user("alice", "pk-alice").unwrap();

        assert_eq!(db.public_key("alice").unwrap(), "pk-alice");
        assert_eq!(db.get_user("alice").unwrap().username, "alice");
        assert!(db.user_exists("alice").unwrap());
    }

    #[test]
    fn duplicate_username_rejected() {
        let (mut db, _dir) = test_db();
        db.create_user("alice", "pk-1").unwrap();

        let err = db.create_user("alice", "pk-2").unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUsername(name) if name == "alice"));
        assert_eq!(db.public_key("alice").unwrap(), "pk-1");
    }

    #[test]
    fn unknown_user_lookups() {
        let (db, _dir) = test_db();
        assert!(matches!(db.public_key("ghost"), Err(StoreError::NotFound)));
        assert!(matches!(db.require_user("ghost"), Err(StoreError::UnknownUser(_))));
    }
}
