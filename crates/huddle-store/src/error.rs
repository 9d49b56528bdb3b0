use huddle_shared::types::{ChatId, ChatKind};
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// A username referenced by the operation is not registered.
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    /// Registration attempted with a username that is already taken.
    #[error("Username already exists: {0}")]
    DuplicateUsername(String),

    /// A task batch collided with task names already present in the group.
    #[error("Already existing task names: {}", .0.join(", "))]
    DuplicateTasks(Vec<String>),

    /// The operation only applies to chats of another kind.
    #[error("Chat {chat} is not a {expected} chat")]
    WrongChatKind { chat: ChatId, expected: ChatKind },

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Map an empty single-row query to [`StoreError::NotFound`].
pub(crate) fn not_found(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        other => StoreError::Sqlite(other),
    }
}
