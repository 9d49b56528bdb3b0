//! v001 -- Initial schema creation.
//!
//! Creates the six core tables: `users`, `chats`, `chat_participants`,
//! `plain_messages`, `encrypted_messages` and `tasks`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (username is the natural key used everywhere else)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    username   TEXT PRIMARY KEY NOT NULL,
    public_key TEXT NOT NULL,                 -- opaque client-supplied blob
    created_at TEXT NOT NULL                  -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- Chats
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chats (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    kind       TEXT NOT NULL CHECK (kind IN ('private', 'group')),
    name       TEXT,                          -- informational for private chats
    created_at TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Participants
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chat_participants (
    chat_id  INTEGER NOT NULL,                -- FK -> chats(id)
    username TEXT NOT NULL,                   -- FK -> users(username)

    PRIMARY KEY (chat_id, username),
    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE,
    FOREIGN KEY (username) REFERENCES users(username) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_participants_username
    ON chat_participants(username);

-- ----------------------------------------------------------------
-- Plaintext messages (group chats, system notes)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS plain_messages (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id   INTEGER NOT NULL,               -- FK -> chats(id)
    sender    TEXT NOT NULL,                  -- FK -> users(username)
    content   TEXT NOT NULL,
    timestamp TEXT NOT NULL,                  -- ISO-8601, fixed width

    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE,
    FOREIGN KEY (sender) REFERENCES users(username)
);

CREATE INDEX IF NOT EXISTS idx_plain_messages_chat_ts
    ON plain_messages(chat_id, timestamp ASC);

-- ----------------------------------------------------------------
-- End-to-end encrypted messages (private chats)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS encrypted_messages (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id   INTEGER NOT NULL,               -- FK -> chats(id)
    sender    TEXT NOT NULL,                  -- FK -> users(username)
    iv        TEXT NOT NULL,
    ct        TEXT NOT NULL,
    tag       TEXT NOT NULL,
    timestamp TEXT NOT NULL,

    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE,
    FOREIGN KEY (sender) REFERENCES users(username)
);

CREATE INDEX IF NOT EXISTS idx_encrypted_messages_chat_ts
    ON encrypted_messages(chat_id, timestamp ASC);

-- ----------------------------------------------------------------
-- Group tasks
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS tasks (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id         INTEGER NOT NULL,        -- FK -> chats(id)
    participant_name TEXT NOT NULL,           -- free text
    task_name        TEXT NOT NULL,
    deadline         TEXT NOT NULL,           -- YYYY-MM-DD
    status           TEXT NOT NULL DEFAULT 'open' CHECK (status IN ('open', 'finished')),
    created_at       TEXT NOT NULL,

    UNIQUE (group_id, task_name),
    FOREIGN KEY (group_id) REFERENCES chats(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_tasks_group_status
    ON tasks(group_id, status);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
