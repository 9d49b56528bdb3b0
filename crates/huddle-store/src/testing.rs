//! Fixtures shared by the store's unit tests.

use tempfile::TempDir;

use crate::database::Database;

/// Open a fresh on-disk database with the given users registered.
pub(crate) fn seeded_db(users: &[&str]) -> (Database, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::open_at(&dir.path().join("huddle.db")).unwrap();
    for user in users {
        db.create_user(user, &format!("pk-{user}")).unwrap();
    }
    (db, dir)
}

pub(crate) fn usernames(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}
