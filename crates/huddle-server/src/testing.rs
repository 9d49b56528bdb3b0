//! Shared fixtures for the server's unit tests.

use tempfile::TempDir;

use huddle_shared::types::{ChatId, ChatKind};
use huddle_store::DatabasePool;

use crate::api::AppState;
use crate::config::ServerConfig;

pub(crate) struct Harness {
    pub state: AppState,
    _dir: TempDir,
}

/// Fresh on-disk database with `users` registered, wrapped in an
/// [`AppState`].
pub(crate) async fn harness(users: &[&str]) -> Harness {
    let dir = TempDir::new().unwrap();
    let config = ServerConfig {
        database_path: dir.path().join("huddle.db"),
        subscriber_queue: 16,
        ..ServerConfig::default()
    };
    let pool = DatabasePool::open(&config.database_path, config.pool_size).unwrap();
    let state = AppState::new(pool, &config);

    for user in users {
        let user = user.to_string();
        state
            .storage
            .run(move |db| Ok(db.create_user(&user, &format!("pk-{user}"))?))
            .await
            .unwrap();
    }

    Harness { state, _dir: dir }
}

impl Harness {
    pub async fn group(&self, name: &str, members: &[&str]) -> ChatId {
        self.chat(Some(name), ChatKind::Group, members).await
    }

    pub async fn private(&self, name: Option<&str>, members: &[&str]) -> ChatId {
        self.chat(name, ChatKind::Private, members).await
    }

    async fn chat(&self, name: Option<&str>, kind: ChatKind, members: &[&str]) -> ChatId {
        let name = name.map(str::to_string);
        let members = names(members);
        self.state
            .storage
            .run(move |db| Ok(db.create_chat(name.as_deref(), kind, &members)?))
            .await
            .unwrap()
            .id
    }
}

pub(crate) fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}
