//! Scoped connection acquisition.
//!
//! Every logical operation borrows a [`Database`] from the pool for its
//! duration. The [`PooledDatabase`] guard hands the connection back on drop,
//! so release happens on success, validation failure and storage failure
//! alike.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::database::Database;
use crate::error::Result;

struct PoolInner {
    path: PathBuf,
    idle: Mutex<Vec<Database>>,
    max_idle: usize,
}

/// A small pool of SQLite connections to one database file.
///
/// Connections are opened on demand when none is idle; at most `max_idle`
/// are retained between operations.
#[derive(Clone)]
pub struct DatabasePool {
    inner: Arc<PoolInner>,
}

impl DatabasePool {
    /// Open the pool. One connection is opened immediately so schema
    /// migrations have completed before the pool is handed out.
    pub fn open(path: &Path, max_idle: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %path.display(), max_idle, "opening database pool");

        let first = Database::open_at(path)?;
        let pool = Self {
            inner: Arc::new(PoolInner {
                path: path.to_path_buf(),
                idle: Mutex::new(Vec::with_capacity(max_idle.max(1))),
                max_idle: max_idle.max(1),
            }),
        };
        pool.release(first);
        Ok(pool)
    }

    /// Borrow a connection, opening a fresh one if the pool is drained.
    pub fn acquire(&self) -> Result<PooledDatabase> {
        let reused = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop();

        let db = match reused {
            Some(db) => db,
            None => {
                tracing::debug!(path = %self.inner.path.display(), "pool drained, opening connection");
                Database::open_at(&self.inner.path)?
            }
        };

        Ok(PooledDatabase {
            pool: self.clone(),
            db: Some(db),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Number of connections currently parked in the pool.
    pub fn idle_count(&self) -> usize {
        self.inner
            .idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn release(&self, db: Database) {
        let mut idle = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if idle.len() < self.inner.max_idle {
            idle.push(db);
        }
    }
}

/// A connection on loan from a [`DatabasePool`].
pub struct PooledDatabase {
    pool: DatabasePool,
    db: Option<Database>,
}

impl Deref for PooledDatabase {
    type Target = Database;

    fn deref(&self) -> &Database {
        self.db.as_ref().expect("connection present until drop")
    }
}

impl DerefMut for PooledDatabase {
    fn deref_mut(&mut self) -> &mut Database {
        self.db.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledDatabase {
    fn drop(&mut self) {
        if let Some(db) = self.db.take() {
            self.pool.release(db);
        }
    }
}
