//! Async facade over the SQLite pool.
//!
//! rusqlite is blocking, so each logical operation borrows a pooled
//! connection and runs on tokio's blocking thread pool. The connection goes
//! back to the pool when the closure returns, whatever the outcome.

use huddle_store::{Database, DatabasePool};

use crate::error::ServerError;

#[derive(Clone)]
pub struct Storage {
    pool: DatabasePool,
}

impl Storage {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub async fn run<T, F>(&self, op: F) -> Result<T, ServerError>
    where
        F: FnOnce(&mut Database) -> Result<T, ServerError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<T, ServerError> {
            let mut db = pool.acquire()?;
            op(&mut *db)
        })
        .await
        .map_err(|e| ServerError::Internal(format!("storage task panicked: {e}")))?
    }
}
