//! Group task ledger.
//!
//! Both mutating operations run inside `BEGIN IMMEDIATE` transactions. SQLite
//! grants the write lock before the first read, so the duplicate check in
//! [`Database::insert_task_batch`] and the open-count check in
//! [`Database::update_task_status`] cannot interleave with another writer.

use std::collections::HashSet;

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use huddle_shared::constants::{DEADLINE_FORMAT, TASK_ENDED_MESSAGE};
use huddle_shared::types::{ChatId, ChatKind, TaskId, TaskStatus};

use crate::chats::require_chat_kind;
use crate::database::{decode_timestamp, encode_timestamp, now, Database};
use crate::error::{Result, StoreError};
use crate::messages::insert_plain_row;
use crate::models::{GroupTask, NewTask, StatusChange, Task};
use crate::users::require_user;

const TASK_COLUMNS: &str =
    "t.id, t.group_id, t.participant_name, t.task_name, t.deadline, t.status, t.created_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a batch of tasks into one group, all or nothing.
    ///
    /// Fails with [`StoreError::DuplicateTasks`] listing every incoming name
    /// that already exists in the group or appears twice in the batch; in
    /// that case nothing is written.
    pub fn insert_task_batch(
        &mut self,
        group_id: ChatId,
        batch: &[NewTask],
    ) -> Result<Vec<GroupTask>> {
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let group = require_chat_kind(&tx, group_id, ChatKind::Group)?;

        let existing: HashSet<String> = {
            let mut stmt = tx.prepare("SELECT task_name FROM tasks WHERE group_id = ?1")?;
            let rows = stmt.query_map(params![group_id.0], |row| row.get(0))?;
            let names = rows.collect::<std::result::Result<HashSet<String>, _>>()?;
            names
        };

        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for task in batch {
            let collides = existing.contains(&task.task_name) || !seen.insert(task.task_name.as_str());
            if collides && !duplicates.contains(&task.task_name) {
                duplicates.push(task.task_name.clone());
            }
        }
        if !duplicates.is_empty() {
            tracing::debug!(group = %group_id, ?duplicates, "rejecting task batch");
            return Err(StoreError::DuplicateTasks(duplicates));
        }

        let created_at = now();
        let mut inserted = Vec::with_capacity(batch.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO tasks (group_id, participant_name, task_name, deadline, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for task in batch {
                stmt.execute(params![
                    group_id.0,
                    task.participant_name,
                    task.task_name,
                    task.deadline.format(DEADLINE_FORMAT).to_string(),
                    TaskStatus::Open.storage_tag(),
                    encode_timestamp(created_at),
                ])?;
                inserted.push(GroupTask {
                    task: Task {
                        id: TaskId(tx.last_insert_rowid()),
                        group_id,
                        participant_name: task.participant_name.clone(),
                        task_name: task.task_name.clone(),
                        deadline: task.deadline,
                        status: TaskStatus::Open,
                        created_at,
                    },
                    group_name: group.name.clone(),
                });
            }
        }

        tx.commit()?;

        tracing::info!(group = %group_id, count = inserted.len(), "added task batch");
        Ok(inserted)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Tasks of one group ordered by deadline.
    #[cfg(test)]
    pub(crate) fn tasks_for_group(&self, group_id: ChatId) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS}
             FROM tasks t
             WHERE t.group_id = ?1
             ORDER BY t.deadline ASC, t.id ASC"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![group_id.0], row_to_task)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Every task across the groups `username` belongs to, ordered by group
    /// name then deadline. A user without groups gets an empty list.
    pub fn list_tasks_for_user(&self, username: &str) -> Result<Vec<GroupTask>> {
        self.require_user(username)?;

        let sql = format!(
            "SELECT {TASK_COLUMNS}, c.name
             FROM tasks t
             JOIN chats c ON c.id = t.group_id
             JOIN chat_participants cp ON cp.chat_id = c.id
             WHERE cp.username = ?1 AND c.kind = 'group'
             ORDER BY c.name ASC, t.deadline ASC, t.id ASC"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![username], |row| {
            Ok(GroupTask {
                task: row_to_task(row)?,
                group_name: row.get(7)?,
            })
        })?;

        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    /// Number of tasks in the group that are not finished.
    #[cfg(test)]
    pub(crate) fn open_task_count(&self, group_id: ChatId) -> Result<i64> {
        Ok(self.conn().query_row(
            "SELECT COUNT(*) FROM tasks WHERE group_id = ?1 AND status = ?2",
            params![group_id.0, TaskStatus::Open.storage_tag()],
            |row| row.get(0),
        )?)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Set a task's status and, when that leaves the group with no open
    /// task, purge the group's tasks and append the system note authored by
    /// `acting_user`. Status write and cascade commit together.
    pub fn update_task_status(
        &mut self,
        task_id: TaskId,
        status: TaskStatus,
        acting_user: &str,
    ) -> Result<StatusChange> {
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let group_id = tx
            .query_row(
                "SELECT group_id FROM tasks WHERE id = ?1",
                params![task_id.0],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .map(ChatId)
            .ok_or(StoreError::NotFound)?;

        require_user(&tx, acting_user)?;

        tx.execute(
            "UPDATE tasks SET status = ?1 WHERE id = ?2",
            params![status.storage_tag(), task_id.0],
        )?;

        let remaining: i64 = tx.query_row(
            "SELECT COUNT(*) FROM tasks WHERE group_id = ?1 AND status = ?2",
            params![group_id.0, TaskStatus::Open.storage_tag()],
            |row| row.get(0),
        )?;

        let cascade = if remaining == 0 {
            let purged = tx.execute("DELETE FROM tasks WHERE group_id = ?1", params![group_id.0])?;
            let note = insert_plain_row(&tx, group_id, acting_user, TASK_ENDED_MESSAGE)?;
            tracing::info!(group = %group_id, purged, by = acting_user, "group finished all tasks");
            Some(note)
        } else {
            None
        };

        tx.commit()?;

        tracing::debug!(task = %task_id, group = %group_id, status = %status, remaining, "task status updated");

        Ok(StatusChange {
            task_id,
            group_id,
            status,
            cascade,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let deadline_str: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    let created_str: String = row.get(6)?;

    let deadline = NaiveDate::parse_from_str(&deadline_str, DEADLINE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let status = TaskStatus::from_storage_tag(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown task status tag: {status_str}").into(),
        )
    })?;

    Ok(Task {
        id: TaskId(row.get(0)?),
        group_id: ChatId(row.get(1)?),
        participant_name: row.get(2)?,
        task_name: row.get(3)?,
        deadline,
        status,
        created_at: decode_timestamp(&created_str, 6)?,
    })
}
