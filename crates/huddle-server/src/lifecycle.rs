//! Group lifecycle: task status transitions and the completion cascade.
//!
//! When a status change leaves a group with no open task, the store purges
//! every task of the group and appends the "Task is Ended!" note in the same
//! transaction. The note is then published to the group's room like any
//! other message.

use serde::Serialize;

use huddle_shared::types::{ChatId, TaskId, TaskStatus};
use huddle_store::StoreError;

use crate::broadcast::{plain_envelope, Broadcaster};
use crate::error::ServerError;
use crate::storage::Storage;

/// Result of a committed status update, as returned to clients.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub task_id: TaskId,
    pub group_id: ChatId,
    pub status: TaskStatus,
    /// True when this update cleared the group's task set.
    pub cascaded: bool,
}

#[derive(Clone)]
pub struct GroupLifecycle {
    storage: Storage,
    broadcaster: Broadcaster,
}

impl GroupLifecycle {
    pub fn new(storage: Storage, broadcaster: Broadcaster) -> Self {
        Self {
            storage,
            broadcaster,
        }
    }

    pub async fn update_task_status(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        acting_user: &str,
    ) -> Result<StatusUpdate, ServerError> {
        let acting_user = acting_user.to_string();
        let change = self
            .storage
            .run(move |db| {
                db.update_task_status(task_id, status, &acting_user)
                    .map_err(|e| match e {
                        StoreError::NotFound => {
                            ServerError::NotFound(format!("Task {task_id} not found"))
                        }
                        other => other.into(),
                    })
            })
            .await?;

        let cascaded = change.cascade.is_some();
        if let Some(note) = change.cascade {
            tracing::info!(group = %change.group_id, by = %note.sender, "publishing group completion");
            self.broadcaster.publish(plain_envelope(&note)).await;
        }

        Ok(StatusUpdate {
            task_id: change.task_id,
            group_id: change.group_id,
            status: change.status,
            cascaded,
        })
    }
}
