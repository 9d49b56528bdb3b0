//! Task ledger: batch creation with duplicate detection and per-user task
//! listing across groups.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use huddle_shared::constants::DEADLINE_FORMAT;
use huddle_shared::types::{ChatId, TaskId, TaskStatus};
use huddle_store::{GroupTask, NewTask, StoreError};

use crate::error::ServerError;
use crate::storage::Storage;

/// One element of an incoming task batch, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub group_id: Option<ChatId>,
    pub participant_name: Option<String>,
    pub task_name: Option<String>,
    pub deadline: Option<String>,
}

/// A task as returned to clients.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: TaskId,
    pub group_id: ChatId,
    pub group_name: Option<String>,
    pub participant_name: String,
    pub task_name: String,
    pub deadline: NaiveDate,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

impl From<GroupTask> for TaskView {
    fn from(row: GroupTask) -> Self {
        let GroupTask { task, group_name } = row;
        Self {
            id: task.id,
            group_id: task.group_id,
            group_name,
            participant_name: task.participant_name,
            task_name: task.task_name,
            deadline: task.deadline,
            status: task.status,
            created_at: task.created_at,
        }
    }
}

/// Check the shape of a batch: non-empty, every field present, a single
/// target group and parseable deadlines.
pub fn validate_batch(drafts: &[TaskDraft]) -> Result<(ChatId, Vec<NewTask>), ServerError> {
    if drafts.is_empty() {
        return Err(ServerError::BadRequest("Invalid or missing tasks array".into()));
    }

    let mut group = None;
    let mut batch = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let (Some(group_id), Some(participant_name), Some(task_name), Some(deadline)) = (
            draft.group_id,
            non_blank(draft.participant_name.as_deref()),
            non_blank(draft.task_name.as_deref()),
            non_blank(draft.deadline.as_deref()),
        ) else {
            return Err(ServerError::BadRequest(
                "Each task must include groupId, participantName, taskName, deadline".into(),
            ));
        };

        match group {
            None => group = Some(group_id),
            Some(g) if g != group_id => {
                return Err(ServerError::BadRequest(
                    "All tasks in a batch must target the same group".into(),
                ));
            }
            Some(_) => {}
        }

        let deadline = NaiveDate::parse_from_str(deadline, DEADLINE_FORMAT).map_err(|_| {
            ServerError::BadRequest(format!("Invalid deadline {deadline:?}, expected YYYY-MM-DD"))
        })?;

        batch.push(NewTask {
            participant_name: participant_name.to_string(),
            task_name: task_name.to_string(),
            deadline,
        });
    }

    // Non-empty input guarantees a group was seen.
    let group = group.ok_or_else(|| ServerError::BadRequest("Missing groupId".into()))?;
    Ok((group, batch))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct TaskLedger {
    storage: Storage,
}

impl TaskLedger {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Insert a batch atomically. Any name already used in the group, or
    /// repeated within the batch, rejects the whole batch with an error
    /// listing every offending name.
    pub async fn add_tasks(&self, drafts: Vec<TaskDraft>) -> Result<Vec<TaskView>, ServerError> {
        let (group_id, batch) = validate_batch(&drafts)?;
        let inserted = self
            .storage
            .run(move |db| {
                db.insert_task_batch(group_id, &batch).map_err(|e| match e {
                    StoreError::NotFound => {
                        ServerError::NotFound(format!("Group {group_id} not found"))
                    }
                    other => other.into(),
                })
            })
            .await?;

        tracing::info!(group = %group_id, count = inserted.len(), "tasks added");
        Ok(inserted.into_iter().map(TaskView::from).collect())
    }

    /// Tasks across every group `username` belongs to, ordered by group name
    /// then deadline.
    pub async fn list_tasks_for_user(&self, username: &str) -> Result<Vec<TaskView>, ServerError> {
        let username = username.to_string();
        let rows = self
            .storage
            .run(move |db| Ok(db.list_tasks_for_user(&username)?))
            .await?;
        Ok(rows.into_iter().map(TaskView::from).collect())
    }
}
