//! Optimistic persistence of board gestures
//!
//! A gesture is shown on the board before any request leaves. When every
//! write succeeds the overlay becomes the cached state; when any write fails
//! the whole gesture is rolled back and the user gets an error notice.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::board::{BoardError, BoardStore, GestureId};
use crate::drag::DragSession;
use crate::notification::{Notice, Notifier};
use crate::reorder::{self, DropPlan, Nudge};
use crate::schedule::{ExternalDrag, ScheduledSlot};
use crate::service::TaskService;
use crate::settings::{Settings, SiblingPolicy};
use crate::types::{Task, TaskDraft, TaskPatch};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    /// Nothing to do: no target, stale task, or the task stayed in place.
    Unchanged,
    Persisted { gesture: GestureId, writes: usize },
    RolledBack { gesture: GestureId, error: String },
}

/// One update call a gesture needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub task_id: String,
    pub patch: TaskPatch,
}

/// Update calls that persist `plan`.
///
/// A reorder writes every task of the column whose position changed. A
/// transfer writes the moved task with its new column and position; siblings
/// are written only under [`SiblingPolicy::Renumber`].
pub fn persistence_calls(plan: &DropPlan, policy: SiblingPolicy) -> Vec<PendingWrite> {
    let original: HashMap<&str, &Task> = plan
        .before
        .iter()
        .flat_map(|column| &column.tasks)
        .map(|task| (task.id.as_str(), task))
        .collect();

    let changed_in = |column_id: &str, skip: Option<&str>| -> Vec<PendingWrite> {
        plan.after
            .iter()
            .filter(|column| column.id == column_id)
            .flat_map(|column| &column.tasks)
            .filter(|task| Some(task.id.as_str()) != skip)
            .filter_map(|task| {
                let before = original.get(task.id.as_str())?;
                (before.position != task.position).then(|| PendingWrite {
                    task_id: task.id.clone(),
                    patch: TaskPatch::reposition(before, task.position),
                })
            })
            .collect()
    };

    if !plan.is_transfer() {
        return changed_in(&plan.to_column, None);
    }

    let (Some(before), Some(moved)) = (plan.original_task(), plan.moved_task()) else {
        return Vec::new();
    };
    let mut writes = vec![PendingWrite {
        task_id: moved.id.clone(),
        patch: TaskPatch::transfer(before, plan.to_column.clone(), moved.position),
    }];

    if policy == SiblingPolicy::Renumber {
        writes.extend(changed_in(&plan.from_column, Some(&plan.task_id)));
        writes.extend(changed_in(&plan.to_column, Some(&plan.task_id)));
    }
    writes
}

pub struct Coordinator {
    board: BoardStore,
    service: Arc<dyn TaskService>,
    notifier: Arc<dyn Notifier>,
    settings: Settings,
}

impl Coordinator {
    pub fn new(
        board: BoardStore,
        service: Arc<dyn TaskService>,
        notifier: Arc<dyn Notifier>,
        settings: Settings,
    ) -> Self {
        Self {
            board,
            service,
            notifier,
            settings,
        }
    }

    pub fn board(&self) -> &BoardStore {
        &self.board
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Ends `session` with a drop on `over_id` and persists the resulting move.
    pub async fn drop_gesture(
        &self,
        session: &mut DragSession,
        over_id: Option<&str>,
    ) -> Result<DropOutcome> {
        match session.end(over_id, &self.board.columns()) {
            Some(plan) => self.commit_drop(plan).await,
            None => Ok(DropOutcome::Unchanged),
        }
    }

    pub async fn nudge(&self, task_id: &str, nudge: Nudge) -> Result<DropOutcome> {
        match reorder::plan_nudge(&self.board.columns(), task_id, nudge) {
            Some(plan) => self.commit_drop(plan).await,
            None => Ok(DropOutcome::Unchanged),
        }
    }

    /// Applies `plan` to the board at once, then writes it back.
    ///
    /// Fails only when another gesture is still in flight; backend failures
    /// are reported as [`DropOutcome::RolledBack`].
    pub async fn commit_drop(&self, plan: DropPlan) -> Result<DropOutcome> {
        let writes = persistence_calls(&plan, self.settings.sibling_policy());
        let gesture = self.board.begin_gesture(&plan)?;
        info!(
            %gesture,
            task_id = %plan.task_id,
            to_column = %plan.to_column,
            to_index = plan.to_index,
            writes = writes.len(),
            "committing task move"
        );

        match self.persist(writes).await {
            Ok(count) => {
                self.board.settle(gesture, Ok(()));
                Ok(DropOutcome::Persisted {
                    gesture,
                    writes: count,
                })
            }
            Err(err) => {
                let error = format!("{err:#}");
                self.board.settle(gesture, Err(error.clone()));
                self.notifier.notify(Notice::error(
                    "Move failed",
                    format!("The task was put back where it was. {error}"),
                ));
                Ok(DropOutcome::RolledBack { gesture, error })
            }
        }
    }

    /// Runs the writes concurrently. The first failure wins; calls still in
    /// flight are left to finish on their own.
    async fn persist(&self, writes: Vec<PendingWrite>) -> Result<usize> {
        let timeout = self.settings.request_timeout();
        let mut set = JoinSet::new();
        for write in writes {
            let service = Arc::clone(&self.service);
            set.spawn(async move {
                let PendingWrite { task_id, patch } = write;
                with_timeout(timeout, service.update_task(&task_id, patch))
                    .await
                    .with_context(|| format!("failed to save task {task_id}"))
            });
        }

        let mut completed = 0;
        while let Some(joined) = set.join_next().await {
            let result = joined
                .map_err(|err| anyhow!("update call panicked or was aborted: {err}"))
                .and_then(|result| result);
            match result {
                Ok(task) => {
                    debug!(task_id = %task.id, position = task.position, "task saved");
                    completed += 1;
                }
                Err(err) => {
                    set.detach_all();
                    return Err(err);
                }
            }
        }
        Ok(completed)
    }

    /// Reloads a group from the backend. Returns false when the result was
    /// dropped because the board changed while it was loading.
    pub async fn refresh(&self, group_id: &str) -> Result<bool> {
        let ticket = self.board.fetch_ticket();
        let group = with_timeout(self.settings.request_timeout(), self.service.get_group(group_id))
            .await
            .with_context(|| format!("failed to refresh group {group_id}"))?;
        let applied = self.board.apply_refresh(ticket, group.columns);
        debug!(group_id = %group_id, applied, "board refresh");
        Ok(applied)
    }

    /// Creates a task at the end of `column_id`.
    pub async fn create_task(&self, column_id: &str, draft: TaskDraft) -> Result<Task> {
        let position = self
            .board
            .columns()
            .iter()
            .find(|column| column.id == column_id)
            .map(|column| column.tasks.len() as i64)
            .ok_or_else(|| BoardError::ColumnNotFound(column_id.to_string()))?;

        let created = with_timeout(
            self.settings.request_timeout(),
            self.service
                .create_task(draft.into_new_task(column_id, position)),
        )
        .await
        .context("failed to create task")?;

        if let Err(err) = self.board.insert_task(created.clone()) {
            warn!(task_id = %created.id, error = %err, "created task could not be placed on the board");
        }
        Ok(created)
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<()> {
        with_timeout(self.settings.request_timeout(), self.service.delete_task(task_id))
            .await
            .with_context(|| format!("failed to delete task {task_id}"))?;
        if let Err(err) = self.board.remove_task(task_id) {
            debug!(task_id = %task_id, error = %err, "deleted task was not on the board");
        }
        Ok(())
    }

    pub async fn set_completed(&self, task_id: &str, completed: bool) -> Result<Task> {
        let task = self
            .board
            .find_task(task_id)
            .ok_or_else(|| BoardError::TaskNotFound(task_id.to_string()))?;
        let updated = with_timeout(
            self.settings.request_timeout(),
            self.service
                .update_task(task_id, TaskPatch::completion(&task, completed)),
        )
        .await
        .with_context(|| format!("failed to update task {task_id}"))?;
        self.board.replace_task(updated.clone())?;
        Ok(updated)
    }

    /// Deletes a column; its tasks go with it.
    pub async fn delete_column(&self, column_id: &str) -> Result<()> {
        with_timeout(self.settings.request_timeout(), self.service.delete_column(column_id))
            .await
            .with_context(|| format!("failed to delete column {column_id}"))?;
        if let Err(err) = self.board.remove_column(column_id) {
            debug!(column_id = %column_id, error = %err, "deleted column was not on the board");
        }
        Ok(())
    }

    /// Binds a dragged task to a calendar slot. Independent of the board
    /// gesture pipeline: no column or position changes.
    pub async fn schedule_drop(&self, drag: ExternalDrag, slot: ScheduledSlot) -> Result<Task> {
        let (task, patch) = drag.into_patch(slot);
        let result = with_timeout(
            self.settings.request_timeout(),
            self.service.update_task(&task.id, patch),
        )
        .await;

        match result {
            Ok(updated) => {
                if self.board.find_task(&updated.id).is_some()
                    && let Err(err) = self.board.replace_task(updated.clone())
                {
                    debug!(task_id = %updated.id, error = %err, "scheduled task left the board");
                }
                self.notifier.notify(Notice::info(
                    "Task scheduled",
                    format!(
                        "{} on {}",
                        updated.title,
                        slot.start.format("%Y-%m-%d %H:%M")
                    ),
                ));
                Ok(updated)
            }
            Err(err) => {
                let detail = format!("{err:#}");
                self.notifier
                    .notify(Notice::error("Scheduling failed", detail.clone()));
                Err(anyhow!("failed to schedule task {}: {detail}", task.id))
            }
        }
    }
}

async fn with_timeout<T>(
    timeout: std::time::Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!(
            "backend did not answer within {}ms",
            timeout.as_millis()
        )),
    }
}
