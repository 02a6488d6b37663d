use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::types::{NewTask, Task, TaskGroup, TaskPatch};

use super::TaskService;

/// A request as the in-memory backend received it, failed or not.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceCall {
    ListGroups,
    GetGroup(String),
    CreateTask(NewTask),
    UpdateTask { task_id: String, patch: TaskPatch },
    DeleteTask(String),
    DeleteColumn(String),
}

impl ServiceCall {
    pub fn is_write(&self) -> bool {
        !matches!(self, ServiceCall::ListGroups | ServiceCall::GetGroup(_))
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    groups: Vec<TaskGroup>,
    /// Tasks with no column; they only show up on the calendar.
    unscheduled: Vec<Task>,
    calls: Vec<ServiceCall>,
    failures_left: u32,
    delay: Duration,
}

/// Backend kept entirely in memory. Writes can be made to fail or to take a
/// while, which is what the board tests and the demo need.
#[derive(Debug, Default)]
pub struct MemoryTaskService {
    state: Mutex<MemoryState>,
}

impl MemoryTaskService {
    pub fn new(groups: Vec<TaskGroup>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                groups,
                ..MemoryState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// The next `count` writes fail.
    pub fn fail_next(&self, count: u32) {
        self.lock().failures_left = count;
    }

    /// Every call waits this long before it is handled.
    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = delay;
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.lock().calls.clone()
    }

    pub fn writes(&self) -> Vec<ServiceCall> {
        self.calls()
            .into_iter()
            .filter(ServiceCall::is_write)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn groups(&self) -> Vec<TaskGroup> {
        self.lock().groups.clone()
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        let state = self.lock();
        state
            .groups
            .iter()
            .flat_map(|group| &group.columns)
            .flat_map(|column| &column.tasks)
            .chain(&state.unscheduled)
            .find(|task| task.id == task_id)
            .cloned()
    }

    pub fn unscheduled(&self) -> Vec<Task> {
        self.lock().unscheduled.clone()
    }

    async fn record(&self, call: ServiceCall) -> Result<MutexGuard<'_, MemoryState>> {
        let delay = self.lock().delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        let is_write = call.is_write();
        debug!(?call, "memory backend call");
        state.calls.push(call);
        if is_write && state.failures_left > 0 {
            state.failures_left -= 1;
            bail!("backend unavailable (injected failure)");
        }
        Ok(state)
    }
}

impl MemoryState {
    fn take_task(&mut self, task_id: &str) -> Option<Task> {
        for column in self.groups.iter_mut().flat_map(|group| &mut group.columns) {
            if let Some(idx) = column.index_of(task_id) {
                return Some(column.tasks.remove(idx));
            }
        }
        let idx = self.unscheduled.iter().position(|task| task.id == task_id)?;
        Some(self.unscheduled.remove(idx))
    }

    /// Files a task under its column, ordered by position. Ties keep the
    /// earlier entry first. A task without a column goes to the unscheduled list.
    fn place_task(&mut self, task: Task) -> Result<Task> {
        let Some(column_id) = task.column_id.clone() else {
            self.unscheduled.push(task.clone());
            return Ok(task);
        };
        let column = self
            .groups
            .iter_mut()
            .flat_map(|group| &mut group.columns)
            .find(|column| column.id == column_id)
            .ok_or_else(|| anyhow!("column {column_id} not found"))?;
        let idx = column
            .tasks
            .iter()
            .position(|existing| existing.position > task.position)
            .unwrap_or(column.tasks.len());
        column.tasks.insert(idx, task.clone());
        Ok(task)
    }
}

#[async_trait]
impl TaskService for MemoryTaskService {
    async fn list_groups(&self) -> Result<Vec<TaskGroup>> {
        let state = self.record(ServiceCall::ListGroups).await?;
        Ok(state.groups.clone())
    }

    async fn get_group(&self, group_id: &str) -> Result<TaskGroup> {
        let state = self
            .record(ServiceCall::GetGroup(group_id.to_string()))
            .await?;
        let mut group = state
            .groups
            .iter()
            .find(|group| group.id == group_id)
            .cloned()
            .ok_or_else(|| anyhow!("group {group_id} not found"))?;
        for column in &mut group.columns {
            column.tasks.sort_by_key(|task| task.position);
        }
        Ok(group)
    }

    async fn create_task(&self, task: NewTask) -> Result<Task> {
        let mut state = self.record(ServiceCall::CreateTask(task.clone())).await?;
        let created = Task {
            id: Uuid::new_v4().to_string(),
            title: task.title,
            description: task.description,
            priority: task.priority,
            column_id: task.column_id,
            position: task.position,
            completed: task.completed,
            start_date: task.start_date,
            end_date: task.end_date,
            all_day: task.all_day,
            kind: task.kind,
        };
        state.place_task(created)
    }

    async fn update_task(&self, task_id: &str, patch: TaskPatch) -> Result<Task> {
        let mut state = self
            .record(ServiceCall::UpdateTask {
                task_id: task_id.to_string(),
                patch: patch.clone(),
            })
            .await?;
        let mut task = state
            .take_task(task_id)
            .ok_or_else(|| anyhow!("task {task_id} not found"))?;
        let previous = task.clone();
        task.apply_patch(&patch);
        match state.place_task(task) {
            Ok(task) => Ok(task),
            Err(err) => {
                state.place_task(previous)?;
                Err(err)
            }
        }
    }

    async fn delete_task(&self, task_id: &str) -> Result<()> {
        let mut state = self
            .record(ServiceCall::DeleteTask(task_id.to_string()))
            .await?;
        state
            .take_task(task_id)
            .map(|_| ())
            .ok_or_else(|| anyhow!("task {task_id} not found"))
    }

    async fn delete_column(&self, column_id: &str) -> Result<()> {
        let mut state = self
            .record(ServiceCall::DeleteColumn(column_id.to_string()))
            .await?;
        for group in &mut state.groups {
            if let Some(idx) = group.columns.iter().position(|c| c.id == column_id) {
                group.columns.remove(idx);
                return Ok(());
            }
        }
        bail!("column {column_id} not found")
    }
}
