//! Boundary to the task backend

mod memory;
mod rest;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{NewTask, Task, TaskGroup, TaskPatch};

pub use memory::{MemoryTaskService, ServiceCall};
pub use rest::RestTaskService;

/// Request/response contract of the task backend. The backend is the source
/// of truth and applies last-write-wins.
#[async_trait]
pub trait TaskService: Send + Sync {
    async fn list_groups(&self) -> Result<Vec<TaskGroup>>;
    /// A group with its columns and their tasks.
    async fn get_group(&self, group_id: &str) -> Result<TaskGroup>;
    async fn create_task(&self, task: NewTask) -> Result<Task>;
    async fn update_task(&self, task_id: &str, patch: TaskPatch) -> Result<Task>;
    async fn delete_task(&self, task_id: &str) -> Result<()>;
    /// Deletes a column and every task in it.
    async fn delete_column(&self, column_id: &str) -> Result<()>;
}
