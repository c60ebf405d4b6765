//! Task store trait
//!
//! Defines the interface for task storage operations.

use async_trait::async_trait;
use uuid::Uuid;

use super::model::{NewTask, Task, TaskPatch};
use crate::Result;

/// Task capability of the backend, scoped to one viewer
///
/// Visibility is decided by the backend's access policy: a viewer only ever
/// sees and touches the tasks it owns.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// All visible tasks, newest first
    async fn list_tasks(&self) -> Result<Vec<Task>>;

    /// Insert a task and return the stored record
    async fn create_task(&self, task: NewTask) -> Result<Task>;

    /// Apply a partial update and return the stored record
    async fn update_task(&self, id: Uuid, patch: TaskPatch) -> Result<Task>;

    /// Delete a task
    async fn delete_task(&self, id: Uuid) -> Result<()>;
}
