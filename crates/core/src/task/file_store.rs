//! File-based task storage implementation
//!
//! Stores tasks as JSON in a file on disk. Every operation is scoped to an
//! owner: rows belonging to someone else are invisible, exactly like the
//! hosted store's row policy.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::model::{NewTask, Task, TaskPatch};
use crate::{Error, Result};

/// File-based task store using JSON
pub struct FileTaskStore {
    /// Path to the JSON file
    path: PathBuf,
    /// In-memory cache of tasks
    cache: RwLock<HashMap<Uuid, Task>>,
}

impl FileTaskStore {
    /// Create a new FileTaskStore
    ///
    /// If the file doesn't exist, it will be created on first write.
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let cache = if tokio::fs::try_exists(&path).await? {
            let content = tokio::fs::read_to_string(&path).await?;
            let tasks: Vec<Task> = serde_json::from_str(&content)?;
            tasks.into_iter().map(|t| (t.id, t)).collect()
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            cache: RwLock::new(cache),
        })
    }

    /// Persist the cache to disk
    async fn persist(&self) -> Result<()> {
        let cache = self.cache.read().await;
        let tasks: Vec<&Task> = cache.values().collect();
        let content = serde_json::to_string_pretty(&tasks)?;

        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }

    /// Tasks owned by `owner`, newest first
    pub async fn list_owned(&self, owner: Uuid) -> Result<Vec<Task>> {
        let cache = self.cache.read().await;
        let mut tasks: Vec<Task> = cache
            .values()
            .filter(|t| t.owner == owner)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    /// Insert a task on behalf of `viewer`
    ///
    /// The row must name the viewer as its owner.
    pub async fn insert(&self, viewer: Uuid, new_task: NewTask) -> Result<Task> {
        if new_task.owner != viewer {
            return Err(Error::store(
                "new row violates row-level security policy for table \"todos\"",
            ));
        }
        if new_task.title.trim().is_empty() {
            return Err(Error::store("Task title cannot be empty"));
        }

        let task = Task::from_new(new_task);
        {
            let mut cache = self.cache.write().await;
            cache.insert(task.id, task.clone());
        }
        self.persist().await?;
        debug!("Inserted task {} for {}", task.id, viewer);
        Ok(task)
    }

    /// Get a task if `viewer` may see it
    pub async fn get_owned(&self, viewer: Uuid, id: Uuid) -> Result<Option<Task>> {
        let cache = self.cache.read().await;
        Ok(cache.get(&id).filter(|t| t.owner == viewer).cloned())
    }

    /// Apply a patch to one of `viewer`'s tasks
    pub async fn update_owned(&self, viewer: Uuid, id: Uuid, patch: TaskPatch) -> Result<Task> {
        if patch.title.as_deref().is_some_and(|title| title.trim().is_empty()) {
            return Err(Error::store("Task title cannot be empty"));
        }

        let task = {
            let mut cache = self.cache.write().await;
            let task = cache
                .get_mut(&id)
                .filter(|t| t.owner == viewer)
                .ok_or(Error::TaskNotFound(id))?;
            task.apply(patch);
            task.clone()
        };
        self.persist().await?;
        Ok(task)
    }

    /// Delete one of `viewer`'s tasks
    pub async fn delete_owned(&self, viewer: Uuid, id: Uuid) -> Result<()> {
        {
            let mut cache = self.cache.write().await;
            match cache.get(&id) {
                Some(task) if task.owner == viewer => {
                    cache.remove(&id);
                }
                _ => return Err(Error::TaskNotFound(id)),
            }
        }
        self.persist().await
    }
}
