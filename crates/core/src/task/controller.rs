//! Task list controller
//!
//! Holds the viewer's copy of their tasks and mediates every create, update
//! and delete against the [`TaskStore`].
//!
//! Updates are pessimistic: the local list changes only inside the completion
//! of a successful store call, never before it. A failed call leaves the list
//! exactly as it was and surfaces an alert. Two in-flight calls on the same
//! task resolve last-response-wins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::model::{normalize_text, NewTask, Task, TaskPatch};
use super::repository::TaskStore;
use crate::navigation::Confirm;
use crate::session::SessionContext;
use crate::{Error, Result};

pub const DELETE_PROMPT: &str = "Are you sure you want to delete this task?";
pub const EMPTY_TITLE_MESSAGE: &str = "Enter a task title";
pub const NO_OWNER_MESSAGE: &str = "User not found";

/// Whether the list has been loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListPhase {
    Loading,
    Ready,
}

/// Contents of the "new task" fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
}

/// In-place editing of a single task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EditSession {
    #[default]
    Idle,
    Editing {
        task_id: Uuid,
        title: String,
        description: String,
    },
    Saving {
        task_id: Uuid,
    },
}

impl EditSession {
    /// The task currently being edited or saved
    pub fn task_id(&self) -> Option<Uuid> {
        match self {
            Self::Idle => None,
            Self::Editing { task_id, .. } | Self::Saving { task_id } => Some(*task_id),
        }
    }
}

/// Everything a view needs to render the list
#[derive(Debug, Clone, Serialize)]
pub struct ListSnapshot {
    pub phase: ListPhase,
    pub tasks: Vec<Task>,
    pub draft: TaskDraft,
    pub form_error: Option<String>,
    pub alert: Option<String>,
    pub edit: EditSession,
}

impl Default for ListSnapshot {
    fn default() -> Self {
        Self {
            phase: ListPhase::Loading,
            tasks: Vec::new(),
            draft: TaskDraft::default(),
            form_error: None,
            alert: None,
            edit: EditSession::Idle,
        }
    }
}

pub struct TaskListController {
    store: Arc<dyn TaskStore>,
    session: SessionContext,
    state: RwLock<ListSnapshot>,
    active: AtomicBool,
}

impl TaskListController {
    pub fn new(store: Arc<dyn TaskStore>, session: SessionContext) -> Self {
        Self {
            store,
            session,
            state: RwLock::new(ListSnapshot::default()),
            active: AtomicBool::new(true),
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub async fn snapshot(&self) -> ListSnapshot {
        self.state.read().await.clone()
    }

    pub async fn tasks(&self) -> Vec<Task> {
        self.state.read().await.tasks.clone()
    }

    pub async fn phase(&self) -> ListPhase {
        self.state.read().await.phase
    }

    pub async fn edit_session(&self) -> EditSession {
        self.state.read().await.edit.clone()
    }

    /// Return the pending alert and clear it
    pub async fn take_alert(&self) -> Option<String> {
        self.state.write().await.alert.take()
    }

    /// Detach from the view; completions arriving afterwards are ignored
    pub fn unmount(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Fetch the full list from the store
    pub async fn load(&self) -> Result<()> {
        self.state.write().await.phase = ListPhase::Loading;

        let result = self.store.list_tasks().await;
        if !self.is_active() {
            return result.map(|_| ());
        }

        let mut state = self.state.write().await;
        state.phase = ListPhase::Ready;
        match result {
            Ok(tasks) => {
                debug!("Loaded {} tasks", tasks.len());
                state.tasks = tasks;
                Ok(())
            }
            Err(e) => {
                warn!("Failed to load tasks: {}", e);
                state.alert = Some(format!("Failed to load tasks: {}", e));
                Err(e)
            }
        }
    }

    /// Record the "new task" fields without submitting them
    pub async fn set_draft(&self, title: &str, description: &str) {
        let mut state = self.state.write().await;
        state.draft = TaskDraft {
            title: title.to_string(),
            description: description.to_string(),
        };
    }

    /// Submit a new task
    ///
    /// The fields are kept as the draft until the store accepts the task.
    pub async fn create(&self, title: &str, description: &str) -> Result<Task> {
        {
            let mut state = self.state.write().await;
            state.draft = TaskDraft {
                title: title.to_string(),
                description: description.to_string(),
            };
            state.form_error = None;
        }

        let Some(title) = normalize_text(title) else {
            return Err(self.reject_draft(EMPTY_TITLE_MESSAGE).await);
        };
        let Some(owner) = self.session.user_id() else {
            return Err(self.reject_draft(NO_OWNER_MESSAGE).await);
        };

        let new_task = NewTask {
            title,
            description: normalize_text(description),
            completed: false,
            owner,
        };

        match self.store.create_task(new_task).await {
            Ok(task) => {
                info!("Created task {}", task.id);
                if self.is_active() {
                    let mut state = self.state.write().await;
                    state.tasks.insert(0, task.clone());
                    state.draft = TaskDraft::default();
                }
                Ok(task)
            }
            Err(e) => Err(self.surface("Failed to create task", e).await),
        }
    }

    /// Send the changed fields of `patch` and adopt the stored record
    pub async fn update(&self, id: Uuid, patch: TaskPatch) -> Result<Task> {
        let current = self.find(id).await?;
        let patch = patch.changes_against(&current);
        if patch.is_empty() {
            debug!("Nothing to update for task {}", id);
            return Ok(current);
        }

        match self.store.update_task(id, patch).await {
            Ok(task) => {
                if self.is_active() {
                    let mut state = self.state.write().await;
                    if let Some(entry) = state.tasks.iter_mut().find(|t| t.id == id) {
                        *entry = task.clone();
                    }
                }
                Ok(task)
            }
            Err(e) => Err(self.surface("Failed to update task", e).await),
        }
    }

    /// Flip the completion flag of a task
    pub async fn toggle_complete(&self, id: Uuid) -> Result<Task> {
        let current = self.find(id).await?;
        self.update(id, TaskPatch::default().completed(!current.completed))
            .await
    }

    /// Delete a task once the viewer confirms
    ///
    /// Returns `false` when the viewer declined and nothing was sent.
    pub async fn delete(&self, id: Uuid, confirm: &dyn Confirm) -> Result<bool> {
        if !confirm.confirm(DELETE_PROMPT) {
            debug!("Deletion of task {} not confirmed", id);
            return Ok(false);
        }

        match self.store.delete_task(id).await {
            Ok(()) => {
                info!("Deleted task {}", id);
                if self.is_active() {
                    self.state.write().await.tasks.retain(|t| t.id != id);
                }
                Ok(true)
            }
            Err(e) => Err(self.surface("Failed to delete task", e).await),
        }
    }

    /// Enter edit mode for a task, seeding the buffers from its current values
    pub async fn start_editing(&self, id: Uuid) -> Result<()> {
        let task = self.find(id).await?;
        self.state.write().await.edit = EditSession::Editing {
            task_id: id,
            title: task.title,
            description: task.description.unwrap_or_default(),
        };
        Ok(())
    }

    /// Replace the edit buffers; ignored outside edit mode
    pub async fn set_edit_fields(&self, title: &str, description: &str) {
        let mut state = self.state.write().await;
        if let EditSession::Editing {
            title: edit_title,
            description: edit_description,
            ..
        } = &mut state.edit
        {
            *edit_title = title.to_string();
            *edit_description = description.to_string();
        }
    }

    pub async fn cancel_edit(&self) {
        self.state.write().await.edit = EditSession::Idle;
    }

    /// Save the edit buffers through [`Self::update`]
    ///
    /// The buffers are dropped as soon as the save starts; the session is back
    /// to idle once the update resolves, whatever its outcome.
    pub async fn save_edit(&self) -> Result<()> {
        let (task_id, title, description) = {
            let mut state = self.state.write().await;
            let EditSession::Editing {
                task_id,
                title,
                description,
            } = &state.edit
            else {
                return Err(Error::validation("No task is being edited"));
            };
            let task_id = *task_id;
            let title = normalize_text(title);
            let description = normalize_text(description);
            let Some(title) = title else {
                state.alert = Some(EMPTY_TITLE_MESSAGE.to_string());
                return Err(Error::validation(EMPTY_TITLE_MESSAGE));
            };
            state.edit = EditSession::Saving { task_id };
            (task_id, title, description)
        };

        let result = self
            .update(task_id, TaskPatch::default().title(title).description(description))
            .await;

        let mut state = self.state.write().await;
        if state.edit == (EditSession::Saving { task_id }) {
            state.edit = EditSession::Idle;
        }
        result.map(|_| ())
    }

    async fn find(&self, id: Uuid) -> Result<Task> {
        self.state
            .read()
            .await
            .tasks
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or(Error::TaskNotFound(id))
    }

    async fn reject_draft(&self, message: &str) -> Error {
        self.state.write().await.form_error = Some(message.to_string());
        Error::validation(message)
    }

    async fn surface(&self, context: &str, e: Error) -> Error {
        warn!("{}: {}", context, e);
        if self.is_active() {
            self.state.write().await.alert = Some(e.to_string());
        }
        e
    }
}
