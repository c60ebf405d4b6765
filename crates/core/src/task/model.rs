//! Task model definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A task as stored by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    pub owner: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Materialize an insert payload the way a store does: fresh id and timestamps
    pub fn from_new(new_task: NewTask) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: new_task.title,
            description: new_task.description,
            completed: new_task.completed,
            owner: new_task.owner,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a patch, bumping `updated_at`
    pub fn apply(&mut self, patch: TaskPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        self.updated_at = Utc::now();
    }
}

/// Insert payload for a new task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub completed: bool,
    pub owner: Uuid,
}

impl NewTask {
    pub fn new(title: impl Into<String>, owner: Uuid) -> Self {
        Self {
            title: title.into(),
            description: None,
            completed: false,
            owner,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Partial update: only the fields that are `Some` get sent
///
/// `description: Some(None)` clears the description.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.completed.is_none()
    }

    /// Drop every field whose value already matches `task`
    pub fn changes_against(self, task: &Task) -> Self {
        Self {
            title: self.title.filter(|title| *title != task.title),
            description: self
                .description
                .filter(|description| *description != task.description),
            completed: self.completed.filter(|completed| *completed != task.completed),
        }
    }
}

/// Trim free text from a form field; blank input means "no value"
pub fn normalize_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
