//! Task module
//!
//! This module contains task-related types and logic.

mod controller;
mod file_store;
mod model;
mod repository;

pub use controller::{
    EditSession, ListPhase, ListSnapshot, TaskDraft, TaskListController, DELETE_PROMPT,
    EMPTY_TITLE_MESSAGE, NO_OWNER_MESSAGE,
};
pub use file_store::FileTaskStore;
pub use model::*;
pub use repository::TaskStore;
