//! Core library for the Todo app
//!
//! This crate contains everything below the HTML surface:
//! - Task model, task store capability and the task list controller
//! - Session model, session store capability, auth gate and credential forms
//! - Backend adapters (local JSON files, Supabase REST)

pub mod auth;
pub mod backend;
pub mod error;
pub mod navigation;
pub mod session;
pub mod task;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
