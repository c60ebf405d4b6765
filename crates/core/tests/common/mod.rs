//! Scripted stores and a recording navigator for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::Notify;
use todo_core::navigation::{Navigator, Route};
use todo_core::session::{Session, SessionStore, User};
use todo_core::task::{NewTask, Task, TaskPatch, TaskStore};
use todo_core::{Error, Result};
use uuid::Uuid;

pub fn user() -> User {
    User {
        id: Uuid::new_v4(),
        email: "a@a.com".to_string(),
    }
}

/// A stored task with a deterministic creation time (`minute` minutes past noon)
pub fn task(title: &str, owner: Uuid, minute: u32) -> Task {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap();
    Task {
        id: Uuid::new_v4(),
        title: title.to_string(),
        description: None,
        completed: false,
        owner,
        created_at: at,
        updated_at: at,
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn push(&self, route: Route) {
        self.routes.lock().unwrap().push(route);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskCall {
    List,
    Create(NewTask),
    Update(Uuid, TaskPatch),
    Delete(Uuid),
}

/// Task store holding rows in memory, with injectable failures and delays
#[derive(Default)]
pub struct MockTaskStore {
    rows: Mutex<Vec<Task>>,
    calls: Mutex<Vec<TaskCall>>,
    failure: Mutex<Option<String>>,
    delays: Mutex<HashMap<Uuid, Duration>>,
}

impl MockTaskStore {
    pub fn with_rows(rows: Vec<Task>) -> Self {
        let store = Self::default();
        *store.rows.lock().unwrap() = rows;
        store
    }

    /// Make every following call fail with `message`
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    /// Hold updates of `id` for `delay` before answering
    pub fn delay_updates(&self, id: Uuid, delay: Duration) {
        self.delays.lock().unwrap().insert(id, delay);
    }

    pub fn calls(&self) -> Vec<TaskCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn remote_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| !matches!(call, TaskCall::List))
            .count()
    }

    pub fn rows(&self) -> Vec<Task> {
        self.rows.lock().unwrap().clone()
    }

    fn record(&self, call: TaskCall) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        match self.failure.lock().unwrap().clone() {
            Some(message) => Err(Error::Store(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TaskStore for MockTaskStore {
    async fn list_tasks(&self) -> Result<Vec<Task>> {
        self.record(TaskCall::List)?;
        let mut rows = self.rows();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn create_task(&self, new_task: NewTask) -> Result<Task> {
        self.record(TaskCall::Create(new_task.clone()))?;
        let task = Task::from_new(new_task);
        self.rows.lock().unwrap().push(task.clone());
        Ok(task)
    }

    async fn update_task(&self, id: Uuid, patch: TaskPatch) -> Result<Task> {
        let delay = self.delays.lock().unwrap().get(&id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record(TaskCall::Update(id, patch.clone()))?;
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(Error::TaskNotFound(id))?;
        row.apply(patch);
        Ok(row.clone())
    }

    async fn delete_task(&self, id: Uuid) -> Result<()> {
        self.record(TaskCall::Delete(id))?;
        self.rows.lock().unwrap().retain(|row| row.id != id);
        Ok(())
    }
}

/// Session store answering from a fixed session, optionally failing or
/// holding `get_session` until released
#[derive(Default)]
pub struct MockSessionStore {
    session: Mutex<Option<Session>>,
    failure: Mutex<Option<String>>,
    hold: Mutex<Option<Arc<Notify>>>,
    calls: Mutex<Vec<&'static str>>,
}

impl MockSessionStore {
    pub fn signed_in(user: User) -> Self {
        let store = Self::default();
        *store.session.lock().unwrap() = Some(Session::new("token", user));
        store
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        let store = Self::default();
        *store.failure.lock().unwrap() = Some(message.to_string());
        store
    }

    /// Block session lookups until the returned handle is notified
    pub fn hold_session_checks(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some(Arc::clone(&notify));
        notify
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        match self.failure.lock().unwrap().clone() {
            Some(message) => Err(Error::Store(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SessionStore for MockSessionStore {
    async fn sign_in(&self, email: &str, _password: &str) -> Result<Session> {
        self.record("sign_in")?;
        let session = Session::new(
            "token",
            User {
                id: Uuid::new_v4(),
                email: email.to_string(),
            },
        );
        *self.session.lock().unwrap() = Some(session.clone());
        Ok(session)
    }

    async fn sign_up(&self, _email: &str, _password: &str) -> Result<Option<Session>> {
        self.record("sign_up")?;
        Ok(None)
    }

    async fn sign_out(&self) -> Result<()> {
        self.record("sign_out")?;
        *self.session.lock().unwrap() = None;
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<Session>> {
        let hold = self.hold.lock().unwrap().clone();
        if let Some(notify) = hold {
            notify.notified().await;
        }
        self.record("get_session")?;
        Ok(self.session.lock().unwrap().clone())
    }

    async fn current_user(&self) -> Result<Option<User>> {
        self.record("current_user")?;
        Ok(self
            .session
            .lock()
            .unwrap()
            .as_ref()
            .map(|session| session.user.clone()))
    }

    async fn request_password_reset(&self, _email: &str) -> Result<()> {
        self.record("request_password_reset")
    }

    async fn update_password(&self, _new_password: &str) -> Result<()> {
        self.record("update_password")
    }
}
