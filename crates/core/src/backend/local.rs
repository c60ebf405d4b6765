//! Local development backend
//!
//! Keeps accounts and tasks as JSON files in one data directory. Each viewer
//! gets a [`LocalClient`] that remembers its own session token; every task
//! call is checked against that token's user.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::users::UserDirectory;
use super::{Backend, BackendClient};
use crate::auth::PasswordPolicy;
use crate::session::{Session, SessionStore, User};
use crate::task::{FileTaskStore, NewTask, Task, TaskPatch, TaskStore};
use crate::{Error, Result};

const DEFAULT_JWT_SECRET: &str = "dev-jwt-secret-change-me";
const DEFAULT_SESSION_TTL_SECONDS: i64 = 60 * 60 * 8;

#[derive(Debug, Clone)]
pub struct LocalConfig {
    pub data_dir: PathBuf,
    pub jwt_secret: String,
    pub session_ttl: Duration,
    pub password_policy: PasswordPolicy,
}

impl LocalConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            session_ttl: Duration::seconds(DEFAULT_SESSION_TTL_SECONDS),
            password_policy: PasswordPolicy::default(),
        }
    }

    pub fn with_jwt_secret(mut self, jwt_secret: impl Into<String>) -> Self {
        self.jwt_secret = jwt_secret.into();
        self
    }

    pub fn with_session_ttl(mut self, session_ttl: Duration) -> Self {
        self.session_ttl = session_ttl;
        self
    }

    pub fn with_password_policy(mut self, policy: PasswordPolicy) -> Self {
        self.password_policy = policy;
        self
    }
}

struct LocalStores {
    users: UserDirectory,
    tasks: FileTaskStore,
}

#[derive(Clone)]
pub struct LocalBackend {
    stores: Arc<LocalStores>,
}

impl LocalBackend {
    pub async fn open(config: LocalConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir).await?;
        let users = UserDirectory::open(
            config.data_dir.join("users.json"),
            config.jwt_secret,
            config.session_ttl,
        )
        .await?
        .with_policy(config.password_policy);
        let tasks = FileTaskStore::new(config.data_dir.join("tasks.json")).await?;
        info!("Local backend ready in {:?}", config.data_dir);

        Ok(Self {
            stores: Arc::new(LocalStores { users, tasks }),
        })
    }

    /// A client that is not signed in
    pub fn client(&self) -> LocalClient {
        LocalClient {
            stores: Arc::clone(&self.stores),
            token: RwLock::new(None),
        }
    }
}

impl Backend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn connect(&self) -> BackendClient {
        BackendClient::from_shared(Arc::new(self.client()))
    }
}

/// One viewer's connection to the local backend
pub struct LocalClient {
    stores: Arc<LocalStores>,
    token: RwLock<Option<String>>,
}

impl LocalClient {
    async fn adopt(&self, session: &Session) {
        *self.token.write().await = Some(session.access_token.clone());
    }

    /// The signed-in user, or `Unauthenticated`
    async fn viewer(&self) -> Result<Uuid> {
        self.get_session()
            .await?
            .map(|session| session.user.id)
            .ok_or(Error::Unauthenticated)
    }
}

#[async_trait]
impl SessionStore for LocalClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let user = self.stores.users.authenticate(email, password).await?;
        let session = self.stores.users.issue_session(user)?;
        self.adopt(&session).await;
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>> {
        let user = self.stores.users.register(email, password).await?;
        let session = self.stores.users.issue_session(user)?;
        self.adopt(&session).await;
        Ok(Some(session))
    }

    async fn sign_out(&self) -> Result<()> {
        *self.token.write().await = None;
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<Session>> {
        let Some(token) = self.token.read().await.clone() else {
            return Ok(None);
        };
        match self.stores.users.verify(&token).await {
            Ok(session) => Ok(Some(session)),
            Err(Error::Unauthenticated) => {
                debug!("Dropping invalid or expired local session");
                *self.token.write().await = None;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn current_user(&self) -> Result<Option<User>> {
        Ok(self.get_session().await?.map(|session| session.user))
    }

    async fn request_password_reset(&self, email: &str) -> Result<()> {
        // No mail transport locally; the outcome is the same whether or not
        // the account exists.
        match self.stores.users.find_by_email(email).await {
            Some(user) => info!("Password reset requested for account {}", user.id),
            None => debug!("Password reset requested for unknown address"),
        }
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> Result<()> {
        let user_id = self.viewer().await?;
        self.stores.users.set_password(user_id, new_password).await
    }
}

#[async_trait]
impl TaskStore for LocalClient {
    async fn list_tasks(&self) -> Result<Vec<Task>> {
        let viewer = self.viewer().await?;
        self.stores.tasks.list_owned(viewer).await
    }

    async fn create_task(&self, task: NewTask) -> Result<Task> {
        let viewer = self.viewer().await?;
        self.stores.tasks.insert(viewer, task).await
    }

    async fn update_task(&self, id: Uuid, patch: TaskPatch) -> Result<Task> {
        let viewer = self.viewer().await?;
        self.stores.tasks.update_owned(viewer, id, patch).await
    }

    async fn delete_task(&self, id: Uuid) -> Result<()> {
        let viewer = self.viewer().await?;
        self.stores.tasks.delete_owned(viewer, id).await
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn build_backend() -> (LocalBackend, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let backend = LocalBackend::open(LocalConfig::new(temp_dir.path().join("data")))
            .await
            .unwrap();
        (backend, temp_dir)
    }

    #[tokio::test]
    async fn sign_up_then_session_is_present() {
        let (backend, _tmp) = build_backend().await;
        let client = backend.client();
        assert!(client.get_session().await.unwrap().is_none());

        let session = client.sign_up("a@a.com", "secret1").await.unwrap().unwrap();
        let current = client.get_session().await.unwrap().unwrap();
        assert_eq!(current.user, session.user);
        assert_eq!(client.current_user().await.unwrap().unwrap().email, "a@a.com");

        client.sign_out().await.unwrap();
        assert!(client.get_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn configured_password_minimum_applies_to_registration() {
        let temp_dir = TempDir::new().unwrap();
        let config = LocalConfig::new(temp_dir.path().join("data"))
            .with_password_policy(PasswordPolicy { min_length: 4 });
        let backend = LocalBackend::open(config).await.unwrap();

        let client = backend.client();
        assert!(client.sign_up("a@a.com", "abcd").await.unwrap().is_some());

        let err = backend.client().sign_up("b@b.com", "abc").await.unwrap_err();
        assert_eq!(err.to_string(), "Password should be at least 4 characters");
    }

    #[tokio::test]
    async fn clients_keep_separate_sessions() {
        let (backend, _tmp) = build_backend().await;
        let alice = backend.client();
        let stranger = backend.client();

        alice.sign_up("alice@example.com", "secret1").await.unwrap();
        assert!(alice.get_session().await.unwrap().is_some());
        assert!(stranger.get_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn task_calls_require_a_session() {
        let (backend, _tmp) = build_backend().await;
        let client = backend.client();

        assert!(matches!(client.list_tasks().await, Err(Error::Unauthenticated)));
        let result = client.create_task(NewTask::new("x", Uuid::new_v4())).await;
        assert!(matches!(result, Err(Error::Unauthenticated)));
    }

    #[tokio::test]
    async fn tasks_are_visible_only_to_their_owner() {
        let (backend, _tmp) = build_backend().await;
        let alice = backend.client();
        let bob = backend.client();
        let alice_id = alice.sign_up("alice@example.com", "secret1").await.unwrap().unwrap().user.id;
        bob.sign_up("bob@example.com", "secret2").await.unwrap();

        let task = alice.create_task(NewTask::new("Alice's", alice_id)).await.unwrap();

        assert_eq!(alice.list_tasks().await.unwrap().len(), 1);
        assert!(bob.list_tasks().await.unwrap().is_empty());
        assert!(bob
            .update_task(task.id, TaskPatch::default().completed(true))
            .await
            .is_err());
        assert!(bob.delete_task(task.id).await.is_err());
        assert!(bob.create_task(NewTask::new("Forged", alice_id)).await.is_err());

        let updated = alice
            .update_task(task.id, TaskPatch::default().completed(true))
            .await
            .unwrap();
        assert!(updated.completed);
        alice.delete_task(task.id).await.unwrap();
        assert!(alice.list_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_password_needs_session() {
        let (backend, _tmp) = build_backend().await;
        let client = backend.client();
        assert!(matches!(
            client.update_password("another1").await,
            Err(Error::Unauthenticated)
        ));

        client.sign_up("a@a.com", "secret1").await.unwrap();
        client.update_password("another1").await.unwrap();
        client.sign_out().await.unwrap();

        assert!(client.sign_in("a@a.com", "secret1").await.is_err());
        client.sign_in("a@a.com", "another1").await.unwrap();
    }

    #[tokio::test]
    async fn password_reset_request_never_reveals_accounts() {
        let (backend, _tmp) = build_backend().await;
        let client = backend.client();
        client.request_password_reset("ghost@example.com").await.unwrap();
        client.sign_up("a@a.com", "secret1").await.unwrap();
        client.request_password_reset("a@a.com").await.unwrap();
    }

    #[tokio::test]
    async fn recovery_links_are_rejected() {
        let (backend, _tmp) = build_backend().await;
        let client = backend.client();
        assert!(client.verify_recovery("anything").await.is_err());
        assert!(client.get_session().await.unwrap().is_none());
    }
}
