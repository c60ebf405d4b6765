//! Session store trait
//!
//! Defines the interface to the authentication backend.

use async_trait::async_trait;
use tracing::warn;

use super::model::{Session, SessionContext, User};
use crate::{Error, Result};

/// Authentication capability of the backend, scoped to one viewer
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Sign in with email and password
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    /// Register a new account
    ///
    /// Returns `None` when the backend requires e-mail confirmation before
    /// issuing a session.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>>;

    /// Drop the current session
    async fn sign_out(&self) -> Result<()>;

    /// The current session, if any
    async fn get_session(&self) -> Result<Option<Session>>;

    /// The user of the current session, if any
    async fn current_user(&self) -> Result<Option<User>>;

    /// Send a password reset message to the given address
    async fn request_password_reset(&self, email: &str) -> Result<()>;

    /// Set a new password for the current user
    async fn update_password(&self, new_password: &str) -> Result<()>;

    /// Exchange the token hash of a password recovery link for a session
    ///
    /// Backends that never send recovery mail reject every link.
    async fn verify_recovery(&self, token_hash: &str) -> Result<Session> {
        let _ = token_hash;
        Err(Error::store("Password recovery links are not supported"))
    }
}

impl SessionContext {
    /// Build the context from whatever user the store reports.
    ///
    /// A failed lookup yields an anonymous context.
    pub async fn resolve(store: &dyn SessionStore) -> Self {
        match store.current_user().await {
            Ok(user) => Self::from(user),
            Err(e) => {
                warn!("Failed to resolve current user: {}", e);
                Self::anonymous()
            }
        }
    }
}
