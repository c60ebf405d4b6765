//! Credential forms
//!
//! Each form validates its fields locally, makes at most one session store
//! call, and maps the outcome onto its status (and a redirect on success).
//! Validation failures never reach the store.

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::navigation::{Navigator, Route};
use crate::session::SessionStore;
use crate::{Error, Result};

pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 6;
pub const PASSWORD_MISMATCH_MESSAGE: &str = "Passwords do not match";

/// Local password rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_length: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_PASSWORD_LENGTH,
        }
    }
}

impl PasswordPolicy {
    pub fn check(&self, password: &str) -> Result<()> {
        if password.chars().count() < self.min_length {
            return Err(Error::validation(format!(
                "Password must be at least {} characters",
                self.min_length
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormStatus {
    Idle,
    /// A store call is in flight; the submit control is disabled
    Submitting,
    Failed(String),
    Succeeded,
}

impl FormStatus {
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed(message) => Some(message),
            _ => None,
        }
    }
}

/// Observable status shared by all forms
struct FormState {
    tx: watch::Sender<FormStatus>,
}

impl FormState {
    fn new() -> Self {
        let (tx, _) = watch::channel(FormStatus::Idle);
        Self { tx }
    }

    fn status(&self) -> FormStatus {
        self.tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<FormStatus> {
        self.tx.subscribe()
    }

    /// Enter `Submitting`; `false` if a submission is already running
    fn begin(&self) -> bool {
        self.tx.send_if_modified(|status| {
            if *status == FormStatus::Submitting {
                false
            } else {
                *status = FormStatus::Submitting;
                true
            }
        })
    }

    fn fail(&self, e: Error) -> Error {
        self.tx.send_replace(FormStatus::Failed(e.to_string()));
        e
    }

    fn succeed(&self) {
        self.tx.send_replace(FormStatus::Succeeded);
    }

    /// Validation failure: reported without ever entering `Submitting`
    fn reject(&self, message: impl Into<String>) -> Error {
        self.fail(Error::validation(message))
    }
}

fn check_email(email: &str) -> std::result::Result<String, &'static str> {
    let normalized = email.trim().to_string();
    if normalized.is_empty() {
        return Err("Email is required");
    }
    if !normalized.contains('@') {
        return Err("Invalid email");
    }
    Ok(normalized)
}

macro_rules! form_status_accessors {
    () => {
        pub fn status(&self) -> FormStatus {
            self.state.status()
        }

        pub fn subscribe(&self) -> watch::Receiver<FormStatus> {
            self.state.subscribe()
        }

        pub fn is_submitting(&self) -> bool {
            self.state.status() == FormStatus::Submitting
        }
    };
}

/// Email + password sign-in
pub struct LoginForm {
    pub email: String,
    pub password: String,
    state: FormState,
}

impl LoginForm {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            state: FormState::new(),
        }
    }

    form_status_accessors!();

    pub async fn submit(&self, sessions: &dyn SessionStore, navigator: &dyn Navigator) -> Result<()> {
        let email = check_email(&self.email).map_err(|m| self.state.reject(m))?;
        if self.password.is_empty() {
            return Err(self.state.reject("Password is required"));
        }
        if !self.state.begin() {
            return Ok(());
        }

        match sessions.sign_in(&email, &self.password).await {
            Ok(session) => {
                info!("Signed in as {}", session.user.email);
                self.state.succeed();
                navigator.push(Route::AFTER_AUTH);
                Ok(())
            }
            Err(e) => {
                debug!("Sign-in rejected: {}", e);
                Err(self.state.fail(e))
            }
        }
    }
}

/// Account registration
pub struct SignUpForm {
    pub email: String,
    pub password: String,
    pub repeat_password: String,
    policy: PasswordPolicy,
    state: FormState,
}

impl SignUpForm {
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        repeat_password: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            repeat_password: repeat_password.into(),
            policy: PasswordPolicy::default(),
            state: FormState::new(),
        }
    }

    pub fn with_policy(mut self, policy: PasswordPolicy) -> Self {
        self.policy = policy;
        self
    }

    form_status_accessors!();

    pub async fn submit(&self, sessions: &dyn SessionStore, navigator: &dyn Navigator) -> Result<()> {
        let email = check_email(&self.email).map_err(|m| self.state.reject(m))?;
        if self.password != self.repeat_password {
            return Err(self.state.reject(PASSWORD_MISMATCH_MESSAGE));
        }
        self.policy
            .check(&self.password)
            .map_err(|e| self.state.fail(e))?;
        if !self.state.begin() {
            return Ok(());
        }

        match sessions.sign_up(&email, &self.password).await {
            Ok(session) => {
                info!(
                    "Registered {} (session issued: {})",
                    email,
                    session.is_some()
                );
                self.state.succeed();
                navigator.push(Route::SignUpSuccess);
                Ok(())
            }
            Err(e) => {
                debug!("Sign-up rejected: {}", e);
                Err(self.state.fail(e))
            }
        }
    }
}

/// Password reset request
pub struct ForgotPasswordForm {
    pub email: String,
    state: FormState,
}

impl ForgotPasswordForm {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            state: FormState::new(),
        }
    }

    form_status_accessors!();

    /// On success the form flips to `Succeeded` and stays on its view
    pub async fn submit(&self, sessions: &dyn SessionStore) -> Result<()> {
        let email = check_email(&self.email).map_err(|m| self.state.reject(m))?;
        if !self.state.begin() {
            return Ok(());
        }

        match sessions.request_password_reset(&email).await {
            Ok(()) => {
                self.state.succeed();
                Ok(())
            }
            Err(e) => Err(self.state.fail(e)),
        }
    }
}

/// New password for the signed-in (or recovering) user
pub struct UpdatePasswordForm {
    pub password: String,
    policy: PasswordPolicy,
    state: FormState,
}

impl UpdatePasswordForm {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            policy: PasswordPolicy::default(),
            state: FormState::new(),
        }
    }

    pub fn with_policy(mut self, policy: PasswordPolicy) -> Self {
        self.policy = policy;
        self
    }

    form_status_accessors!();

    pub async fn submit(&self, sessions: &dyn SessionStore, navigator: &dyn Navigator) -> Result<()> {
        self.policy
            .check(&self.password)
            .map_err(|e| self.state.fail(e))?;
        if !self.state.begin() {
            return Ok(());
        }

        match sessions.update_password(&self.password).await {
            Ok(()) => {
                self.state.succeed();
                navigator.push(Route::AFTER_AUTH);
                Ok(())
            }
            Err(e) => Err(self.state.fail(e)),
        }
    }
}

/// Drop the session and go to the sign-in view
///
/// A failing sign-out is logged; the viewer leaves either way.
pub async fn sign_out(sessions: &dyn SessionStore, navigator: &dyn Navigator) {
    if let Err(e) = sessions.sign_out().await {
        warn!("Sign-out failed: {}", e);
    }
    navigator.push(Route::SignIn);
}
