//! Auth gate
//!
//! Guards protected views. Each activation asks the session store for the
//! current session; nothing protected may render until that answer is in.
//! A missing session, or a failed lookup, sends the viewer to the sign-in
//! view after a short delay so quick navigations don't flicker.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::navigation::{Navigator, Route};
use crate::session::{SessionStore, User};

pub const DEFAULT_REDIRECT_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig {
    /// How long to wait before leaving for the sign-in view
    pub redirect_delay: Duration,
    /// Where unauthenticated viewers are sent
    pub sign_in: Route,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            redirect_delay: DEFAULT_REDIRECT_DELAY,
            sign_in: Route::SignIn,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Checking,
    Authenticated(User),
    Unauthenticated,
}

impl GateState {
    /// Only a confirmed session lets protected content through
    pub fn allows_render(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Self::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRedirect {
    pub route: Route,
    pub delay: Duration,
}

/// Result of one activation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateOutcome {
    pub state: GateState,
    /// Set when the viewer has to leave; surfaces without a navigator
    /// carry it out themselves.
    pub redirect: Option<PendingRedirect>,
}

/// Pushes a route after a delay, at most one at a time
pub struct DelayedRedirect {
    navigator: Arc<dyn Navigator>,
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl DelayedRedirect {
    pub fn new(navigator: Arc<dyn Navigator>, delay: Duration) -> Self {
        Self {
            navigator,
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Schedule a push of `route`
    ///
    /// Returns `false` without scheduling anything while an earlier redirect
    /// is still waiting.
    pub fn schedule(&self, route: Route) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Redirect to {} already pending", route.path());
            return false;
        }

        let navigator = Arc::clone(&self.navigator);
        let delay = self.delay;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            info!("Redirecting to {}", route.path());
            navigator.push(route);
        }));
        true
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Drop a redirect that has not fired yet
    pub fn cancel(&self) {
        if let Some(handle) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

pub struct AuthGate {
    sessions: Arc<dyn SessionStore>,
    config: GateConfig,
    state: RwLock<GateState>,
    redirect: Option<DelayedRedirect>,
}

impl AuthGate {
    pub fn new(sessions: Arc<dyn SessionStore>, config: GateConfig) -> Self {
        Self {
            sessions,
            config,
            state: RwLock::new(GateState::Checking),
            redirect: None,
        }
    }

    /// Let the gate carry out its own redirects through `navigator`
    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.redirect = Some(DelayedRedirect::new(navigator, self.config.redirect_delay));
        self
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub async fn state(&self) -> GateState {
        self.state.read().await.clone()
    }

    pub fn redirect_pending(&self) -> bool {
        self.redirect
            .as_ref()
            .is_some_and(DelayedRedirect::is_pending)
    }

    /// Look up the session and settle the gate state
    ///
    /// Lookup errors count as "no session".
    pub async fn check(&self) -> GateState {
        *self.state.write().await = GateState::Checking;

        let state = match self.sessions.get_session().await {
            Ok(Some(session)) => GateState::Authenticated(session.user),
            Ok(None) => GateState::Unauthenticated,
            Err(e) => {
                warn!("Session check failed: {}", e);
                GateState::Unauthenticated
            }
        };
        debug!("Session check settled: {:?}", state);

        *self.state.write().await = state.clone();
        state
    }

    /// Run a check for a viewer currently on `current`
    pub async fn activate(&self, current: Route) -> GateOutcome {
        let state = self.check().await;

        let redirect = match state {
            GateState::Unauthenticated if current != self.config.sign_in => {
                Some(PendingRedirect {
                    route: self.config.sign_in,
                    delay: self.config.redirect_delay,
                })
            }
            _ => None,
        };

        if let (Some(redirect), Some(scheduler)) = (redirect, self.redirect.as_ref()) {
            scheduler.schedule(redirect.route);
        }

        GateOutcome { state, redirect }
    }
}
