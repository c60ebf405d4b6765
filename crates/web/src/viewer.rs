//! Per-browser state
//!
//! Every browser is identified by the `todo_sid` cookie. The id maps to a
//! [`Viewer`] holding that browser's backend connection (and so its session)
//! plus the task list controller of the page it last loaded.
//!
//! A browser only gets a cookie once a handler retains its viewer, which
//! happens when a session is established. Anonymous requests get a
//! throwaway viewer that is dropped with the response.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use todo_core::backend::BackendClient;
use todo_core::navigation::{Navigator, Route};
use todo_core::session::{SessionContext, SessionStore};
use todo_core::task::TaskListController;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::state::AppState;

pub const SESSION_COOKIE: &str = "todo_sid";

pub struct Viewer {
    id: Uuid,
    client: BackendClient,
    list: RwLock<Option<Arc<TaskListController>>>,
    retained: AtomicBool,
    last_seen: Mutex<Instant>,
}

impl Viewer {
    pub fn new(id: Uuid, client: BackendClient) -> Self {
        Self {
            id,
            client,
            list: RwLock::new(None),
            retained: AtomicBool::new(false),
            last_seen: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Keep this viewer beyond the current request
    pub fn retain(&self) {
        self.retained.store(true, Ordering::Relaxed);
    }

    pub fn is_retained(&self) -> bool {
        self.retained.load(Ordering::Relaxed)
    }

    pub fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    pub fn sessions(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.client.sessions)
    }

    /// Replace the current task list with a fresh one for `session`
    ///
    /// The previous controller is unmounted so late completions cannot
    /// touch it.
    pub async fn mount_list(&self, session: SessionContext) -> Arc<TaskListController> {
        let list = Arc::new(TaskListController::new(
            Arc::clone(&self.client.tasks),
            session,
        ));
        if let Some(previous) = self.list.write().await.replace(Arc::clone(&list)) {
            previous.unmount();
        }
        list
    }

    pub async fn list(&self) -> Option<Arc<TaskListController>> {
        self.list.read().await.clone()
    }

    pub async fn unmount_list(&self) {
        if let Some(list) = self.list.write().await.take() {
            list.unmount();
        }
    }
}

/// Navigator for a single request: remembers the last pushed route
#[derive(Default)]
pub struct RedirectSlot {
    route: Mutex<Option<Route>>,
}

impl RedirectSlot {
    pub fn take(&self) -> Option<Route> {
        self.route
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Navigator for RedirectSlot {
    fn push(&self, route: Route) {
        *self.route.lock().unwrap_or_else(PoisonError::into_inner) = Some(route);
    }
}

pub fn viewer_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value).ok())
}

fn session_cookie(id: Uuid) -> HeaderValue {
    // A hyphenated uuid is always a valid header value
    HeaderValue::from_str(&format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, id
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("todo_sid=; Path=/"))
}

pub fn expired_session_cookie() -> HeaderValue {
    HeaderValue::from_static("todo_sid=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Attach the caller's [`Viewer`] to the request
///
/// A viewer created for this request is only tracked, and its cookie only
/// set, when a handler retained it.
pub async fn attach_viewer(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let known = viewer_id(request.headers());
    let (viewer, created) = state.viewer(known).await;

    request.extensions_mut().insert(Arc::clone(&viewer));
    let mut response = next.run(request).await;
    if created && viewer.is_retained() {
        debug!("New viewer {}", viewer.id());
        state.keep(&viewer).await;
        response
            .headers_mut()
            .append(header::SET_COOKIE, session_cookie(viewer.id()));
    }
    response
}

/// Drop viewers that have been idle for `max_idle`, checking every `every`
pub fn start_viewer_sweeper(state: AppState, every: Duration, max_idle: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            state.evict_idle(max_idle).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewer_id_from_cookie_header() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {}={}", SESSION_COOKIE, id)).unwrap(),
        );
        assert_eq!(viewer_id(&headers), Some(id));

        let mut garbage = HeaderMap::new();
        garbage.insert(header::COOKIE, HeaderValue::from_static("todo_sid=nope"));
        assert_eq!(viewer_id(&garbage), None);
        assert_eq!(viewer_id(&HeaderMap::new()), None);
    }

    #[test]
    fn test_redirect_slot_keeps_last_route() {
        let slot = RedirectSlot::default();
        assert_eq!(slot.take(), None);
        slot.push(Route::SignIn);
        slot.push(Route::Tasks);
        assert_eq!(slot.take(), Some(Route::Tasks));
        assert_eq!(slot.take(), None);
    }
}
