//! Application state

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::response::Html;
use minijinja::Environment;
use serde::Serialize;
use todo_core::backend::Backend;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::viewer::Viewer;

const TEMPLATES: &[(&str, &str)] = &[
    ("layout.html", include_str!("../templates/layout.html")),
    ("home.html", include_str!("../templates/home.html")),
    ("login.html", include_str!("../templates/login.html")),
    ("sign_up.html", include_str!("../templates/sign_up.html")),
    ("sign_up_success.html", include_str!("../templates/sign_up_success.html")),
    ("forgot_password.html", include_str!("../templates/forgot_password.html")),
    ("update_password.html", include_str!("../templates/update_password.html")),
    ("gate.html", include_str!("../templates/gate.html")),
    ("todos.html", include_str!("../templates/todos.html")),
    ("confirm_delete.html", include_str!("../templates/confirm_delete.html")),
];

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    backend: Arc<dyn Backend>,
    config: Config,
    templates: Environment<'static>,
    viewers: RwLock<HashMap<Uuid, Arc<Viewer>>>,
}

impl AppState {
    pub fn new(backend: Arc<dyn Backend>, config: Config) -> Result<Self, AppError> {
        let mut templates = Environment::new();
        for &(name, source) in TEMPLATES {
            templates.add_template(name, source)?;
        }

        Ok(Self {
            inner: Arc::new(AppStateInner {
                backend,
                config,
                templates,
                viewers: RwLock::new(HashMap::new()),
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.backend.name()
    }

    /// Look up the viewer for `id`, or connect a new untracked one
    ///
    /// Returns the viewer and whether it was created by this call. New
    /// viewers are only tracked once passed to [`AppState::keep`].
    pub async fn viewer(&self, id: Option<Uuid>) -> (Arc<Viewer>, bool) {
        if let Some(id) = id {
            if let Some(viewer) = self.inner.viewers.read().await.get(&id) {
                viewer.touch();
                return (Arc::clone(viewer), false);
            }
        }

        let viewer = Viewer::new(Uuid::new_v4(), self.inner.backend.connect());
        (Arc::new(viewer), true)
    }

    pub async fn keep(&self, viewer: &Arc<Viewer>) {
        self.inner
            .viewers
            .write()
            .await
            .insert(viewer.id(), Arc::clone(viewer));
    }

    /// Stop tracking a viewer and unmount its list
    pub async fn forget(&self, id: Uuid) {
        let removed = self.inner.viewers.write().await.remove(&id);
        if let Some(viewer) = removed {
            viewer.unmount_list().await;
            debug!("Forgot viewer {}", id);
        }
    }

    /// Forget every viewer idle for at least `max_idle`
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut evicted = Vec::new();
        self.inner.viewers.write().await.retain(|_, viewer| {
            if viewer.idle_for() >= max_idle {
                evicted.push(Arc::clone(viewer));
                false
            } else {
                true
            }
        });

        for viewer in &evicted {
            viewer.unmount_list().await;
        }
        if !evicted.is_empty() {
            info!("Evicted {} idle viewers", evicted.len());
        }
        evicted.len()
    }

    pub async fn viewer_count(&self) -> usize {
        self.inner.viewers.read().await.len()
    }

    pub fn render<S: Serialize>(&self, name: &str, context: S) -> Result<Html<String>, AppError> {
        let html = self.inner.templates.get_template(name)?.render(context)?;
        Ok(Html(html))
    }
}
