//! Web server for the Todo app
//!
//! Serves the credential pages and the task list as server-rendered HTML.
//! The backend is a Supabase project when `SUPABASE_URL` and
//! `SUPABASE_ANON_KEY` are set, and the local JSON backend otherwise.

mod config;
mod error;
mod routes;
mod state;
mod viewer;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use todo_core::backend::{Backend, LocalBackend, SupabaseBackend};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::state::AppState;
use crate::viewer::start_viewer_sweeper;

const VIEWER_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todo_web=debug,todo_core=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let backend: Arc<dyn Backend> = match &config.supabase {
        Some(supabase) => {
            tracing::info!("Using Supabase project at {}", supabase.url);
            Arc::new(SupabaseBackend::new(supabase.clone())?)
        }
        None => {
            tracing::info!("Using local backend in {:?}", config.data_dir);
            Arc::new(
                LocalBackend::open(config.local_backend())
                    .await
                    .context("Failed to open local backend")?,
            )
        }
    };

    let bind_addr = config.bind_addr;
    let idle_timeout = config.viewer_idle_timeout;
    let state = AppState::new(backend, config)?;
    start_viewer_sweeper(state.clone(), VIEWER_SWEEP_INTERVAL, idle_timeout);
    let app = routes::app(state);

    tracing::info!("Listening on {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
