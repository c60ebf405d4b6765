//! Route handlers

pub mod auth;
pub mod health;
pub mod todos;

use axum::{
    http::{header, HeaderValue},
    middleware, Router,
};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::viewer::attach_viewer;

/// The full application: pages, health check and the viewer cookie
pub fn app(state: AppState) -> Router {
    let pages = Router::new()
        .merge(auth::router())
        .merge(todos::router())
        .layer(middleware::from_fn_with_state(state.clone(), attach_viewer))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ));

    Router::new()
        .merge(pages)
        .merge(health::router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
