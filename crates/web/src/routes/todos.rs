//! Task list pages
//!
//! `GET /todos` runs the auth gate and mounts a fresh controller for the
//! viewer. Every action posts back to the mounted controller and renders
//! the list as the controller holds it after the store call completed.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Form, Router,
};
use serde::{Deserialize, Serialize};
use todo_core::auth::{AuthGate, GateState, PendingRedirect};
use todo_core::navigation::Route;
use todo_core::session::SessionContext;
use todo_core::task::{ListSnapshot, Task, TaskListController, DELETE_PROMPT};
use tracing::debug;
use uuid::Uuid;

use crate::error::{status_of, AppError};
use crate::state::AppState;
use crate::viewer::Viewer;

const REFRESH: HeaderName = HeaderName::from_static("refresh");

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct TaskInput {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Default, Deserialize)]
struct DeleteInput {
    #[serde(default)]
    confirm: Option<String>,
}

#[derive(Serialize)]
struct ListPage<'a> {
    email: Option<&'a str>,
    alert: Option<String>,
    list: &'a ListSnapshot,
}

#[derive(Serialize)]
struct GatePage {
    redirect: Option<&'static str>,
}

#[derive(Serialize)]
struct ConfirmPage<'a> {
    email: Option<&'a str>,
    task: &'a Task,
    prompt: &'static str,
}

// ============================================================================
// Helpers
// ============================================================================

/// Status of a page rendered after an action
fn action_status<T>(result: &todo_core::Result<T>) -> StatusCode {
    match result {
        Ok(_) => StatusCode::OK,
        Err(e) => status_of(e),
    }
}

async fn render_list(
    state: &AppState,
    list: &TaskListController,
    status: StatusCode,
) -> Result<Response, AppError> {
    let alert = list.take_alert().await;
    let snapshot = list.snapshot().await;
    let page = ListPage {
        email: list.session().email(),
        alert,
        list: &snapshot,
    };
    Ok((status, state.render("todos.html", page)?).into_response())
}

/// Page shown instead of the list while the viewer is sent to sign in
fn gate_page(state: &AppState, redirect: Option<PendingRedirect>) -> Result<Response, AppError> {
    let Some(redirect) = redirect else {
        return Ok(Redirect::to(Route::SignIn.path()).into_response());
    };

    let page = GatePage {
        redirect: Some(redirect.route.path()),
    };
    let mut response = state.render("gate.html", page)?.into_response();
    let refresh = format!(
        "{}; url={}",
        redirect.delay.as_secs_f32(),
        redirect.route.path()
    );
    if let Ok(value) = HeaderValue::from_str(&refresh) {
        response.headers_mut().insert(REFRESH, value);
    }
    Ok(response)
}

/// Actions need a list mounted by `GET /todos`; without one, start over there
fn remount() -> Response {
    Redirect::to(Route::Tasks.path()).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

async fn show(
    State(state): State<AppState>,
    Extension(viewer): Extension<Arc<Viewer>>,
) -> Result<Response, AppError> {
    let gate = AuthGate::new(viewer.sessions(), state.config().gate());
    let outcome = gate.activate(Route::Tasks).await;
    let GateState::Authenticated(user) = outcome.state else {
        viewer.unmount_list().await;
        return gate_page(&state, outcome.redirect);
    };

    let list = viewer.mount_list(SessionContext::authenticated(user)).await;
    if let Err(e) = list.load().await {
        debug!("Showing list without fresh data: {}", e);
    }
    render_list(&state, &list, StatusCode::OK).await
}

async fn create(
    State(state): State<AppState>,
    Extension(viewer): Extension<Arc<Viewer>>,
    Form(input): Form<TaskInput>,
) -> Result<Response, AppError> {
    let Some(list) = viewer.list().await else {
        return Ok(remount());
    };
    let result = list.create(&input.title, &input.description).await;
    render_list(&state, &list, action_status(&result)).await
}

async fn toggle(
    State(state): State<AppState>,
    Extension(viewer): Extension<Arc<Viewer>>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let Some(list) = viewer.list().await else {
        return Ok(remount());
    };
    let result = list.toggle_complete(id).await;
    render_list(&state, &list, action_status(&result)).await
}

async fn edit(
    State(state): State<AppState>,
    Extension(viewer): Extension<Arc<Viewer>>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let Some(list) = viewer.list().await else {
        return Ok(remount());
    };
    let result = list.start_editing(id).await;
    render_list(&state, &list, action_status(&result)).await
}

async fn save(
    State(state): State<AppState>,
    Extension(viewer): Extension<Arc<Viewer>>,
    Path(id): Path<Uuid>,
    Form(input): Form<TaskInput>,
) -> Result<Response, AppError> {
    let Some(list) = viewer.list().await else {
        return Ok(remount());
    };
    if list.edit_session().await.task_id() != Some(id) {
        if let Err(e) = list.start_editing(id).await {
            let status = action_status::<()>(&Err(e));
            return render_list(&state, &list, status).await;
        }
    }
    list.set_edit_fields(&input.title, &input.description).await;
    let result = list.save_edit().await;
    render_list(&state, &list, action_status(&result)).await
}

async fn cancel(
    State(state): State<AppState>,
    Extension(viewer): Extension<Arc<Viewer>>,
) -> Result<Response, AppError> {
    let Some(list) = viewer.list().await else {
        return Ok(remount());
    };
    list.cancel_edit().await;
    render_list(&state, &list, StatusCode::OK).await
}

async fn confirm_delete(
    State(state): State<AppState>,
    Extension(viewer): Extension<Arc<Viewer>>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let Some(list) = viewer.list().await else {
        return Ok(remount());
    };
    let tasks = list.tasks().await;
    let task = tasks
        .iter()
        .find(|task| task.id == id)
        .ok_or(todo_core::Error::TaskNotFound(id))?;

    let page = ConfirmPage {
        email: list.session().email(),
        task,
        prompt: DELETE_PROMPT,
    };
    Ok(state.render("confirm_delete.html", page)?.into_response())
}

async fn delete(
    State(state): State<AppState>,
    Extension(viewer): Extension<Arc<Viewer>>,
    Path(id): Path<Uuid>,
    Form(input): Form<DeleteInput>,
) -> Result<Response, AppError> {
    let Some(list) = viewer.list().await else {
        return Ok(remount());
    };
    let confirmed = input.confirm.as_deref() == Some("yes");
    let result = list.delete(id, &confirmed).await;
    render_list(&state, &list, action_status(&result)).await
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(Route::Tasks.path(), get(show).post(create))
        .route("/todos/{id}/toggle", post(toggle))
        .route("/todos/{id}/edit", post(edit))
        .route("/todos/{id}/save", post(save))
        .route("/todos/{id}/cancel", post(cancel))
        .route("/todos/{id}/delete", get(confirm_delete).post(delete))
}
