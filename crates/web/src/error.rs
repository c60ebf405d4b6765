use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use thiserror::Error;
use todo_core::navigation::Route;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] todo_core::Error),

    #[error("Invalid {key} value: {message}")]
    Config { key: String, message: String },

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
}

/// Status of a page answering with a core error
pub fn status_of(error: &todo_core::Error) -> StatusCode {
    match error {
        todo_core::Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        todo_core::Error::TaskNotFound(_) => StatusCode::NOT_FOUND,
        todo_core::Error::Unauthenticated => StatusCode::UNAUTHORIZED,
        todo_core::Error::Store(_) | todo_core::Error::Http(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Core(todo_core::Error::Unauthenticated) => {
                return Redirect::to(Route::SignIn.path()).into_response();
            }
            AppError::Core(error) => status_of(error),
            AppError::Config { .. } | AppError::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}
