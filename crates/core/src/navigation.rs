//! Views, navigation and user confirmation
//!
//! The presentation surface implements [`Navigator`] and [`Confirm`]; the
//! gate, the forms and the task list controller only talk to these traits.

use serde::Serialize;

/// A view of the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Home,
    SignIn,
    SignUp,
    SignUpSuccess,
    ForgotPassword,
    UpdatePassword,
    Tasks,
}

impl Route {
    /// Where every successful authentication lands, whichever flow it came from.
    pub const AFTER_AUTH: Route = Route::Tasks;

    pub fn path(self) -> &'static str {
        match self {
            Self::Home => "/",
            Self::SignIn => "/auth/login",
            Self::SignUp => "/auth/sign-up",
            Self::SignUpSuccess => "/auth/sign-up-success",
            Self::ForgotPassword => "/auth/forgot-password",
            Self::UpdatePassword => "/auth/update-password",
            Self::Tasks => "/todos",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let path = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        };
        [
            Self::Home,
            Self::SignIn,
            Self::SignUp,
            Self::SignUpSuccess,
            Self::ForgotPassword,
            Self::UpdatePassword,
            Self::Tasks,
        ]
        .into_iter()
        .find(|route| route.path() == path)
    }

    /// Views rendered only behind the auth gate
    pub fn is_guarded(self) -> bool {
        matches!(self, Self::Tasks)
    }
}

/// Moves the viewer to another view
pub trait Navigator: Send + Sync {
    fn push(&self, route: Route);
}

/// Asks the viewer to confirm a destructive action
pub trait Confirm: Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// An answer already collected by the surface, e.g. a submitted confirmation form.
impl Confirm for bool {
    fn confirm(&self, _prompt: &str) -> bool {
        *self
    }
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool + Sync,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}
