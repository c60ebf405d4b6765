//! Auth module
//!
//! The auth gate in front of protected views and the credential forms.

mod forms;
mod gate;

pub use forms::{
    sign_out, ForgotPasswordForm, FormStatus, LoginForm, PasswordPolicy, SignUpForm,
    UpdatePasswordForm, DEFAULT_MIN_PASSWORD_LENGTH, PASSWORD_MISMATCH_MESSAGE,
};
pub use gate::{
    AuthGate, DelayedRedirect, GateConfig, GateOutcome, GateState, PendingRedirect,
    DEFAULT_REDIRECT_DELAY,
};
