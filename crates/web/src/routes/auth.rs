//! Credential pages: sign in, sign up, password reset and sign out

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Form, Router,
};
use serde::{Deserialize, Serialize};
use todo_core::auth::{
    sign_out, ForgotPasswordForm, FormStatus, LoginForm, SignUpForm, UpdatePasswordForm,
};
use todo_core::navigation::Route;
use todo_core::session::SessionContext;
use tracing::debug;

use crate::error::AppError;
use crate::state::AppState;
use crate::viewer::{expired_session_cookie, RedirectSlot, Viewer};

#[derive(Debug, Default, Deserialize, Serialize)]
struct CredentialsInput {
    #[serde(default)]
    email: String,
    #[serde(default, skip_serializing)]
    password: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct SignUpInput {
    #[serde(default)]
    email: String,
    #[serde(default, skip_serializing)]
    password: String,
    #[serde(default, skip_serializing)]
    repeat_password: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct EmailInput {
    #[serde(default)]
    email: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct PasswordInput {
    #[serde(default, skip_serializing)]
    password: String,
}

/// Query of the link in a password recovery mail
#[derive(Debug, Default, Deserialize)]
struct RecoveryQuery {
    token_hash: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Serialize)]
struct FormPage<'a, T> {
    form: &'a T,
    error: Option<&'a str>,
    submitting: bool,
    succeeded: bool,
}

#[derive(Serialize)]
struct HomePage<'a> {
    email: Option<&'a str>,
}

fn form_page<T: Serialize>(
    state: &AppState,
    template: &str,
    form: &T,
    status: &FormStatus,
) -> Result<Response, AppError> {
    let page = FormPage {
        form,
        error: status.error(),
        submitting: *status == FormStatus::Submitting,
        succeeded: *status == FormStatus::Succeeded,
    };
    let code = match status {
        FormStatus::Failed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::OK,
    };
    Ok((code, state.render(template, page)?).into_response())
}

/// Follow the redirect a form asked for, or show the form again
fn finish<T: Serialize>(
    state: &AppState,
    template: &str,
    input: &T,
    status: &FormStatus,
    slot: RedirectSlot,
) -> Result<Response, AppError> {
    match slot.take() {
        Some(route) => Ok(Redirect::to(route.path()).into_response()),
        None => form_page(state, template, input, status),
    }
}

async fn home(
    State(state): State<AppState>,
    Extension(viewer): Extension<Arc<Viewer>>,
) -> Result<Response, AppError> {
    let session = SessionContext::resolve(viewer.sessions().as_ref()).await;
    let page = HomePage {
        email: session.email(),
    };
    Ok(state.render("home.html", page)?.into_response())
}

async fn login_page(State(state): State<AppState>) -> Result<Response, AppError> {
    form_page(&state, "login.html", &CredentialsInput::default(), &FormStatus::Idle)
}

async fn login(
    State(state): State<AppState>,
    Extension(viewer): Extension<Arc<Viewer>>,
    Form(input): Form<CredentialsInput>,
) -> Result<Response, AppError> {
    let form = LoginForm::new(input.email.as_str(), input.password.as_str());
    let slot = RedirectSlot::default();
    match form.submit(viewer.sessions().as_ref(), &slot).await {
        Ok(()) => viewer.retain(),
        Err(e) => debug!("Login form rejected: {}", e),
    }
    finish(&state, "login.html", &input, &form.status(), slot)
}

async fn sign_up_page(State(state): State<AppState>) -> Result<Response, AppError> {
    form_page(&state, "sign_up.html", &SignUpInput::default(), &FormStatus::Idle)
}

async fn sign_up(
    State(state): State<AppState>,
    Extension(viewer): Extension<Arc<Viewer>>,
    Form(input): Form<SignUpInput>,
) -> Result<Response, AppError> {
    let form = SignUpForm::new(
        input.email.as_str(),
        input.password.as_str(),
        input.repeat_password.as_str(),
    )
    .with_policy(state.config().password_policy());
    let slot = RedirectSlot::default();
    match form.submit(viewer.sessions().as_ref(), &slot).await {
        Ok(()) => viewer.retain(),
        Err(e) => debug!("Sign-up form rejected: {}", e),
    }
    finish(&state, "sign_up.html", &input, &form.status(), slot)
}

async fn sign_up_success(State(state): State<AppState>) -> Result<Response, AppError> {
    Ok(state.render("sign_up_success.html", HomePage { email: None })?.into_response())
}

async fn forgot_password_page(State(state): State<AppState>) -> Result<Response, AppError> {
    form_page(&state, "forgot_password.html", &EmailInput::default(), &FormStatus::Idle)
}

async fn forgot_password(
    State(state): State<AppState>,
    Extension(viewer): Extension<Arc<Viewer>>,
    Form(input): Form<EmailInput>,
) -> Result<Response, AppError> {
    let form = ForgotPasswordForm::new(input.email.as_str());
    if let Err(e) = form.submit(viewer.sessions().as_ref()).await {
        debug!("Password reset request rejected: {}", e);
    }
    form_page(&state, "forgot_password.html", &input, &form.status())
}

/// The password form, signing the viewer in first when opened from a recovery link
async fn update_password_page(
    State(state): State<AppState>,
    Extension(viewer): Extension<Arc<Viewer>>,
    Query(query): Query<RecoveryQuery>,
) -> Result<Response, AppError> {
    let token_hash = match (query.token_hash, query.kind.as_deref()) {
        (Some(token_hash), None | Some("recovery")) => token_hash,
        _ => {
            let input = PasswordInput::default();
            return form_page(&state, "update_password.html", &input, &FormStatus::Idle);
        }
    };

    match viewer.sessions().verify_recovery(&token_hash).await {
        Ok(session) => {
            debug!("Recovery session for {}", session.user.id);
            viewer.retain();
            // Drop the token from the address bar
            Ok(Redirect::to(Route::UpdatePassword.path()).into_response())
        }
        Err(e) => {
            debug!("Recovery link rejected: {}", e);
            let status = FormStatus::Failed(e.to_string());
            form_page(&state, "update_password.html", &PasswordInput::default(), &status)
        }
    }
}

async fn update_password(
    State(state): State<AppState>,
    Extension(viewer): Extension<Arc<Viewer>>,
    Form(input): Form<PasswordInput>,
) -> Result<Response, AppError> {
    let form = UpdatePasswordForm::new(input.password.as_str())
        .with_policy(state.config().password_policy());
    let slot = RedirectSlot::default();
    if let Err(e) = form.submit(viewer.sessions().as_ref(), &slot).await {
        debug!("Password update rejected: {}", e);
    }
    finish(&state, "update_password.html", &input, &form.status(), slot)
}

async fn logout(
    State(state): State<AppState>,
    Extension(viewer): Extension<Arc<Viewer>>,
) -> Response {
    let slot = RedirectSlot::default();
    sign_out(viewer.sessions().as_ref(), &slot).await;
    state.forget(viewer.id()).await;
    viewer.unmount_list().await;
    (
        [(header::SET_COOKIE, expired_session_cookie())],
        Redirect::to(slot.take().unwrap_or(Route::SignIn).path()),
    )
        .into_response()
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(Route::Home.path(), get(home))
        .route(Route::SignIn.path(), get(login_page).post(login))
        .route(Route::SignUp.path(), get(sign_up_page).post(sign_up))
        .route(Route::SignUpSuccess.path(), get(sign_up_success))
        .route(
            Route::ForgotPassword.path(),
            get(forgot_password_page).post(forgot_password),
        )
        .route(
            Route::UpdatePassword.path(),
            get(update_password_page).post(update_password),
        )
        .route("/auth/logout", post(logout))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use serde_json::json;
    use todo_core::backend::{SupabaseBackend, SupabaseConfig};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::routes::test_support::{body_text, cookie_of, form_request, TestApp};

    #[tokio::test]
    async fn anonymous_pages_do_not_track_the_browser() {
        let app = TestApp::new().await;

        for _ in 0..50 {
            let response = app
                .send(Request::builder().uri("/auth/login").body(Body::empty()).unwrap())
                .await;
            assert_eq!(response.status(), StatusCode::OK);
            assert!(cookie_of(&response).is_none());
            assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
            assert!(body_text(response).await.contains("Forgot your password?"));
        }
        app.send(Request::builder().uri("/todos").body(Body::empty()).unwrap())
            .await;
        app.send(form_request("/auth/login", None, "email=a%40a.com&password=wrong-password"))
            .await;

        assert_eq!(app.state.viewer_count().await, 0);
    }

    #[tokio::test]
    async fn sign_in_tracks_the_browser_until_logout() {
        let app = TestApp::new().await;
        let cookie = app.signed_up("a@a.com").await;
        assert!(cookie.starts_with("todo_sid="));
        assert_eq!(app.state.viewer_count().await, 1);

        let response = app
            .send(form_request("/auth/logout", Some(&cookie), ""))
            .await;

        assert_eq!(app.state.viewer_count().await, 0);
        let cleared = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cleared.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn known_cookie_is_not_reissued() {
        let app = TestApp::new().await;
        let cookie = app.signed_up("a@a.com").await;

        let response = app
            .send(
                Request::builder()
                    .uri("/")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

        assert!(cookie_of(&response).is_none());
        assert!(body_text(response).await.contains("a@a.com"));
    }

    #[tokio::test]
    async fn sign_up_mismatch_shows_error_and_keeps_email() {
        let app = TestApp::new().await;

        let response = app
            .send(form_request(
                "/auth/sign-up",
                None,
                "email=a%40a.com&password=123&repeat_password=456",
            ))
            .await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_text(response).await;
        assert!(body.contains("Passwords do not match"));
        assert!(body.contains("value=\"a@a.com\""));
    }

    #[tokio::test]
    async fn sign_up_then_login_reaches_tasks() {
        let app = TestApp::new().await;

        let response = app
            .send(form_request(
                "/auth/sign-up",
                None,
                "email=a%40a.com&password=secret1&repeat_password=secret1",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/auth/sign-up-success");

        let response = app
            .send(form_request(
                "/auth/login",
                None,
                "email=a%40a.com&password=wrong-password",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_text(response).await.contains("Invalid login credentials"));

        let response = app
            .send(form_request(
                "/auth/login",
                None,
                "email=a%40a.com&password=secret1",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/todos");
    }

    #[tokio::test]
    async fn forgot_password_confirms_without_redirect() {
        let app = TestApp::new().await;

        let response = app
            .send(form_request("/auth/forgot-password", None, "email=ghost%40example.com"))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Check Your Email"));
    }

    #[tokio::test]
    async fn update_password_without_session_reports_error() {
        let app = TestApp::new().await;

        let response = app
            .send(form_request("/auth/update-password", None, "password=new-secret"))
            .await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_text(response).await.contains("Not authenticated"));
    }

    #[tokio::test]
    async fn update_password_lands_on_tasks() {
        let app = TestApp::new().await;
        let cookie = app.signed_up("a@a.com").await;

        let response = app
            .send(form_request("/auth/update-password", Some(&cookie), "password=new-secret"))
            .await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/todos");
    }

    #[tokio::test]
    async fn logout_redirects_to_sign_in() {
        let app = TestApp::new().await;

        let response = app.send(form_request("/auth/logout", None, "")).await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/auth/login");
    }

    #[tokio::test]
    async fn sign_up_follows_configured_password_minimum() {
        let app = TestApp::configured(|config| config.min_password_length = 4).await;

        let response = app
            .send(form_request(
                "/auth/sign-up",
                None,
                "email=a%40a.com&password=abcd&repeat_password=abcd",
            ))
            .await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/auth/sign-up-success");
    }

    #[tokio::test]
    async fn recovery_link_signs_in_for_the_password_update() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/verify"))
            .and(body_partial_json(json!({ "type": "recovery", "token_hash": "hash-123" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "recovery-token",
                "expires_in": 3600,
                "refresh_token": "refresh-token",
                "user": { "id": "0a6b2d1e-7c3f-4a55-8e2d-1f0e9c8b7a66", "email": "a@a.com" }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/auth/v1/user"))
            .and(wiremock::matchers::header("authorization", "Bearer recovery-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        let backend = SupabaseBackend::new(SupabaseConfig::new(server.uri(), "anon-key")).unwrap();
        let app = TestApp::with_backend(Arc::new(backend));

        let response = app
            .send(
                Request::builder()
                    .uri("/auth/update-password?token_hash=hash-123&type=recovery")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/auth/update-password");
        let cookie = cookie_of(&response).unwrap();

        let response = app
            .send(form_request("/auth/update-password", Some(&cookie), "password=new-secret"))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/todos");
    }

    #[tokio::test]
    async fn rejected_recovery_link_shows_the_error() {
        let app = TestApp::new().await;

        let response = app
            .send(
                Request::builder()
                    .uri("/auth/update-password?token_hash=stale&type=recovery")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(cookie_of(&response).is_none());
        assert!(body_text(response)
            .await
            .contains("Password recovery links are not supported"));
    }
}
