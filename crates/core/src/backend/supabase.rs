//! Supabase REST client
//!
//! Talks to the auth service (`/auth/v1`) for sessions and to the REST
//! gateway (`/rest/v1`) for the tasks table. Row visibility is left to the
//! project's row policy; the client only sends the viewer's bearer token.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Backend, BackendClient};
use crate::session::{Session, SessionStore, User};
use crate::task::{NewTask, Task, TaskPatch, TaskStore};
use crate::{Error, Result};

const DEFAULT_TABLE: &str = "todos";

/// Connection settings for a Supabase project
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub url: String,
    /// Public anon key
    pub anon_key: String,
    /// Table holding the tasks
    pub table: String,
    /// Where password reset links should send the user back to
    pub reset_redirect_to: Option<String>,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            table: DEFAULT_TABLE.to_string(),
            reset_redirect_to: None,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_reset_redirect_to(mut self, url: impl Into<String>) -> Self {
        self.reset_redirect_to = Some(url.into());
        self
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.url, path)
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.url, self.table)
    }
}

#[derive(Clone)]
pub struct SupabaseBackend {
    http: reqwest::Client,
    config: Arc<SupabaseConfig>,
}

impl SupabaseBackend {
    pub fn new(config: SupabaseConfig) -> Result<Self> {
        if config.url.is_empty() || config.anon_key.is_empty() {
            return Err(Error::Config(
                "Supabase URL and anon key are both required".to_string(),
            ));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            config: Arc::new(config),
        })
    }

    /// A client that is not signed in
    pub fn client(&self) -> SupabaseClient {
        SupabaseClient {
            http: self.http.clone(),
            config: Arc::clone(&self.config),
            session: RwLock::new(None),
        }
    }
}

impl Backend for SupabaseBackend {
    fn name(&self) -> &'static str {
        "supabase"
    }

    fn connect(&self) -> BackendClient {
        BackendClient::from_shared(Arc::new(self.client()))
    }
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

impl From<AuthUser> for User {
    fn from(user: AuthUser) -> Self {
        Self {
            id: user.id,
            email: user.email.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl From<TokenResponse> for Session {
    fn from(token: TokenResponse) -> Self {
        let expires_at = token
            .expires_at
            .and_then(|at| DateTime::<Utc>::from_timestamp(at, 0))
            .or_else(|| token.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)));
        Session {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            user: token.user.into(),
        }
    }
}

/// One viewer's connection to a Supabase project
pub struct SupabaseClient {
    http: reqwest::Client,
    config: Arc<SupabaseConfig>,
    session: RwLock<Option<Session>>,
}

impl SupabaseClient {
    /// Start from a session obtained elsewhere
    pub async fn restore(&self, session: Session) {
        *self.session.write().await = Some(session);
    }

    fn headers(&self, access_token: Option<&str>) -> Result<HeaderMap> {
        let bearer = access_token.unwrap_or(&self.config.anon_key);
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.config.anon_key)
                .map_err(|_| Error::Config("Invalid anon key".to_string()))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", bearer))
                .map_err(|_| Error::Config("Invalid access token".to_string()))?,
        );
        Ok(headers)
    }

    async fn access_token(&self) -> Result<String> {
        self.get_session()
            .await?
            .map(|session| session.access_token)
            .ok_or(Error::Unauthenticated)
    }

    async fn request_token(&self, grant_type: &str, body: serde_json::Value) -> Result<Session> {
        let response = self
            .http
            .post(self.config.auth_url(&format!(
                "token?grant_type={}",
                urlencoding::encode(grant_type)
            )))
            .headers(self.headers(None)?)
            .json(&body)
            .send()
            .await?;
        let token: TokenResponse = parse_json(response).await?;
        Ok(token.into())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session> {
        self.request_token("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }

    async fn table_request(&self, builder: RequestBuilder) -> Result<Response> {
        let token = self.access_token().await?;
        let response = builder
            .headers(self.headers(Some(&token))?)
            .header("Prefer", "return=representation")
            .send()
            .await?;
        ensure_success(response).await
    }
}

#[async_trait]
impl SessionStore for SupabaseClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let session = self
            .request_token("password", json!({ "email": email, "password": password }))
            .await?;
        info!("Signed in {}", session.user.id);
        self.restore(session.clone()).await;
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>> {
        let response = self
            .http
            .post(self.config.auth_url("signup"))
            .headers(self.headers(None)?)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let body: serde_json::Value = parse_json(response).await?;

        // With e-mail confirmation on, only the user comes back.
        if body.get("access_token").is_some() {
            let session: Session = serde_json::from_value::<TokenResponse>(body)?.into();
            self.restore(session.clone()).await;
            Ok(Some(session))
        } else {
            debug!("Sign-up awaiting e-mail confirmation");
            Ok(None)
        }
    }

    async fn sign_out(&self) -> Result<()> {
        let Some(session) = self.session.write().await.take() else {
            return Ok(());
        };
        let response = self
            .http
            .post(self.config.auth_url("logout"))
            .headers(self.headers(Some(&session.access_token))?)
            .send()
            .await?;
        ensure_success(response).await.map(|_| ())
    }

    async fn get_session(&self) -> Result<Option<Session>> {
        let Some(session) = self.session.read().await.clone() else {
            return Ok(None);
        };
        if !session.is_expired() {
            return Ok(Some(session));
        }

        let Some(refresh_token) = session.refresh_token.as_deref() else {
            *self.session.write().await = None;
            return Ok(None);
        };
        match self.refresh(refresh_token).await {
            Ok(fresh) => {
                debug!("Refreshed session for {}", fresh.user.id);
                self.restore(fresh.clone()).await;
                Ok(Some(fresh))
            }
            Err(e) => {
                warn!("Session refresh failed: {}", e);
                *self.session.write().await = None;
                Ok(None)
            }
        }
    }

    async fn current_user(&self) -> Result<Option<User>> {
        let Some(session) = self.get_session().await? else {
            return Ok(None);
        };
        let response = self
            .http
            .get(self.config.auth_url("user"))
            .headers(self.headers(Some(&session.access_token))?)
            .send()
            .await?;
        let user: AuthUser = parse_json(response).await?;
        Ok(Some(user.into()))
    }

    async fn request_password_reset(&self, email: &str) -> Result<()> {
        let mut url = self.config.auth_url("recover");
        if let Some(redirect_to) = &self.config.reset_redirect_to {
            url = format!("{}?redirect_to={}", url, urlencoding::encode(redirect_to));
        }
        let response = self
            .http
            .post(url)
            .headers(self.headers(None)?)
            .json(&json!({ "email": email }))
            .send()
            .await?;
        ensure_success(response).await.map(|_| ())
    }

    async fn update_password(&self, new_password: &str) -> Result<()> {
        let token = self.access_token().await?;
        let response = self
            .http
            .put(self.config.auth_url("user"))
            .headers(self.headers(Some(&token))?)
            .json(&json!({ "password": new_password }))
            .send()
            .await?;
        ensure_success(response).await.map(|_| ())
    }

    async fn verify_recovery(&self, token_hash: &str) -> Result<Session> {
        let response = self
            .http
            .post(self.config.auth_url("verify"))
            .headers(self.headers(None)?)
            .json(&json!({ "type": "recovery", "token_hash": token_hash }))
            .send()
            .await?;
        let token: TokenResponse = parse_json(response).await?;
        let session: Session = token.into();
        info!("Recovery link verified for {}", session.user.id);
        self.restore(session.clone()).await;
        Ok(session)
    }
}

#[async_trait]
impl TaskStore for SupabaseClient {
    async fn list_tasks(&self) -> Result<Vec<Task>> {
        let builder = self
            .http
            .get(format!("{}?select=*&order=created_at.desc", self.config.table_url()));
        let response = self.table_request(builder).await?;
        Ok(response.json().await?)
    }

    async fn create_task(&self, task: NewTask) -> Result<Task> {
        let builder = self
            .http
            .post(format!("{}?select=*", self.config.table_url()))
            .json(&task);
        let response = self.table_request(builder).await?;
        let rows: Vec<Task> = response.json().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::store("Insert returned no row"))
    }

    async fn update_task(&self, id: Uuid, patch: TaskPatch) -> Result<Task> {
        let builder = self
            .http
            .patch(format!(
                "{}?id=eq.{}&select=*",
                self.config.table_url(),
                urlencoding::encode(&id.to_string())
            ))
            .json(&patch);
        let response = self.table_request(builder).await?;
        let rows: Vec<Task> = response.json().await?;
        rows.into_iter().next().ok_or(Error::TaskNotFound(id))
    }

    async fn delete_task(&self, id: Uuid) -> Result<()> {
        let builder = self.http.delete(format!(
            "{}?id=eq.{}",
            self.config.table_url(),
            urlencoding::encode(&id.to_string())
        ));
        self.table_request(builder).await.map(|_| ())
    }
}

/// Turn a non-2xx response into the service's own error text
async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| format!("HTTP {}", status));
    debug!("Supabase returned {}: {}", status, message);
    Err(Error::Store(message))
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    let response = ensure_success(response).await?;
    Ok(response.json().await?)
}

/// Error text as the auth service (`msg`, `error_description`) or the REST
/// gateway (`message`) phrases it
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["msg", "message", "error_description", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_keys() {
        assert_eq!(
            error_message(r#"{"code":400,"msg":"Invalid login credentials"}"#).as_deref(),
            Some("Invalid login credentials")
        );
        assert_eq!(
            error_message(r#"{"error":"invalid_grant","error_description":"Bad refresh"}"#)
                .as_deref(),
            Some("Bad refresh")
        );
        assert_eq!(
            error_message(r#"{"code":"42501","message":"permission denied"}"#).as_deref(),
            Some("permission denied")
        );
        assert!(error_message("<html>").is_none());
    }

    #[test]
    fn test_config_trims_trailing_slash() {
        let config = SupabaseConfig::new("https://xyz.supabase.co/", "anon");
        assert_eq!(config.auth_url("signup"), "https://xyz.supabase.co/auth/v1/signup");
        assert_eq!(config.table_url(), "https://xyz.supabase.co/rest/v1/todos");
    }

    #[test]
    fn test_backend_requires_credentials() {
        assert!(SupabaseBackend::new(SupabaseConfig::new("", "anon")).is_err());
        assert!(SupabaseBackend::new(SupabaseConfig::new("https://x.supabase.co", "")).is_err());
    }

    #[test]
    fn test_token_response_expiry() {
        let token: TokenResponse = serde_json::from_value(json!({
            "access_token": "at",
            "refresh_token": "rt",
            "expires_in": 3600,
            "user": { "id": "0a6b2d1e-7c3f-4a55-8e2d-1f0e9c8b7a66", "email": "a@a.com" }
        }))
        .unwrap();
        let session: Session = token.into();
        assert!(!session.is_expired());
        assert_eq!(session.user.email, "a@a.com");
        assert_eq!(session.refresh_token.as_deref(), Some("rt"));
    }
}
