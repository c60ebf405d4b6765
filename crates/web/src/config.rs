//! Startup configuration read from the environment

use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use todo_core::auth::{GateConfig, PasswordPolicy};
use todo_core::backend::{LocalConfig, SupabaseConfig};
use tracing::{info, warn};

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    /// Set when both the project URL and anon key are present
    pub supabase: Option<SupabaseConfig>,
    pub redirect_delay: Duration,
    pub min_password_length: usize,
    pub jwt_secret: Option<String>,
    pub session_ttl: chrono::Duration,
    /// Viewers unseen for this long are forgotten
    pub viewer_idle_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let public_url = optional("TODO_PUBLIC_URL");
        let supabase = match (optional("SUPABASE_URL"), optional("SUPABASE_ANON_KEY")) {
            (Some(url), Some(anon_key)) => {
                let mut config = SupabaseConfig::new(url, anon_key);
                if let Some(public_url) = &public_url {
                    config = config.with_reset_redirect_to(format!(
                        "{}/auth/update-password",
                        public_url.trim_end_matches('/')
                    ));
                }
                Some(config)
            }
            (Some(_), None) | (None, Some(_)) => {
                warn!("SUPABASE_URL and SUPABASE_ANON_KEY must be set together; using the local backend");
                None
            }
            (None, None) => None,
        };

        Ok(Self {
            bind_addr: try_load("TODO_BIND_ADDR", "0.0.0.0:8081")?,
            data_dir: try_load("TODO_DATA_DIR", ".todo-data")?,
            supabase,
            redirect_delay: Duration::from_millis(try_load("TODO_REDIRECT_DELAY_MS", "200")?),
            min_password_length: try_load("TODO_MIN_PASSWORD_LENGTH", "6")?,
            jwt_secret: optional("TODO_JWT_SECRET"),
            session_ttl: chrono::Duration::seconds(try_load("TODO_SESSION_TTL_SECONDS", "28800")?),
            viewer_idle_timeout: Duration::from_secs(try_load("TODO_VIEWER_IDLE_SECONDS", "28800")?),
        })
    }

    /// Defaults with the local backend in `data_dir`
    pub fn local(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8081)),
            data_dir: data_dir.into(),
            supabase: None,
            redirect_delay: todo_core::auth::DEFAULT_REDIRECT_DELAY,
            min_password_length: todo_core::auth::DEFAULT_MIN_PASSWORD_LENGTH,
            jwt_secret: None,
            session_ttl: chrono::Duration::hours(8),
            viewer_idle_timeout: Duration::from_secs(8 * 60 * 60),
        }
    }

    pub fn gate(&self) -> GateConfig {
        GateConfig {
            redirect_delay: self.redirect_delay,
            ..GateConfig::default()
        }
    }

    pub fn password_policy(&self) -> PasswordPolicy {
        PasswordPolicy {
            min_length: self.min_password_length,
        }
    }

    pub fn local_backend(&self) -> LocalConfig {
        let config = LocalConfig::new(&self.data_dir)
            .with_session_ttl(self.session_ttl)
            .with_password_policy(self.password_policy());
        match &self.jwt_secret {
            Some(secret) => config.with_jwt_secret(secret),
            None => {
                warn!("TODO_JWT_SECRET not set, local sessions use the development secret");
                config
            }
        }
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, AppError>
where
    T::Err: Display,
{
    optional(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            AppError::Config {
                key: key.to_string(),
                message: e.to_string(),
            }
        })
}
