//! User directory of the local backend
//!
//! Accounts live in a JSON file; passwords are stored as salted SHA-256
//! digests and sessions are HS256 tokens carrying the user id and email.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::PasswordPolicy;
use crate::session::{Session, User};
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    id: Uuid,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl UserRecord {
    fn to_user(&self) -> User {
        User {
            id: self.id,
            email: self.email.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    email: String,
    exp: usize,
}

pub struct UserDirectory {
    users: RwLock<HashMap<Uuid, UserRecord>>,
    file_path: PathBuf,
    jwt_secret: String,
    session_ttl: Duration,
    policy: PasswordPolicy,
}

impl UserDirectory {
    pub async fn open(
        file_path: impl Into<PathBuf>,
        jwt_secret: impl Into<String>,
        session_ttl: Duration,
    ) -> Result<Self> {
        let file_path = file_path.into();
        let users = load_users(&file_path).await?;
        debug!("Loaded {} local accounts", users.len());

        Ok(Self {
            users: RwLock::new(users),
            file_path,
            jwt_secret: jwt_secret.into(),
            session_ttl,
            policy: PasswordPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: PasswordPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<User> {
        let email = normalize_email(email)?;
        self.policy
            .check(password)
            .map_err(|_| Error::store(format!(
                "Password should be at least {} characters",
                self.policy.min_length
            )))?;

        let user = {
            let mut users = self.users.write().await;
            if users.values().any(|record| record.email == email) {
                return Err(Error::store("User already registered"));
            }
            let record = UserRecord {
                id: Uuid::new_v4(),
                email,
                password_hash: hash_password(password),
                created_at: Utc::now(),
            };
            let user = record.to_user();
            users.insert(record.id, record);
            user
        };
        self.persist().await?;
        info!("Registered local account {}", user.id);
        Ok(user)
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let email = normalize_email(email)?;
        let users = self.users.read().await;
        users
            .values()
            .find(|record| record.email == email)
            .filter(|record| verify_password(&record.password_hash, password))
            .map(UserRecord::to_user)
            .ok_or_else(|| Error::store("Invalid login credentials"))
    }

    pub async fn find_by_email(&self, email: &str) -> Option<User> {
        let email = normalize_email(email).ok()?;
        let users = self.users.read().await;
        users
            .values()
            .find(|record| record.email == email)
            .map(UserRecord::to_user)
    }

    pub async fn set_password(&self, user_id: Uuid, password: &str) -> Result<()> {
        self.policy
            .check(password)
            .map_err(|_| Error::store(format!(
                "Password should be at least {} characters",
                self.policy.min_length
            )))?;
        {
            let mut users = self.users.write().await;
            let record = users
                .get_mut(&user_id)
                .ok_or_else(|| Error::store("User not found"))?;
            if verify_password(&record.password_hash, password) {
                return Err(Error::store(
                    "New password should be different from the old password",
                ));
            }
            record.password_hash = hash_password(password);
        }
        self.persist().await
    }

    /// Issue a session token for `user`
    pub fn issue_session(&self, user: User) -> Result<Session> {
        let expires_at = Utc::now() + self.session_ttl;
        let claims = SessionClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            exp: expires_at.timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|err| Error::store(format!("Failed to sign session: {}", err)))?;

        Ok(Session::new(token, user).with_expires_at(expires_at))
    }

    /// Resolve a session token back into a session
    ///
    /// Fails for expired or forged tokens and for deleted accounts.
    pub async fn verify(&self, token: &str) -> Result<Session> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        validation.leeway = 0;
        let claims = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|decoded| decoded.claims)
        .map_err(|_| Error::Unauthenticated)?;

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| Error::Unauthenticated)?;
        let user = self
            .users
            .read()
            .await
            .get(&user_id)
            .map(UserRecord::to_user)
            .ok_or(Error::Unauthenticated)?;

        let mut session = Session::new(token, user);
        session.expires_at = DateTime::<Utc>::from_timestamp(claims.exp as i64, 0);
        Ok(session)
    }

    async fn persist(&self) -> Result<()> {
        let users = self.users.read().await;
        let records: Vec<&UserRecord> = users.values().collect();
        let content = serde_json::to_string_pretty(&records)?;
        if let Some(parent) = self.file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.file_path, content).await?;
        Ok(())
    }
}

async fn load_users(path: &Path) -> Result<HashMap<Uuid, UserRecord>> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(HashMap::new());
    }
    let content = tokio::fs::read_to_string(path).await?;
    let records: Vec<UserRecord> = serde_json::from_str(&content)?;
    Ok(records.into_iter().map(|record| (record.id, record)).collect())
}

fn normalize_email(email: &str) -> Result<String> {
    let normalized = email.trim().to_lowercase();
    if normalized.is_empty() || !normalized.contains('@') {
        return Err(Error::store("Unable to validate email address: invalid format"));
    }
    Ok(normalized)
}

fn hash_password(password: &str) -> String {
    let mut salt = [0_u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);

    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();

    format!(
        "v1${}${}",
        URL_SAFE_NO_PAD.encode(salt),
        URL_SAFE_NO_PAD.encode(digest)
    )
}

fn verify_password(stored_hash: &str, password: &str) -> bool {
    let mut parts = stored_hash.split('$');
    let (Some("v1"), Some(encoded_salt), Some(encoded_digest)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    let (Ok(salt), Ok(expected_digest)) = (
        URL_SAFE_NO_PAD.decode(encoded_salt),
        URL_SAFE_NO_PAD.decode(encoded_digest),
    ) else {
        return false;
    };

    let mut hasher = Sha256::new();
    hasher.update(&salt);
    hasher.update(password.as_bytes());
    expected_digest == hasher.finalize().as_slice()
}
