//! Password authentication with opaque session tokens.
//!
//! Tokens are 32 random bytes, hex encoded, handed to the client once. Only their
//! SHA-256 digest is persisted, so a leaked sessions table cannot be replayed.

pub mod extract;
pub mod handlers;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::core::shared::models::{Profile, SessionRecord, User, UserChanges};
use crate::security::password::{is_acceptable_password, PasswordError, PasswordHasher2};
use crate::storage::{StoreError, UserStore};

pub use extract::{AuthenticatedUser, OptionalAuth};
pub use handlers::configure_auth_routes;

pub const SESSION_COOKIE: &str = "lp_session";
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("Password must be at least 6 characters")]
    WeakPassword,
    #[error("Invalid login credentials")]
    InvalidCredentials,
    #[error("Email already registered")]
    EmailTaken,
    #[error("Authentication required")]
    Unauthorized,
    #[error("User not found")]
    UserNotFound,
    #[error("{0}")]
    Validation(String),
    #[error("Upload failed: {0}")]
    Upload(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Password(#[from] PasswordError),
}

impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidEmail | Self::WeakPassword | Self::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidCredentials | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::EmailTaken | Self::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::Upload(_) => StatusCode::BAD_GATEWAY,
            Self::Store(_) | Self::Password(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            log::error!("Auth request failed: {self}");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    UserUpdated,
    UserDeleted,
}

impl AuthEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignedIn => "SIGNED_IN",
            Self::SignedOut => "SIGNED_OUT",
            Self::UserUpdated => "USER_UPDATED",
            Self::UserDeleted => "USER_DELETED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub user_id: Uuid,
}

/// A freshly issued session. `token` is the only copy of the raw bearer token.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: Profile,
}

pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(AuthError::InvalidEmail),
    }
}

pub struct AuthService {
    users: Arc<dyn UserStore>,
    hasher: Arc<PasswordHasher2>,
    session_ttl: Duration,
    events: broadcast::Sender<AuthEvent>,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, hasher: PasswordHasher2, session_ttl_hours: i64) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            users,
            hasher: Arc::new(hasher),
            session_ttl: Duration::hours(session_ttl_hours.max(1)),
            events,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn emit(&self, kind: AuthEventKind, user_id: Uuid) {
        // No receivers is fine: nobody is listening yet.
        let _ = self.events.send(AuthEvent { kind, user_id });
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<String>,
    ) -> Result<AuthSession, AuthError> {
        let email = normalize_email(email)?;
        if !is_acceptable_password(password) {
            return Err(AuthError::WeakPassword);
        }
        if self.users.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = self.hash_password(password.to_string()).await?;
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email,
            password_hash,
            full_name: full_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            avatar_url: None,
            created_at: now,
            updated_at: now,
        };

        self.users.insert_user(&user).await.map_err(|e| match e {
            StoreError::Conflict(_) => AuthError::EmailTaken,
            other => AuthError::Store(other),
        })?;
        info!("Registered user {}", user.id);

        self.open_session(&user).await
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let email = normalize_email(email).map_err(|_| AuthError::InvalidCredentials)?;
        let Some(user) = self.users.find_user_by_email(&email).await? else {
            debug!("Sign-in for unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !self
            .verify_password(password.to_string(), user.password_hash.clone())
            .await?
        {
            warn!("Wrong password for user {}", user.id);
            return Err(AuthError::InvalidCredentials);
        }

        self.open_session(&user).await
    }

    pub async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        let token_hash = hash_token(token);
        if let Some(session) = self.users.find_session(&token_hash).await? {
            self.users.delete_session(&token_hash).await?;
            self.emit(AuthEventKind::SignedOut, session.user_id);
        }
        Ok(())
    }

    /// Resolves a bearer token to its user. Expired sessions are removed on sight.
    pub async fn get_session(&self, token: &str) -> Result<Option<User>, AuthError> {
        let token_hash = hash_token(token);
        let Some(session) = self.users.find_session(&token_hash).await? else {
            return Ok(None);
        };

        if session.is_expired(Utc::now()) {
            debug!("Dropping expired session {}", session.id);
            self.users.delete_session(&token_hash).await?;
            return Ok(None);
        }

        Ok(self.users.find_user(session.user_id).await?)
    }

    pub async fn update_user(
        &self,
        user_id: Uuid,
        mut changes: UserChanges,
    ) -> Result<User, AuthError> {
        if let Some(email) = &changes.email {
            let email = normalize_email(email)?;
            if let Some(existing) = self.users.find_user_by_email(&email).await? {
                if existing.id != user_id {
                    return Err(AuthError::EmailTaken);
                }
            }
            changes.email = Some(email);
        }
        if let Some(name) = &changes.full_name {
            changes.full_name = Some(name.trim().to_string());
        }

        let user = self
            .users
            .update_user(user_id, &changes)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => AuthError::EmailTaken,
                other => AuthError::Store(other),
            })?
            .ok_or(AuthError::UserNotFound)?;

        self.emit(AuthEventKind::UserUpdated, user_id);
        Ok(user)
    }

    pub async fn delete_user(&self, user_id: Uuid) -> Result<(), AuthError> {
        if !self.users.delete_user(user_id).await? {
            return Err(AuthError::UserNotFound);
        }
        info!("Deleted user {user_id} and their data");
        self.emit(AuthEventKind::UserDeleted, user_id);
        Ok(())
    }

    pub async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, AuthError> {
        Ok(self.users.find_user(user_id).await?)
    }

    async fn open_session(&self, user: &User) -> Result<AuthSession, AuthError> {
        let token = generate_token();
        let now = Utc::now();
        let session = SessionRecord {
            id: Uuid::new_v4(),
            user_id: user.id,
            token_hash: hash_token(&token),
            created_at: now,
            expires_at: now + self.session_ttl,
        };
        self.users.insert_session(&session).await?;
        self.emit(AuthEventKind::SignedIn, user.id);

        Ok(AuthSession {
            token,
            expires_at: session.expires_at,
            user: Profile::from(user),
        })
    }

    async fn hash_password(&self, password: String) -> Result<String, AuthError> {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Internal(format!("Hashing task failed: {e}")))?
            .map_err(AuthError::from)
    }

    async fn verify_password(&self, password: String, hash: String) -> Result<bool, AuthError> {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| AuthError::Internal(format!("Verification task failed: {e}")))?
            .map_err(AuthError::from)
    }
}
