use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use std::sync::Arc;
use tower_cookies::Cookies;
use uuid::Uuid;

use super::{AuthError, SESSION_COOKIE};
use crate::core::shared::models::User;
use crate::core::shared::state::AppState;

/// Extract bearer token from Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|auth| {
            let (scheme, token) = auth.split_once(' ')?;
            scheme
                .eq_ignore_ascii_case("bearer")
                .then(|| token.trim().to_string())
        })
        .filter(|token| !token.is_empty())
}

/// Bearer header first, session cookie second.
pub async fn extract_token<S: Send + Sync>(parts: &mut Parts, state: &S) -> Option<String> {
    if let Some(token) = extract_bearer_token(&parts.headers) {
        return Some(token);
    }
    let cookies = Cookies::from_request_parts(parts, state).await.ok()?;
    cookies
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// The signed-in user. Rejects with 401 when the token is missing, unknown or expired.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub token: String,
}

impl AuthenticatedUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = Arc::<AppState>::from_ref(state);
        let token = extract_token(parts, state)
            .await
            .ok_or(AuthError::Unauthorized)?;

        let user = app
            .auth
            .get_session(&token)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        Ok(AuthenticatedUser { user, token })
    }
}

/// Optional authenticated user (doesn't fail if not authenticated)
pub struct OptionalAuth(pub Option<AuthenticatedUser>);

#[async_trait]
impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match AuthenticatedUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(OptionalAuth(Some(user))),
            Err(AuthError::Unauthorized) => Ok(OptionalAuth(None)),
            Err(e) => Err(e),
        }
    }
}
