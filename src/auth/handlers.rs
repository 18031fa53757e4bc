use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use log::{info, trace};
use serde::Deserialize;
use std::{convert::Infallible, sync::Arc, time::Duration};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tower_cookies::{
    cookie::{time::Duration as CookieDuration, SameSite},
    Cookie, Cookies,
};

use super::{AuthError, AuthSession, AuthenticatedUser, OptionalAuth, SESSION_COOKIE};
use crate::core::shared::models::{Profile, UserChanges};
use crate::core::shared::state::AppState;
use crate::drive::{avatar_extension, avatar_key};

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub full_name: Option<String>,
}

fn set_session_cookie(state: &AppState, cookies: &Cookies, session: &AuthSession) {
    let ttl = state.auth.session_ttl();
    let cookie = Cookie::build((SESSION_COOKIE, session.token.clone()))
        .path("/")
        .http_only(true)
        .secure(state.config.auth.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::seconds(ttl.num_seconds()))
        .build();
    cookies.add(cookie);
}

fn clear_session_cookie(cookies: &Cookies) {
    cookies.remove(Cookie::build(SESSION_COOKIE).path("/").build());
}

pub async fn handle_sign_up(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    body: Result<Json<SignUpRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthSession>), AuthError> {
    let Json(req) = body?;
    let session = state
        .auth
        .sign_up(&req.email, &req.password, req.full_name)
        .await?;
    set_session_cookie(&state, &cookies, &session);
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn handle_sign_in(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    body: Result<Json<SignInRequest>, JsonRejection>,
) -> Result<Json<AuthSession>, AuthError> {
    let Json(req) = body?;
    let session = state
        .auth
        .sign_in_with_password(&req.email, &req.password)
        .await?;
    info!("User {} signed in", session.user.id);
    set_session_cookie(&state, &cookies, &session);
    Ok(Json(session))
}

pub async fn handle_sign_out(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    OptionalAuth(user): OptionalAuth,
) -> Result<StatusCode, AuthError> {
    if let Some(user) = user {
        state.auth.sign_out(&user.token).await?;
    }
    clear_session_cookie(&cookies);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_get_session(user: AuthenticatedUser) -> Json<Profile> {
    Json(Profile::from(&user.user))
}

pub async fn handle_update_user(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    body: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<Profile>, AuthError> {
    let Json(req) = body?;
    let changes = UserChanges {
        email: req.email,
        full_name: req.full_name,
        avatar_url: None,
    };
    if changes.is_empty() {
        return Ok(Json(Profile::from(&user.user)));
    }
    let updated = state.auth.update_user(user.id(), changes).await?;
    Ok(Json(Profile::from(&updated)))
}

pub async fn handle_upload_avatar(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Profile>, AuthError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let extension = avatar_extension(&content_type).ok_or_else(|| {
        AuthError::Validation("Avatar must be a PNG, JPEG, WebP or GIF image".to_string())
    })?;
    if body.is_empty() {
        return Err(AuthError::Validation("Avatar upload is empty".to_string()));
    }
    let max_bytes = state.config.drive.max_avatar_bytes;
    if body.len() > max_bytes {
        return Err(AuthError::Validation(format!(
            "Avatar exceeds the {max_bytes} byte limit"
        )));
    }

    let key = avatar_key(user.id(), extension);
    state
        .drive
        .upload(&key, body, &content_type)
        .await
        .map_err(|e| AuthError::Upload(e.to_string()))?;
    info!("Stored avatar {key} for user {}", user.id());

    let changes = UserChanges {
        avatar_url: Some(state.drive.public_url(&key)),
        ..Default::default()
    };
    let updated = state.auth.update_user(user.id(), changes).await?;
    Ok(Json(Profile::from(&updated)))
}

pub async fn handle_delete_user(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    user: AuthenticatedUser,
) -> Result<StatusCode, AuthError> {
    state.auth.delete_user(user.id()).await?;
    clear_session_cookie(&cookies);
    Ok(StatusCode::NO_CONTENT)
}

/// The caller's own auth events as server-sent events.
pub async fn handle_auth_events(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let user_id = user.id();
    trace!("Opening auth event stream for user {user_id}");

    let stream = BroadcastStream::new(state.auth.subscribe()).filter_map(move |msg| match msg {
        Ok(event) if event.user_id == user_id => Event::default()
            .event(event.kind.as_str())
            .json_data(&event)
            .ok()
            .map(Ok),
        _ => None,
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

pub fn configure_auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/signup", post(handle_sign_up))
        .route("/api/auth/signin", post(handle_sign_in))
        .route("/api/auth/signout", post(handle_sign_out))
        .route("/api/auth/session", get(handle_get_session))
        .route(
            "/api/auth/user",
            axum::routing::put(handle_update_user).delete(handle_delete_user),
        )
        .route("/api/auth/user/avatar", post(handle_upload_avatar))
        .route("/api/auth/events", get(handle_auth_events))
}
