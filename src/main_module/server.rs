//! HTTP server initialization and routing

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::{routing::get, Router};
use log::{error, info, warn};
use std::sync::Arc;
use tower_cookies::CookieManagerLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::auth::handlers::configure_auth_routes;
use crate::core::config::{AppConfig, DriveBackend};
use crate::core::shared::state::AppState;
use crate::crm::configure_crm_routes;
use crate::tasks::configure_task_routes;
use crate::ui::{configure_ui_routes, pages::not_found};

use super::{health_check, shutdown_signal};

/// Headroom above the largest accepted avatar upload.
const BODY_LIMIT_SLACK: usize = 64 * 1024;

fn create_cors_layer(config: &AppConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    match HeaderValue::from_str(config.server.base_url.trim_end_matches('/')) {
        Ok(origin) => cors.allow_origin(origin),
        Err(e) => {
            warn!(
                "Invalid base_url {:?} for CORS ({e}); cross-origin requests are disabled",
                config.server.base_url
            );
            cors
        }
    }
}

/// Assembles every route and layer around the shared state.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health_check))
        .merge(configure_auth_routes())
        .merge(configure_crm_routes())
        .merge(configure_task_routes())
        .merge(configure_ui_routes());

    if state.config.drive.backend == DriveBackend::Local {
        app = app.nest_service("/storage", ServeDir::new(&state.config.drive.local_root));
    }

    let body_limit = state.config.drive.max_avatar_bytes + BODY_LIMIT_SLACK;
    let cors = create_cors_layer(&state.config);

    app.fallback(not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CookieManagerLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(state: Arc<AppState>) -> std::io::Result<()> {
    let addr = state.config.bind_address();
    let app = build_router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {addr}: {e} - is another instance running?");
            return Err(e);
        }
    };
    info!("HTTP server listening on {addr}");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(std::io::Error::other)
}
