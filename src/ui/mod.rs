//! Server-rendered screens. Every action on a page goes through the JSON API.

pub mod layout;
pub mod pages;

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::core::shared::state::AppState;

pub fn configure_ui_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(pages::index_page))
        .route("/login", get(pages::login_page))
        .route("/register", get(pages::register_page))
        .route("/dashboard", get(pages::dashboard_page))
        .route("/leads", get(pages::leads_page))
        .route("/leads/:id", get(pages::lead_detail_page))
        .route("/tasks", get(pages::tasks_page))
        .route("/settings", get(pages::settings_page))
        .route("/c/:user_id", get(pages::capture_page))
}
