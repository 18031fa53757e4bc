//! Leads: CRUD, scoring, recommendations, dashboard metrics and public capture.

pub mod capture;
pub mod dashboard;
pub mod error;
pub mod leads;
pub mod recommend;
pub mod score_lead;
pub mod types;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::core::shared::state::AppState;

pub use error::CrmError;

pub fn configure_crm_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/leads", get(leads::list_leads).post(leads::create_lead))
        .route(
            "/api/leads/:id",
            get(leads::get_lead)
                .put(leads::update_lead)
                .delete(leads::delete_lead),
        )
        .route("/api/leads/:id/insight", get(leads::lead_insight))
        .route("/api/dashboard", get(dashboard::dashboard))
        .route("/api/public/capture/:user_id", post(capture::capture_lead))
}
