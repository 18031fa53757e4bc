//! Unauthenticated lead capture for the public `/c/:user_id` form.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use log::info;
use std::sync::Arc;
use uuid::Uuid;

use super::error::CrmError;
use super::types::{clean_optional, required_text, CaptureRequest, CaptureResponse};
use crate::core::shared::models::{Lead, PUBLIC_FORM_SOURCE};
use crate::core::shared::state::AppState;

pub const DEFAULT_CAPTURE_NOTES: &str = "Inquiry from Public Capture Page";

pub fn captured_lead(owner: Uuid, req: CaptureRequest) -> Result<Lead, CrmError> {
    let mut lead = Lead::new(owner, required_text(&req.name, "name")?);
    lead.email = clean_optional(req.email);
    lead.phone = clean_optional(req.phone);
    lead.notes = Some(clean_optional(req.notes).unwrap_or_else(|| DEFAULT_CAPTURE_NOTES.to_string()));
    lead.source = PUBLIC_FORM_SOURCE.to_string();
    Ok(lead)
}

pub async fn capture_lead(
    State(state): State<Arc<AppState>>,
    Path(owner): Path<Uuid>,
    body: Result<Json<CaptureRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CaptureResponse>), CrmError> {
    let Json(req) = body?;
    let exists = state
        .auth
        .find_user(owner)
        .await
        .map_err(|e| CrmError::Internal(e.to_string()))?
        .is_some();
    if !exists {
        return Err(CrmError::NotFound("Unknown capture page".to_string()));
    }

    let lead = captured_lead(owner, req)?;
    state.crm.insert_lead(&lead).await?;
    info!("Captured public lead {} for user {owner}", lead.id);

    Ok((
        StatusCode::CREATED,
        Json(CaptureResponse {
            id: lead.id,
            status: "received",
        }),
    ))
}
