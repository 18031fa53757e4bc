use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use log::info;
use std::sync::Arc;
use uuid::Uuid;

use super::error::CrmError;
use super::score_lead::{calculate_lead_score, priority_for};
use super::types::{
    CreateLeadRequest, InsightResponse, LeadDetailResponse, LeadResponse, ListLeadsQuery,
    UpdateLeadRequest,
};
use crate::auth::AuthenticatedUser;
use crate::core::shared::models::TaskSummary;
use crate::core::shared::state::AppState;

pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<ListLeadsQuery>,
) -> Result<Json<Vec<LeadResponse>>, CrmError> {
    let query = query.into_query()?;
    let rows = state
        .crm
        .list_leads_with_task_summary(user.id(), &query)
        .await?;

    Ok(Json(
        rows.into_iter()
            .map(|(lead, summary)| LeadResponse::new(lead, summary))
            .collect(),
    ))
}

pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    body: Result<Json<CreateLeadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LeadResponse>), CrmError> {
    let Json(req) = body?;
    let lead = req.into_lead(user.id())?;
    state.crm.insert_lead(&lead).await?;
    info!("Created lead {} for user {}", lead.id, user.id());

    Ok((
        StatusCode::CREATED,
        Json(LeadResponse::new(lead, TaskSummary::default())),
    ))
}

pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LeadDetailResponse>, CrmError> {
    let detail = state
        .crm
        .get_lead_with_tasks(user.id(), id)
        .await?
        .ok_or_else(|| CrmError::NotFound("Lead not found".to_string()))?;

    Ok(Json(LeadDetailResponse::from(detail)))
}

pub async fn update_lead(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateLeadRequest>, JsonRejection>,
) -> Result<Json<LeadResponse>, CrmError> {
    let Json(req) = body?;
    let changes = req.into_changes()?;
    let lead = state
        .crm
        .update_lead(user.id(), id, &changes)
        .await?
        .ok_or_else(|| CrmError::NotFound("Lead not found".to_string()))?;

    let detail = state.crm.get_lead_with_tasks(user.id(), id).await?;
    let summary = detail
        .map(|d| crate::storage::summarize_tasks(&d.tasks))
        .unwrap_or_default();

    Ok(Json(LeadResponse::new(lead, summary)))
}

pub async fn delete_lead(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CrmError> {
    if !state.crm.delete_lead(user.id(), id).await? {
        return Err(CrmError::NotFound("Lead not found".to_string()));
    }
    info!("Deleted lead {id} for user {}", user.id());
    Ok(StatusCode::NO_CONTENT)
}

pub async fn lead_insight(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<InsightResponse>, CrmError> {
    let lead = state
        .crm
        .get_lead(user.id(), id)
        .await?
        .ok_or_else(|| CrmError::NotFound("Lead not found".to_string()))?;

    let score = calculate_lead_score(&lead);
    let recommendation = state.recommender.recommend(&lead).await;

    Ok(Json(InsightResponse {
        lead_id: lead.id,
        score,
        priority: priority_for(score),
        recommendation: recommendation.text,
        source: recommendation.source,
        generated_at: Utc::now(),
    }))
}
