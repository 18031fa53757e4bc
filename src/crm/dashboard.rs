use axum::{extract::State, Json};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::error::CrmError;
use super::types::LeadResponse;
use crate::auth::AuthenticatedUser;
use crate::core::shared::models::{LeadQuery, LeadStatus, Task, TaskQuery, TaskStatus};
use crate::core::shared::state::AppState;
use crate::storage::{CrmStore, StoreError};
use crate::tasks::types::{due_state, DueState};

pub const RECENT_LEADS: i64 = 5;

#[derive(Debug, Serialize)]
pub struct DashboardMetrics {
    pub total_leads: i64,
    pub active_leads: i64,
    pub converted_leads: i64,
    pub lost_leads: i64,
    pub pending_tasks: i64,
    pub completed_tasks: i64,
    pub recent_leads: Vec<LeadResponse>,
    pub due_tasks: Vec<Task>,
}

pub async fn collect_metrics(
    crm: &dyn CrmStore,
    owner: Uuid,
    today: NaiveDate,
) -> Result<DashboardMetrics, StoreError> {
    let total_leads = crm.count_leads(owner, None).await?;
    let converted_leads = crm.count_leads(owner, Some(LeadStatus::Converted)).await?;
    let lost_leads = crm.count_leads(owner, Some(LeadStatus::Lost)).await?;

    let pending_tasks = crm.count_tasks(owner, Some(TaskStatus::Pending)).await?;
    let completed_tasks = crm.count_tasks(owner, Some(TaskStatus::Completed)).await?;

    let recent = LeadQuery {
        limit: Some(RECENT_LEADS),
        ..Default::default()
    };
    let recent_leads = crm
        .list_leads_with_task_summary(owner, &recent)
        .await?
        .into_iter()
        .map(|(lead, summary)| LeadResponse::new(lead, summary))
        .collect();

    let pending = TaskQuery {
        status: Some(TaskStatus::Pending),
        ..Default::default()
    };
    let mut due_tasks: Vec<Task> = crm
        .list_tasks(owner, &pending)
        .await?
        .into_iter()
        .filter(|t| matches!(due_state(t, today), DueState::Overdue | DueState::DueToday))
        .collect();
    due_tasks.sort_by_key(|t| t.due_date);

    Ok(DashboardMetrics {
        total_leads,
        active_leads: total_leads - converted_leads - lost_leads,
        converted_leads,
        lost_leads,
        pending_tasks,
        completed_tasks,
        recent_leads,
        due_tasks,
    })
}

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<DashboardMetrics>, CrmError> {
    let today = Utc::now().date_naive();
    Ok(Json(
        collect_metrics(state.crm.as_ref(), user.id(), today).await?,
    ))
}
