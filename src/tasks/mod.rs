//! Follow-up tasks, optionally attached to a lead.

pub mod types;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use log::info;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::core::shared::models::{Task, TaskChanges, TaskQuery, TaskStatus};
use crate::core::shared::state::AppState;
use crate::crm::types::required_text;
use crate::crm::CrmError;
use types::{
    CreateTaskRequest, TaskFilters, TaskListResponse, TaskResponse, ToggleResponse,
    UpdateTaskRequest,
};

fn parse_task_status(value: Option<&str>) -> Result<Option<TaskStatus>, CrmError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => Ok(Some(v.parse()?)),
        None => Ok(None),
    }
}

/// A task may only point at a lead owned by the same user.
async fn ensure_own_lead(state: &AppState, owner: Uuid, lead_id: Uuid) -> Result<(), CrmError> {
    if state.crm.get_lead(owner, lead_id).await?.is_none() {
        return Err(CrmError::Validation(format!("lead {lead_id} does not exist")));
    }
    Ok(())
}

async fn pending_count(state: &AppState, owner: Uuid) -> Result<i64, CrmError> {
    Ok(state
        .crm
        .count_tasks(owner, Some(TaskStatus::Pending))
        .await?)
}

pub async fn handle_task_list(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(filters): Query<TaskFilters>,
) -> Result<Json<TaskListResponse>, CrmError> {
    let query = TaskQuery {
        status: parse_task_status(filters.status.as_deref())?,
        lead_id: filters.lead_id,
        global_only: filters.global_only,
    };
    let today = Utc::now().date_naive();
    let tasks = state.crm.list_tasks(user.id(), &query).await?;

    Ok(Json(TaskListResponse {
        tasks: tasks
            .into_iter()
            .map(|t| TaskResponse::new(t, today))
            .collect(),
        pending_count: pending_count(&state, user.id()).await?,
    }))
}

pub async fn handle_task_create(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    body: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TaskResponse>), CrmError> {
    let Json(req) = body?;
    let mut task = Task::new(user.id(), required_text(&req.title, "title")?);
    if let Some(status) = parse_task_status(req.status.as_deref())? {
        task.status = status;
    }
    if let Some(lead_id) = req.lead_id {
        ensure_own_lead(&state, user.id(), lead_id).await?;
        task.lead_id = Some(lead_id);
    }
    task.due_date = req.due_date;

    state.crm.insert_task(&task).await?;
    info!("Created task {} for user {}", task.id, user.id());

    Ok((
        StatusCode::CREATED,
        Json(TaskResponse::new(task, Utc::now().date_naive())),
    ))
}

pub async fn handle_task_update(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> Result<Json<TaskResponse>, CrmError> {
    let Json(req) = body?;
    let title = match req.title {
        Some(title) => Some(required_text(&title, "title")?),
        None => None,
    };
    if let Some(Some(lead_id)) = req.lead_id {
        ensure_own_lead(&state, user.id(), lead_id).await?;
    }
    let changes = TaskChanges {
        title,
        status: parse_task_status(req.status.as_deref())?,
        due_date: req.due_date,
        lead_id: req.lead_id,
    };

    let task = state
        .crm
        .update_task(user.id(), id, &changes)
        .await?
        .ok_or_else(|| CrmError::NotFound("Task not found".to_string()))?;

    Ok(Json(TaskResponse::new(task, Utc::now().date_naive())))
}

pub async fn handle_task_toggle(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ToggleResponse>, CrmError> {
    let current = state
        .crm
        .get_task(user.id(), id)
        .await?
        .ok_or_else(|| CrmError::NotFound("Task not found".to_string()))?;

    let changes = TaskChanges {
        status: Some(current.status.toggled()),
        ..Default::default()
    };
    let task = state
        .crm
        .update_task(user.id(), id, &changes)
        .await?
        .ok_or_else(|| CrmError::NotFound("Task not found".to_string()))?;

    Ok(Json(ToggleResponse {
        task: TaskResponse::new(task, Utc::now().date_naive()),
        pending_count: pending_count(&state, user.id()).await?,
    }))
}

pub async fn handle_task_delete(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CrmError> {
    if !state.crm.delete_task(user.id(), id).await? {
        return Err(CrmError::NotFound("Task not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_task_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tasks", get(handle_task_list).post(handle_task_create))
        .route(
            "/api/tasks/:id",
            put(handle_task_update).delete(handle_task_delete),
        )
        .route("/api/tasks/:id/toggle", post(handle_task_toggle))
}
