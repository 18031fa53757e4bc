//! Types for the tasks module
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::core::shared::models::{Task, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DueState {
    Completed,
    NoDueDate,
    Overdue,
    DueToday,
    Upcoming,
}

/// Classifies a task against the given calendar day.
pub fn due_state(task: &Task, today: NaiveDate) -> DueState {
    if task.status == TaskStatus::Completed {
        return DueState::Completed;
    }
    match task.due_date {
        None => DueState::NoDueDate,
        Some(due) if due < today => DueState::Overdue,
        Some(due) if due == today => DueState::DueToday,
        Some(_) => DueState::Upcoming,
    }
}

/// Distinguishes an absent JSON field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub title: String,
    pub lead_id: Option<Uuid>,
    pub status: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub status: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    pub lead_id: Option<Option<Uuid>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilters {
    pub status: Option<String>,
    pub lead_id: Option<Uuid>,
    #[serde(default)]
    pub global_only: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskResponse {
    #[serde(flatten)]
    pub task: Task,
    pub due_state: DueState,
}

impl TaskResponse {
    pub fn new(task: Task, today: NaiveDate) -> Self {
        let due_state = due_state(&task, today);
        Self { task, due_state }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskResponse>,
    pub pending_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub task: TaskResponse,
    pub pending_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_due_state() {
        let today = day(15);
        let mut task = Task::new(Uuid::new_v4(), "Call");
        assert_eq!(due_state(&task, today), DueState::NoDueDate);

        task.due_date = Some(day(14));
        assert_eq!(due_state(&task, today), DueState::Overdue);
        task.due_date = Some(day(15));
        assert_eq!(due_state(&task, today), DueState::DueToday);
        task.due_date = Some(day(16));
        assert_eq!(due_state(&task, today), DueState::Upcoming);

        task.status = TaskStatus::Completed;
        task.due_date = Some(day(1));
        assert_eq!(due_state(&task, today), DueState::Completed);
    }

    #[test]
    fn test_update_request_distinguishes_null_from_absent() {
        let absent: UpdateTaskRequest = serde_json::from_str(r#"{"title":"x"}"#).unwrap();
        assert_eq!(absent.lead_id, None);
        assert_eq!(absent.due_date, None);

        let cleared: UpdateTaskRequest =
            serde_json::from_str(r#"{"lead_id":null,"due_date":"2024-03-20"}"#).unwrap();
        assert_eq!(cleared.lead_id, Some(None));
        assert_eq!(cleared.due_date, Some(Some(day(20))));
    }
}
