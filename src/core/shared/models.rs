//! Domain records shared by the stores, the auth service and the HTTP layer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeadStatus {
    New,
    Proposal,
    FollowUp,
    Converted,
    Lost,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 5] = [
        Self::New,
        Self::Proposal,
        Self::FollowUp,
        Self::Converted,
        Self::Lost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Proposal => "Proposal",
            Self::FollowUp => "FollowUp",
            Self::Converted => "Converted",
            Self::Lost => "Lost",
        }
    }

    /// Converted and Lost leads have left the pipeline.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Converted | Self::Lost)
    }
}

impl Default for LeadStatus {
    fn default() -> Self {
        Self::New
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Completed => "Completed",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Pending => Self::Completed,
            Self::Completed => Self::Pending,
        }
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Completed" => Ok(Self::Completed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status: {0}")]
pub struct UnknownStatus(pub String);

pub const DEFAULT_LEAD_SOURCE: &str = "Manual";
pub const PUBLIC_FORM_SOURCE: &str = "Public Form";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: LeadStatus,
    pub source: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(user_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            name: name.into(),
            email: None,
            phone: None,
            status: LeadStatus::New,
            source: DEFAULT_LEAD_SOURCE.to_string(),
            notes: None,
            created_at: Utc::now(),
        }
    }

    pub fn has_email(&self) -> bool {
        self.email.as_deref().is_some_and(|e| !e.trim().is_empty())
    }

    pub fn has_phone(&self) -> bool {
        self.phone.as_deref().is_some_and(|p| !p.trim().is_empty())
    }

    pub fn notes_len(&self) -> usize {
        self.notes.as_deref().map_or(0, |n| n.chars().count())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub title: String,
    pub status: TaskStatus,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(user_id: Uuid, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            lead_id: None,
            title: title.into(),
            status: TaskStatus::Pending,
            due_date: None,
            created_at: Utc::now(),
        }
    }
}

/// A lead joined with its child tasks.
#[derive(Debug, Clone, Serialize)]
pub struct LeadWithTasks {
    #[serde(flatten)]
    pub lead: Lead,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    pub total: usize,
    pub pending: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Default)]
pub struct LeadQuery {
    pub status: Option<LeadStatus>,
    pub search: Option<String>,
    pub order: SortOrder,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    pub status: Option<TaskStatus>,
    pub lead_id: Option<Uuid>,
    pub global_only: bool,
}

/// Field-level changes to a lead. `None` leaves the stored value untouched;
/// `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default)]
pub struct LeadChanges {
    pub name: Option<String>,
    pub email: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub status: Option<LeadStatus>,
    pub source: Option<String>,
    pub notes: Option<Option<String>>,
}

impl LeadChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.status.is_none()
            && self.source.is_none()
            && self.notes.is_none()
    }

    pub fn apply(&self, lead: &mut Lead) {
        if let Some(name) = &self.name {
            lead.name = name.clone();
        }
        if let Some(email) = &self.email {
            lead.email = email.clone();
        }
        if let Some(phone) = &self.phone {
            lead.phone = phone.clone();
        }
        if let Some(status) = self.status {
            lead.status = status;
        }
        if let Some(source) = &self.source {
            lead.source = source.clone();
        }
        if let Some(notes) = &self.notes {
            lead.notes = notes.clone();
        }
    }
}

/// `lead_id: Some(None)` detaches the task from its lead.
#[derive(Debug, Clone, Default)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub status: Option<TaskStatus>,
    pub due_date: Option<Option<NaiveDate>>,
    pub lead_id: Option<Option<Uuid>>,
}

impl TaskChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.status.is_none()
            && self.due_date.is_none()
            && self.lead_id.is_none()
    }

    pub fn apply(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(lead_id) = self.lead_id {
            task.lead_id = lead_id;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.full_name.is_none() && self.avatar_url.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Display projection of a user, as shown in the header and settings screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
    pub initials: String,
}

impl From<&User> for Profile {
    fn from(user: &User) -> Self {
        let full_name = user
            .full_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());
        Self {
            id: user.id,
            email: user.email.clone(),
            name: full_name.unwrap_or("Pilot").to_string(),
            avatar: user.avatar_url.clone(),
            initials: full_name
                .and_then(|n| n.chars().next())
                .map(|c| c.to_uppercase().collect())
                .unwrap_or_else(|| "P".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lead_status_round_trips_through_strings() {
        for status in LeadStatus::ALL {
            assert_eq!(status.as_str().parse::<LeadStatus>(), Ok(status));
        }
        assert!("Won".parse::<LeadStatus>().is_err());
        assert!("new".parse::<LeadStatus>().is_err());
    }

    #[test]
    fn test_lead_status_serializes_as_variant_name() {
        let json = serde_json::to_string(&LeadStatus::FollowUp).unwrap();
        assert_eq!(json, "\"FollowUp\"");
    }

    #[test]
    fn test_task_status_toggle() {
        assert_eq!(TaskStatus::Pending.toggled(), TaskStatus::Completed);
        assert_eq!(TaskStatus::Completed.toggled(), TaskStatus::Pending);
    }

    #[test]
    fn test_new_lead_defaults() {
        let lead = Lead::new(Uuid::new_v4(), "Maria");
        assert_eq!(lead.status, LeadStatus::New);
        assert_eq!(lead.source, "Manual");
        assert!(!lead.has_email());
        assert_eq!(lead.notes_len(), 0);
    }

    #[test]
    fn test_blank_contact_fields_do_not_count() {
        let mut lead = Lead::new(Uuid::new_v4(), "Blank");
        lead.email = Some("   ".to_string());
        lead.phone = Some(String::new());
        assert!(!lead.has_email());
        assert!(!lead.has_phone());
    }

    #[test]
    fn test_profile_defaults_without_name() {
        let now = Utc::now();
        let mut user = User {
            id: Uuid::new_v4(),
            email: "pilot@example.com".to_string(),
            password_hash: String::new(),
            full_name: None,
            avatar_url: None,
            created_at: now,
            updated_at: now,
        };
        let profile = Profile::from(&user);
        assert_eq!(profile.name, "Pilot");
        assert_eq!(profile.initials, "P");

        user.full_name = Some("joana prado".to_string());
        let profile = Profile::from(&user);
        assert_eq!(profile.name, "joana prado");
        assert_eq!(profile.initials, "J");
    }

    #[test]
    fn test_task_changes_can_detach_lead() {
        let mut task = Task::new(Uuid::new_v4(), "Call back");
        task.lead_id = Some(Uuid::new_v4());
        let changes = TaskChanges {
            lead_id: Some(None),
            ..Default::default()
        };
        changes.apply(&mut task);
        assert_eq!(task.lead_id, None);
    }
}
