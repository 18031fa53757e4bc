use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::CrmError;
use super::recommend::RecommendationSource;
use super::score_lead::{calculate_lead_score, priority_for, Priority};
use crate::core::shared::models::{
    Lead, LeadChanges, LeadQuery, LeadStatus, LeadWithTasks, SortOrder, Task, TaskSummary,
};

/// Trims a free-text field; blank input becomes `None`.
pub fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn required_text(value: &str, field: &str) -> Result<String, CrmError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CrmError::Validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

pub fn parse_status(value: Option<&str>) -> Result<Option<LeadStatus>, CrmError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => Ok(Some(v.parse()?)),
        None => Ok(None),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateLeadRequest {
    #[serde(default)]
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
    pub source: Option<String>,
    pub notes: Option<String>,
}

impl CreateLeadRequest {
    pub fn into_lead(self, owner: Uuid) -> Result<Lead, CrmError> {
        let mut lead = Lead::new(owner, required_text(&self.name, "name")?);
        lead.email = clean_optional(self.email);
        lead.phone = clean_optional(self.phone);
        lead.notes = clean_optional(self.notes);
        if let Some(status) = parse_status(self.status.as_deref())? {
            lead.status = status;
        }
        if let Some(source) = clean_optional(self.source) {
            lead.source = source;
        }
        Ok(lead)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateLeadRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
    pub source: Option<String>,
    pub notes: Option<String>,
}

impl UpdateLeadRequest {
    pub fn into_changes(self) -> Result<LeadChanges, CrmError> {
        let name = match self.name {
            Some(name) => Some(required_text(&name, "name")?),
            None => None,
        };
        let source = match self.source {
            Some(source) => Some(required_text(&source, "source")?),
            None => None,
        };
        Ok(LeadChanges {
            name,
            email: self.email.map(|v| clean_optional(Some(v))),
            phone: self.phone.map(|v| clean_optional(Some(v))),
            status: parse_status(self.status.as_deref())?,
            source,
            notes: self.notes.map(|v| clean_optional(Some(v))),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListLeadsQuery {
    pub status: Option<String>,
    pub search: Option<String>,
    pub order: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListLeadsQuery {
    pub fn into_query(self) -> Result<LeadQuery, CrmError> {
        let order = match self.order.as_deref().map(str::trim) {
            None | Some("") | Some("desc") => SortOrder::Desc,
            Some("asc") => SortOrder::Asc,
            Some(other) => {
                return Err(CrmError::Validation(format!("unknown order: {other}")));
            }
        };
        if self.limit.is_some_and(|l| l < 0) || self.offset.is_some_and(|o| o < 0) {
            return Err(CrmError::Validation(
                "limit and offset must not be negative".to_string(),
            ));
        }
        Ok(LeadQuery {
            status: parse_status(self.status.as_deref())?,
            search: clean_optional(self.search),
            order,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct LeadResponse {
    #[serde(flatten)]
    pub lead: Lead,
    pub score: i64,
    pub priority: Priority,
    pub tasks: TaskSummary,
}

impl LeadResponse {
    pub fn new(lead: Lead, tasks: TaskSummary) -> Self {
        let score = calculate_lead_score(&lead);
        Self {
            lead,
            score,
            priority: priority_for(score),
            tasks,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LeadDetailResponse {
    #[serde(flatten)]
    pub lead: Lead,
    pub tasks: Vec<Task>,
    pub score: i64,
    pub priority: Priority,
}

impl From<LeadWithTasks> for LeadDetailResponse {
    fn from(detail: LeadWithTasks) -> Self {
        let score = calculate_lead_score(&detail.lead);
        Self {
            lead: detail.lead,
            tasks: detail.tasks,
            score,
            priority: priority_for(score),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InsightResponse {
    pub lead_id: Uuid,
    pub score: i64,
    pub priority: Priority,
    pub recommendation: String,
    pub source: RecommendationSource,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CaptureRequest {
    #[serde(default)]
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    pub id: Uuid,
    pub status: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_defaults() {
        let req = CreateLeadRequest {
            name: "  Maria Souza ".to_string(),
            email: Some("   ".to_string()),
            phone: None,
            status: None,
            source: Some(String::new()),
            notes: None,
        };
        let lead = req.into_lead(Uuid::new_v4()).unwrap();
        assert_eq!(lead.name, "Maria Souza");
        assert_eq!(lead.email, None);
        assert_eq!(lead.status, LeadStatus::New);
        assert_eq!(lead.source, "Manual");
    }

    #[test]
    fn test_create_request_rejects_blank_name_and_bad_status() {
        let blank = CreateLeadRequest {
            name: " ".to_string(),
            email: None,
            phone: None,
            status: None,
            source: None,
            notes: None,
        };
        assert!(matches!(
            blank.into_lead(Uuid::new_v4()),
            Err(CrmError::Validation(_))
        ));

        let bad_status = CreateLeadRequest {
            name: "Acme".to_string(),
            email: None,
            phone: None,
            status: Some("Won".to_string()),
            source: None,
            notes: None,
        };
        assert!(matches!(
            bad_status.into_lead(Uuid::new_v4()),
            Err(CrmError::Validation(_))
        ));
    }

    #[test]
    fn test_update_request_blank_fields_clear() {
        let req: UpdateLeadRequest =
            serde_json::from_str(r#"{"email": " ", "phone": "", "notes": "call Tuesday "}"#).unwrap();
        let changes = req.into_changes().unwrap();
        assert_eq!(changes.email, Some(None));
        assert_eq!(changes.phone, Some(None));
        assert_eq!(changes.notes, Some(Some("call Tuesday".to_string())));
        assert_eq!(changes.name, None);
    }

    #[test]
    fn test_create_request_without_name_is_validation_error() {
        let req: CreateLeadRequest = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            req.into_lead(Uuid::new_v4()),
            Err(CrmError::Validation(msg)) if msg == "name is required"
        ));
    }

    #[test]
    fn test_list_query_parsing() {
        let query = ListLeadsQuery {
            status: Some("Proposal".to_string()),
            order: Some("asc".to_string()),
            search: Some("  ".to_string()),
            ..Default::default()
        }
        .into_query()
        .unwrap();
        assert_eq!(query.status, Some(LeadStatus::Proposal));
        assert_eq!(query.order, SortOrder::Asc);
        assert_eq!(query.search, None);

        let bad = ListLeadsQuery {
            order: Some("sideways".to_string()),
            ..Default::default()
        };
        assert!(bad.into_query().is_err());
    }
}
