//! Data access for leads, tasks, users and sessions.
//!
//! Every CRM call takes the owner's user id explicitly; rows belonging to other owners
//! behave exactly like missing rows.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::shared::models::{
    Lead, LeadChanges, LeadQuery, LeadStatus, LeadWithTasks, SessionRecord, Task, TaskChanges,
    TaskQuery, TaskStatus, TaskSummary, User, UserChanges,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database connection failed: {0}")]
    Connection(String),
    #[error("Query failed: {0}")]
    Query(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait CrmStore: Send + Sync {
    async fn list_leads(&self, owner: Uuid, query: &LeadQuery) -> Result<Vec<Lead>, StoreError>;

    /// Leads together with a per-lead summary of their tasks.
    async fn list_leads_with_task_summary(
        &self,
        owner: Uuid,
        query: &LeadQuery,
    ) -> Result<Vec<(Lead, TaskSummary)>, StoreError> {
        let leads = self.list_leads(owner, query).await?;
        let tasks = self
            .list_tasks(owner, &TaskQuery::default())
            .await?;
        Ok(leads
            .into_iter()
            .map(|lead| {
                let summary = summarize_tasks(tasks.iter().filter(|t| t.lead_id == Some(lead.id)));
                (lead, summary)
            })
            .collect())
    }

    async fn count_leads(&self, owner: Uuid, status: Option<LeadStatus>)
        -> Result<i64, StoreError>;

    async fn get_lead(&self, owner: Uuid, id: Uuid) -> Result<Option<Lead>, StoreError>;

    async fn get_lead_with_tasks(
        &self,
        owner: Uuid,
        id: Uuid,
    ) -> Result<Option<LeadWithTasks>, StoreError>;

    async fn insert_lead(&self, lead: &Lead) -> Result<(), StoreError>;

    async fn update_lead(
        &self,
        owner: Uuid,
        id: Uuid,
        changes: &LeadChanges,
    ) -> Result<Option<Lead>, StoreError>;

    /// Returns whether a row was removed. Tasks of the lead are detached, not deleted.
    async fn delete_lead(&self, owner: Uuid, id: Uuid) -> Result<bool, StoreError>;

    async fn list_tasks(&self, owner: Uuid, query: &TaskQuery) -> Result<Vec<Task>, StoreError>;

    async fn count_tasks(&self, owner: Uuid, status: Option<TaskStatus>)
        -> Result<i64, StoreError>;

    async fn get_task(&self, owner: Uuid, id: Uuid) -> Result<Option<Task>, StoreError>;

    async fn insert_task(&self, task: &Task) -> Result<(), StoreError>;

    async fn update_task(
        &self,
        owner: Uuid,
        id: Uuid,
        changes: &TaskChanges,
    ) -> Result<Option<Task>, StoreError>;

    async fn delete_task(&self, owner: Uuid, id: Uuid) -> Result<bool, StoreError>;

    async fn ping(&self) -> bool;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with [`StoreError::Conflict`] when the email is already registered.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn update_user(&self, id: Uuid, changes: &UserChanges)
        -> Result<Option<User>, StoreError>;

    /// Removes the user with their sessions, leads and tasks.
    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn insert_session(&self, session: &SessionRecord) -> Result<(), StoreError>;

    async fn find_session(&self, token_hash: &str) -> Result<Option<SessionRecord>, StoreError>;

    async fn delete_session(&self, token_hash: &str) -> Result<bool, StoreError>;
}

pub fn summarize_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> TaskSummary {
    tasks.into_iter().fold(TaskSummary::default(), |mut acc, task| {
        acc.total += 1;
        if task.status == TaskStatus::Pending {
            acc.pending += 1;
        }
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_tasks() {
        let owner = Uuid::new_v4();
        let mut done = Task::new(owner, "Send proposal");
        done.status = TaskStatus::Completed;
        let tasks = vec![Task::new(owner, "Call"), done, Task::new(owner, "Email")];
        let summary = summarize_tasks(&tasks);
        assert_eq!(summary, TaskSummary { total: 3, pending: 2 });
    }
}
