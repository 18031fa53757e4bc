use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CrmStore, StoreError, UserStore};
use crate::core::shared::models::{
    Lead, LeadChanges, LeadQuery, LeadStatus, LeadWithTasks, SessionRecord, SortOrder, Task,
    TaskChanges, TaskQuery, TaskStatus, User, UserChanges,
};

/// In-process store used when no database is configured, and by the tests.
#[derive(Default)]
pub struct MemoryStore {
    leads: RwLock<HashMap<Uuid, Lead>>,
    tasks: RwLock<HashMap<Uuid, Task>>,
    users: RwLock<HashMap<Uuid, User>>,
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_search(lead: &Lead, search: &str) -> bool {
    let needle = search.to_lowercase();
    lead.name.to_lowercase().contains(&needle)
        || lead
            .email
            .as_deref()
            .is_some_and(|e| e.to_lowercase().contains(&needle))
}

#[async_trait]
impl CrmStore for MemoryStore {
    async fn list_leads(&self, owner: Uuid, query: &LeadQuery) -> Result<Vec<Lead>, StoreError> {
        let leads = self.leads.read().await;
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let mut result: Vec<Lead> = leads
            .values()
            .filter(|l| l.user_id == owner)
            .filter(|l| query.status.map_or(true, |s| l.status == s))
            .filter(|l| search.map_or(true, |s| matches_search(l, s)))
            .cloned()
            .collect();

        result.sort_by_key(|l| l.created_at);
        if query.order == SortOrder::Desc {
            result.reverse();
        }

        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let limit = query.limit.map_or(usize::MAX, |l| l.max(0) as usize);
        Ok(result.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_leads(
        &self,
        owner: Uuid,
        status: Option<LeadStatus>,
    ) -> Result<i64, StoreError> {
        let leads = self.leads.read().await;
        let count = leads
            .values()
            .filter(|l| l.user_id == owner && status.map_or(true, |s| l.status == s))
            .count();
        Ok(count as i64)
    }

    async fn get_lead(&self, owner: Uuid, id: Uuid) -> Result<Option<Lead>, StoreError> {
        let leads = self.leads.read().await;
        Ok(leads.get(&id).filter(|l| l.user_id == owner).cloned())
    }

    async fn get_lead_with_tasks(
        &self,
        owner: Uuid,
        id: Uuid,
    ) -> Result<Option<LeadWithTasks>, StoreError> {
        let Some(lead) = self.get_lead(owner, id).await? else {
            return Ok(None);
        };
        let tasks = self.tasks.read().await;
        let mut children: Vec<Task> = tasks
            .values()
            .filter(|t| t.user_id == owner && t.lead_id == Some(id))
            .cloned()
            .collect();
        children.sort_by_key(|t| t.created_at);
        Ok(Some(LeadWithTasks {
            lead,
            tasks: children,
        }))
    }

    async fn insert_lead(&self, lead: &Lead) -> Result<(), StoreError> {
        let mut leads = self.leads.write().await;
        if leads.contains_key(&lead.id) {
            return Err(StoreError::Conflict(format!("lead {} exists", lead.id)));
        }
        leads.insert(lead.id, lead.clone());
        Ok(())
    }

    async fn update_lead(
        &self,
        owner: Uuid,
        id: Uuid,
        changes: &LeadChanges,
    ) -> Result<Option<Lead>, StoreError> {
        let mut leads = self.leads.write().await;
        Ok(leads
            .get_mut(&id)
            .filter(|l| l.user_id == owner)
            .map(|lead| {
                changes.apply(lead);
                lead.clone()
            }))
    }

    async fn delete_lead(&self, owner: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let mut leads = self.leads.write().await;
        if !leads.get(&id).is_some_and(|l| l.user_id == owner) {
            return Ok(false);
        }
        leads.remove(&id);

        let mut tasks = self.tasks.write().await;
        for task in tasks.values_mut().filter(|t| t.lead_id == Some(id)) {
            task.lead_id = None;
        }
        Ok(true)
    }

    async fn list_tasks(&self, owner: Uuid, query: &TaskQuery) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        let mut result: Vec<Task> = tasks
            .values()
            .filter(|t| t.user_id == owner)
            .filter(|t| query.status.map_or(true, |s| t.status == s))
            .filter(|t| query.lead_id.map_or(true, |id| t.lead_id == Some(id)))
            .filter(|t| !query.global_only || t.lead_id.is_none())
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn count_tasks(
        &self,
        owner: Uuid,
        status: Option<TaskStatus>,
    ) -> Result<i64, StoreError> {
        let tasks = self.tasks.read().await;
        let count = tasks
            .values()
            .filter(|t| t.user_id == owner && status.map_or(true, |s| t.status == s))
            .count();
        Ok(count as i64)
    }

    async fn get_task(&self, owner: Uuid, id: Uuid) -> Result<Option<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(&id).filter(|t| t.user_id == owner).cloned())
    }

    async fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(StoreError::Conflict(format!("task {} exists", task.id)));
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn update_task(
        &self,
        owner: Uuid,
        id: Uuid,
        changes: &TaskChanges,
    ) -> Result<Option<Task>, StoreError> {
        let mut tasks = self.tasks.write().await;
        Ok(tasks
            .get_mut(&id)
            .filter(|t| t.user_id == owner)
            .map(|task| {
                changes.apply(task);
                task.clone()
            }))
    }

    async fn delete_task(&self, owner: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let mut tasks = self.tasks.write().await;
        if !tasks.get(&id).is_some_and(|t| t.user_id == owner) {
            return Ok(false);
        }
        tasks.remove(&id);
        Ok(true)
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(format!(
                "email {} already registered",
                user.email
            )));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn update_user(
        &self,
        id: Uuid,
        changes: &UserChanges,
    ) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write().await;
        if let Some(email) = &changes.email {
            if users.values().any(|u| u.id != id && &u.email == email) {
                return Err(StoreError::Conflict(format!(
                    "email {email} already registered"
                )));
            }
        }
        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(email) = &changes.email {
            user.email = email.clone();
        }
        if let Some(full_name) = &changes.full_name {
            user.full_name = Some(full_name.clone());
        }
        if let Some(avatar_url) = &changes.avatar_url {
            user.avatar_url = Some(avatar_url.clone());
        }
        user.updated_at = chrono::Utc::now();
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let removed = self.users.write().await.remove(&id).is_some();
        self.sessions.write().await.retain(|_, s| s.user_id != id);
        self.leads.write().await.retain(|_, l| l.user_id != id);
        self.tasks.write().await.retain(|_, t| t.user_id != id);
        Ok(removed)
    }

    async fn insert_session(&self, session: &SessionRecord) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(session.token_hash.clone(), session.clone());
        Ok(())
    }

    async fn find_session(&self, token_hash: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.sessions.read().await.get(token_hash).cloned())
    }

    async fn delete_session(&self, token_hash: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.write().await.remove(token_hash).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn lead_at(owner: Uuid, name: &str, minutes_ago: i64) -> Lead {
        let mut lead = Lead::new(owner, name);
        lead.created_at = Utc::now() - Duration::minutes(minutes_ago);
        lead
    }

    #[tokio::test]
    async fn test_list_leads_filters_and_orders() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let mut proposal = lead_at(owner, "Beta Corp", 5);
        proposal.status = LeadStatus::Proposal;
        proposal.email = Some("buyer@beta.io".to_string());
        store.insert_lead(&lead_at(owner, "Alpha", 10)).await.unwrap();
        store.insert_lead(&proposal).await.unwrap();
        store.insert_lead(&lead_at(owner, "Gamma", 1)).await.unwrap();
        store
            .insert_lead(&lead_at(Uuid::new_v4(), "Someone else", 0))
            .await
            .unwrap();

        let all = store.list_leads(owner, &LeadQuery::default()).await.unwrap();
        let names: Vec<&str> = all.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["Gamma", "Beta Corp", "Alpha"]);

        let asc = LeadQuery {
            order: SortOrder::Asc,
            limit: Some(2),
            ..Default::default()
        };
        let first_two = store.list_leads(owner, &asc).await.unwrap();
        assert_eq!(first_two[0].name, "Alpha");
        assert_eq!(first_two.len(), 2);

        let by_email = LeadQuery {
            search: Some("BETA.IO".to_string()),
            ..Default::default()
        };
        assert_eq!(store.list_leads(owner, &by_email).await.unwrap().len(), 1);

        assert_eq!(
            store
                .count_leads(owner, Some(LeadStatus::Proposal))
                .await
                .unwrap(),
            1
        );
        assert_eq!(store.count_leads(owner, None).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_delete_lead_detaches_tasks() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let lead = Lead::new(owner, "Acme");
        let mut task = Task::new(owner, "Follow up");
        task.lead_id = Some(lead.id);
        store.insert_lead(&lead).await.unwrap();
        store.insert_task(&task).await.unwrap();

        assert!(!store.delete_lead(Uuid::new_v4(), lead.id).await.unwrap());
        assert!(store.delete_lead(owner, lead.id).await.unwrap());

        let remaining = store.get_task(owner, task.id).await.unwrap().unwrap();
        assert_eq!(remaining.lead_id, None);
        let global = TaskQuery {
            global_only: true,
            ..Default::default()
        };
        assert_eq!(store.list_tasks(owner, &global).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_user_cascades() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: "a@b.c".to_string(),
            password_hash: String::new(),
            full_name: None,
            avatar_url: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_user(&user).await.unwrap();
        store.insert_lead(&Lead::new(user.id, "Acme")).await.unwrap();
        store.insert_task(&Task::new(user.id, "Call")).await.unwrap();

        assert!(store.delete_user(user.id).await.unwrap());
        assert_eq!(store.count_leads(user.id, None).await.unwrap(), 0);
        assert_eq!(store.count_tasks(user.id, None).await.unwrap(), 0);
        assert!(store.find_user(user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: "dup@example.com".to_string(),
            password_hash: String::new(),
            full_name: None,
            avatar_url: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_user(&user).await.unwrap();
        let twin = User {
            id: Uuid::new_v4(),
            ..user.clone()
        };
        assert!(matches!(
            store.insert_user(&twin).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_update_lead_clears_nullable_fields() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let mut lead = Lead::new(owner, "Delta");
        lead.email = Some("ops@delta.dev".to_string());
        lead.notes = Some("met at expo".to_string());
        store.insert_lead(&lead).await.unwrap();

        let changes = LeadChanges {
            email: Some(None),
            notes: Some(Some("follow up in May".to_string())),
            ..Default::default()
        };
        let updated = store
            .update_lead(owner, lead.id, &changes)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.email, None);
        assert_eq!(updated.notes.as_deref(), Some("follow up in May"));
        assert_eq!(updated.phone, None);
    }

    #[tokio::test]
    async fn test_search_treats_wildcards_literally() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        store.insert_lead(&Lead::new(owner, "50% Off Outlet")).await.unwrap();
        store.insert_lead(&Lead::new(owner, "500 Widgets")).await.unwrap();

        let query = LeadQuery {
            search: Some("50%".to_string()),
            ..Default::default()
        };
        let found = store.list_leads(owner, &query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "50% Off Outlet");
    }
}
