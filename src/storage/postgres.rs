use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use log::{error, trace};
use std::collections::HashMap;
use uuid::Uuid;

use super::{summarize_tasks, CrmStore, StoreError, UserStore};
use crate::core::shared::models::{
    Lead, LeadChanges, LeadQuery, LeadStatus, LeadWithTasks, SessionRecord, SortOrder, Task,
    TaskChanges, TaskQuery, TaskStatus, TaskSummary, User, UserChanges,
};
use crate::core::shared::schema::{leads, tasks, user_sessions, users};
use crate::core::shared::utils::DbPool;

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = leads)]
struct DbLead {
    id: Uuid,
    user_id: Uuid,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    status: String,
    source: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = leads)]
struct DbLeadChanges {
    name: Option<String>,
    email: Option<Option<String>>,
    phone: Option<Option<String>>,
    status: Option<String>,
    source: Option<String>,
    notes: Option<Option<String>>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = tasks)]
struct DbTask {
    id: Uuid,
    user_id: Uuid,
    lead_id: Option<Uuid>,
    title: String,
    status: String,
    due_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = tasks)]
struct DbTaskChanges {
    title: Option<String>,
    status: Option<String>,
    due_date: Option<Option<NaiveDate>>,
    lead_id: Option<Option<Uuid>>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = users)]
struct DbUser {
    id: Uuid,
    email: String,
    password_hash: String,
    full_name: Option<String>,
    avatar_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = users)]
struct DbUserChanges {
    email: Option<String>,
    full_name: Option<String>,
    avatar_url: Option<String>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = user_sessions)]
struct DbSession {
    id: Uuid,
    user_id: Uuid,
    token_hash: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<DbLead> for Lead {
    type Error = StoreError;

    fn try_from(row: DbLead) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<LeadStatus>()
            .map_err(|e| StoreError::Corrupt(format!("lead {}: {e}", row.id)))?;
        Ok(Lead {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            status,
            source: row.source,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

impl From<&Lead> for DbLead {
    fn from(lead: &Lead) -> Self {
        Self {
            id: lead.id,
            user_id: lead.user_id,
            name: lead.name.clone(),
            email: lead.email.clone(),
            phone: lead.phone.clone(),
            status: lead.status.as_str().to_string(),
            source: lead.source.clone(),
            notes: lead.notes.clone(),
            created_at: lead.created_at,
        }
    }
}

impl TryFrom<DbTask> for Task {
    type Error = StoreError;

    fn try_from(row: DbTask) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<TaskStatus>()
            .map_err(|e| StoreError::Corrupt(format!("task {}: {e}", row.id)))?;
        Ok(Task {
            id: row.id,
            user_id: row.user_id,
            lead_id: row.lead_id,
            title: row.title,
            status,
            due_date: row.due_date,
            created_at: row.created_at,
        })
    }
}

impl From<&Task> for DbTask {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            user_id: task.user_id,
            lead_id: task.lead_id,
            title: task.title.clone(),
            status: task.status.as_str().to_string(),
            due_date: task.due_date,
            created_at: task.created_at,
        }
    }
}

impl From<DbUser> for User {
    fn from(row: DbUser) -> Self {
        Self {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            full_name: row.full_name,
            avatar_url: row.avatar_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<DbSession> for SessionRecord {
    fn from(row: DbSession) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            token_hash: row.token_hash,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

impl From<DieselError> for StoreError {
    fn from(e: DieselError) -> Self {
        match e {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::Conflict(info.message().to_string())
            }
            other => StoreError::Query(other.to_string()),
        }
    }
}

/// Escapes `LIKE` metacharacters so search terms match literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn convert_leads(rows: Vec<DbLead>) -> Result<Vec<Lead>, StoreError> {
    rows.into_iter().map(Lead::try_from).collect()
}

fn convert_tasks(rows: Vec<DbTask>) -> Result<Vec<Task>, StoreError> {
    rows.into_iter().map(Task::try_from).collect()
}

/// PostgreSQL-backed store. Diesel calls are blocking, so each operation runs on the
/// blocking thread pool with its own pooled connection.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> Result<T, StoreError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| {
                error!("Failed to get database connection: {e}");
                StoreError::Connection(e.to_string())
            })?;
            op(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Query(format!("Blocking task failed: {e}")))?
    }
}

#[async_trait]
impl CrmStore for PgStore {
    async fn list_leads(&self, owner: Uuid, query: &LeadQuery) -> Result<Vec<Lead>, StoreError> {
        let query = query.clone();
        self.run(move |conn| {
            let mut q = leads::table.filter(leads::user_id.eq(owner)).into_boxed();

            if let Some(status) = query.status {
                q = q.filter(leads::status.eq(status.as_str()));
            }

            if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                let pattern = format!("%{}%", escape_like(search));
                q = q.filter(
                    leads::name
                        .ilike(pattern.clone())
                        .or(leads::email.assume_not_null().ilike(pattern)),
                );
            }

            q = match query.order {
                SortOrder::Asc => q.order(leads::created_at.asc()),
                SortOrder::Desc => q.order(leads::created_at.desc()),
            };

            if let Some(limit) = query.limit {
                q = q.limit(limit);
            }
            if let Some(offset) = query.offset {
                q = q.offset(offset);
            }

            let rows: Vec<DbLead> = q.load(conn)?;
            trace!("Loaded {} lead(s) for owner {owner}", rows.len());
            convert_leads(rows)
        })
        .await
    }

    async fn list_leads_with_task_summary(
        &self,
        owner: Uuid,
        query: &LeadQuery,
    ) -> Result<Vec<(Lead, TaskSummary)>, StoreError> {
        let leads = self.list_leads(owner, query).await?;
        let ids: Vec<Uuid> = leads.iter().map(|l| l.id).collect();

        let children = self
            .run(move |conn| {
                let rows: Vec<DbTask> = tasks::table
                    .filter(tasks::user_id.eq(owner))
                    .filter(tasks::lead_id.eq_any(ids))
                    .load(conn)?;
                convert_tasks(rows)
            })
            .await?;

        let mut by_lead: HashMap<Uuid, Vec<Task>> = HashMap::new();
        for task in children {
            if let Some(lead_id) = task.lead_id {
                by_lead.entry(lead_id).or_default().push(task);
            }
        }

        Ok(leads
            .into_iter()
            .map(|lead| {
                let summary = by_lead
                    .get(&lead.id)
                    .map(|t| summarize_tasks(t))
                    .unwrap_or_default();
                (lead, summary)
            })
            .collect())
    }

    async fn count_leads(
        &self,
        owner: Uuid,
        status: Option<LeadStatus>,
    ) -> Result<i64, StoreError> {
        self.run(move |conn| {
            let mut q = leads::table.filter(leads::user_id.eq(owner)).into_boxed();
            if let Some(status) = status {
                q = q.filter(leads::status.eq(status.as_str()));
            }
            Ok(q.count().get_result(conn)?)
        })
        .await
    }

    async fn get_lead(&self, owner: Uuid, id: Uuid) -> Result<Option<Lead>, StoreError> {
        self.run(move |conn| {
            let row: Option<DbLead> = leads::table
                .filter(leads::id.eq(id))
                .filter(leads::user_id.eq(owner))
                .first(conn)
                .optional()?;
            row.map(Lead::try_from).transpose()
        })
        .await
    }

    async fn get_lead_with_tasks(
        &self,
        owner: Uuid,
        id: Uuid,
    ) -> Result<Option<LeadWithTasks>, StoreError> {
        self.run(move |conn| {
            let row: Option<DbLead> = leads::table
                .filter(leads::id.eq(id))
                .filter(leads::user_id.eq(owner))
                .first(conn)
                .optional()?;
            let Some(row) = row else {
                return Ok(None);
            };

            let task_rows: Vec<DbTask> = tasks::table
                .filter(tasks::lead_id.eq(id))
                .filter(tasks::user_id.eq(owner))
                .order(tasks::created_at.asc())
                .load(conn)?;

            Ok(Some(LeadWithTasks {
                lead: Lead::try_from(row)?,
                tasks: convert_tasks(task_rows)?,
            }))
        })
        .await
    }

    async fn insert_lead(&self, lead: &Lead) -> Result<(), StoreError> {
        let row = DbLead::from(lead);
        self.run(move |conn| {
            diesel::insert_into(leads::table).values(&row).execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn update_lead(
        &self,
        owner: Uuid,
        id: Uuid,
        changes: &LeadChanges,
    ) -> Result<Option<Lead>, StoreError> {
        if changes.is_empty() {
            return self.get_lead(owner, id).await;
        }
        let changeset = DbLeadChanges {
            name: changes.name.clone(),
            email: changes.email.clone(),
            phone: changes.phone.clone(),
            status: changes.status.map(|s| s.as_str().to_string()),
            source: changes.source.clone(),
            notes: changes.notes.clone(),
        };
        self.run(move |conn| {
            let row: Option<DbLead> = diesel::update(
                leads::table
                    .filter(leads::id.eq(id))
                    .filter(leads::user_id.eq(owner)),
            )
            .set(&changeset)
            .get_result(conn)
            .optional()?;
            row.map(Lead::try_from).transpose()
        })
        .await
    }

    async fn delete_lead(&self, owner: Uuid, id: Uuid) -> Result<bool, StoreError> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                diesel::update(
                    tasks::table
                        .filter(tasks::lead_id.eq(id))
                        .filter(tasks::user_id.eq(owner)),
                )
                .set(tasks::lead_id.eq(None::<Uuid>))
                .execute(conn)?;

                let deleted = diesel::delete(
                    leads::table
                        .filter(leads::id.eq(id))
                        .filter(leads::user_id.eq(owner)),
                )
                .execute(conn)?;
                Ok(deleted > 0)
            })
        })
        .await
    }

    async fn list_tasks(&self, owner: Uuid, query: &TaskQuery) -> Result<Vec<Task>, StoreError> {
        let query = query.clone();
        self.run(move |conn| {
            let mut q = tasks::table.filter(tasks::user_id.eq(owner)).into_boxed();

            if let Some(status) = query.status {
                q = q.filter(tasks::status.eq(status.as_str()));
            }
            if let Some(lead_id) = query.lead_id {
                q = q.filter(tasks::lead_id.eq(lead_id));
            }
            if query.global_only {
                q = q.filter(tasks::lead_id.is_null());
            }

            let rows: Vec<DbTask> = q.order(tasks::created_at.desc()).load(conn)?;
            convert_tasks(rows)
        })
        .await
    }

    async fn count_tasks(
        &self,
        owner: Uuid,
        status: Option<TaskStatus>,
    ) -> Result<i64, StoreError> {
        self.run(move |conn| {
            let mut q = tasks::table.filter(tasks::user_id.eq(owner)).into_boxed();
            if let Some(status) = status {
                q = q.filter(tasks::status.eq(status.as_str()));
            }
            Ok(q.count().get_result(conn)?)
        })
        .await
    }

    async fn get_task(&self, owner: Uuid, id: Uuid) -> Result<Option<Task>, StoreError> {
        self.run(move |conn| {
            let row: Option<DbTask> = tasks::table
                .filter(tasks::id.eq(id))
                .filter(tasks::user_id.eq(owner))
                .first(conn)
                .optional()?;
            row.map(Task::try_from).transpose()
        })
        .await
    }

    async fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        let row = DbTask::from(task);
        self.run(move |conn| {
            diesel::insert_into(tasks::table).values(&row).execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn update_task(
        &self,
        owner: Uuid,
        id: Uuid,
        changes: &TaskChanges,
    ) -> Result<Option<Task>, StoreError> {
        if changes.is_empty() {
            return self.get_task(owner, id).await;
        }
        let changeset = DbTaskChanges {
            title: changes.title.clone(),
            status: changes.status.map(|s| s.as_str().to_string()),
            due_date: changes.due_date,
            lead_id: changes.lead_id,
        };
        self.run(move |conn| {
            let row: Option<DbTask> = diesel::update(
                tasks::table
                    .filter(tasks::id.eq(id))
                    .filter(tasks::user_id.eq(owner)),
            )
            .set(&changeset)
            .get_result(conn)
            .optional()?;
            row.map(Task::try_from).transpose()
        })
        .await
    }

    async fn delete_task(&self, owner: Uuid, id: Uuid) -> Result<bool, StoreError> {
        self.run(move |conn| {
            let deleted = diesel::delete(
                tasks::table
                    .filter(tasks::id.eq(id))
                    .filter(tasks::user_id.eq(owner)),
            )
            .execute(conn)?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn ping(&self) -> bool {
        self.run(|conn| {
            diesel::sql_query("SELECT 1").execute(conn)?;
            Ok(())
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let row = DbUser {
            id: user.id,
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            full_name: user.full_name.clone(),
            avatar_url: user.avatar_url.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        };
        self.run(move |conn| {
            diesel::insert_into(users::table).values(&row).execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.run(move |conn| {
            let row: Option<DbUser> = users::table.find(id).first(conn).optional()?;
            Ok(row.map(User::from))
        })
        .await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = email.to_string();
        self.run(move |conn| {
            let row: Option<DbUser> = users::table
                .filter(users::email.eq(email))
                .first(conn)
                .optional()?;
            Ok(row.map(User::from))
        })
        .await
    }

    async fn update_user(
        &self,
        id: Uuid,
        changes: &UserChanges,
    ) -> Result<Option<User>, StoreError> {
        let changeset = DbUserChanges {
            email: changes.email.clone(),
            full_name: changes.full_name.clone(),
            avatar_url: changes.avatar_url.clone(),
            updated_at: Utc::now(),
        };
        self.run(move |conn| {
            let row: Option<DbUser> = diesel::update(users::table.find(id))
                .set(&changeset)
                .get_result(conn)
                .optional()?;
            Ok(row.map(User::from))
        })
        .await
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                diesel::delete(tasks::table.filter(tasks::user_id.eq(id))).execute(conn)?;
                diesel::delete(leads::table.filter(leads::user_id.eq(id))).execute(conn)?;
                diesel::delete(user_sessions::table.filter(user_sessions::user_id.eq(id)))
                    .execute(conn)?;
                let deleted = diesel::delete(users::table.find(id)).execute(conn)?;
                Ok(deleted > 0)
            })
        })
        .await
    }

    async fn insert_session(&self, session: &SessionRecord) -> Result<(), StoreError> {
        let row = DbSession {
            id: session.id,
            user_id: session.user_id,
            token_hash: session.token_hash.clone(),
            created_at: session.created_at,
            expires_at: session.expires_at,
        };
        self.run(move |conn| {
            diesel::insert_into(user_sessions::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn find_session(&self, token_hash: &str) -> Result<Option<SessionRecord>, StoreError> {
        let token_hash = token_hash.to_string();
        self.run(move |conn| {
            let row: Option<DbSession> = user_sessions::table
                .filter(user_sessions::token_hash.eq(token_hash))
                .first(conn)
                .optional()?;
            Ok(row.map(SessionRecord::from))
        })
        .await
    }

    async fn delete_session(&self, token_hash: &str) -> Result<bool, StoreError> {
        let token_hash = token_hash.to_string();
        self.run(move |conn| {
            let deleted = diesel::delete(
                user_sessions::table.filter(user_sessions::token_hash.eq(token_hash)),
            )
            .execute(conn)?;
            Ok(deleted > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("acme"), "acme");
        assert_eq!(escape_like("50%"), "50\\%");
        assert_eq!(escape_like("first_name"), "first\\_name");
        assert_eq!(escape_like(r"a\b"), r"a\\b");
    }

    #[test]
    fn test_lead_row_conversion() {
        let lead = Lead::new(Uuid::new_v4(), "Acme");
        let row = DbLead::from(&lead);
        assert_eq!(row.status, "New");
        assert_eq!(Lead::try_from(row).unwrap(), lead);
    }

    #[test]
    fn test_unknown_status_in_row_is_corrupt() {
        let mut row = DbTask::from(&Task::new(Uuid::new_v4(), "Call"));
        row.status = "Done".to_string();
        assert!(matches!(Task::try_from(row), Err(StoreError::Corrupt(_))));
    }
}
