use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::layout::{app_page, auth_page, avatar, error_page, html_escape, not_found_page, Nav};
use crate::auth::{AuthError, OptionalAuth};
use crate::core::shared::models::{
    Lead, LeadQuery, LeadStatus, Profile, Task, TaskQuery, TaskStatus,
};
use crate::core::shared::state::AppState;
use crate::crm::dashboard::collect_metrics;
use crate::crm::score_lead::{calculate_lead_score, priority_for};
use crate::storage::StoreError;
use crate::tasks::types::due_state;

#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        log::error!("Page render failed: {self}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(error_page("The page could not be loaded. Please try again.")),
        )
            .into_response()
    }
}

type PageResult = Result<Response, PageError>;

fn to_login() -> Response {
    Redirect::to("/login").into_response()
}

fn status_label(status: LeadStatus) -> &'static str {
    match status {
        LeadStatus::New => "New lead",
        LeadStatus::Proposal => "Proposal sent",
        LeadStatus::FollowUp => "Follow-up",
        LeadStatus::Converted => "Converted",
        LeadStatus::Lost => "Lost",
    }
}

fn status_options(selected: Option<LeadStatus>) -> String {
    LeadStatus::ALL
        .iter()
        .map(|s| {
            let sel = if Some(*s) == selected { " selected" } else { "" };
            format!(
                r#"<option value="{}"{sel}>{}</option>"#,
                s.as_str(),
                status_label(*s)
            )
        })
        .collect()
}

fn lead_row(lead: &Lead, pending: Option<usize>) -> String {
    let score = calculate_lead_score(lead);
    let priority = priority_for(score).as_str();
    let tasks = pending
        .map(|p| format!("<td>{p}</td>"))
        .unwrap_or_default();
    format!(
        r#"<tr><td><a href="/leads/{id}">{name}</a></td><td>{email}</td><td>{status}</td><td>{score} <span class="badge {priority}">{priority}</span></td>{tasks}<td>{created}</td></tr>"#,
        id = lead.id,
        name = html_escape(&lead.name),
        email = html_escape(lead.email.as_deref().unwrap_or("-")),
        status = status_label(lead.status),
        created = lead.created_at.format("%Y-%m-%d"),
    )
}

fn task_item(task: &Task, lead_name: Option<&str>) -> String {
    let today = Utc::now().date_naive();
    let done = task.status == TaskStatus::Completed;
    let due = task
        .due_date
        .map(|d| {
            format!(
                r#" <small class="{:?}">due {}</small>"#,
                due_state(task, today),
                d.format("%Y-%m-%d")
            )
        })
        .unwrap_or_default();
    let lead = lead_name
        .zip(task.lead_id)
        .map(|(name, id)| format!(r#" <small>· <a href="/leads/{id}">{}</a></small>"#, html_escape(name)))
        .unwrap_or_default();
    format!(
        r#"<tr data-id="{id}"><td><input type="checkbox" class="toggle" style="width:auto"{checked}></td><td class="{class}">{title}{due}{lead}</td><td><button class="ghost delete-task">Delete</button></td></tr>"#,
        id = task.id,
        checked = if done { " checked" } else { "" },
        class = if done { "done" } else { "" },
        title = html_escape(&task.title),
    )
}

pub async fn index_page() -> Redirect {
    Redirect::to("/login")
}

const LOGIN_JS: &str = r#"
document.getElementById('auth-form').addEventListener('submit', async (ev) => {
  ev.preventDefault();
  try {
    await api('POST', ev.target.dataset.action, formData(ev.target));
    window.location = '/dashboard';
  } catch (e) { showError('auth-error', e); }
});
"#;

pub async fn login_page(OptionalAuth(user): OptionalAuth) -> Response {
    if user.is_some() {
        return Redirect::to("/dashboard").into_response();
    }
    Html(auth_page(
        "Sign in",
        &format!(
            r#"<h2>Sign in to LeadPilot</h2>
<form id="auth-form" data-action="/api/auth/signin">
<input name="email" type="email" placeholder="Email" required>
<input name="password" type="password" placeholder="Password" required>
<p class="error" id="auth-error"></p>
<button type="submit">Sign in</button>
</form>
<p>No account yet? <a href="/register">Create one</a></p>
<script>{LOGIN_JS}</script>"#
        ),
    ))
    .into_response()
}

pub async fn register_page(OptionalAuth(user): OptionalAuth) -> Response {
    if user.is_some() {
        return Redirect::to("/dashboard").into_response();
    }
    Html(auth_page(
        "Create account",
        &format!(
            r#"<h2>Create your account</h2>
<form id="auth-form" data-action="/api/auth/signup">
<input name="full_name" placeholder="Full name">
<input name="email" type="email" placeholder="Email" required>
<input name="password" type="password" placeholder="Password (min. 6 characters)" minlength="6" required>
<p class="error" id="auth-error"></p>
<button type="submit">Create account</button>
</form>
<p>Already registered? <a href="/login">Sign in</a></p>
<script>{LOGIN_JS}</script>"#
        ),
    ))
    .into_response()
}

pub async fn dashboard_page(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
) -> PageResult {
    let Some(user) = user else {
        return Ok(to_login());
    };
    let profile = Profile::from(&user.user);
    let metrics = collect_metrics(state.crm.as_ref(), user.id(), Utc::now().date_naive()).await?;

    let recent = if metrics.recent_leads.is_empty() {
        r#"<p>No leads yet. <a href="/leads">Add your first lead</a>.</p>"#.to_string()
    } else {
        let rows: String = metrics
            .recent_leads
            .iter()
            .map(|l| lead_row(&l.lead, Some(l.tasks.pending)))
            .collect();
        format!(
            "<table><tr><th>Name</th><th>Email</th><th>Status</th><th>Score</th><th>Open tasks</th><th>Created</th></tr>{rows}</table>"
        )
    };

    let due = if metrics.due_tasks.is_empty() {
        "<p>Nothing due today.</p>".to_string()
    } else {
        let rows: String = metrics.due_tasks.iter().map(|t| task_item(t, None)).collect();
        format!("<table>{rows}</table>")
    };

    let content = format!(
        r#"<div class="grid">
<div class="card"><div>Total leads</div><div class="metric">{total}</div></div>
<div class="card"><div>Active leads</div><div class="metric">{active}</div></div>
<div class="card"><div>Converted</div><div class="metric">{converted}</div></div>
<div class="card"><div>Lost</div><div class="metric">{lost}</div></div>
<div class="card"><div>Pending tasks</div><div class="metric" id="pending-count">{pending}</div></div>
<div class="card"><div>Completed tasks</div><div class="metric">{completed}</div></div>
</div>
<div class="card"><h3>Recent leads</h3>{recent}</div>
<div class="card"><h3>Due and overdue</h3>{due}</div>
<script>{TASKS_JS}</script>"#,
        total = metrics.total_leads,
        active = metrics.active_leads,
        converted = metrics.converted_leads,
        lost = metrics.lost_leads,
        pending = metrics.pending_tasks,
        completed = metrics.completed_tasks,
    );

    Ok(Html(app_page("Dashboard", &profile, Nav::Dashboard, &content)).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct LeadsPageQuery {
    pub status: Option<String>,
    pub search: Option<String>,
}

const LEADS_JS: &str = r#"
document.getElementById('lead-form').addEventListener('submit', async (ev) => {
  ev.preventDefault();
  try {
    const lead = await api('POST', '/api/leads', formData(ev.target));
    window.location = '/leads/' + lead.id;
  } catch (e) { showError('lead-error', e); }
});
"#;

pub async fn leads_page(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<LeadsPageQuery>,
) -> PageResult {
    let Some(user) = user else {
        return Ok(to_login());
    };
    let profile = Profile::from(&user.user);
    let status = query
        .status
        .as_deref()
        .and_then(|s| s.parse::<LeadStatus>().ok());
    let search = query
        .search
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let lead_query = LeadQuery {
        status,
        search: search.clone(),
        ..Default::default()
    };
    let rows: String = state
        .crm
        .list_leads_with_task_summary(user.id(), &lead_query)
        .await?
        .iter()
        .map(|(lead, summary)| lead_row(lead, Some(summary.pending)))
        .collect();

    let table = if rows.is_empty() {
        "<p>No leads match.</p>".to_string()
    } else {
        format!("<table><tr><th>Name</th><th>Email</th><th>Status</th><th>Score</th><th>Open tasks</th><th>Created</th></tr>{rows}</table>")
    };

    let content = format!(
        r#"<div class="card">
<form method="get" style="display:flex;gap:10px">
<input name="search" placeholder="Search name or email" value="{search}">
<select name="status"><option value="">All statuses</option>{filter_options}</select>
<button type="submit">Filter</button>
</form>
{table}
</div>
<div class="card"><h3>New lead</h3>
<form id="lead-form">
<input name="name" placeholder="Name" required>
<input name="email" type="email" placeholder="Email">
<input name="phone" placeholder="Phone">
<select name="status">{new_options}</select>
<input name="source" placeholder="Source (default: Manual)">
<textarea name="notes" placeholder="Notes"></textarea>
<p class="error" id="lead-error"></p>
<button type="submit">Add lead</button>
</form></div>
<script>{LEADS_JS}</script>"#,
        search = html_escape(search.as_deref().unwrap_or_default()),
        filter_options = status_options(status),
        new_options = status_options(Some(LeadStatus::New)),
    );

    Ok(Html(app_page("Leads", &profile, Nav::Leads, &content)).into_response())
}

const LEAD_DETAIL_JS: &str = r#"
const leadId = document.getElementById('lead').dataset.id;
document.getElementById('lead-status').addEventListener('change', async (ev) => {
  try { await api('PUT', '/api/leads/' + leadId, { status: ev.target.value }); window.location.reload(); }
  catch (e) { showError('lead-error', e); }
});
document.getElementById('lead-form').addEventListener('submit', async (ev) => {
  ev.preventDefault();
  const data = Object.fromEntries(new FormData(ev.target));
  try { await api('PUT', '/api/leads/' + leadId, data); window.location.reload(); }
  catch (e) { showError('lead-error', e); }
});
document.getElementById('insight-btn').addEventListener('click', async (ev) => {
  ev.target.disabled = true;
  ev.target.textContent = 'Analyzing...';
  try {
    const insight = await api('GET', '/api/leads/' + leadId + '/insight');
    document.getElementById('insight').textContent = insight.recommendation;
    document.getElementById('insight-score').textContent = insight.score + ' (' + insight.priority + ')';
  } catch (e) { showError('lead-error', e); }
  ev.target.disabled = false;
  ev.target.textContent = 'Get recommendation';
});
document.getElementById('task-form').addEventListener('submit', async (ev) => {
  ev.preventDefault();
  const data = formData(ev.target);
  data.lead_id = leadId;
  try { await api('POST', '/api/tasks', data); window.location.reload(); }
  catch (e) { showError('lead-error', e); }
});
document.getElementById('delete-lead').addEventListener('click', async () => {
  if (!confirm('Delete this lead? Its tasks are kept as general tasks.')) return;
  try { await api('DELETE', '/api/leads/' + leadId); window.location = '/leads'; }
  catch (e) { showError('lead-error', e); }
});
"#;

pub async fn lead_detail_page(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
    Path(id): Path<String>,
) -> PageResult {
    let Some(user) = user else {
        return Ok(to_login());
    };
    let Ok(id) = Uuid::parse_str(&id) else {
        return Ok(Redirect::to("/leads").into_response());
    };
    let Some(detail) = state.crm.get_lead_with_tasks(user.id(), id).await? else {
        return Ok(Redirect::to("/leads").into_response());
    };
    let profile = Profile::from(&user.user);
    let lead = &detail.lead;
    let score = calculate_lead_score(lead);

    let tasks = if detail.tasks.is_empty() {
        "<p>No linked tasks.</p>".to_string()
    } else {
        let rows: String = detail.tasks.iter().map(|t| task_item(t, None)).collect();
        format!("<table>{rows}</table>")
    };

    let content = format!(
        r#"<div id="lead" data-id="{id}">
<p><a href="/leads">&larr; All leads</a></p>
<p class="error" id="lead-error"></p>
<div class="grid">
<div class="card">
<h3>Contact</h3>
<p>Email: {email}</p>
<p>Phone: {phone}</p>
<p>Source: {source}</p>
<p>Since: {created}</p>
<label>Pipeline stage</label>
<select id="lead-status">{options}</select>
<p>Score: <strong id="insight-score">{score} ({priority})</strong></p>
<button id="delete-lead" class="danger">Delete lead</button>
</div>
<div class="card">
<h3>Recommendation</h3>
<p id="insight">Ask for a recommendation based on this lead's data.</p>
<button id="insight-btn">Get recommendation</button>
</div>
</div>
<div class="card"><h3>Details</h3>
<form id="lead-form">
<input name="name" value="{name}" required>
<input name="email" type="email" value="{email_value}" placeholder="Email">
<input name="phone" value="{phone_value}" placeholder="Phone">
<textarea name="notes" rows="6" placeholder="Conversation history...">{notes}</textarea>
<button type="submit">Save</button>
</form></div>
<div class="card"><h3>Tasks</h3>{tasks}
<form id="task-form" style="display:flex;gap:10px;margin-top:12px">
<input name="title" placeholder="New task" required>
<input name="due_date" type="date">
<button type="submit">Add</button>
</form></div>
</div>
<script>{LEAD_DETAIL_JS}</script>
<script>{TASKS_JS}</script>"#,
        email = html_escape(lead.email.as_deref().unwrap_or("No email")),
        phone = html_escape(lead.phone.as_deref().unwrap_or("No phone")),
        source = html_escape(&lead.source),
        created = lead.created_at.format("%Y-%m-%d"),
        options = status_options(Some(lead.status)),
        priority = priority_for(score).as_str(),
        name = html_escape(&lead.name),
        email_value = html_escape(lead.email.as_deref().unwrap_or_default()),
        phone_value = html_escape(lead.phone.as_deref().unwrap_or_default()),
        notes = html_escape(lead.notes.as_deref().unwrap_or_default()),
    );

    Ok(Html(app_page(&lead.name, &profile, Nav::Leads, &content)).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct TasksPageQuery {
    pub status: Option<String>,
    #[serde(default)]
    pub global_only: bool,
}

const TASKS_JS: &str = r#"
document.querySelectorAll('.toggle').forEach((box) => box.addEventListener('change', async (ev) => {
  const row = ev.target.closest('tr');
  try {
    const res = await api('POST', '/api/tasks/' + row.dataset.id + '/toggle');
    row.querySelector('td:nth-child(2)').classList.toggle('done', res.task.status === 'Completed');
    const counter = document.getElementById('pending-count');
    if (counter) counter.textContent = res.pending_count;
  } catch (e) { ev.target.checked = !ev.target.checked; alert(e.message); }
}));
document.querySelectorAll('.delete-task').forEach((btn) => btn.addEventListener('click', async (ev) => {
  const row = ev.target.closest('tr');
  try { await api('DELETE', '/api/tasks/' + row.dataset.id); row.remove(); }
  catch (e) { alert(e.message); }
}));
const taskForm = document.getElementById('new-task-form');
if (taskForm) taskForm.addEventListener('submit', async (ev) => {
  ev.preventDefault();
  try { await api('POST', '/api/tasks', formData(ev.target)); window.location.reload(); }
  catch (e) { showError('task-error', e); }
});
"#;

pub async fn tasks_page(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<TasksPageQuery>,
) -> PageResult {
    let Some(user) = user else {
        return Ok(to_login());
    };
    let profile = Profile::from(&user.user);
    let status = query
        .status
        .as_deref()
        .and_then(|s| s.parse::<TaskStatus>().ok());

    let task_query = TaskQuery {
        status,
        lead_id: None,
        global_only: query.global_only,
    };
    let tasks = state.crm.list_tasks(user.id(), &task_query).await?;
    let leads = state.crm.list_leads(user.id(), &LeadQuery::default()).await?;
    let pending = state
        .crm
        .count_tasks(user.id(), Some(TaskStatus::Pending))
        .await?;

    let names: HashMap<Uuid, &str> = leads.iter().map(|l| (l.id, l.name.as_str())).collect();
    let rows: String = tasks
        .iter()
        .map(|t| task_item(t, t.lead_id.and_then(|id| names.get(&id).copied())))
        .collect();
    let list = if rows.is_empty() {
        "<p>No tasks here.</p>".to_string()
    } else {
        format!("<table>{rows}</table>")
    };
    let lead_options: String = leads
        .iter()
        .map(|l| format!(r#"<option value="{}">{}</option>"#, l.id, html_escape(&l.name)))
        .collect();

    let content = format!(
        r#"<div class="card">
<p><strong id="pending-count">{pending}</strong> pending ·
<a href="/tasks">All</a> · <a href="/tasks?status=Pending">Pending</a> ·
<a href="/tasks?status=Completed">Completed</a> · <a href="/tasks?global_only=true">General</a></p>
{list}
</div>
<div class="card"><h3>New task</h3>
<form id="new-task-form">
<input name="title" placeholder="Title" required>
<input name="due_date" type="date">
<select name="lead_id"><option value="">General task (no lead)</option>{lead_options}</select>
<p class="error" id="task-error"></p>
<button type="submit">Add task</button>
</form></div>
<script>{TASKS_JS}</script>"#
    );

    Ok(Html(app_page("Tasks", &profile, Nav::Tasks, &content)).into_response())
}

const SETTINGS_JS: &str = r#"
document.getElementById('profile-form').addEventListener('submit', async (ev) => {
  ev.preventDefault();
  try { await api('PUT', '/api/auth/user', formData(ev.target)); window.location.reload(); }
  catch (e) { showError('settings-error', e); }
});
document.getElementById('avatar-input').addEventListener('change', async (ev) => {
  const file = ev.target.files[0];
  if (!file) return;
  const res = await fetch('/api/auth/user/avatar', {
    method: 'POST', credentials: 'same-origin',
    headers: { 'Content-Type': file.type }, body: file,
  });
  if (res.ok) { window.location.reload(); return; }
  const data = await res.json().catch(() => null);
  showError('settings-error', new Error((data && data.error) || res.statusText));
});
document.getElementById('signout').addEventListener('click', async () => {
  await api('POST', '/api/auth/signout');
  window.location = '/login';
});
document.getElementById('delete-account').addEventListener('click', async () => {
  if (!confirm('Delete your account and all leads and tasks? This cannot be undone.')) return;
  try { await api('DELETE', '/api/auth/user'); window.location = '/register'; }
  catch (e) { showError('settings-error', e); }
});
"#;

pub async fn settings_page(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
) -> PageResult {
    let Some(user) = user else {
        return Ok(to_login());
    };
    let profile = Profile::from(&user.user);
    let capture_url = format!(
        "{}/c/{}",
        state.config.server.base_url.trim_end_matches('/'),
        user.id()
    );

    let content = format!(
        r#"<p class="error" id="settings-error"></p>
<div class="card"><h3>Profile</h3>
<p>{avatar}</p>
<label>Avatar (PNG, JPEG, WebP or GIF)</label>
<input id="avatar-input" type="file" accept="image/png,image/jpeg,image/webp,image/gif">
<form id="profile-form">
<input name="full_name" value="{full_name}" placeholder="Full name">
<input name="email" type="email" value="{email}" required>
<button type="submit">Save profile</button>
</form></div>
<div class="card"><h3>Public capture page</h3>
<p>Share this link to collect leads: <a href="{capture}">{capture}</a></p></div>
<div class="card"><h3>Session</h3>
<button id="signout" class="ghost">Sign out</button>
<button id="delete-account" class="danger">Delete account</button></div>
<script>{SETTINGS_JS}</script>"#,
        avatar = avatar(&profile),
        full_name = html_escape(user.user.full_name.as_deref().unwrap_or_default()),
        email = html_escape(&user.user.email),
        capture = html_escape(&capture_url),
    );

    Ok(Html(app_page("Settings", &profile, Nav::Settings, &content)).into_response())
}

const CAPTURE_JS: &str = r#"
document.getElementById('capture-form').addEventListener('submit', async (ev) => {
  ev.preventDefault();
  try {
    await api('POST', ev.target.dataset.action, formData(ev.target));
    ev.target.outerHTML = '<p>Thanks! We will get in touch soon.</p>';
  } catch (e) { showError('capture-error', e); }
});
"#;

pub async fn capture_page(
    State(state): State<Arc<AppState>>,
    Path(owner): Path<String>,
) -> PageResult {
    let owner = match Uuid::parse_str(&owner) {
        Ok(id) => state.auth.find_user(id).await?,
        Err(_) => None,
    };
    let Some(owner) = owner else {
        return Ok(not_found().await);
    };
    let profile = Profile::from(&owner);

    Ok(Html(auth_page(
        "Get in touch",
        &format!(
            r#"<h2>Talk to {name}</h2>
<form id="capture-form" data-action="/api/public/capture/{id}">
<input name="name" placeholder="Your name" required>
<input name="email" type="email" placeholder="Email">
<input name="phone" placeholder="Phone">
<textarea name="notes" placeholder="How can we help?"></textarea>
<p class="error" id="capture-error"></p>
<button type="submit">Send</button>
</form>
<script>{CAPTURE_JS}</script>"#,
            name = html_escape(&profile.name),
            id = owner.id,
        ),
    ))
    .into_response())
}

pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Html(not_found_page())).into_response()
}
