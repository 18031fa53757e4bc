use crate::core::shared::models::Profile;

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

const STYLE: &str = r#"
*{box-sizing:border-box}body{margin:0;font-family:system-ui,sans-serif;background:#f5f6f8;color:#1f2430}
a{color:#3b5bdb;text-decoration:none}
.shell{display:flex;min-height:100vh}
.sidebar{width:220px;background:#1f2430;color:#fff;padding:24px 16px}
.sidebar h1{font-size:20px;margin:0 0 24px}
.sidebar a{display:block;color:#c9cdd6;padding:8px 12px;border-radius:6px}
.sidebar a.active,.sidebar a:hover{background:#343a4a;color:#fff}
.main{flex:1;padding:24px 32px}
.header{display:flex;justify-content:space-between;align-items:center;margin-bottom:24px}
.avatar{width:36px;height:36px;border-radius:50%;background:#3b5bdb;color:#fff;display:inline-flex;align-items:center;justify-content:center;font-weight:600;overflow:hidden}
.avatar img{width:100%;height:100%;object-fit:cover}
.card{background:#fff;border-radius:10px;padding:20px;box-shadow:0 1px 3px rgba(0,0,0,.08);margin-bottom:20px}
.grid{display:grid;grid-template-columns:repeat(auto-fit,minmax(180px,1fr));gap:16px}
.metric{font-size:28px;font-weight:700}
table{width:100%;border-collapse:collapse}th,td{text-align:left;padding:8px;border-bottom:1px solid #eceef2}
input,select,textarea{width:100%;padding:8px 10px;border:1px solid #d0d4dc;border-radius:6px;font:inherit;margin-bottom:10px}
button{background:#3b5bdb;color:#fff;border:0;border-radius:6px;padding:8px 14px;cursor:pointer}
button.danger{background:#e03131}button.ghost{background:#e9ecf2;color:#1f2430}
.badge{font-size:11px;font-weight:700;text-transform:uppercase;padding:2px 8px;border-radius:10px;background:#e9ecf2}
.Hot{background:#ffe3e3;color:#c92a2a}.Warm{background:#fff3bf;color:#e67700}.Cold{background:#e7f5ff;color:#1971c2}
.Overdue{color:#c92a2a}.DueToday{color:#e67700}.done{text-decoration:line-through;color:#868e96}
.auth{max-width:380px;margin:80px auto}.error{color:#c92a2a;min-height:20px}
"#;

const SCRIPT: &str = r#"
async function api(method, url, body) {
  const opts = { method, headers: {}, credentials: 'same-origin' };
  if (body !== undefined) {
    opts.headers['Content-Type'] = 'application/json';
    opts.body = JSON.stringify(body);
  }
  const res = await fetch(url, opts);
  if (res.status === 401 && !url.startsWith('/api/auth/sign')) { window.location = '/login'; return null; }
  const data = res.status === 204 ? null : await res.json().catch(() => null);
  if (!res.ok) throw new Error((data && data.error) || res.statusText);
  return data;
}
function formData(form) {
  const out = {};
  new FormData(form).forEach((v, k) => { if (v !== '') out[k] = v; });
  return out;
}
function showError(id, e) { document.getElementById(id).textContent = e.message; }
"#;

fn document(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} · LeadPilot</title>
<style>{STYLE}</style>
<script>{SCRIPT}</script>
</head>
<body>
{body}
</body>
</html>"#,
        title = html_escape(title),
    )
}

/// Centered card used by the sign-in, registration and public capture screens.
pub fn auth_page(title: &str, body: &str) -> String {
    document(
        title,
        &format!(r#"<div class="auth"><div class="card">{body}</div></div>"#),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nav {
    Dashboard,
    Leads,
    Tasks,
    Settings,
}

fn nav_link(href: &str, label: &str, active: bool) -> String {
    let class = if active { r#" class="active""# } else { "" };
    format!(r#"<a href="{href}"{class}>{label}</a>"#)
}

pub fn avatar(profile: &Profile) -> String {
    match &profile.avatar {
        Some(url) => format!(
            r#"<span class="avatar"><img src="{}" alt=""></span>"#,
            html_escape(url)
        ),
        None => format!(
            r#"<span class="avatar">{}</span>"#,
            html_escape(&profile.initials)
        ),
    }
}

pub fn app_page(title: &str, profile: &Profile, active: Nav, content: &str) -> String {
    let nav = [
        ("/dashboard", "Dashboard", Nav::Dashboard),
        ("/leads", "Leads", Nav::Leads),
        ("/tasks", "Tasks", Nav::Tasks),
        ("/settings", "Settings", Nav::Settings),
    ]
    .iter()
    .map(|(href, label, nav)| nav_link(href, label, *nav == active))
    .collect::<String>();

    document(
        title,
        &format!(
            r#"<div class="shell">
<nav class="sidebar"><h1>LeadPilot</h1>{nav}</nav>
<main class="main">
<div class="header"><h2>{title}</h2><div>{name} {avatar}</div></div>
{content}
</main>
</div>"#,
            title = html_escape(title),
            name = html_escape(&profile.name),
            avatar = avatar(profile),
        ),
    )
}

pub fn not_found_page() -> String {
    auth_page(
        "Page not found",
        r#"<h2>404</h2><p>The page you are looking for does not exist.</p><p><a href="/dashboard">Back to the dashboard</a></p>"#,
    )
}

pub fn error_page(message: &str) -> String {
    auth_page(
        "Something went wrong",
        &format!(
            r#"<h2>Something went wrong</h2><p class="error">{}</p><p><a href="/dashboard">Back to the dashboard</a></p>"#,
            html_escape(message)
        ),
    )
}
