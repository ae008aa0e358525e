//! Usage: Server-rendered HTML (dashboard shell and OAuth result pages).

use crate::app::forms_store::FormsSnapshot;

const PAGE_STYLE: &str = "font-family: Arial, sans-serif; text-align: center; padding: 50px;";

pub(crate) fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn message_page(title: &str, body: &str, link_home: bool, extra: &str) -> String {
    let home = if link_home {
        r#"<p><a href="/">Return to Dashboard</a></p>"#
    } else {
        "<p>Return to your application.</p>"
    };
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body style=\"{PAGE_STYLE}\"><h2>{title}</h2>{body}{home}{extra}</body></html>",
        title = escape_html(title),
    )
}

/// Web callback success. Closes the popup and refreshes the opener.
pub(crate) fn auth_success_page(loading_started: bool) -> String {
    let status = if loading_started {
        "<p>Loading your ACC Forms data...</p>"
    } else {
        "<p>A data load is already running.</p>"
    };
    let script = "<script>setTimeout(function () { if (window.opener) { window.opener.location.reload(); } window.close(); }, 3000);</script>";
    message_page("Authentication Successful", status, true, script)
}

/// Page served by the local browser-login listener.
pub(crate) fn local_auth_success_page() -> String {
    message_page(
        "Authentication Successful",
        "<p>You can close this browser window.</p>",
        false,
        "",
    )
}

pub(crate) fn auth_failed_page(message: &str, link_home: bool) -> String {
    let body = format!("<p>{}</p>", escape_html(message));
    message_page("Authentication Failed", &body, link_home, "")
}

pub(crate) fn not_found_page() -> String {
    message_page("Not Found", "", false, "")
}

pub(crate) fn dashboard_page(snapshot: &FormsSnapshot, auth_mode: &str) -> String {
    let last_update = snapshot
        .last_update
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "Never".to_string());
    let error = snapshot
        .error_message
        .as_deref()
        .map(|e| format!(r#"<div class="error">{}</div>"#, escape_html(e)))
        .unwrap_or_default();
    let issues: String = snapshot
        .issues
        .iter()
        .map(|issue| format!("<li>{}</li>", escape_html(issue)))
        .collect();
    let issues = if issues.is_empty() {
        String::new()
    } else {
        format!(r#"<ul class="issues">{issues}</ul>"#)
    };

    format!(
        r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>ACC Forms Dashboard</title>
<style>
body {{ font-family: Arial, sans-serif; margin: 2rem; color: #222; }}
.stats span {{ display: inline-block; margin-right: 2rem; }}
.error {{ color: #b00020; margin: 1rem 0; }}
.issues {{ color: #8a6d3b; }}
table {{ border-collapse: collapse; margin-top: 1rem; width: 100%; }}
th, td {{ border: 1px solid #ddd; padding: 0.4rem; text-align: left; }}
</style>
</head>
<body>
<h1>ACC Forms Dashboard</h1>
<div class="stats">
  <span>Forms: <strong id="forms-count">{forms_count}</strong></span>
  <span>Last update: <strong id="last-update">{last_update}</strong></span>
  <span>Status: <strong id="loading">{loading}</strong></span>
  <span>Auth mode: <strong>{auth_mode}</strong></span>
</div>
<div id="error">{error}</div>
{issues}
<p>
  <button id="load">Load Data</button>
  <a href="/api/export-csv">Export CSV</a>
</p>
<table id="forms"><thead><tr>
  <th>#</th><th>Name</th><th>Template</th><th>Status</th><th>Date</th><th>Custom fields</th><th>Tables</th>
</tr></thead><tbody></tbody></table>
<script>
async function refreshStatus() {{
  const res = await fetch('/api/status');
  const s = await res.json();
  document.getElementById('forms-count').textContent = s.forms_count;
  document.getElementById('last-update').textContent = s.last_update || 'Never';
  document.getElementById('loading').textContent = s.is_loading ? 'Loading...' : 'Idle';
  document.getElementById('error').textContent = s.error_message || '';
  if (s.is_loading) {{ setTimeout(refreshStatus, 2000); }} else {{ loadTable(); }}
}}
async function loadTable() {{
  const res = await fetch('/api/forms-data');
  const body = await res.json();
  const tbody = document.querySelector('#forms tbody');
  tbody.textContent = '';
  if (body.status !== 'success') {{ return; }}
  for (const f of body.data) {{
    const tr = document.createElement('tr');
    for (const v of [f.formNum, f.name, f.templateName, f.status, f.formDate, f.customFieldsCount, f.tabularDataCount]) {{
      const td = document.createElement('td');
      td.textContent = v == null ? '' : v;
      tr.appendChild(td);
    }}
    tbody.appendChild(tr);
  }}
}}
document.getElementById('load').addEventListener('click', async () => {{
  const res = await fetch('/api/load-data', {{ method: 'POST' }});
  const body = await res.json();
  if (body.status === 'auth_required') {{
    const start = await (await fetch(body.auth_url)).json();
    if (start.status === 'success') {{ window.open(start.auth_url, 'acc-auth', 'width=600,height=700'); }}
    else {{ document.getElementById('error').textContent = start.message; }}
  }} else if (body.status === 'error') {{
    document.getElementById('error').textContent = body.message;
  }}
  refreshStatus();
}});
refreshStatus();
</script>
</body>
</html>
"#,
        forms_count = snapshot.forms.len(),
        loading = if snapshot.is_loading { "Loading..." } else { "Idle" },
        auth_mode = escape_html(auth_mode),
    )
}
