mod app;
mod domain;
mod gateway;
mod infra;
mod shared;
pub mod test_support;

pub use app::app_state::{DashboardState, PendingLogin, PENDING_LOGIN_TTL_SECS};
pub use app::data_load::{run_fetch_cycle, spawn_fetch_cycle, start_load, LoadStart};
pub use app::forms_store::{
    FormsSnapshot, FormsStore, LoadTicket, LOAD_ABORTED_MESSAGE, NO_FORMS_MESSAGE,
};
pub use domain::export::{
    export_file_name, export_forms_csv, form_rows, summarize_form, summarize_forms, CsvRow,
    FormSummary, TableSummary, CSV_COLUMNS,
};
pub use domain::forms::{
    AccFormsClient, FormRecord, FormTemplate, FormsReport, FormsSource, PagedForms,
    TemplateStamp, FORMS_PAGE_SIZE,
};
pub use gateway::oauth::{AccAuthenticator, BrowserLoginOutcome, TokenSet};
pub use gateway::{DashboardServer, DashboardStatus, CALLBACK_ROUTE};
pub use infra::settings::{AuthMode, Settings};
pub use shared::error::{AppError, AppResult};

/// Run the dashboard until Ctrl-C.
pub async fn run() -> AppResult<()> {
    let _log_guard = app::logging::init(infra::settings::log_dir_from_env().as_deref())?;

    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        tracing::error!(location = %location, "PANIC: application panicked at {location}");
    }));

    let settings = Settings::from_env()?;
    tracing::info!(
        auth_mode = settings.auth_mode.as_str(),
        has_credentials = settings.credentials().is_ok(),
        has_project = settings.primary_project_id().is_some(),
        api_base = %settings.api_base_url,
        "configuration loaded"
    );

    let host = settings.host.clone();
    let port = settings.port;
    let state = DashboardState::new(settings)?;
    let server = DashboardServer::start(state, &host, port).await?;
    tracing::info!("ACC Forms Dashboard available at {}", server.base_url());

    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
    }
    tracing::info!("shutting down");
    server.shutdown().await
}
