//! Usage: Kick off a forms load (optionally authenticating first) as one background task.

use super::app_state::DashboardState;
use super::forms_store::LoadTicket;
use crate::gateway::oauth::BrowserLoginOutcome;
use crate::infra::settings::AuthMode;
use crate::shared::error::{AppError, AppResult};
use tokio::task::JoinHandle;

/// What `/api/load-data` set in motion.
#[derive(Debug)]
pub enum LoadStart {
    /// A token was held; fetching started.
    Fetching(JoinHandle<()>),
    /// Client-credential login then fetch.
    Authenticating(JoinHandle<()>),
    /// Local browser login then fetch.
    BrowserLogin(JoinHandle<()>),
    /// The user must go through `/auth/start`.
    AuthRequired,
}

impl LoadStart {
    pub fn into_task(self) -> Option<JoinHandle<()>> {
        match self {
            Self::Fetching(task) | Self::Authenticating(task) | Self::BrowserLogin(task) => {
                Some(task)
            }
            Self::AuthRequired => None,
        }
    }
}

pub fn start_load(state: &DashboardState) -> AppResult<LoadStart> {
    if state.store.is_loading() {
        return Err("LOAD_IN_PROGRESS: Data is already being loaded"
            .to_string()
            .into());
    }
    if !state.authenticator.has_credentials() || state.settings.primary_project_id().is_none() {
        return Err("CONFIG_MISSING: Missing required environment variables"
            .to_string()
            .into());
    }

    if state.authenticator.access_token().is_some() {
        let ticket = state.store.begin_load()?;
        return Ok(LoadStart::Fetching(spawn_fetch_cycle(state, ticket)));
    }

    match state.settings.auth_mode {
        AuthMode::ThreeLegged => Ok(LoadStart::AuthRequired),
        AuthMode::ClientCredentials => {
            let ticket = state.store.begin_load()?;
            let state = state.clone();
            Ok(LoadStart::Authenticating(tokio::spawn(async move {
                match state.authenticator.authenticate_client_credentials().await {
                    Ok(()) => run_fetch_cycle(&state, ticket).await,
                    Err(err) => ticket.fail(err),
                }
            })))
        }
        AuthMode::Browser => {
            let ticket = state.store.begin_load()?;
            let state = state.clone();
            Ok(LoadStart::BrowserLogin(tokio::spawn(async move {
                match state.authenticator.authenticate_via_browser().await {
                    Ok(BrowserLoginOutcome::Authorized) => run_fetch_cycle(&state, ticket).await,
                    Ok(outcome) => ticket.fail(login_failure(outcome)),
                    Err(err) => ticket.fail(err),
                }
            })))
        }
    }
}

/// Fetch with the held token in a background task. The ticket is released when it ends.
pub fn spawn_fetch_cycle(state: &DashboardState, ticket: LoadTicket) -> JoinHandle<()> {
    let state = state.clone();
    tokio::spawn(async move { run_fetch_cycle(&state, ticket).await })
}

pub async fn run_fetch_cycle(state: &DashboardState, ticket: LoadTicket) {
    let Some(token) = state.authenticator.access_token() else {
        ticket.fail("AUTH_REQUIRED: No valid authentication token".into());
        return;
    };
    let Some(project_id) = state.settings.primary_project_id() else {
        ticket.fail("CONFIG_MISSING: No project ID configured".into());
        return;
    };

    tracing::info!("fetching forms data in background");
    let client = state.forms_client(&token);
    let outcome = client.get_all_forms(project_id).await;
    ticket.finish(outcome);
}

fn login_failure(outcome: BrowserLoginOutcome) -> AppError {
    match outcome {
        BrowserLoginOutcome::Denied { error, description } => {
            let detail = description.map(|d| format!(" ({d})")).unwrap_or_default();
            AppError::new("AUTH_REQUIRED", format!("Authentication failed: {error}{detail}"))
        }
        BrowserLoginOutcome::TimedOut => {
            AppError::new("AUTH_REQUIRED", "Authentication timed out")
        }
        BrowserLoginOutcome::Authorized => AppError::new("SYSTEM_ERROR", "login did not fail"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::settings::Settings;

    fn state(with_config: bool) -> DashboardState {
        let mut settings = Settings::default();
        if with_config {
            settings.client_id = Some("cid".to_string());
            settings.client_secret = Some("secret".to_string());
            settings.project_ids = vec!["proj".to_string()];
        }
        DashboardState::new(settings).expect("state")
    }

    #[tokio::test]
    async fn missing_configuration_is_reported() {
        let err = start_load(&state(false)).expect_err("missing");
        assert_eq!(err.code(), "CONFIG_MISSING");
    }

    #[tokio::test]
    async fn three_legged_mode_without_token_requires_auth() {
        let state = state(true);
        let started = start_load(&state).expect("start");
        assert!(matches!(started, LoadStart::AuthRequired));
        assert!(!state.store.is_loading());
    }

    #[tokio::test]
    async fn running_load_rejects_a_second_trigger() {
        let state = state(true);
        let _ticket = state.store.try_begin_load().expect("ticket");
        let err = start_load(&state).expect_err("busy");
        assert_eq!(err.code(), "LOAD_IN_PROGRESS");
    }

    #[tokio::test]
    async fn fetch_without_token_releases_ticket_with_error() {
        let state = state(true);
        let ticket = state.store.try_begin_load().expect("ticket");
        spawn_fetch_cycle(&state, ticket).await.expect("join");

        let snapshot = state.store.snapshot();
        assert!(!snapshot.is_loading);
        assert_eq!(
            snapshot.error_message.as_deref(),
            Some("Error fetching data: No valid authentication token")
        );
    }

    #[test]
    fn login_failures_carry_provider_error() {
        let err = login_failure(BrowserLoginOutcome::Denied {
            error: "access_denied".to_string(),
            description: Some("User cancelled".to_string()),
        });
        assert_eq!(err.message(), "Authentication failed: access_denied (User cancelled)");
        assert_eq!(
            login_failure(BrowserLoginOutcome::TimedOut).message(),
            "Authentication timed out"
        );
    }
}
