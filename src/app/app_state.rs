//! Usage: Shared dashboard state handed to every axum handler and background load.

use super::forms_store::FormsStore;
use crate::domain::forms::AccFormsClient;
use crate::gateway::oauth::AccAuthenticator;
use crate::infra::http_client::build_http_client;
use crate::infra::settings::Settings;
use crate::shared::error::AppResult;
use crate::shared::mutex_ext::MutexExt;
use crate::shared::security::{constant_time_eq, new_signed_state, verify_signed_state};
use crate::shared::time::now_unix_seconds;
use std::sync::{Arc, Mutex};

/// Lifetime of a login started with `/auth/start`.
pub const PENDING_LOGIN_TTL_SECS: i64 = 30 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLogin {
    pub state: String,
    pub redirect_uri: String,
    pub created_at: i64,
}

impl PendingLogin {
    fn is_expired(&self, now_unix: i64) -> bool {
        now_unix.saturating_sub(self.created_at) > PENDING_LOGIN_TTL_SECS
    }
}

#[derive(Clone)]
pub struct DashboardState {
    pub settings: Arc<Settings>,
    pub http: reqwest::Client,
    pub authenticator: Arc<AccAuthenticator>,
    pub store: Arc<FormsStore>,
    pending_login: Arc<Mutex<Option<PendingLogin>>>,
}

impl DashboardState {
    pub fn new(settings: Settings) -> AppResult<Self> {
        let http = build_http_client(settings.http_timeout())?;
        Ok(Self::with_http_client(settings, http))
    }

    /// Same as `new` with a caller-built outbound client.
    pub fn with_http_client(settings: Settings, http: reqwest::Client) -> Self {
        let authenticator = AccAuthenticator::new(http.clone(), &settings);
        Self {
            settings: Arc::new(settings),
            http,
            authenticator: Arc::new(authenticator),
            store: FormsStore::new(),
            pending_login: Arc::new(Mutex::new(None)),
        }
    }

    pub fn forms_client(&self, access_token: &str) -> AccFormsClient {
        AccFormsClient::new(
            self.http.clone(),
            access_token,
            self.settings.forms_api_base(),
        )
    }

    /// Start a three-legged login. Replaces any earlier pending login.
    pub fn begin_login(&self, redirect_uri: &str) -> AppResult<String> {
        let state = new_signed_state(&self.settings.session_secret);
        let auth_url = self.authenticator.authorize_url(redirect_uri, &state)?;
        *self.pending_login.lock_or_recover() = Some(PendingLogin {
            state,
            redirect_uri: redirect_uri.to_string(),
            created_at: now_unix_seconds(),
        });
        Ok(auth_url)
    }

    /// Consume the pending login matching `state`. Each login can be completed once.
    pub fn complete_login(&self, state: Option<&str>) -> AppResult<PendingLogin> {
        self.complete_login_at(state, now_unix_seconds())
    }

    fn complete_login_at(&self, state: Option<&str>, now_unix: i64) -> AppResult<PendingLogin> {
        let state = state
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "SEC_INVALID_INPUT: oauth callback missing state".to_string())?;
        if !verify_signed_state(&self.settings.session_secret, state) {
            return Err("SEC_INVALID_INPUT: oauth state signature invalid"
                .to_string()
                .into());
        }

        let mut guard = self.pending_login.lock_or_recover();
        let pending = guard
            .take()
            .ok_or_else(|| "SEC_INVALID_INPUT: no login in progress".to_string())?;
        if !constant_time_eq(pending.state.as_bytes(), state.as_bytes()) {
            // A stale callback must not cancel the login that is still in flight.
            *guard = Some(pending);
            return Err("SEC_INVALID_INPUT: oauth state does not match the current login"
                .to_string()
                .into());
        }
        if pending.is_expired(now_unix) {
            return Err("SEC_INVALID_INPUT: login expired; start again"
                .to_string()
                .into());
        }
        Ok(pending)
    }

    #[cfg(test)]
    pub(crate) fn pending_login(&self) -> Option<PendingLogin> {
        self.pending_login.lock_or_recover().clone()
    }
}
