//! Usage: Process-wide Autodesk authenticator (client credentials, browser login, code exchange).

use super::browser::open_browser;
use super::callback_server::{bind_callback_listener, spawn_callback_listener, CallbackWait};
use super::token_exchange::{request_token, TokenGrant, TokenRequest, TokenSet};
use crate::infra::settings::{ClientCredentials, Settings, DEFAULT_OAUTH_SCOPE};
use crate::shared::error::AppResult;
use crate::shared::mutex_ext::MutexExt;
use crate::shared::security::{mask_token, random_hex};
use std::sync::Mutex;
use std::time::Duration;

const BROWSER_STATE_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserLoginOutcome {
    /// Code received and exchanged; the token is stored.
    Authorized,
    /// The provider redirected back with an `error` parameter.
    Denied {
        error: String,
        description: Option<String>,
    },
    TimedOut,
}

#[derive(Debug)]
pub struct AccAuthenticator {
    http: reqwest::Client,
    token_uri: String,
    authorize_uri: String,
    scope: String,
    credentials: Option<ClientCredentials>,
    callback_port: u16,
    callback_timeout: Duration,
    tokens: Mutex<Option<TokenSet>>,
}

impl AccAuthenticator {
    pub fn new(http: reqwest::Client, settings: &Settings) -> Self {
        Self {
            http,
            token_uri: settings.token_url(),
            authorize_uri: settings.authorize_url(),
            scope: DEFAULT_OAUTH_SCOPE.to_string(),
            credentials: settings.credentials().ok(),
            callback_port: settings.oauth_callback_port,
            callback_timeout: settings.oauth_timeout(),
            tokens: Mutex::new(None),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn access_token(&self) -> Option<String> {
        self.tokens
            .lock_or_recover()
            .as_ref()
            .map(|t| t.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.tokens
            .lock_or_recover()
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
    }

    pub fn token_expires_at(&self) -> Option<i64> {
        self.tokens.lock_or_recover().as_ref().and_then(|t| t.expires_at)
    }

    /// Server-to-server login. Failures are logged, never raised.
    pub async fn authenticate(&self) -> bool {
        match self.authenticate_client_credentials().await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!("authentication failed: {err}");
                false
            }
        }
    }

    pub async fn authenticate_client_credentials(&self) -> AppResult<()> {
        let grant = TokenGrant::ClientCredentials {
            scope: self.scope.clone(),
        };
        let tokens = self.request(grant).await?;
        tracing::info!(
            token = %mask_token(&tokens.access_token),
            "client credentials authentication successful"
        );
        self.store(tokens);
        Ok(())
    }

    /// Authorization-code exchange. Failures are logged, never raised.
    pub async fn exchange_code_for_token(&self, code: &str, redirect_uri: &str) -> bool {
        match self.try_exchange_code_for_token(code, redirect_uri).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!("token exchange failed: {err}");
                false
            }
        }
    }

    pub async fn try_exchange_code_for_token(&self, code: &str, redirect_uri: &str) -> AppResult<()> {
        if code.trim().is_empty() {
            return Err("SEC_INVALID_INPUT: authorization code is empty"
                .to_string()
                .into());
        }
        let grant = TokenGrant::AuthorizationCode {
            code: code.to_string(),
            redirect_uri: redirect_uri.to_string(),
        };
        let tokens = self.request(grant).await?;
        tracing::info!(
            token = %mask_token(&tokens.access_token),
            "authorization code exchange successful"
        );
        self.store(tokens);
        Ok(())
    }

    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> AppResult<String> {
        let credentials = self.require_credentials()?;
        let mut url = reqwest::Url::parse(&self.authorize_uri)
            .map_err(|e| format!("CONFIG_MISSING: invalid oauth authorize url: {e}"))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &credentials.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &self.scope)
            .append_pair("state", state);
        Ok(url.to_string())
    }

    /// Log in through the desktop browser and a loopback callback listener.
    pub async fn authenticate_via_browser(&self) -> AppResult<BrowserLoginOutcome> {
        self.authenticate_via_browser_with(open_browser).await
    }

    /// Same as `authenticate_via_browser` with a custom URL opener.
    pub async fn authenticate_via_browser_with(
        &self,
        opener: impl FnOnce(&str) -> AppResult<()>,
    ) -> AppResult<BrowserLoginOutcome> {
        self.require_credentials()?;

        let listener = bind_callback_listener(self.callback_port).await?;
        let redirect_uri = listener.redirect_uri();
        let state = random_hex(BROWSER_STATE_BYTES);
        let auth_url = self.authorize_url(&redirect_uri, &state)?;

        let pending = spawn_callback_listener(listener, Some(state));
        tracing::info!(port = pending.port(), "oauth callback listener started");

        if let Err(err) = opener(&auth_url) {
            tracing::warn!("could not open a browser ({err}); open this URL manually: {auth_url}");
        } else {
            tracing::info!("opened browser for Autodesk authentication");
        }

        let payload = match pending.wait(self.callback_timeout).await? {
            CallbackWait::Received(payload) => payload,
            CallbackWait::TimedOut => {
                tracing::error!("browser authentication timed out");
                return Ok(BrowserLoginOutcome::TimedOut);
            }
        };

        if let Some(error) = payload.error {
            tracing::error!(error = %error, "browser authentication denied");
            return Ok(BrowserLoginOutcome::Denied {
                error,
                description: payload.error_description,
            });
        }

        let code = payload.code.unwrap_or_default();
        tracing::info!("exchanging authorization code for access token");
        self.try_exchange_code_for_token(&code, &redirect_uri).await?;
        Ok(BrowserLoginOutcome::Authorized)
    }

    fn require_credentials(&self) -> AppResult<&ClientCredentials> {
        self.credentials.as_ref().ok_or_else(|| {
            "CONFIG_MISSING: Missing Autodesk credentials (AUTODESK_CLIENT_ID/AUTODESK_CLIENT_SECRET)"
                .into()
        })
    }

    async fn request(&self, grant: TokenGrant) -> AppResult<TokenSet> {
        let credentials = self.require_credentials()?;
        let req = TokenRequest {
            token_uri: self.token_uri.clone(),
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            grant,
        };
        request_token(&self.http, &req).await
    }

    /// Install a token obtained elsewhere.
    pub(crate) fn store_access_token(&self, access_token: &str) {
        self.store(TokenSet {
            access_token: access_token.to_string(),
            refresh_token: None,
            expires_at: None,
        });
    }

    fn store(&self, tokens: TokenSet) {
        *self.tokens.lock_or_recover() = Some(tokens);
    }
}
