//! Usage: Process configuration read once from the environment at startup.

use crate::shared::error::AppResult;
use crate::shared::security::random_hex;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_API_BASE_URL: &str = "https://developer.api.autodesk.com";
pub const DEFAULT_OAUTH_CALLBACK_PORT: u16 = 3001;
pub const DEFAULT_OAUTH_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_OAUTH_SCOPE: &str = "data:read account:read";

const ENV_CLIENT_ID: &str = "AUTODESK_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "AUTODESK_CLIENT_SECRET";
const ENV_PROJECT_IDS: &str = "AUTODESK_PROJECT_IDS";
const ENV_API_BASE_URL: &str = "AUTODESK_API_BASE_URL";
const ENV_SECRET_KEY: &str = "SECRET_KEY";
const ENV_PORT: &str = "PORT";
const ENV_HOST: &str = "HOST";
const ENV_PUBLIC_BASE_URL: &str = "PUBLIC_BASE_URL";
const ENV_AUTH_MODE: &str = "ACC_AUTH_MODE";
const ENV_OAUTH_CALLBACK_PORT: &str = "OAUTH_CALLBACK_PORT";
const ENV_OAUTH_TIMEOUT_SECS: &str = "OAUTH_TIMEOUT_SECS";
const ENV_HTTP_TIMEOUT_SECS: &str = "HTTP_TIMEOUT_SECS";
const ENV_LOG_DIR: &str = "LOG_DIR";

/// How `/api/load-data` obtains a token when none is held yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// Redirect the user through `/auth/start` and `/auth/callback`.
    #[default]
    ThreeLegged,
    /// Server-to-server client credential exchange.
    ClientCredentials,
    /// Open a local browser and catch the redirect on the callback port.
    Browser,
}

impl AuthMode {
    pub fn parse(raw: &str) -> AppResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "three_legged" | "web" => Ok(Self::ThreeLegged),
            "client_credentials" | "2legged" | "two_legged" => Ok(Self::ClientCredentials),
            "browser" | "local_browser" => Ok(Self::Browser),
            other => Err(format!(
                "SEC_INVALID_INPUT: {ENV_AUTH_MODE} must be three_legged|client_credentials|browser, got {other}"
            )
            .into()),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ThreeLegged => "three_legged",
            Self::ClientCredentials => "client_credentials",
            Self::Browser => "browser",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub project_ids: Vec<String>,
    pub session_secret: String,
    pub host: String,
    pub port: u16,
    pub api_base_url: String,
    pub public_base_url: Option<String>,
    pub auth_mode: AuthMode,
    pub oauth_callback_port: u16,
    pub oauth_timeout_secs: u64,
    pub http_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            project_ids: Vec::new(),
            session_secret: random_hex(32),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            public_base_url: None,
            auth_mode: AuthMode::default(),
            oauth_callback_port: DEFAULT_OAUTH_CALLBACK_PORT,
            oauth_timeout_secs: DEFAULT_OAUTH_TIMEOUT_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

/// `LOG_DIR`, read on its own so logging can start before the rest of the settings.
pub fn log_dir_from_env() -> Option<PathBuf> {
    log_dir_from_lookup(|key| std::env::var(key).ok())
}

fn log_dir_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    lookup(ENV_LOG_DIR)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

impl Settings {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut settings = Settings {
            client_id: get(ENV_CLIENT_ID),
            client_secret: get(ENV_CLIENT_SECRET),
            project_ids: get(ENV_PROJECT_IDS)
                .map(|raw| parse_project_ids(&raw))
                .unwrap_or_default(),
            public_base_url: get(ENV_PUBLIC_BASE_URL).map(|v| v.trim_end_matches('/').to_string()),
            ..Settings::default()
        };

        match get(ENV_SECRET_KEY) {
            Some(secret) => settings.session_secret = secret,
            None => tracing::warn!(
                "{ENV_SECRET_KEY} is not set; generated a random session secret for this process"
            ),
        }

        if let Some(raw) = get(ENV_HOST) {
            let parsed = crate::gateway::listen::parse_listen_address(&raw)
                .map_err(|e| format!("SEC_INVALID_INPUT: {ENV_HOST}: {e}"))?;
            settings.host = parsed.host;
            if let Some(port) = parsed.port {
                settings.port = port;
            }
        }
        if let Some(raw) = get(ENV_PORT) {
            settings.port = parse_number(ENV_PORT, &raw)?;
        }
        if let Some(raw) = get(ENV_API_BASE_URL) {
            settings.api_base_url = raw.trim_end_matches('/').to_string();
        }
        if let Some(raw) = get(ENV_AUTH_MODE) {
            settings.auth_mode = AuthMode::parse(&raw)?;
        }
        if let Some(raw) = get(ENV_OAUTH_CALLBACK_PORT) {
            settings.oauth_callback_port = parse_number(ENV_OAUTH_CALLBACK_PORT, &raw)?;
        }
        if let Some(raw) = get(ENV_OAUTH_TIMEOUT_SECS) {
            settings.oauth_timeout_secs = parse_number(ENV_OAUTH_TIMEOUT_SECS, &raw)?;
        }
        if let Some(raw) = get(ENV_HTTP_TIMEOUT_SECS) {
            settings.http_timeout_secs = parse_number(ENV_HTTP_TIMEOUT_SECS, &raw)?;
        }

        Ok(settings)
    }

    /// First configured project; the rest of the list is ignored.
    pub fn primary_project_id(&self) -> Option<&str> {
        self.project_ids.first().map(String::as_str)
    }

    pub fn credentials(&self) -> AppResult<ClientCredentials> {
        match (self.client_id.as_deref(), self.client_secret.as_deref()) {
            (Some(id), Some(secret)) => Ok(ClientCredentials {
                client_id: id.to_string(),
                client_secret: secret.to_string(),
            }),
            _ => Err(format!(
                "CONFIG_MISSING: Missing Autodesk credentials ({ENV_CLIENT_ID}/{ENV_CLIENT_SECRET})"
            )
            .into()),
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}/authentication/v2/token", self.api_base_url)
    }

    pub fn authorize_url(&self) -> String {
        format!("{}/authentication/v2/authorize", self.api_base_url)
    }

    pub fn forms_api_base(&self) -> String {
        format!("{}/construction/forms/v1", self.api_base_url)
    }

    pub fn oauth_timeout(&self) -> Duration {
        Duration::from_secs(self.oauth_timeout_secs.max(1))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }
}

fn parse_project_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> AppResult<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| format!("SEC_INVALID_INPUT: {key} must be a number, got {raw}").into())
}
