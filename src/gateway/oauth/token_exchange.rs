//! Usage: Autodesk token endpoint calls (client_credentials + authorization_code grants).

use crate::shared::error::{AppError, AppResult};
use crate::shared::security::{basic_authorization, mask_token, sanitize_error_body_snippet};
use serde_json::Value;

const ERROR_SNIPPET_CHARS: usize = 500;
const ERROR_DETAIL_CHARS: usize = 240;

#[derive(Debug, Clone)]
pub(crate) enum TokenGrant {
    ClientCredentials { scope: String },
    AuthorizationCode { code: String, redirect_uri: String },
}

impl TokenGrant {
    fn name(&self) -> &'static str {
        match self {
            Self::ClientCredentials { .. } => "client_credentials",
            Self::AuthorizationCode { .. } => "authorization_code",
        }
    }

    fn form(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::ClientCredentials { scope } => vec![
                ("grant_type", "client_credentials".to_string()),
                ("scope", scope.trim().to_string()),
            ],
            Self::AuthorizationCode { code, redirect_uri } => vec![
                ("grant_type", "authorization_code".to_string()),
                ("code", code.trim().to_string()),
                ("redirect_uri", redirect_uri.trim().to_string()),
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TokenRequest {
    pub(crate) token_uri: String,
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) grant: TokenGrant,
}

#[derive(Clone)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix seconds.
    pub expires_at: Option<i64>,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &mask_token(&self.access_token))
            .field(
                "refresh_token",
                &self.refresh_token.as_deref().map(mask_token),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

pub(crate) async fn request_token(
    client: &reqwest::Client,
    req: &TokenRequest,
) -> AppResult<TokenSet> {
    let grant = req.grant.name();
    let response = client
        .post(req.token_uri.trim())
        .header(
            reqwest::header::AUTHORIZATION,
            basic_authorization(&req.client_id, &req.client_secret),
        )
        .form(&req.grant.form())
        .send()
        .await
        .map_err(|e| {
            AppError::new(
                "SYSTEM_ERROR",
                format!("oauth {grant} request failed: {e}"),
            )
            .with_source(e)
        })?;

    parse_token_response(grant, response).await
}

async fn parse_token_response(grant: &str, response: reqwest::Response) -> AppResult<TokenSet> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("SYSTEM_ERROR: oauth token response read failed: {e}"))?;

    // Anything but 200 counts as a failed exchange.
    if status != reqwest::StatusCode::OK {
        let (error_code, error_message) = parse_oauth_error_details(&body);
        let snippet = sanitize_error_body_snippet(&body, ERROR_SNIPPET_CHARS);
        let mut msg = format!(
            "UPSTREAM_STATUS: oauth {grant} returned status={}",
            status.as_u16()
        );
        if let Some(code) = error_code {
            msg.push_str(" code=");
            msg.push_str(code.as_str());
        }
        if let Some(detail) = error_message {
            msg.push_str(" message=");
            msg.push_str(
                detail
                    .chars()
                    .take(ERROR_DETAIL_CHARS)
                    .collect::<String>()
                    .as_str(),
            );
        }
        msg.push_str(" body=");
        msg.push_str(snippet.as_str());
        return Err(msg.into());
    }

    let value: Value = serde_json::from_str(&body)
        .map_err(|e| format!("UPSTREAM_FORMAT: oauth token response json invalid: {e}"))?;

    let access_token = non_empty_str(&value, "access_token")
        .ok_or_else(|| "UPSTREAM_FORMAT: oauth token response missing access_token".to_string())?;
    let refresh_token = non_empty_str(&value, "refresh_token");

    let expires_in = value.get("expires_in").and_then(parse_i64_lossy);
    let now = crate::shared::time::now_unix_seconds();
    let expires_at = expires_in.and_then(|v| {
        if v <= 0 {
            None
        } else {
            Some(now.saturating_add(v))
        }
    });

    tracing::info!(
        grant,
        expires_in = ?expires_in,
        has_refresh_token = refresh_token.is_some(),
        "oauth token obtained"
    );

    Ok(TokenSet {
        access_token,
        refresh_token,
        expires_at,
    })
}

fn non_empty_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_i64_lossy(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Pull `(code, message)` out of the flat OAuth error shape or Autodesk's
/// `{"developerMessage", "errorCode"}` shape.
fn parse_oauth_error_details(body: &str) -> (Option<String>, Option<String>) {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return (None, None),
    };

    let code = non_empty_str(&value, "error")
        .or_else(|| non_empty_str(&value, "errorCode"))
        .or_else(|| non_empty_str(&value, "code"));
    let message = non_empty_str(&value, "error_description")
        .or_else(|| non_empty_str(&value, "developerMessage"))
        .or_else(|| non_empty_str(&value, "message"));

    (code, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_i64_lossy_supports_number_and_string() {
        assert_eq!(parse_i64_lossy(&Value::from(3599)), Some(3599));
        assert_eq!(parse_i64_lossy(&Value::from("3600")), Some(3600));
        assert_eq!(parse_i64_lossy(&Value::from("x")), None);
    }

    #[test]
    fn grant_forms_carry_expected_fields() {
        let cc = TokenGrant::ClientCredentials {
            scope: "data:read account:read".to_string(),
        };
        assert_eq!(
            cc.form(),
            vec![
                ("grant_type", "client_credentials".to_string()),
                ("scope", "data:read account:read".to_string()),
            ]
        );

        let code = TokenGrant::AuthorizationCode {
            code: " abc ".to_string(),
            redirect_uri: "http://localhost:5000/auth/callback".to_string(),
        };
        let form = code.form();
        assert_eq!(form[0], ("grant_type", "authorization_code".to_string()));
        assert_eq!(form[1], ("code", "abc".to_string()));
        assert_eq!(form[2].0, "redirect_uri");
    }

    #[test]
    fn parse_oauth_error_details_supports_standard_fields() {
        let (code, message) =
            parse_oauth_error_details(r#"{"error":"invalid_grant","error_description":"expired"}"#);
        assert_eq!(code.as_deref(), Some("invalid_grant"));
        assert_eq!(message.as_deref(), Some("expired"));
    }

    #[test]
    fn parse_oauth_error_details_supports_autodesk_fields() {
        let (code, message) = parse_oauth_error_details(
            r#"{"developerMessage":"The client_id specified does not have access","errorCode":"AUTH-001"}"#,
        );
        assert_eq!(code.as_deref(), Some("AUTH-001"));
        assert_eq!(
            message.as_deref(),
            Some("The client_id specified does not have access")
        );
        assert_eq!(parse_oauth_error_details("<html>"), (None, None));
    }

    #[test]
    fn token_set_debug_masks_secrets() {
        let tokens = TokenSet {
            access_token: "eyJhbGciOiJSUzI1NiIsImtpZCI6".to_string(),
            refresh_token: Some("refresh-secret-value".to_string()),
            expires_at: None,
        };
        let rendered = format!("{tokens:?}");
        assert!(!rendered.contains("eyJhbGciOiJSUzI1NiIsImtpZCI6"));
        assert!(!rendered.contains("refresh-secret-value"));
    }
}
