//! Usage: Security-sensitive helpers (token masking, constant-time equality, signed OAuth state,
//! Basic auth header).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::Value;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const TOKEN_MASK_PREFIX_LEN: usize = 6;
const TOKEN_MASK_SUFFIX_LEN: usize = 4;
const STATE_NONCE_BYTES: usize = 16;

pub(crate) fn mask_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let len = trimmed.len();
    if len <= TOKEN_MASK_PREFIX_LEN + TOKEN_MASK_SUFFIX_LEN {
        return "*".repeat(len.min(8));
    }

    let prefix = &trimmed[..TOKEN_MASK_PREFIX_LEN];
    let suffix = &trimmed[len - TOKEN_MASK_SUFFIX_LEN..];
    format!("{prefix}...{suffix}")
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

pub(crate) fn random_hex(len_bytes: usize) -> String {
    let mut bytes = vec![0u8; len_bytes];
    OsRng.fill_bytes(&mut bytes);
    to_hex(&bytes)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn state_signature(secret: &str, nonce: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b":");
    hasher.update(nonce.as_bytes());
    to_hex(&hasher.finalize())
}

/// Build an OAuth `state` value of the form `<nonce>.<sha256(secret:nonce)>`.
pub(crate) fn new_signed_state(secret: &str) -> String {
    let nonce = random_hex(STATE_NONCE_BYTES);
    let signature = state_signature(secret, &nonce);
    format!("{nonce}.{signature}")
}

pub(crate) fn verify_signed_state(secret: &str, state: &str) -> bool {
    let Some((nonce, signature)) = state.trim().split_once('.') else {
        return false;
    };
    if nonce.is_empty() || signature.is_empty() {
        return false;
    }
    let expected = state_signature(secret, nonce);
    constant_time_eq(expected.as_bytes(), signature.as_bytes())
}

/// `Authorization` header value for HTTP Basic auth with OAuth client credentials.
pub(crate) fn basic_authorization(client_id: &str, client_secret: &str) -> String {
    let raw = format!("{}:{}", client_id.trim(), client_secret.trim());
    format!("Basic {}", STANDARD.encode(raw.as_bytes()))
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lc = key.trim().to_ascii_lowercase();
    key_lc.contains("token")
        || key_lc.contains("secret")
        || key_lc.contains("password")
        || key_lc == "code"
        || key_lc == "authorization"
}

fn redact_sensitive_json_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                if is_sensitive_key(key) {
                    if let Some(raw) = nested.as_str() {
                        *nested = Value::String(mask_token(raw));
                        continue;
                    }
                }
                redact_sensitive_json_fields(nested);
            }
        }
        Value::Array(items) => {
            for nested in items {
                redact_sensitive_json_fields(nested);
            }
        }
        _ => {}
    }
}

/// Upstream error body fit for logs and user-facing messages: JSON bodies get token-like
/// fields masked, then everything is cut to `max_chars`.
pub(crate) fn sanitize_error_body_snippet(body: &str, max_chars: usize) -> String {
    if let Ok(mut value) = serde_json::from_str::<Value>(body) {
        redact_sensitive_json_fields(&mut value);
        if let Ok(encoded) = serde_json::to_string(&value) {
            return encoded.chars().take(max_chars).collect();
        }
    }
    body.chars().take(max_chars).collect()
}
