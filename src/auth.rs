//! Short-lived bearer tokens for the settings API.
//!
//! The API key is an 80-character composite: the first 40 characters are the
//! key id (sent as the token payload), the last 40 the HMAC-SHA256 signing
//! secret. Tokens are compact JWTs and expire 60 seconds after issuance.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{Result, WardenError};

type HmacSha256 = Hmac<Sha256>;

const KEY_ID_LEN: usize = 40;
const KEY_LEN: usize = 80;

/// Seconds until a signed token expires.
pub const TOKEN_TTL_SECS: i64 = 60;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "apiKeyId")]
    pub api_key_id: String,
    pub iat: i64,
    pub exp: i64,
}

/// Sign a bearer token for the settings API using the current clock.
pub fn sign_token(api_key: &str) -> Result<String> {
    sign_token_at(api_key, Utc::now().timestamp())
}

/// Sign a bearer token with an explicit issue time (seconds since epoch).
pub fn sign_token_at(api_key: &str, now: i64) -> Result<String> {
    let (key_id, secret) = split_api_key(api_key)?;

    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = Claims {
        api_key_id: key_id.to_string(),
        iat: now,
        exp: now + TOKEN_TTL_SECS,
    };
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);

    let signing_input = format!("{header}.{payload}");
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| WardenError::Config(format!("invalid signing key: {e}")))?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{signing_input}.{signature}"))
}

/// Verify a token's signature and expiry against the given secret.
///
/// Signature comparison is constant-time. Returns the decoded claims.
pub fn verify_token(token: &str, secret: &str, now: i64) -> Result<Claims> {
    let mut parts = token.split('.');
    let (header, payload, signature) = match (parts.next(), parts.next(), parts.next(), parts.next())
    {
        (Some(h), Some(p), Some(s), None) => (h, p, s),
        _ => return Err(WardenError::Config("malformed token".to_string())),
    };

    let signing_input = format!("{header}.{payload}");
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| WardenError::Config(format!("invalid signing key: {e}")))?;
    mac.update(signing_input.as_bytes());
    let expected = mac.finalize().into_bytes();

    let provided = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| WardenError::Config("malformed token signature".to_string()))?;
    if !bool::from(expected.ct_eq(provided.as_slice())) {
        return Err(WardenError::Config("invalid token signature".to_string()));
    }

    let claims: Claims = serde_json::from_slice(
        &URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| WardenError::Config("malformed token payload".to_string()))?,
    )?;
    if claims.exp <= now {
        return Err(WardenError::Config("token expired".to_string()));
    }
    Ok(claims)
}

fn split_api_key(api_key: &str) -> Result<(&str, &str)> {
    if !api_key.is_ascii() {
        return Err(WardenError::Config("API key must be ASCII".to_string()));
    }
    if api_key.len() < KEY_LEN {
        return Err(WardenError::Config(format!(
            "API key must be at least {KEY_LEN} characters, got {}",
            api_key.len()
        )));
    }
    Ok((&api_key[..KEY_ID_LEN], &api_key[KEY_ID_LEN..KEY_LEN]))
}
