//! Access-token claims decoding
//!
//! Tokens are JWT-shaped: `header.payload.signature`, each segment base64url.
//! Only the payload is read. The signature is NOT verified here: the API
//! server verifies every token it receives, and rejecting tokens client-side
//! could lock out sessions the server still honors.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::PRIVILEGED_ROLE;
use crate::error::{Error, Result};

/// An organizational scope the identity may act within.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub name: String,
    /// The identity's role inside this tenant.
    #[serde(default)]
    pub role: String,
}

/// Claims carried by an access token.
///
/// `sub` and `exp` are required; the rest default to empty when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "sub")]
    pub subject: String,
    /// Issue time, epoch seconds.
    #[serde(rename = "iat", default, deserialize_with = "epoch_seconds")]
    pub issued_at: u64,
    /// Expiry, epoch seconds.
    #[serde(rename = "exp", deserialize_with = "epoch_seconds")]
    pub expires_at: u64,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub tenants: Vec<Tenant>,
}

impl Claims {
    /// Expiry in the millisecond time base used for all comparisons.
    pub fn expires_at_millis(&self) -> u64 {
        self.expires_at.saturating_mul(1000)
    }

    pub fn is_expired_at(&self, now_millis: u64) -> bool {
        self.expires_at_millis() <= now_millis
    }

    pub fn is_privileged(&self) -> bool {
        self.roles.iter().any(|r| r == PRIVILEGED_ROLE)
    }

    pub fn tenant(&self, id: &str) -> Option<&Tenant> {
        self.tenants.iter().find(|t| t.id == id)
    }
}

/// Any non-negative JSON number, floored to whole seconds. Some issuers
/// write `exp` as a float.
fn epoch_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(D::Error::custom(format!("invalid epoch seconds: {secs}")));
    }
    Ok(secs.floor() as u64)
}

/// Decode a token's payload into `Claims`.
pub fn decode(token: &str) -> Result<Claims> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(Error::MalformedToken(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    }

    // Some issuers keep '=' padding on segments
    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|e| Error::MalformedToken(format!("payload is not base64url: {e}")))?;

    serde_json::from_slice(&payload)
        .map_err(|e| Error::MalformedToken(format!("payload is not a claims object: {e}")))
}

/// Current unix time in milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Build an unsigned token carrying `claims`. Test helper only.
#[cfg(any(test, feature = "test-util"))]
pub fn encode_unsigned(claims: &Claims) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).expect("claims serialize"));
    format!("{header}.{payload}.unsigned")
}
