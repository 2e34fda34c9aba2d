use std::collections::HashMap;
use std::time::Duration;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ClaimsError, Result};

/// base64url that accepts payloads with or without `=` padding
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Claims read from a token payload. Advisory only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    #[serde(default)]
    pub sub: Option<String>,
    /// Expiry, unix seconds
    #[serde(default)]
    pub exp: Option<i64>,
    /// Issued-at, unix seconds
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Any other claims the server put in the payload
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Decode the payload of `token` without verifying its signature
pub fn decode(token: &str) -> Result<Claims> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(ClaimsError::Malformed);
    };

    if payload.is_empty() {
        return Err(ClaimsError::Malformed);
    }

    let bytes = PAYLOAD_ENGINE.decode(payload)?;
    Ok(serde_json::from_slice(&bytes)?)
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp
            .and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.iat
            .and_then(|iat| Utc.timestamp_opt(iat, 0).single())
    }

    /// A token without `exp` never reports itself as expired
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|exp| exp <= now)
    }

    /// True when the token expires within `window` of `now` (or already has)
    pub fn expires_within(&self, window: Duration, now: DateTime<Utc>) -> bool {
        let Some(exp) = self.expires_at() else {
            return false;
        };
        match chrono::Duration::from_std(window) {
            Ok(window) => exp - now <= window,
            Err(_) => true,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role) || self.roles.iter().any(|r| r == role)
    }

    /// Whether the UI should offer admin affordances. The server still
    /// authorizes every admin action.
    pub fn is_admin(&self) -> bool {
        self.has_role("admin")
            || matches!(
                self.extra.get("isAdmin").or_else(|| self.extra.get("is_admin")),
                Some(serde_json::Value::Bool(true))
            )
    }
}
