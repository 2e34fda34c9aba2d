//! Token pair persistence on top of [`TokenStorage`]

use chrono::{DateTime, TimeZone, Utc};
use tracing::warn;

use crate::error::StorageError;
use crate::storage::TokenStorage;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
/// Access token expiry, unix seconds
pub const TOKEN_EXPIRY_KEY: &str = "token_expiry";

const ALL_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, TOKEN_EXPIRY_KEY];

#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenPair {
    /// Build a pair from a server response. Expiry comes from the access
    /// token's `exp` claim, or `expires_in` seconds from `now` when the token
    /// carries none.
    pub fn issued(
        access_token: String,
        refresh_token: String,
        expires_in: Option<i64>,
        now: DateTime<Utc>,
    ) -> Self {
        let expires_at = jwt_claims::decode(&access_token)
            .ok()
            .and_then(|claims| claims.expires_at())
            .or_else(|| {
                expires_in
                    .filter(|secs| *secs > 0)
                    .map(|secs| now + chrono::Duration::seconds(secs))
            });
        Self {
            access_token,
            refresh_token,
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

// Tokens never show up in logs
impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// What durable storage holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredTokens {
    /// First run, or logged out
    Empty,
    /// One token without the other, or an unreadable expiry
    Corrupt,
    Complete(TokenPair),
}

pub async fn load_tokens(storage: &dyn TokenStorage) -> Result<StoredTokens, StorageError> {
    let access = storage.get(ACCESS_TOKEN_KEY).await?;
    let refresh = storage.get(REFRESH_TOKEN_KEY).await?;
    let expiry = storage.get(TOKEN_EXPIRY_KEY).await?;

    let (access_token, refresh_token) = match (access, refresh) {
        (None, None) => return Ok(StoredTokens::Empty),
        (Some(a), Some(r)) if !a.is_empty() && !r.is_empty() => (a, r),
        _ => return Ok(StoredTokens::Corrupt),
    };

    let expires_at = match expiry {
        None => None,
        Some(raw) => match parse_expiry(&raw) {
            Some(at) => Some(at),
            None => {
                warn!(value = %raw, "Stored token expiry is unreadable");
                return Ok(StoredTokens::Corrupt);
            }
        },
    };

    Ok(StoredTokens::Complete(TokenPair {
        access_token,
        refresh_token,
        expires_at,
    }))
}

pub async fn save_tokens(storage: &dyn TokenStorage, pair: &TokenPair) -> Result<(), StorageError> {
    let mut entries = vec![
        (ACCESS_TOKEN_KEY, pair.access_token.clone()),
        (REFRESH_TOKEN_KEY, pair.refresh_token.clone()),
    ];
    match pair.expires_at {
        Some(at) => entries.push((TOKEN_EXPIRY_KEY, at.timestamp().to_string())),
        None => storage.remove(TOKEN_EXPIRY_KEY).await?,
    }
    storage.set_many(&entries).await
}

pub async fn clear_tokens(storage: &dyn TokenStorage) -> Result<(), StorageError> {
    storage.remove_many(&ALL_KEYS).await
}

/// Both tokens present and the stored expiry (if any) not yet passed.
/// Storage failures count as "no".
pub async fn has_valid_tokens(storage: &dyn TokenStorage, now: DateTime<Utc>) -> bool {
    match load_tokens(storage).await {
        Ok(StoredTokens::Complete(pair)) => !pair.is_expired_at(now),
        Ok(_) => false,
        Err(e) => {
            warn!(error = %e, "Failed to read token storage");
            false
        }
    }
}

fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let secs: i64 = raw.trim().parse().ok()?;
    Utc.timestamp_opt(secs, 0).single()
}
