//! Error types for claims decoding

use std::fmt;

/// Errors that can occur when decoding a token payload
#[derive(Debug)]
pub enum ClaimsError {
    /// Token does not have three dot-separated segments
    Malformed,
    /// Payload segment is not valid base64url
    Base64(base64::DecodeError),
    /// Payload is not a JSON object of claims
    Json(serde_json::Error),
}

impl fmt::Display for ClaimsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "Malformed token: expected three segments"),
            Self::Base64(e) => write!(f, "Invalid token payload encoding: {e}"),
            Self::Json(e) => write!(f, "Invalid token payload: {e}"),
        }
    }
}

impl std::error::Error for ClaimsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Malformed => None,
            Self::Base64(e) => Some(e),
            Self::Json(e) => Some(e),
        }
    }
}

impl From<base64::DecodeError> for ClaimsError {
    fn from(e: base64::DecodeError) -> Self {
        Self::Base64(e)
    }
}

impl From<serde_json::Error> for ClaimsError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

pub type Result<T> = std::result::Result<T, ClaimsError>;
