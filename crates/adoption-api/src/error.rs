//! Error types for the adoption API client

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use serde_json::Value;

/// Errors returned by API calls, classified by HTTP status
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// No response reached us (connect failure, timeout, DNS)
    Network(String),
    /// 401: missing, expired or rejected credentials
    Authentication(String),
    /// 403: authenticated but not allowed
    Authorization(String),
    /// 400: request rejected, with field-level details when the server sends them
    Validation {
        message: String,
        details: HashMap<String, Vec<String>>,
    },
    /// 404
    NotFound(String),
    /// Any other non-success status
    Status { status: u16, message: String },
    /// Response body did not match the expected shape
    Decode(String),
    /// Client misconfiguration (bad base URL, request build failure)
    Config(String),
}

impl ApiError {
    /// Build the error for a non-success response from its status and raw body
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let parsed: Option<ErrorBody> = serde_json::from_slice(body).ok();
        let message = parsed
            .as_ref()
            .and_then(ErrorBody::message)
            .unwrap_or_else(|| default_message(status).to_string());

        match status {
            400 | 422 => Self::Validation {
                message,
                details: parsed
                    .as_ref()
                    .map(ErrorBody::field_details)
                    .unwrap_or_default(),
            },
            401 => Self::Authentication(message),
            403 => Self::Authorization(message),
            404 => Self::NotFound(message),
            _ => Self::Status { status, message },
        }
    }

    /// HTTP status this error was derived from, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication(_) => Some(401),
            Self::Authorization(_) => Some(403),
            Self::Validation { .. } => Some(400),
            Self::NotFound(_) => Some(404),
            Self::Status { status, .. } => Some(*status),
            Self::Network(_) | Self::Decode(_) | Self::Config(_) => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Transient failures that say nothing about the validity of credentials
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Message suitable for inline display next to a form
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => {
                "Unable to reach the server. Check your connection and try again.".to_string()
            }
            Self::Authentication(_) => "Your session has expired. Please sign in again.".to_string(),
            Self::Authorization(msg) => msg.clone(),
            Self::Validation { message, details } => {
                if details.is_empty() {
                    return message.clone();
                }
                let mut fields: Vec<_> = details.iter().collect();
                fields.sort_by(|a, b| a.0.cmp(b.0));
                let lines = fields
                    .into_iter()
                    .map(|(field, errors)| format!("{field}: {}", errors.join(", ")))
                    .collect::<Vec<_>>()
                    .join("; ");
                format!("{message} ({lines})")
            }
            Self::NotFound(msg) => msg.clone(),
            Self::Status { status: 409, message } => message.clone(),
            Self::Status { status, .. } if *status >= 500 => {
                "Something went wrong on our end. Please try again later.".to_string()
            }
            Self::Status { message, .. } => message.clone(),
            Self::Decode(_) | Self::Config(_) => "Unexpected response from the server.".to_string(),
        }
    }
}

fn default_message(status: u16) -> &'static str {
    match status {
        400 | 422 => "Invalid request",
        401 => "Authentication required",
        403 => "You do not have permission to do that",
        404 => "Not found",
        409 => "That record already exists",
        429 => "Too many requests",
        s if s >= 500 => "Internal server error",
        _ => "Request failed",
    }
}

/// Error payloads as the API sends them: `{ "error": ... }` or `{ "message": ... }`,
/// with field details either as an object or as a list of `{ field, message }`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default, alias = "errors")]
    details: Option<Value>,
}

impl ErrorBody {
    fn message(&self) -> Option<String> {
        if let Some(msg) = self.message.as_ref().filter(|m| !m.is_empty()) {
            return Some(msg.clone());
        }
        match &self.error {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Object(obj)) => obj
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        }
    }

    fn field_details(&self) -> HashMap<String, Vec<String>> {
        let mut out: HashMap<String, Vec<String>> = HashMap::new();
        match &self.details {
            Some(Value::Object(map)) => {
                for (field, value) in map {
                    let messages = match value {
                        Value::String(s) => vec![s.clone()],
                        Value::Array(items) => items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect(),
                        _ => continue,
                    };
                    out.entry(field.clone()).or_default().extend(messages);
                }
            }
            Some(Value::Array(items)) => {
                for item in items {
                    let field = ["field", "path", "param"]
                        .iter()
                        .find_map(|k| item.get(*k).and_then(Value::as_str));
                    let message = ["message", "msg"]
                        .iter()
                        .find_map(|k| item.get(*k).and_then(Value::as_str));
                    if let (Some(field), Some(message)) = (field, message) {
                        out.entry(field.to_string())
                            .or_default()
                            .push(message.to_string());
                    }
                }
            }
            _ => {}
        }
        out
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {msg}"),
            Self::Authentication(msg) => write!(f, "Authentication error: {msg}"),
            Self::Authorization(msg) => write!(f, "Authorization error: {msg}"),
            Self::Validation { message, .. } => write!(f, "Validation error: {message}"),
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::Status { status, message } => write!(f, "API error ({status}): {message}"),
            Self::Decode(msg) => write!(f, "Decode error: {msg}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if err.is_builder() {
            Self::Config(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<url::ParseError> for ApiError {
    fn from(err: url::ParseError) -> Self {
        Self::Config(format!("invalid base URL: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
