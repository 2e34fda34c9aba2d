//! Error types for the adoption CLI

use std::fmt;

use adoption_api::ApiError;
use adoption_session::SessionError;

#[derive(Debug)]
pub enum CliError {
    Api(ApiError),
    Session(SessionError),
    Config(String),
    Output(serde_json::Error),
}

impl CliError {
    /// What to tell the person at the terminal
    pub fn user_message(&self) -> String {
        match self {
            CliError::Api(err) => err.user_message(),
            CliError::Session(err) => err.user_message(),
            CliError::Config(msg) => msg.clone(),
            CliError::Output(err) => format!("Failed to render output: {}", err),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Api(err) => write!(f, "{}", err),
            CliError::Session(err) => write!(f, "{}", err),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Output(err) => write!(f, "Output error: {}", err),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Api(err) => Some(err),
            CliError::Session(err) => Some(err),
            CliError::Output(err) => Some(err),
            CliError::Config(_) => None,
        }
    }
}

impl From<ApiError> for CliError {
    fn from(err: ApiError) -> Self {
        CliError::Api(err)
    }
}

impl From<SessionError> for CliError {
    fn from(err: SessionError) -> Self {
        CliError::Session(err)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Output(err)
    }
}

impl From<tracing_subscriber::filter::ParseError> for CliError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        CliError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
