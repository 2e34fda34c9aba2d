//! Error types for session management

use std::fmt;

use adoption_api::ApiError;

/// Durable token storage failures
#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(err) => write!(f, "Token storage I/O error: {}", err),
            StorageError::Serialization(err) => {
                write!(f, "Token storage serialization error: {}", err)
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(err) => Some(err),
            StorageError::Serialization(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err)
    }
}

#[derive(Debug)]
pub enum SessionError {
    /// No session, or the session ended while the request was in flight
    NotAuthenticated,
    /// Login rejected by the server
    InvalidCredentials,
    Api(ApiError),
    Storage(StorageError),
}

impl SessionError {
    /// Message suitable for inline display
    pub fn user_message(&self) -> String {
        match self {
            SessionError::NotAuthenticated => "Please sign in to continue.".to_string(),
            SessionError::InvalidCredentials => "Invalid email or password".to_string(),
            SessionError::Api(err) => err.user_message(),
            SessionError::Storage(_) => {
                "Your session could not be saved on this device.".to_string()
            }
        }
    }

    /// The underlying API error, if the failure came from the server
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            SessionError::Api(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NotAuthenticated => write!(f, "Not authenticated"),
            SessionError::InvalidCredentials => write!(f, "Invalid email or password"),
            SessionError::Api(err) => write!(f, "{}", err),
            SessionError::Storage(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Api(err) => Some(err),
            SessionError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ApiError> for SessionError {
    fn from(err: ApiError) -> Self {
        SessionError::Api(err)
    }
}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        SessionError::Storage(err)
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_credentials_message() {
        let err = SessionError::InvalidCredentials;
        assert_eq!(err.to_string(), "Invalid email or password");
        assert_eq!(err.user_message(), "Invalid email or password");
    }

    #[test]
    fn test_api_error_passthrough() {
        let err = SessionError::from(ApiError::NotFound("Pet not found".into()));
        assert_eq!(err.user_message(), "Pet not found");
        assert!(matches!(err.api_error(), Some(ApiError::NotFound(_))));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_storage_error_display() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = SessionError::from(StorageError::from(io));
        assert_eq!(err.to_string(), "Token storage I/O error: denied");
        assert!(err.api_error().is_none());
    }
}
