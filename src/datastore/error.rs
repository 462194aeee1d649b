use reqwest::StatusCode;

use crate::core::credentials::CredentialsError;

#[derive(Debug, thiserror::Error)]
pub enum DatastoreError {
    #[error("Entity not found: {0}")]
    NotFound(String),
    #[error("Transaction conflict: {0}")]
    Conflict(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Datastore unavailable: {0}")]
    Transient(String),
    #[error("Datastore error: {0}")]
    Backend(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Decode error: {0}")]
    Decode(String),
}

impl DatastoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Maps an HTTP status returned by the Datastore REST API.
    pub fn from_status(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::NOT_FOUND => Self::NotFound(message),
            StatusCode::CONFLICT => Self::Conflict(message),
            StatusCode::BAD_REQUEST => Self::InvalidArgument(message),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Auth(message),
            StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => Self::Transient(message),
            _ => Self::Backend(format!("HTTP {}: {}", status, message)),
        }
    }
}

impl From<reqwest::Error> for DatastoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            Self::Transient(e.to_string())
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_status(status, e.to_string())
        } else {
            Self::Backend(e.to_string())
        }
    }
}

impl From<CredentialsError> for DatastoreError {
    fn from(e: CredentialsError) -> Self {
        Self::Auth(e.to_string())
    }
}
