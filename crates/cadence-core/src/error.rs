//! The error-kind taxonomy consulted at every request/session boundary.
//!
//! Every fallible operation below the HTTP/WS layer returns `CoreError`,
//! never a bare `anyhow::Error` — the boundary needs to pattern-match a
//! status code and a response shape out of it, which an opaque error type
//! can't give it.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    Authorization,
    Validation,
    NotFound,
    Conflict,
    RateLimit,
    Upstream,
    Storage,
    Deadline,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("not authorized")]
    Authorization,

    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimit { retry_after_secs: u64 },

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("deadline exceeded")]
    Deadline,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Auth(_) => ErrorKind::Auth,
            CoreError::Authorization => ErrorKind::Authorization,
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::RateLimit { .. } => ErrorKind::RateLimit,
            CoreError::Upstream(_) => ErrorKind::Upstream,
            CoreError::Storage(_) => ErrorKind::Storage,
            CoreError::Deadline => ErrorKind::Deadline,
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Validation(vec![FieldError {
            field: field.into(),
            message: message.into(),
        }])
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        CoreError::NotFound(resource.into())
    }
}

impl From<tokio_rusqlite::Error> for CoreError {
    fn from(e: tokio_rusqlite::Error) -> Self {
        CoreError::Storage(e.to_string())
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        CoreError::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_mapping_covers_every_variant() {
        assert_eq!(CoreError::Auth("x".into()).kind(), ErrorKind::Auth);
        assert_eq!(CoreError::Authorization.kind(), ErrorKind::Authorization);
        assert_eq!(CoreError::validation("f", "m").kind(), ErrorKind::Validation);
        assert_eq!(CoreError::not_found("user").kind(), ErrorKind::NotFound);
        assert_eq!(CoreError::Conflict("x".into()).kind(), ErrorKind::Conflict);
        assert_eq!(
            CoreError::RateLimit { retry_after_secs: 60 }.kind(),
            ErrorKind::RateLimit
        );
        assert_eq!(CoreError::Upstream("x".into()).kind(), ErrorKind::Upstream);
        assert_eq!(CoreError::Storage("x".into()).kind(), ErrorKind::Storage);
        assert_eq!(CoreError::Deadline.kind(), ErrorKind::Deadline);
    }
}
