#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("token expired")]
    Expired,

    #[error("token revoked")]
    Revoked,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("account is inactive")]
    Inactive,

    #[error("blacklist store unavailable, failing closed for write")]
    BlacklistUnavailable,

    #[error("password hashing failed: {0}")]
    Hashing(String),
}
