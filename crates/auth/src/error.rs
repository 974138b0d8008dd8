//! Credential error types.

use thiserror::Error;

/// Errors from password hashing and token operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    TokenExpired,

    #[error("invalid claims: {0}")]
    InvalidClaims(String),
}

/// Result type for credential operations.
pub type AuthResult<T> = std::result::Result<T, AuthError>;
