//! Custom error types for the auth service

use datastore::StoreError;
use thiserror::Error;

/// Custom error type for session and identity operations.
///
/// Authorization failures are separate variants from datastore failures so
/// handlers can map them to access-denied responses instead of
/// missing-resource ones.
#[derive(Error, Debug)]
pub enum AuthError {
    /// No session token was presented
    #[error("missing session token")]
    MissingToken,

    /// No live session matches the token (unknown, expired, or restricted)
    #[error("session not found or no longer valid")]
    SessionNotFound,

    /// The session's user is missing, inactive, or deleted
    #[error("user not found or not active")]
    UserNotFound,

    /// Login failed: unknown username or wrong password
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Registration collided with an existing username
    #[error("username already taken")]
    DuplicateUser,

    /// Password hashing or verification machinery failed
    #[error("password hashing error: {0}")]
    PasswordHash(String),

    /// A stored record did not deserialize into its model
    #[error("malformed stored record: {0}")]
    MalformedRecord(#[from] bson::de::Error),

    /// Datastore failure underneath an auth operation
    #[error("datastore error: {0}")]
    Store(#[from] StoreError),
}

impl AuthError {
    /// True for rejections that should surface as access-denied rather
    /// than as a data or infrastructure problem.
    pub fn is_authorization_failure(&self) -> bool {
        matches!(
            self,
            AuthError::MissingToken | AuthError::SessionNotFound | AuthError::UserNotFound
        )
    }
}

/// Type alias for Result with AuthError
pub type AuthResult<T> = Result<T, AuthError>;
