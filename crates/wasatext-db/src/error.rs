use rusqlite::{ErrorCode, ffi};
use thiserror::Error;

use crate::models::UserId;

/// Errors produced by the storage core. Authorization outcomes are distinct
/// variants.
#[derive(Error, Debug)]
pub enum DbError {
    /// Entity absent, or the caller may not learn that it exists.
    #[error("Record not found")]
    NotFound,

    #[error("User is not a member of the conversation")]
    NotMember,

    #[error("User is not an administrator of the conversation")]
    NotAdmin,

    /// Uniqueness violation, e.g. a user name already in use.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Reply target not found in this conversation")]
    ReplyTargetNotFound,

    #[error("User {0} does not exist")]
    MemberNotFound(UserId),

    #[error("Conversation not found")]
    ConversationNotFound,

    #[error("Message not found")]
    MessageNotFound,

    /// The caller's deadline passed or it cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Database error: {0}")]
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(ErrorCode::OperationInterrupted) => DbError::Cancelled,
            _ => DbError::Sqlite(e),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DbError>;

/// True for UNIQUE and PRIMARY KEY constraint failures.
pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => {
            err.code == ErrorCode::ConstraintViolation
                && (err.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                    || err.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}
