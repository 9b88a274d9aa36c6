use serde::Serialize;
use thiserror::Error;

use crate::{domain::policy::DenyReason, store::StoreError};

pub type CoreResult<T> = Result<T, CoreError>;

/// Machine readable error category returned alongside every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DuplicateKey,
    InvalidReference,
    OutOfRange,
    Conflict,
    InvalidCredentials,
    EmailNotVerified,
    InvalidToken,
    InvalidTransition,
    Forbidden,
    UnsupportedType,
    NotFound,
    Validation,
    Unavailable,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0} already exists")]
    DuplicateKey(&'static str),

    #[error("referenced {0} does not exist")]
    InvalidReference(&'static str),

    #[error("semester number {0} is outside 1..=8")]
    OutOfRange(i32),

    #[error("{0} still has dependent records")]
    Conflict(&'static str),

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("email address has not been verified")]
    EmailNotVerified,

    #[error("token is invalid or has expired")]
    InvalidToken,

    #[error("cannot move {entity} from `{from}` to `{to}`")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("action not permitted: {0}")]
    Forbidden(DenyReason),

    #[error("unsupported document type `{0}`")]
    UnsupportedType(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("service temporarily unavailable: {0}")]
    Unavailable(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::DuplicateKey(_) => ErrorKind::DuplicateKey,
            CoreError::InvalidReference(_) => ErrorKind::InvalidReference,
            CoreError::OutOfRange(_) => ErrorKind::OutOfRange,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::InvalidCredentials => ErrorKind::InvalidCredentials,
            CoreError::EmailNotVerified => ErrorKind::EmailNotVerified,
            CoreError::InvalidToken => ErrorKind::InvalidToken,
            CoreError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            CoreError::Forbidden(_) => ErrorKind::Forbidden,
            CoreError::UnsupportedType(_) => ErrorKind::UnsupportedType,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::Unavailable(_) => ErrorKind::Unavailable,
        }
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            CoreError::Forbidden(reason) => Some(*reason),
            _ => None,
        }
    }

    pub(crate) fn transition(entity: &'static str, from: impl ToString, to: impl ToString) -> Self {
        CoreError::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(what) => CoreError::DuplicateKey(what),
            StoreError::Referenced(what) => CoreError::Conflict(what),
            StoreError::MissingReference(what) => CoreError::InvalidReference(what),
            StoreError::Unavailable(message) => CoreError::Unavailable(message),
            StoreError::Corrupt(message) => CoreError::Unavailable(message),
        }
    }
}
