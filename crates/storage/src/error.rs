use thiserror::Error;
use uuid::Uuid;

use collector_core::TransitionError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Transient: store unreachable, pool exhausted, timeout. Safe to retry.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Terminal: the data itself was refused (constraint or type violation).
    #[error("storage rejected data: {0}")]
    Rejected(String),
}

impl StorageError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }

    pub(crate) fn timed_out(timeout: std::time::Duration) -> Self {
        StorageError::Unavailable(format!("operation timed out after {}ms", timeout.as_millis()))
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            // SQLSTATE class 22 = data exception, 23 = integrity constraint violation.
            sqlx::Error::Database(db) => match db.code().as_deref().map(|c| c.get(..2)) {
                Some(Some("22")) | Some(Some("23")) => StorageError::Rejected(e.to_string()),
                _ => StorageError::Unavailable(e.to_string()),
            },
            sqlx::Error::Encode(_) => StorageError::Rejected(e.to_string()),
            _ => StorageError::Unavailable(e.to_string()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("job not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl LedgerError {
    pub fn is_already_claimed(&self) -> bool {
        matches!(self, LedgerError::Transition(TransitionError::AlreadyClaimed { .. }))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Storage(e.into())
    }
}
