use thiserror::Error;
use uuid::Uuid;

use crate::sink::SinkError;

/// Errors that can occur within the automation subsystem.
#[derive(Debug, Error)]
pub enum AutomationError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    /// The record an operation needs to mutate does not exist.
    ///
    /// Plain lookups never produce this; they return `Ok(None)`.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    /// A unique key (e.g. event name within a guild) is already taken.
    #[error("{entity} already exists: {key}")]
    AlreadyExists { entity: &'static str, key: String },

    /// A write would break an event's action chain.
    #[error("Action chain corruption: {0}")]
    ChainCorruption(String),

    /// No repository is registered for the action's type name.
    #[error("Unknown action type: {0}")]
    UnknownActionType(String),

    /// A 1-based chain position outside `1..=len`.
    #[error("Invalid action position {index} (event has {len} actions)")]
    InvalidPosition { index: usize, len: usize },

    /// The operation does not apply to the record's current state
    /// (e.g. pausing a one-shot event).
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A configured quota would be exceeded.
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    /// The notification sink refused a dispatch.
    #[error("Notification sink error: {0}")]
    Sink(#[from] SinkError),

    /// A stored row could not be decoded (bad UUID, unknown enum name...).
    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

impl AutomationError {
    /// Errors a wait-task should retry rather than give up on.
    ///
    /// A closed sink never reopens, and undecodable rows stay undecodable.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AutomationError::Database(_) | AutomationError::Sink(SinkError::Full)
        )
    }

    /// Map a UNIQUE / PRIMARY KEY failure to [`AutomationError::AlreadyExists`],
    /// passing every other error (foreign keys included) through.
    pub(crate) fn from_insert(
        err: rusqlite::Error,
        entity: &'static str,
        key: impl Into<String>,
    ) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, _)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                AutomationError::AlreadyExists {
                    entity,
                    key: key.into(),
                }
            }
            other => other.into(),
        }
    }
}

/// True when rusqlite read a row but could not turn a column into its Rust type.
pub(crate) fn is_decode_failure(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
    )
}

impl From<rusqlite::Error> for AutomationError {
    fn from(err: rusqlite::Error) -> Self {
        if is_decode_failure(&err) {
            AutomationError::InvalidData(err.to_string())
        } else {
            AutomationError::Database(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, AutomationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_failures_become_invalid_data() {
        let err: AutomationError = rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            "unknown repeat interval: Monthly".into(),
        )
        .into();
        assert!(matches!(err, AutomationError::InvalidData(_)));
        assert!(!err.is_transient());

        let err: AutomationError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, AutomationError::Database(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn only_a_full_sink_is_retried() {
        assert!(AutomationError::Sink(SinkError::Full).is_transient());
        assert!(!AutomationError::Sink(SinkError::Closed).is_transient());
    }
}
