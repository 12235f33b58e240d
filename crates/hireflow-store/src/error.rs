//! Error types for hireflow storage.

use hireflow_core::{CreditTransaction, LedgerError, OrganizationId};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Another writer appended to the organization's ledger first.
    ///
    /// The caller should re-read the head and retry.
    #[error("ledger head moved for organization {organization_id} (expected sequence {expected_sequence})")]
    Conflict {
        /// Organization whose ledger moved.
        organization_id: OrganizationId,
        /// Sequence the rejected append tried to claim.
        expected_sequence: u64,
    },

    /// A transaction with the same external event id is already stored.
    #[error("duplicate event: {event_id}")]
    DuplicateEvent {
        /// The duplicated external event id.
        event_id: String,
        /// The transaction already stored for that event.
        existing: Box<CreditTransaction>,
    },

    /// The transaction does not extend the current head correctly.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::Serialization(err.to_string())
            }
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
