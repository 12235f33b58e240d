//! Error types for the hireflow ledger.

use crate::ids::{CvId, IdError, OrganizationId, TransactionId};

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors raised by the ledger, the payment adapter and the unlock workflow.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The operation would drive the balance below zero.
    ///
    /// This is an expected business outcome; `balance` is the balance before
    /// the attempted operation.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Balance before the attempted operation.
        balance: i64,
        /// Credits the operation needed.
        required: i64,
    },

    /// Zero amount, or an amount whose sign does not match the transaction type.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A purchase event is missing required fields.
    #[error("malformed payment event: {0}")]
    MalformedEvent(String),

    /// A referenced entity does not exist within the caller's organization.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity (`cv`, `job`).
        entity: &'static str,
        /// Identifier that did not resolve.
        id: String,
    },

    /// Credits were debited but the visibility flip did not complete.
    ///
    /// Operators reconcile by re-running the flip for `cv_ids`.
    #[error(
        "inconsistent state: deduction {transaction_id} for organization {organization_id} \
         succeeded but unlocking failed: {reason}"
    )]
    InconsistentState {
        /// Organization that was charged.
        organization_id: OrganizationId,
        /// The deduction that was committed.
        transaction_id: TransactionId,
        /// CVs that were paid for.
        cv_ids: Vec<CvId>,
        /// Underlying failure.
        reason: String,
    },

    /// Concurrent writers kept winning the append race.
    #[error("ledger contention for organization {organization_id} after {attempts} attempts")]
    Contention {
        /// Organization whose ledger was contended.
        organization_id: OrganizationId,
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// Storage layer failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

impl LedgerError {
    /// Shorthand for a scoped not-found error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether this error needs operator attention.
    #[must_use]
    pub const fn is_alertable(&self) -> bool {
        matches!(self, Self::InconsistentState { .. } | Self::Storage(_))
    }
}
