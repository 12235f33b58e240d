//! Storage layer for the hireflow credit ledger.
//!
//! The [`Store`] trait is the only way ledger rows and CV visibility state are
//! persisted. Three backends implement it:
//!
//! - [`MemoryStore`]: process-local, used by tests and local development
//! - [`PgStore`]: PostgreSQL via `sqlx`, the production backend
//! - `RocksStore`: embedded `RocksDB` (feature `rocksdb-backend`)
//!
//! # Append discipline
//!
//! Ledger appends are conditional. A transaction carries the sequence number
//! it expects to occupy (`head.sequence + 1`); a backend commits it only if
//! that slot is still free and the balance chain still holds, and otherwise
//! returns [`StoreError::Conflict`]. The caller re-reads the head and retries.
//! This keeps every committed running balance non-negative no matter how
//! many writers race on the same organization.
//!
//! # Example
//!
//! ```
//! use hireflow_core::{CreditTransaction, NewTransaction, OrganizationId, TransactionType};
//! use hireflow_store::{MemoryStore, Store};
//!
//! # async fn example() -> hireflow_store::Result<()> {
//! let store = MemoryStore::new();
//! let org = OrganizationId::generate();
//!
//! let head = store.latest_transaction(&org).await?;
//! let tx = CreditTransaction::next(
//!     NewTransaction::new(org, TransactionType::Purchase, 50),
//!     head.as_ref(),
//! )
//! .expect("valid purchase");
//! store.append_transaction(&tx).await?;
//!
//! let head = store.latest_transaction(&org).await?.expect("one row");
//! assert_eq!(head.balance_after, 50);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
pub mod postgres;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
pub mod schema;

use async_trait::async_trait;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use hireflow_core::{
    CreditTransaction, Cv, CvId, HistoryFilter, Job, JobId, OrganizationId, TransactionId,
    TransactionPage, UnlockRecord,
};

/// Locked/unlocked CV counts for one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisibilityCounts {
    /// CVs still gated.
    pub locked: u64,
    /// CVs whose contact details are visible.
    pub unlocked: u64,
}

impl VisibilityCounts {
    /// All CVs for the job.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.locked + self.unlocked
    }
}

/// The storage trait defining all database operations.
///
/// Every CV and job lookup is scoped by organization: a record that belongs to
/// another organization behaves exactly like a missing one.
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Ledger Operations
    // =========================================================================

    /// Latest transaction of the organization's ledger, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn latest_transaction(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Option<CreditTransaction>>;

    /// Append a transaction if it still extends the current head.
    ///
    /// # Errors
    ///
    /// - `StoreError::DuplicateEvent` if the external event id is already stored.
    /// - `StoreError::Conflict` if `transaction.sequence` is already taken.
    /// - `StoreError::InvalidTransaction` if the balance chain would break.
    async fn append_transaction(&self, transaction: &CreditTransaction) -> Result<()>;

    /// Get a transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<CreditTransaction>>;

    /// Find the transaction recorded for an external event id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_by_external_event_id(&self, event_id: &str)
        -> Result<Option<CreditTransaction>>;

    /// List an organization's transactions, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_transactions(
        &self,
        organization_id: &OrganizationId,
        filter: &HistoryFilter,
    ) -> Result<TransactionPage>;

    // =========================================================================
    // Job Operations
    // =========================================================================

    /// Insert or replace a job.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_job(&self, job: &Job) -> Result<()>;

    /// Get a job within an organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_job(&self, organization_id: &OrganizationId, job_id: &JobId)
        -> Result<Option<Job>>;

    // =========================================================================
    // CV Operations
    // =========================================================================

    /// Insert or replace a CV.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_cv(&self, cv: &Cv) -> Result<()>;

    /// Load the CVs among `cv_ids` that belong to the organization.
    ///
    /// Unknown or foreign ids are silently absent from the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_cvs(&self, organization_id: &OrganizationId, cv_ids: &[CvId]) -> Result<Vec<Cv>>;

    /// The `limit` most recently created locked CVs of a job, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn latest_locked_cvs(
        &self,
        organization_id: &OrganizationId,
        job_id: &JobId,
        limit: usize,
    ) -> Result<Vec<Cv>>;

    /// Flip the given CVs to unlocked, appending `record` to each audit trail.
    ///
    /// CVs that are already unlocked are left untouched. Returns the ids that
    /// actually changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn unlock_cvs(
        &self,
        organization_id: &OrganizationId,
        cv_ids: &[CvId],
        record: &UnlockRecord,
    ) -> Result<Vec<CvId>>;

    /// Locked/unlocked counts for a job.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn visibility_counts(
        &self,
        organization_id: &OrganizationId,
        job_id: &JobId,
    ) -> Result<VisibilityCounts>;
}

/// Validate `transaction` against the current `head` and the event index.
///
/// Shared by the backends that enforce the append discipline in process.
pub(crate) fn check_append(
    transaction: &CreditTransaction,
    head: Option<&CreditTransaction>,
    existing_event: Option<CreditTransaction>,
) -> Result<()> {
    if let Some(existing) = existing_event {
        return Err(StoreError::DuplicateEvent {
            event_id: existing.external_event_id().unwrap_or_default().to_string(),
            existing: Box::new(existing),
        });
    }

    let head_sequence = head.map_or(0, |h| h.sequence);
    if transaction.sequence != head_sequence + 1 {
        return Err(StoreError::Conflict {
            organization_id: transaction.organization_id,
            expected_sequence: transaction.sequence,
        });
    }

    if !transaction.follows(head) {
        return Err(StoreError::InvalidTransaction(format!(
            "transaction {} does not extend the ledger of {} (balance_after={})",
            transaction.id, transaction.organization_id, transaction.balance_after
        )));
    }

    Ok(())
}
