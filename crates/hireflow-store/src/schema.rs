//! Column families used by the `RocksDB` backend.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Credit transactions, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: ledger order, keyed by `organization_id || sequence`.
    /// Value is the transaction id.
    pub const TRANSACTIONS_BY_ORG: &str = "transactions_by_org";

    /// Index: external event id -> transaction id.
    pub const EXTERNAL_EVENTS: &str = "external_events";

    /// CV records, keyed by `cv_id`.
    pub const CVS: &str = "cvs";

    /// Index: CVs by job, keyed by `organization_id || job_id || created_at || cv_id`.
    /// Value is empty (index only).
    pub const CVS_BY_JOB: &str = "cvs_by_job";

    /// Job records, keyed by `job_id`.
    pub const JOBS: &str = "jobs";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_ORG,
        cf::EXTERNAL_EVENTS,
        cf::CVS,
        cf::CVS_BY_JOB,
        cf::JOBS,
    ]
}
