//! Core types for the hireflow credit ledger.
//!
//! This crate provides the types shared by the store, the service and the
//! client:
//!
//! - **Identifiers**: `OrganizationId`, `UserId`, `JobId`, `CvId`, `TransactionId`
//! - **Credits**: `CreditTransaction`, `NewTransaction`, `TransactionType`, `HistoryFilter`
//! - **CVs**: `Cv`, `Visibility`, `UnlockRecord`, `Ranking`
//! - **Integrations**: `Integration`, `IntegrationKind`
//!
//! # Credit unit
//!
//! Credits are whole numbers stored as `i64`. Unlocking one CV costs
//! [`CREDITS_PER_UNLOCK`] credit. An organization's balance is never stored;
//! it is the `balance_after` of its latest ledger entry.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod credits;
pub mod cv;
pub mod error;
pub mod ids;
pub mod integration;
pub mod job;
pub mod pricing;

pub use credits::{
    CreditTransaction, EntityType, HistoryFilter, NewTransaction, Pagination, RelatedEntity,
    TransactionMetadata, TransactionPage, TransactionType, UnknownTransactionType,
    DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT,
};
pub use cv::{
    Candidate, Cv, CvSource, CvStatus, Education, Experience, Language, NewCv, Proficiency,
    Ranking, RankingCategory, UnlockRecord, Visibility,
};
pub use error::{LedgerError, Result};
pub use ids::{CvId, IdError, JobId, OrganizationId, TransactionId, UserId};
pub use integration::{EmailProvider, Integration, IntegrationKind, IntegrationStatus};
pub use job::{Job, JobStatus};
pub use pricing::{unlock_cost, CREDITS_PER_UNLOCK};
