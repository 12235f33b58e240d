//! Hireflow credits HTTP service.
//!
//! This crate hosts the credit ledger, the payment event adapter and the CV
//! unlock workflow, and exposes them over HTTP:
//!
//! - Credit balance and paged transaction history
//! - CV unlocks billed through the ledger
//! - Paddle purchase webhooks
//! - Admin adjustments and unlock reconciliation
//!
//! # Authentication
//!
//! 1. **HS256 JWT** - recruiter requests; `sub` is the user, `org` the organization
//! 2. **Service API key** - CV ingestion from the classification pipeline
//! 3. **Admin API key** - privileged endpoints

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for the router even when they do not await

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod payments;
pub mod routes;
pub mod state;
pub mod visibility;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use ledger::{CreditLedger, DeductOutcome, DeductionContext};
pub use payments::{PaymentEventAdapter, PaymentStatus, PurchaseApplication, PurchaseEvent};
pub use routes::create_router;
pub use state::AppState;
pub use visibility::{JobUnlockStats, UnlockOutcome, UnlockQuote, VisibilityService};
