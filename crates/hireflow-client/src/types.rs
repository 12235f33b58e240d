//! Request and response types for the hireflow client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hireflow_core::{CvId, OrganizationId, TransactionId, TransactionType};

pub use hireflow_core::{CreditTransaction, Pagination, TransactionPage};

/// Organization balance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BalanceResponse {
    /// Organization the balance belongs to.
    pub organization_id: OrganizationId,
    /// Current balance in credits.
    pub balance: i64,
}

/// History query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HistoryQuery {
    /// 1-based page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Page size (server caps at 100).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Only this transaction type.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<TransactionType>,
    /// Inclusive lower bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
}

/// Unlock by ids request.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct UnlockRequest<'a> {
    pub cv_ids: &'a [CvId],
}

/// Unlock next request.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct UnlockNextRequest {
    pub count: usize,
}

/// Result of a successful unlock.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UnlockResponse {
    /// CVs flipped by the request.
    pub unlocked_count: u64,
    /// Balance after the request.
    pub remaining_credits: i64,
    /// The deduction, if anything was billed.
    #[serde(default)]
    pub transaction_id: Option<TransactionId>,
}

/// Affordability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct UnlockQuote {
    /// Locked CVs that would be billed.
    pub to_unlock: u64,
    /// CVs that are already visible.
    pub already_unlocked: u64,
    /// Whether the balance covers the cost.
    pub has_enough_credits: bool,
    /// Current balance.
    pub available_credits: i64,
    /// Cost of the unlock.
    pub required_credits: i64,
}

/// Per-job unlock counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct JobUnlockStats {
    /// All CVs of the job.
    pub total: u64,
    /// CVs still locked.
    pub locked: u64,
    /// CVs already visible.
    pub unlocked: u64,
    /// Current balance.
    pub available_credits: i64,
}

/// Error envelope returned by the service.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}
