//! Credit balance and transaction handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hireflow_core::{
    CreditTransaction, HistoryFilter, OrganizationId, RelatedEntity, TransactionMetadata,
    TransactionPage, TransactionType, DEFAULT_HISTORY_LIMIT,
};

use crate::auth::{AdminAuth, AuthUser};
use crate::error::ApiError;
use crate::state::AppState;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Organization the balance belongs to.
    pub organization_id: OrganizationId,
    /// Current balance in credits.
    pub balance: i64,
}

/// Get the caller's organization balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.ledger.get_balance(&auth.organization_id).await?;

    Ok(Json(BalanceResponse {
        organization_id: auth.organization_id,
        balance,
    }))
}

/// Transaction history query parameters.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// 1-based page (default: 1).
    #[serde(default = "default_page")]
    pub page: u32,
    /// Page size (default: 20, max: 100).
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Only this transaction type.
    #[serde(rename = "type", default)]
    pub transaction_type: Option<String>,
    /// Inclusive lower bound, RFC 3339.
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound, RFC 3339.
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    DEFAULT_HISTORY_LIMIT
}

/// List transaction history, newest first.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<TransactionPage>, ApiError> {
    let transaction_type = query
        .transaction_type
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(str::parse::<TransactionType>)
        .transpose()
        .map_err(|_| ApiError::BadRequest("unknown transaction type".into()))?;

    let filter = HistoryFilter {
        start_date: query.start_date,
        end_date: query.end_date,
        transaction_type,
        page: query.page,
        limit: query.limit,
    };

    let page = state.ledger.history(&auth.organization_id, &filter).await?;
    Ok(Json(page))
}

/// Kind of manual credit an admin can grant.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminCreditKind {
    /// Goodwill or correction credit.
    #[default]
    Adjustment,
    /// Credits returned for a specific charge.
    Refund,
}

/// Admin credit request.
#[derive(Debug, Deserialize)]
pub struct AdminCreditRequest {
    /// Organization to credit.
    pub organization_id: OrganizationId,
    /// Credits to add; must be positive.
    pub amount: i64,
    /// Adjustment or refund.
    #[serde(default)]
    pub kind: AdminCreditKind,
    /// Reason shown in the history.
    pub description: String,
    /// Idempotency key for retried requests.
    #[serde(default)]
    pub external_event_id: Option<String>,
    /// What a refund is for.
    #[serde(default)]
    pub related_entity: Option<RelatedEntity>,
}

/// Admin endpoint: grant an adjustment or refund.
pub async fn admin_credit(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(req): Json<AdminCreditRequest>,
) -> Result<Json<CreditTransaction>, ApiError> {
    if req.amount <= 0 {
        return Err(ApiError::BadRequest("amount must be positive".into()));
    }

    let mut metadata = TransactionMetadata::described(req.description);
    metadata.external_event_id = req.external_event_id.filter(|id| !id.trim().is_empty());
    metadata.extra = serde_json::json!({ "admin_id": admin.admin_id });

    let transaction = match req.kind {
        AdminCreditKind::Adjustment => {
            state
                .ledger
                .adjust(req.organization_id, req.amount, metadata)
                .await?
        }
        AdminCreditKind::Refund => {
            state
                .ledger
                .refund(req.organization_id, req.amount, req.related_entity, metadata)
                .await?
        }
    };

    tracing::info!(
        admin_id = %admin.admin_id,
        organization_id = %req.organization_id,
        transaction_id = %transaction.id,
        amount = req.amount,
        "Admin credited organization"
    );

    Ok(Json(transaction))
}
