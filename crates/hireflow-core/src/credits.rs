//! Credit ledger types.
//!
//! The ledger is append-only. Each [`CreditTransaction`] carries the balance
//! that resulted from applying it, so the balance of an organization is the
//! `balance_after` of its most recent transaction and is never stored
//! anywhere else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::{OrganizationId, TransactionId, UserId};

/// Default page size for history queries.
pub const DEFAULT_HISTORY_LIMIT: u32 = 20;

/// Largest page size a history query may request.
pub const MAX_HISTORY_LIMIT: u32 = 100;

/// A committed ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Unique transaction ID.
    pub id: TransactionId,

    /// Organization whose ledger this entry belongs to.
    pub organization_id: OrganizationId,

    /// 1-based position in the organization's ledger.
    pub sequence: u64,

    /// Kind of entry.
    pub transaction_type: TransactionType,

    /// Signed amount. Negative only for deductions.
    pub amount: i64,

    /// Balance after applying `amount`. Never negative.
    pub balance_after: i64,

    /// What this entry paid for, if anything. Lookup hint only.
    pub related_entity: Option<RelatedEntity>,

    /// Free-form metadata, including the external event id used for dedup.
    pub metadata: TransactionMetadata,

    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    /// Build the entry that applies `draft` on top of `previous`.
    ///
    /// `previous` is the organization's current head, or `None` for an empty
    /// ledger.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] if the amount is zero or has the wrong
    ///   sign for its type.
    /// - [`LedgerError::InsufficientCredits`] if the resulting balance would be
    ///   negative.
    pub fn next(draft: NewTransaction, previous: Option<&Self>) -> Result<Self, LedgerError> {
        draft.transaction_type.validate_amount(draft.amount)?;

        let (balance, sequence) = previous.map_or((0, 0), |p| (p.balance_after, p.sequence));
        let balance_after = balance
            .checked_add(draft.amount)
            .ok_or_else(|| LedgerError::InvalidAmount(format!("amount {} overflows", draft.amount)))?;

        if balance_after < 0 {
            return Err(LedgerError::InsufficientCredits {
                balance,
                required: -draft.amount,
            });
        }

        Ok(Self {
            id: TransactionId::generate(),
            organization_id: draft.organization_id,
            sequence: sequence + 1,
            transaction_type: draft.transaction_type,
            amount: draft.amount,
            balance_after,
            related_entity: draft.related_entity,
            metadata: draft.metadata,
            created_at: Utc::now(),
        })
    }

    /// Check that this entry is a valid successor of `previous`.
    ///
    /// Storage backends call this at commit time so that a stale head can never
    /// produce a broken chain or a negative balance.
    #[must_use]
    pub fn follows(&self, previous: Option<&Self>) -> bool {
        let (balance, sequence) = previous.map_or((0, 0), |p| (p.balance_after, p.sequence));
        previous.map_or(true, |p| p.organization_id == self.organization_id)
            && self.sequence == sequence + 1
            && self.amount != 0
            && balance.checked_add(self.amount) == Some(self.balance_after)
            && self.balance_after >= 0
    }

    /// The external event id, if this entry came from an external system.
    #[must_use]
    pub fn external_event_id(&self) -> Option<&str> {
        self.metadata.external_event_id.as_deref()
    }
}

/// An entry that has not been applied to a ledger yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    /// Target organization.
    pub organization_id: OrganizationId,
    /// Kind of entry.
    pub transaction_type: TransactionType,
    /// Signed amount.
    pub amount: i64,
    /// Optional weak reference.
    pub related_entity: Option<RelatedEntity>,
    /// Metadata to store with the entry.
    pub metadata: TransactionMetadata,
}

impl NewTransaction {
    /// Start a draft with empty metadata.
    #[must_use]
    pub fn new(organization_id: OrganizationId, transaction_type: TransactionType, amount: i64) -> Self {
        Self {
            organization_id,
            transaction_type,
            amount,
            related_entity: None,
            metadata: TransactionMetadata::default(),
        }
    }

    /// Attach a related entity.
    #[must_use]
    pub fn with_related_entity(mut self, related: RelatedEntity) -> Self {
        self.related_entity = Some(related);
        self
    }

    /// Replace the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: TransactionMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Kind of ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Credits bought through the payment provider.
    Purchase,

    /// Credits spent (CV unlocks).
    Deduction,

    /// Credits returned to the organization.
    Refund,

    /// Manual credit granted by an administrator.
    Adjustment,
}

impl TransactionType {
    /// Whether entries of this type add credits.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(self, Self::Purchase | Self::Refund | Self::Adjustment)
    }

    /// Whether entries of this type remove credits.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        matches!(self, Self::Deduction)
    }

    /// Stable lowercase name, as stored.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Deduction => "deduction",
            Self::Refund => "refund",
            Self::Adjustment => "adjustment",
        }
    }

    /// Reject amounts that are zero or carry the wrong sign for this type.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidAmount`] on misuse.
    pub fn validate_amount(&self, amount: i64) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount("amount must not be zero".into()));
        }
        if self.is_debit() && amount > 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "{} amount must be negative, got {amount}",
                self.as_str()
            )));
        }
        if self.is_credit() && amount < 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "{} amount must be positive, got {amount}",
                self.as_str()
            )));
        }
        Ok(())
    }
}

/// Error returned when a string names no [`TransactionType`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transaction type: {0}")]
pub struct UnknownTransactionType(pub String);

impl std::str::FromStr for TransactionType {
    type Err = UnknownTransactionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(Self::Purchase),
            "deduction" => Ok(Self::Deduction),
            "refund" => Ok(Self::Refund),
            "adjustment" => Ok(Self::Adjustment),
            other => Err(UnknownTransactionType(other.to_string())),
        }
    }
}

/// Weak reference from a transaction to the thing it paid for.
///
/// Deleting the referenced entity never touches the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedEntity {
    /// Kind of entity.
    pub entity_type: EntityType,
    /// Identifier, stored as text.
    pub entity_id: String,
}

impl RelatedEntity {
    /// Reference a CV.
    #[must_use]
    pub fn cv(id: crate::CvId) -> Self {
        Self {
            entity_type: EntityType::Cv,
            entity_id: id.to_string(),
        }
    }

    /// Reference a job.
    #[must_use]
    pub fn job(id: crate::JobId) -> Self {
        Self {
            entity_type: EntityType::Job,
            entity_id: id.to_string(),
        }
    }

    /// Reference another ledger transaction.
    #[must_use]
    pub fn transaction(id: TransactionId) -> Self {
        Self {
            entity_type: EntityType::Transaction,
            entity_id: id.to_string(),
        }
    }
}

/// Kinds of entity a transaction can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A CV.
    Cv,
    /// A job posting.
    Job,
    /// Another ledger transaction (refunds point at their deduction).
    Transaction,
}

impl EntityType {
    /// Stable lowercase name, as stored.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cv => "cv",
            Self::Job => "job",
            Self::Transaction => "transaction",
        }
    }
}

/// Metadata stored alongside a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    /// Identifier supplied by an external system; unique across the ledger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_event_id: Option<String>,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// User who triggered the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performed_by: Option<UserId>,

    /// Anything else the caller wants to keep.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

impl TransactionMetadata {
    /// Metadata with just a description.
    #[must_use]
    pub fn described(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Self::default()
        }
    }

    /// Set the external event id.
    #[must_use]
    pub fn with_external_event_id(mut self, id: impl Into<String>) -> Self {
        self.external_event_id = Some(id.into());
        self
    }

    /// Set the acting user.
    #[must_use]
    pub fn with_performed_by(mut self, user_id: Option<UserId>) -> Self {
        self.performed_by = user_id;
        self
    }
}

/// Filter and page selection for ledger history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryFilter {
    /// Inclusive lower bound on `created_at`.
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub end_date: Option<DateTime<Utc>>,
    /// Only entries of this type.
    pub transaction_type: Option<TransactionType>,
    /// 1-based page number.
    pub page: u32,
    /// Page size.
    pub limit: u32,
}

impl Default for HistoryFilter {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            transaction_type: None,
            page: 1,
            limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl HistoryFilter {
    /// Clamp page and limit into their valid ranges.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.page = self.page.max(1);
        self.limit = self.limit.clamp(1, MAX_HISTORY_LIMIT);
        self
    }

    /// Number of matching entries that precede the requested page.
    #[must_use]
    pub fn offset(&self) -> usize {
        (self.page.max(1) as usize - 1) * self.limit as usize
    }

    /// Whether `tx` passes the date and type filters.
    #[must_use]
    pub fn matches(&self, tx: &CreditTransaction) -> bool {
        self.start_date.map_or(true, |start| tx.created_at >= start)
            && self.end_date.map_or(true, |end| tx.created_at <= end)
            && self
                .transaction_type
                .map_or(true, |t| t == tx.transaction_type)
    }
}

/// Page metadata returned with history results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Total matching entries.
    pub total: u64,
    /// Total pages at the current limit.
    pub pages: u64,
    /// Current 1-based page.
    pub page: u32,
    /// Page size.
    pub limit: u32,
}

impl Pagination {
    /// Compute page metadata for `total` matches.
    #[must_use]
    pub fn new(total: u64, page: u32, limit: u32) -> Self {
        let limit = limit.max(1);
        Self {
            total,
            pages: total.div_ceil(u64::from(limit)),
            page,
            limit,
        }
    }
}

/// One page of ledger history, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPage {
    /// Entries on this page.
    pub transactions: Vec<CreditTransaction>,
    /// Page metadata.
    pub pagination: Pagination,
}
