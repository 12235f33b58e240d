//! Credit ledger service.
//!
//! The only writer of credit transactions. Every append reads the
//! organization's head, builds the successor entry and asks the store to
//! commit it at `head.sequence + 1`. When another writer got there first the
//! store reports a conflict and the append is re-evaluated against the new
//! head, so affordability is always checked against the balance that is
//! actually committed.

use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};

use hireflow_core::{
    CreditTransaction, HistoryFilter, LedgerError, NewTransaction, OrganizationId, RelatedEntity,
    Result, TransactionMetadata, TransactionPage, TransactionType, UserId,
};
use hireflow_store::{Store, StoreError};

use crate::config::DEFAULT_MAX_APPEND_ATTEMPTS;

/// Metadata attached to a deduction.
#[derive(Debug, Clone, Default)]
pub struct DeductionContext {
    /// What the credits paid for.
    pub related_entity: Option<RelatedEntity>,
    /// Human-readable description.
    pub description: Option<String>,
    /// User who triggered the deduction.
    pub performed_by: Option<UserId>,
}

/// Result of [`CreditLedger::deduct`].
///
/// Running out of credits is an expected outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeductOutcome {
    /// The deduction was committed.
    Applied {
        /// The committed entry.
        transaction: CreditTransaction,
        /// Balance right after the deduction.
        remaining_balance: i64,
    },
    /// Nothing was written.
    InsufficientCredits {
        /// Balance at the time of the attempt.
        remaining_balance: i64,
        /// Credits the deduction needed.
        required: i64,
    },
}

/// Append-only credit ledger over a [`Store`].
#[derive(Clone)]
pub struct CreditLedger {
    store: Arc<dyn Store>,
    max_attempts: u32,
}

impl CreditLedger {
    /// Create a ledger with the default retry budget.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_APPEND_ATTEMPTS,
        }
    }

    /// Override how many compare-and-append attempts a write may use.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Current balance: the latest `balance_after`, or 0 for an empty ledger.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Storage` if the store cannot be read.
    pub async fn get_balance(&self, organization_id: &OrganizationId) -> Result<i64> {
        Ok(self
            .store
            .latest_transaction(organization_id)
            .await?
            .map_or(0, |head| head.balance_after))
    }

    /// Append a transaction to the organization's ledger.
    ///
    /// If `draft` carries an external event id that is already recorded, the
    /// stored transaction is returned unchanged and nothing is written.
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` for a zero amount or a sign that does not match the type.
    /// - `InsufficientCredits` if the balance would go negative.
    /// - `Contention` if every attempt lost the race for the next sequence.
    /// - `Storage` on backend failure.
    pub async fn append_transaction(&self, draft: NewTransaction) -> Result<CreditTransaction> {
        draft.transaction_type.validate_amount(draft.amount)?;
        let organization_id = draft.organization_id;

        if let Some(event_id) = draft.metadata.external_event_id.as_deref() {
            if let Some(existing) = self.store.find_by_external_event_id(event_id).await? {
                tracing::debug!(
                    organization_id = %organization_id,
                    external_event_id = %event_id,
                    transaction_id = %existing.id,
                    "External event already recorded"
                );
                return Ok(existing);
            }
        }

        let mut delays = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(2))
            .with_max_delay(Duration::from_millis(50))
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
            .with_jitter()
            .build();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let head = self.store.latest_transaction(&organization_id).await?;
            let transaction = match CreditTransaction::next(draft.clone(), head.as_ref()) {
                Ok(transaction) => transaction,
                Err(err @ LedgerError::InsufficientCredits { balance, required }) => {
                    tracing::info!(
                        organization_id = %organization_id,
                        balance,
                        required,
                        "Insufficient credits"
                    );
                    return Err(err);
                }
                Err(err) => return Err(err),
            };

            match self.store.append_transaction(&transaction).await {
                Ok(()) => {
                    tracing::info!(
                        organization_id = %organization_id,
                        transaction_id = %transaction.id,
                        transaction_type = transaction.transaction_type.as_str(),
                        amount = transaction.amount,
                        balance_after = transaction.balance_after,
                        sequence = transaction.sequence,
                        "Transaction recorded"
                    );
                    return Ok(transaction);
                }
                Err(StoreError::DuplicateEvent { event_id, existing }) => {
                    tracing::debug!(
                        organization_id = %organization_id,
                        external_event_id = %event_id,
                        "Lost dedup race, returning recorded transaction"
                    );
                    return Ok(*existing);
                }
                Err(StoreError::Conflict { .. }) => match delays.next() {
                    Some(delay) => {
                        tracing::debug!(
                            organization_id = %organization_id,
                            attempt,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "Ledger head moved, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::warn!(
                            organization_id = %organization_id,
                            attempts = attempt,
                            "Ledger append gave up under contention"
                        );
                        return Err(LedgerError::Contention {
                            organization_id,
                            attempts: attempt,
                        });
                    }
                },
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Spend `amount` credits.
    ///
    /// # Errors
    ///
    /// `InvalidAmount` if `amount` is not positive; otherwise as
    /// [`append_transaction`](Self::append_transaction), except that
    /// insufficient credits is reported through [`DeductOutcome`].
    pub async fn deduct(
        &self,
        organization_id: OrganizationId,
        amount: i64,
        context: DeductionContext,
    ) -> Result<DeductOutcome> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "deduction must be positive, got {amount}"
            )));
        }

        let mut metadata = TransactionMetadata::default().with_performed_by(context.performed_by);
        metadata.description = context.description;
        let mut draft = NewTransaction::new(organization_id, TransactionType::Deduction, -amount)
            .with_metadata(metadata);
        draft.related_entity = context.related_entity;

        match self.append_transaction(draft).await {
            Ok(transaction) => Ok(DeductOutcome::Applied {
                remaining_balance: transaction.balance_after,
                transaction,
            }),
            Err(LedgerError::InsufficientCredits { balance, required }) => {
                Ok(DeductOutcome::InsufficientCredits {
                    remaining_balance: balance,
                    required,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Credit a completed purchase exactly once per `external_event_id`.
    ///
    /// # Errors
    ///
    /// `MalformedEvent` if `external_event_id` is empty; otherwise as
    /// [`append_transaction`](Self::append_transaction).
    pub async fn purchase(
        &self,
        organization_id: OrganizationId,
        amount: i64,
        external_event_id: &str,
        metadata: TransactionMetadata,
    ) -> Result<CreditTransaction> {
        if external_event_id.trim().is_empty() {
            return Err(LedgerError::MalformedEvent(
                "purchase requires an external event id".into(),
            ));
        }

        self.append_transaction(
            NewTransaction::new(organization_id, TransactionType::Purchase, amount)
                .with_metadata(metadata.with_external_event_id(external_event_id)),
        )
        .await
    }

    /// Give credits back to an organization.
    ///
    /// # Errors
    ///
    /// As [`append_transaction`](Self::append_transaction).
    pub async fn refund(
        &self,
        organization_id: OrganizationId,
        amount: i64,
        related_entity: Option<RelatedEntity>,
        metadata: TransactionMetadata,
    ) -> Result<CreditTransaction> {
        let mut draft = NewTransaction::new(organization_id, TransactionType::Refund, amount)
            .with_metadata(metadata);
        draft.related_entity = related_entity;
        self.append_transaction(draft).await
    }

    /// Grant credits manually.
    ///
    /// # Errors
    ///
    /// As [`append_transaction`](Self::append_transaction).
    pub async fn adjust(
        &self,
        organization_id: OrganizationId,
        amount: i64,
        metadata: TransactionMetadata,
    ) -> Result<CreditTransaction> {
        self.append_transaction(
            NewTransaction::new(organization_id, TransactionType::Adjustment, amount)
                .with_metadata(metadata),
        )
        .await
    }

    /// Page through the organization's ledger, newest first.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Storage` if the store cannot be read.
    pub async fn history(
        &self,
        organization_id: &OrganizationId,
        filter: &HistoryFilter,
    ) -> Result<TransactionPage> {
        Ok(self
            .store
            .list_transactions(organization_id, &filter.clone().normalized())
            .await?)
    }
}
