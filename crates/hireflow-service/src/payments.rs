//! Payment event adapter.
//!
//! Turns verified purchase confirmations into ledger purchases. Redelivery is
//! handled entirely by the ledger's external event id dedup; this module keeps
//! no bookkeeping of its own.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use hireflow_core::{
    CreditTransaction, LedgerError, OrganizationId, Result, TransactionMetadata, UserId,
};

use crate::ledger::CreditLedger;

/// Payment state reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Money captured; credits may be granted.
    Completed,
    /// Payment still in flight.
    Pending,
    /// Payment failed or was canceled.
    Failed,
    /// Any other provider-specific state.
    #[serde(other)]
    Other,
}

impl PaymentStatus {
    /// Map a Paddle transaction status.
    #[must_use]
    pub fn from_paddle(status: &str) -> Self {
        match status {
            "completed" => Self::Completed,
            "draft" | "ready" | "billed" | "paid" => Self::Pending,
            "canceled" | "past_due" => Self::Failed,
            _ => Self::Other,
        }
    }
}

/// A verified purchase confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseEvent {
    /// Provider order id; the dedup key.
    pub external_event_id: String,
    /// Organization buying credits.
    pub organization_id: Option<OrganizationId>,
    /// Credits bought.
    pub credit_amount: Option<i64>,
    /// Payment state.
    pub status: PaymentStatus,
    /// User who started the checkout.
    #[serde(default)]
    pub performed_by: Option<UserId>,
    /// Optional description for the ledger entry.
    #[serde(default)]
    pub description: Option<String>,
}

/// What [`PaymentEventAdapter::handle_purchase_event`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseApplication {
    /// Whether the event produced (or matched) a ledger purchase.
    pub applied: bool,
    /// The purchase entry, if applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<CreditTransaction>,
}

/// Applies purchase events to the ledger.
#[derive(Clone)]
pub struct PaymentEventAdapter {
    ledger: Arc<CreditLedger>,
}

impl PaymentEventAdapter {
    /// Create an adapter writing to `ledger`.
    #[must_use]
    pub fn new(ledger: Arc<CreditLedger>) -> Self {
        Self { ledger }
    }

    /// Apply a purchase event.
    ///
    /// # Errors
    ///
    /// - `MalformedEvent` if the organization, a positive credit amount or the
    ///   event id is missing. The ledger is not touched.
    /// - Ledger errors from the purchase itself.
    pub async fn handle_purchase_event(&self, event: PurchaseEvent) -> Result<PurchaseApplication> {
        let (organization_id, amount) = match validate(&event) {
            Ok(fields) => fields,
            Err(err) => {
                tracing::warn!(
                    external_event_id = %event.external_event_id,
                    error = %err,
                    "Malformed purchase event"
                );
                return Err(err);
            }
        };

        if event.status != PaymentStatus::Completed {
            tracing::info!(
                external_event_id = %event.external_event_id,
                organization_id = %organization_id,
                status = ?event.status,
                "Purchase not completed, ledger untouched"
            );
            return Ok(PurchaseApplication {
                applied: false,
                transaction: None,
            });
        }

        let description = event
            .description
            .clone()
            .unwrap_or_else(|| format!("Purchase of {amount} credits"));
        let metadata =
            TransactionMetadata::described(description).with_performed_by(event.performed_by);

        let transaction = self
            .ledger
            .purchase(organization_id, amount, &event.external_event_id, metadata)
            .await?;

        Ok(PurchaseApplication {
            applied: true,
            transaction: Some(transaction),
        })
    }
}

fn validate(event: &PurchaseEvent) -> Result<(OrganizationId, i64)> {
    if event.external_event_id.trim().is_empty() {
        return Err(LedgerError::MalformedEvent("missing external event id".into()));
    }
    let organization_id = event
        .organization_id
        .ok_or_else(|| LedgerError::MalformedEvent("missing organization id".into()))?;
    let amount = event
        .credit_amount
        .filter(|amount| *amount > 0)
        .ok_or_else(|| LedgerError::MalformedEvent("missing or non-positive credit amount".into()))?;
    Ok((organization_id, amount))
}

// ============================================================================
// Paddle notifications
// ============================================================================

/// Paddle notification envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct PaddleNotification {
    /// Notification id (differs per delivery attempt of the same change).
    pub event_id: String,
    /// Notification type, e.g. `transaction.completed`.
    pub event_type: String,
    /// Notification payload.
    pub data: PaddleTransaction,
}

/// The `data` object of a Paddle transaction notification.
#[derive(Debug, Clone, Deserialize)]
pub struct PaddleTransaction {
    /// Paddle transaction (order) id.
    pub id: String,
    /// Paddle transaction status.
    #[serde(default)]
    pub status: String,
    /// Checkout custom data set by the frontend.
    #[serde(default)]
    pub custom_data: Option<PaddleCustomData>,
}

/// Custom data attached at checkout.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaddleCustomData {
    /// Buying organization.
    #[serde(rename = "organizationId", default)]
    pub organization_id: Option<String>,
    /// Credits bought; Paddle may echo it back as a string or a number.
    #[serde(default)]
    pub credits: Option<serde_json::Value>,
    /// User who started the checkout.
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
}

const PADDLE_TRANSACTION_EVENTS: [&str; 3] = [
    "transaction.completed",
    "transaction.paid",
    "transaction.updated",
];

impl PaddleNotification {
    /// Translate into a [`PurchaseEvent`].
    ///
    /// Returns `Ok(None)` for notifications that are not credit purchases.
    ///
    /// # Errors
    ///
    /// Returns `MalformedEvent` if the custom data cannot be parsed.
    pub fn into_purchase_event(self) -> Result<Option<PurchaseEvent>> {
        if !PADDLE_TRANSACTION_EVENTS.contains(&self.event_type.as_str()) {
            return Ok(None);
        }
        let custom = self.data.custom_data.unwrap_or_default();
        let Some(credits) = custom.credits else {
            return Ok(None);
        };

        let credit_amount = parse_credits(&credits)?;
        let organization_id = custom
            .organization_id
            .map(|id| id.parse::<OrganizationId>())
            .transpose()
            .map_err(|e| LedgerError::MalformedEvent(format!("organizationId: {e}")))?;
        // An unparseable buyer only loses attribution, not the purchase.
        let performed_by = custom.user_id.and_then(|id| id.parse::<UserId>().ok());

        Ok(Some(PurchaseEvent {
            external_event_id: self.data.id,
            organization_id,
            credit_amount: Some(credit_amount),
            status: PaymentStatus::from_paddle(&self.data.status),
            performed_by,
            description: Some(format!("Purchase of {credit_amount} credits")),
        }))
    }
}

fn parse_credits(value: &serde_json::Value) -> Result<i64> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| LedgerError::MalformedEvent(format!("invalid credits value: {value}")))
}
