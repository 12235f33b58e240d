//! Payment provider webhooks.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use hireflow_core::TransactionId;

use crate::crypto::verify_paddle_signature;
use crate::error::ApiError;
use crate::payments::PaddleNotification;
use crate::state::AppState;

/// Webhook acknowledgement.
#[derive(Debug, Default, Serialize)]
pub struct WebhookResponse {
    /// The notification was authentic and parsed far enough to be logged.
    pub received: bool,
    /// A ledger purchase exists for the notification.
    pub applied: bool,
    /// The purchase entry, when applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,
    /// Why the notification was not applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookResponse {
    fn ignored() -> Self {
        Self {
            received: true,
            ..Self::default()
        }
    }

    fn failed(error: impl ToString) -> Self {
        Self {
            received: true,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// Handle Paddle notifications.
///
/// Only signature failures, including a missing secret, are rejected. Everything else is acknowledged with
/// 200 so Paddle does not keep redelivering; the outcome is in the body.
pub async fn paddle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let Some(secret) = &state.config.paddle_webhook_secret else {
        tracing::error!("Paddle webhook secret not configured - rejecting notification");
        return Err(ApiError::BadRequest("Webhook verification not configured".into()));
    };

    let signature = headers
        .get("paddle-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing Paddle signature".into()))?;

    verify_paddle_signature(signature, &body, secret, Utc::now().timestamp()).map_err(|e| {
        tracing::warn!(error = %e, "Invalid Paddle webhook signature");
        ApiError::BadRequest("Invalid webhook signature".into())
    })?;

    let notification: PaddleNotification = match serde_json::from_slice(&body) {
        Ok(notification) => notification,
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable Paddle notification");
            return Ok(Json(WebhookResponse::failed(format!("invalid payload: {e}"))));
        }
    };

    let event_id = notification.event_id.clone();
    let event_type = notification.event_type.clone();
    tracing::info!(event_id = %event_id, event_type = %event_type, "Received Paddle webhook");

    let event = match notification.into_purchase_event() {
        Ok(Some(event)) => event,
        Ok(None) => {
            tracing::debug!(event_id = %event_id, event_type = %event_type, "Not a credit purchase");
            return Ok(Json(WebhookResponse::ignored()));
        }
        Err(e) => {
            tracing::warn!(event_id = %event_id, error = %e, "Malformed Paddle purchase");
            return Ok(Json(WebhookResponse::failed(e)));
        }
    };

    match state.payments.handle_purchase_event(event).await {
        Ok(application) => Ok(Json(WebhookResponse {
            received: true,
            applied: application.applied,
            transaction_id: application.transaction.map(|tx| tx.id),
            error: None,
        })),
        Err(e) => {
            if e.is_alertable() || matches!(e, hireflow_core::LedgerError::Contention { .. }) {
                tracing::error!(
                    alert = "purchase_not_applied",
                    event_id = %event_id,
                    error = %e,
                    "Paddle purchase could not be applied"
                );
            }
            Ok(Json(WebhookResponse::failed(e)))
        }
    }
}
