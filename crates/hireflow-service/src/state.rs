//! Application state.

use std::sync::Arc;

use hireflow_store::Store;

use crate::config::ServiceConfig;
use crate::ledger::CreditLedger;
use crate::payments::PaymentEventAdapter;
use crate::visibility::VisibilityService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Credit ledger over `store`.
    pub ledger: Arc<CreditLedger>,

    /// Purchase confirmation handling.
    pub payments: PaymentEventAdapter,

    /// CV unlock workflow.
    pub visibility: VisibilityService,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Wire the services over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let ledger = Arc::new(
            CreditLedger::new(store.clone()).with_max_attempts(config.ledger_max_append_attempts),
        );

        if config.paddle_webhook_secret.is_none() {
            tracing::warn!("Paddle webhook secret not configured - webhooks will be rejected");
        }
        if config.auth_jwt_secret.is_none() {
            tracing::warn!("AUTH_JWT_SECRET not configured - user endpoints will reject all tokens");
        }

        Self {
            payments: PaymentEventAdapter::new(ledger.clone()),
            visibility: VisibilityService::new(store.clone(), ledger.clone()),
            store,
            ledger,
            config,
        }
    }
}
