//! Router configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{credits, cvs, health, webhooks};
use crate::state::AppState;

/// Maximum concurrent requests for user and service endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for admin endpoints.
const ADMIN_MAX_CONCURRENT_REQUESTS: usize = 10;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Credits (user JWT)
/// - `GET /v1/credits/balance` - Current balance
/// - `GET /v1/credits/transactions` - Paged history
///
/// ## CVs (user JWT unless noted)
/// - `POST /v1/cvs/unlock` - Unlock CVs by id
/// - `POST /v1/cvs/can-unlock` - Affordability check
/// - `GET /v1/cvs/:cv_id` - Read a CV
/// - `POST /v1/jobs/:job_id/cvs` - Ingest a classified CV (service key)
/// - `POST /v1/jobs/:job_id/unlock-cvs` - Unlock the newest locked CVs
/// - `GET /v1/jobs/:job_id/unlock-stats` - Locked/unlocked counts
///
/// ## Admin (admin key)
/// - `POST /v1/admin/credits/adjust` - Grant an adjustment or refund
/// - `POST /v1/admin/cvs/reconcile-unlock` - Flip an already-paid batch
///
/// ## Webhooks (signature verification)
/// - `POST /webhooks/paddle` - Paddle notifications
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let state = Arc::new(state);

    let admin_routes = Router::new()
        .route("/credits/adjust", post(credits::admin_credit))
        .route("/cvs/reconcile-unlock", post(cvs::reconcile_unlock))
        .layer(ConcurrencyLimitLayer::new(ADMIN_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Credits
        .route("/credits/balance", get(credits::get_balance))
        .route("/credits/transactions", get(credits::list_transactions))
        // CVs
        .route("/cvs/unlock", post(cvs::unlock_cvs))
        .route("/cvs/can-unlock", post(cvs::can_unlock))
        .route("/cvs/:cv_id", get(cvs::get_cv))
        // Jobs
        .route("/jobs/:job_id/cvs", post(cvs::create_cv))
        .route("/jobs/:job_id/unlock-cvs", post(cvs::unlock_next_by_job))
        .route("/jobs/:job_id/unlock-stats", get(cvs::unlock_stats))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS))
        .nest("/admin", admin_routes);

    Router::new()
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        // Webhooks (no rate limit - controlled by the provider)
        .route("/webhooks/paddle", post(webhooks::paddle_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
