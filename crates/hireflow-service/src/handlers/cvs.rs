//! CV ingestion and unlock handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use hireflow_core::{
    Candidate, Cv, CvId, CvSource, JobId, NewCv, OrganizationId, Ranking, TransactionId, UserId,
};

use crate::auth::{AdminAuth, AuthUser, ServiceAuth};
use crate::error::ApiError;
use crate::state::AppState;
use crate::visibility::{JobUnlockStats, UnlockOutcome, UnlockQuote};

/// Upper bound on CVs per unlock request.
const MAX_UNLOCK_BATCH: usize = 500;

/// Unlock by ids request.
#[derive(Debug, Deserialize)]
pub struct UnlockRequest {
    /// CVs to unlock.
    pub cv_ids: Vec<CvId>,
}

/// Unlock response.
#[derive(Debug, Serialize)]
pub struct UnlockResponse {
    /// CVs flipped by this request.
    pub unlocked_count: u64,
    /// Balance after the request.
    pub remaining_credits: i64,
    /// The deduction, if anything was billed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,
}

impl TryFrom<UnlockOutcome> for UnlockResponse {
    type Error = ApiError;

    fn try_from(outcome: UnlockOutcome) -> Result<Self, Self::Error> {
        match outcome {
            UnlockOutcome::Unlocked {
                unlocked_count,
                remaining_credits,
                transaction_id,
            } => Ok(Self {
                unlocked_count,
                remaining_credits,
                transaction_id,
            }),
            UnlockOutcome::InsufficientCredits {
                remaining_credits,
                required_credits,
            } => Err(ApiError::InsufficientCredits {
                balance: remaining_credits,
                required: required_credits,
            }),
        }
    }
}

fn check_batch(len: usize) -> Result<(), ApiError> {
    if len == 0 {
        return Err(ApiError::BadRequest("at least one CV is required".into()));
    }
    if len > MAX_UNLOCK_BATCH {
        return Err(ApiError::BadRequest(format!(
            "at most {MAX_UNLOCK_BATCH} CVs per request"
        )));
    }
    Ok(())
}

/// Unlock specific CVs.
pub async fn unlock_cvs(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<UnlockRequest>,
) -> Result<Json<UnlockResponse>, ApiError> {
    check_batch(req.cv_ids.len())?;

    let outcome = state
        .visibility
        .unlock_by_ids(&req.cv_ids, auth.user_id, auth.organization_id)
        .await?;
    Ok(Json(outcome.try_into()?))
}

/// Affordability check for a set of CVs.
pub async fn can_unlock(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<UnlockRequest>,
) -> Result<Json<UnlockQuote>, ApiError> {
    check_batch(req.cv_ids.len())?;

    let quote = state
        .visibility
        .can_unlock(&req.cv_ids, &auth.organization_id)
        .await?;
    Ok(Json(quote))
}

/// Read one CV; contact details are removed while it is locked.
pub async fn get_cv(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(cv_id): Path<CvId>,
) -> Result<Json<Cv>, ApiError> {
    let cv = state.visibility.get_cv(cv_id, &auth.organization_id).await?;
    Ok(Json(cv))
}

/// Classified submission pushed by the ingestion pipeline.
#[derive(Debug, Deserialize)]
pub struct CreateCvRequest {
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Extracted candidate record.
    pub candidate: Candidate,
    /// Classifier output.
    pub ranking: Ranking,
    /// Where the submission came from (default: landing page).
    #[serde(default = "default_source")]
    pub source: CvSource,
}

fn default_source() -> CvSource {
    CvSource::LandingPage
}

/// Service endpoint: record a classified CV for a job.
pub async fn create_cv(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Path(job_id): Path<JobId>,
    Json(req): Json<CreateCvRequest>,
) -> Result<(StatusCode, Json<Cv>), ApiError> {
    let cv = state
        .visibility
        .create_cv(NewCv {
            organization_id: req.organization_id,
            job_id,
            candidate: req.candidate,
            ranking: req.ranking,
            source: req.source,
        })
        .await?;

    tracing::debug!(service = %service.service_name, cv_id = %cv.id, "CV ingested");
    Ok((StatusCode::CREATED, Json(cv.redacted())))
}

/// Unlock-next request.
#[derive(Debug, Deserialize)]
pub struct UnlockNextRequest {
    /// How many of the newest locked CVs to unlock.
    pub count: usize,
}

/// Unlock the newest locked CVs of a job.
pub async fn unlock_next_by_job(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(job_id): Path<JobId>,
    Json(req): Json<UnlockNextRequest>,
) -> Result<Json<UnlockResponse>, ApiError> {
    check_batch(req.count)?;

    let outcome = state
        .visibility
        .unlock_next_by_job(job_id, req.count, auth.user_id, auth.organization_id)
        .await?;
    Ok(Json(outcome.try_into()?))
}

/// Locked/unlocked counts for a job.
pub async fn unlock_stats(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(job_id): Path<JobId>,
) -> Result<Json<JobUnlockStats>, ApiError> {
    let stats = state
        .visibility
        .job_unlock_stats(job_id, &auth.organization_id)
        .await?;
    Ok(Json(stats))
}

/// Reconcile request for a paid-but-locked batch.
#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    /// Organization that was charged.
    pub organization_id: OrganizationId,
    /// User recorded in the audit trail.
    pub user_id: UserId,
    /// CVs covered by the deduction.
    pub cv_ids: Vec<CvId>,
}

/// Reconcile response.
#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    /// CVs that changed.
    pub unlocked_count: u64,
}

/// Admin endpoint: flip CVs whose unlock was already paid for.
pub async fn reconcile_unlock(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(req): Json<ReconcileRequest>,
) -> Result<Json<ReconcileResponse>, ApiError> {
    check_batch(req.cv_ids.len())?;

    let unlocked_count = state
        .visibility
        .reconcile_unlock(&req.cv_ids, req.user_id, req.organization_id)
        .await?;

    tracing::info!(
        admin_id = %admin.admin_id,
        organization_id = %req.organization_id,
        unlocked_count,
        "Admin reconciled unlock"
    );
    Ok(Json(ReconcileResponse { unlocked_count }))
}
