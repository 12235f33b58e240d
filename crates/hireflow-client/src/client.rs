//! Hireflow HTTP client implementation.

use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;

use hireflow_core::{CvId, JobId};

use crate::error::ClientError;
use crate::types::{
    ApiErrorResponse, BalanceResponse, HistoryQuery, JobUnlockStats, TransactionPage,
    UnlockNextRequest, UnlockQuote, UnlockRequest, UnlockResponse,
};

/// Hireflow API client acting for one recruiter session.
#[derive(Debug, Clone)]
pub struct HireflowClient {
    client: Client,
    base_url: String,
    token: String,
}

impl HireflowClient {
    /// Create a client.
    ///
    /// * `base_url` - Base URL of the service (e.g., `"http://hireflow:8080"`)
    /// * `token` - Session JWT sent as a bearer token
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_options(base_url, token, ClientOptions::default())
    }

    /// Create a client with custom options.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be built.
    pub fn with_options(
        base_url: impl Into<String>,
        token: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .map_err(|e| ClientError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Current balance of the session's organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_balance(&self) -> Result<BalanceResponse, ClientError> {
        self.send(self.client.get(self.url("/v1/credits/balance")))
            .await
    }

    /// One page of transaction history, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn list_transactions(
        &self,
        query: &HistoryQuery,
    ) -> Result<TransactionPage, ClientError> {
        self.send(
            self.client
                .get(self.url("/v1/credits/transactions"))
                .query(query),
        )
        .await
    }

    /// Unlock specific CVs.
    ///
    /// # Errors
    ///
    /// `ClientError::InsufficientCredits` if the organization cannot pay,
    /// `ClientError::NotFound` if any CV is not visible to the organization.
    pub async fn unlock_cvs(&self, cv_ids: &[CvId]) -> Result<UnlockResponse, ClientError> {
        self.send(
            self.client
                .post(self.url("/v1/cvs/unlock"))
                .json(&UnlockRequest { cv_ids }),
        )
        .await
    }

    /// Check what unlocking `cv_ids` would cost.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn can_unlock(&self, cv_ids: &[CvId]) -> Result<UnlockQuote, ClientError> {
        self.send(
            self.client
                .post(self.url("/v1/cvs/can-unlock"))
                .json(&UnlockRequest { cv_ids }),
        )
        .await
    }

    /// Unlock the `count` newest locked CVs of a job.
    ///
    /// # Errors
    ///
    /// `ClientError::InsufficientCredits` if the organization cannot pay,
    /// `ClientError::NotFound` if the job is not the organization's.
    pub async fn unlock_next_by_job(
        &self,
        job_id: JobId,
        count: usize,
    ) -> Result<UnlockResponse, ClientError> {
        self.send(
            self.client
                .post(self.url(&format!("/v1/jobs/{job_id}/unlock-cvs")))
                .json(&UnlockNextRequest { count }),
        )
        .await
    }

    /// Locked/unlocked counts for a job.
    ///
    /// # Errors
    ///
    /// `ClientError::NotFound` if the job is not the organization's.
    pub async fn unlock_stats(&self, job_id: JobId) -> Result<JobUnlockStats, ClientError> {
        self.send(
            self.client
                .get(self.url(&format!("/v1/jobs/{job_id}/unlock-stats"))),
        )
        .await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = request.bearer_auth(&self.token).send().await?;
        Self::handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let error_body: Option<ApiErrorResponse> = response.json().await.ok();
        tracing::debug!(status = %status, error = ?error_body, "Hireflow request failed");

        match (status, error_body) {
            (StatusCode::PAYMENT_REQUIRED, body) => {
                let details = body.and_then(|b| b.error.details);
                let field = |name: &str| {
                    details
                        .as_ref()
                        .and_then(|d| d.get(name))
                        .and_then(serde_json::Value::as_i64)
                        .unwrap_or(0)
                };
                Err(ClientError::InsufficientCredits {
                    balance: field("balance"),
                    required: field("required"),
                })
            }
            (StatusCode::NOT_FOUND, body) => Err(ClientError::NotFound {
                message: body.map_or_else(|| "not found".to_string(), |b| b.error.message),
            }),
            (StatusCode::UNAUTHORIZED, _) => Err(ClientError::Unauthorized),
            (_, Some(body)) => Err(ClientError::Api {
                code: body.error.code,
                message: body.error.message,
                status: status.as_u16(),
            }),
            (_, None) => Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            }),
        }
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 30).
    pub timeout_seconds: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
        }
    }
}
