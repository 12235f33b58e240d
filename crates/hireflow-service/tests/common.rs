//! Common test utilities for hireflow integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;

use hireflow_core::{
    Candidate, CreditTransaction, Cv, CvSource, Job, NewCv, NewTransaction, OrganizationId,
    Ranking, RankingCategory, TransactionType, UserId,
};
use hireflow_service::auth::JwtClaims;
use hireflow_service::{create_router, AppState, ServiceConfig};
use hireflow_store::{MemoryStore, Store};

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const SERVICE_API_KEY: &str = "test-service-key";
pub const ADMIN_API_KEY: &str = "test-admin-key";
pub const PADDLE_SECRET: &str = "pdl_ntfset_test";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Backing store, for seeding jobs and inspecting CVs.
    pub store: Arc<MemoryStore>,
    /// The organization of the default test user.
    pub org: OrganizationId,
    /// The default test user.
    pub user: UserId,
}

impl TestHarness {
    /// Create a new test harness with a fresh in-memory store.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Create a harness after adjusting the default test configuration.
    pub fn with_config(adjust: impl FnOnce(&mut ServiceConfig)) -> Self {
        let store = Arc::new(MemoryStore::new());

        let mut config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            auth_jwt_secret: Some(JWT_SECRET.into()),
            service_api_key: Some(SERVICE_API_KEY.into()),
            admin_api_key: Some(ADMIN_API_KEY.into()),
            paddle_webhook_secret: Some(PADDLE_SECRET.into()),
            ..ServiceConfig::default()
        };
        adjust(&mut config);

        let state = AppState::new(store.clone(), config);
        let router: Router = create_router(state);
        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            org: OrganizationId::generate(),
            user: UserId::generate(),
        }
    }

    /// Authorization header for the default user.
    pub fn user_auth_header(&self) -> String {
        auth_header(self.user, self.org)
    }

    /// Authorization header for a user of another organization.
    pub fn other_org_auth_header() -> String {
        auth_header(UserId::generate(), OrganizationId::generate())
    }

    /// Grant credits through the admin endpoint.
    pub async fn fund(&self, credits: i64) {
        self.server
            .post("/v1/admin/credits/adjust")
            .add_header("x-admin-key", ADMIN_API_KEY)
            .json(&json!({
                "organization_id": self.org,
                "amount": credits,
                "description": "Test funding"
            }))
            .await
            .assert_status_ok();
    }

    /// Current balance via the API.
    pub async fn balance(&self) -> i64 {
        let response = self
            .server
            .get("/v1/credits/balance")
            .add_header("authorization", self.user_auth_header())
            .await;
        response.assert_status_ok();
        response.json::<serde_json::Value>()["balance"]
            .as_i64()
            .expect("balance is a number")
    }

    /// Append an adjustment directly with a chosen timestamp.
    pub async fn seed_credit_at(
        &self,
        amount: i64,
        created_at: chrono::DateTime<chrono::Utc>,
    ) -> CreditTransaction {
        let head = self.store.latest_transaction(&self.org).await.expect("head");
        let mut tx = CreditTransaction::next(
            NewTransaction::new(self.org, TransactionType::Adjustment, amount),
            head.as_ref(),
        )
        .expect("next transaction");
        tx.created_at = created_at;
        self.store.append_transaction(&tx).await.expect("append");
        tx
    }

    /// Create a job owned by the default organization.
    pub async fn job(&self, title: &str) -> Job {
        let job = Job::new(self.org, title);
        self.store.put_job(&job).await.expect("put job");
        job
    }

    /// Ingest a CV through the service endpoint.
    pub async fn ingest_cv(&self, job: &Job, category: &str) -> serde_json::Value {
        let response = self
            .server
            .post(&format!("/v1/jobs/{}/cvs", job.id))
            .add_header("x-api-key", SERVICE_API_KEY)
            .add_header("x-service-name", "cv-pipeline")
            .json(&json!({
                "organization_id": self.org,
                "candidate": {
                    "full_name": "Grace Hopper",
                    "email": "grace@example.com",
                    "phone": "+1 555 0100"
                },
                "ranking": { "category": category, "justification": "test" }
            }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        response.json()
    }

    /// Insert a locked CV directly with a chosen age in minutes.
    pub async fn seed_locked_cv(&self, job: &Job, minutes_ago: i64) -> Cv {
        let mut cv = Cv::new(NewCv {
            organization_id: self.org,
            job_id: job.id,
            candidate: Candidate {
                full_name: "Seeded Candidate".into(),
                email: Some("seeded@example.com".into()),
                ..Candidate::default()
            },
            ranking: Ranking {
                category: RankingCategory::Relevant,
                justification: String::new(),
                relevance_score: None,
            },
            source: CvSource::Manual,
        });
        cv.created_at = chrono::Utc::now() - chrono::Duration::minutes(minutes_ago);
        self.store.put_cv(&cv).await.expect("put cv");
        cv
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Bearer header carrying a signed session token.
pub fn auth_header(user: UserId, org: OrganizationId) -> String {
    let claims = JwtClaims {
        sub: user.to_string(),
        org: org.to_string(),
        aud: Some("hireflow".into()),
        exp: chrono::Utc::now().timestamp() + 3600,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("encode token");
    format!("Bearer {token}")
}
