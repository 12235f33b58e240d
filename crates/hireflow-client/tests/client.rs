//! Client SDK tests against a mocked service.

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hireflow_client::{ClientError, HireflowClient, HistoryQuery};
use hireflow_core::{CvId, JobId, TransactionType};

async fn client(server: &MockServer) -> HireflowClient {
    HireflowClient::new(server.uri(), "session-token").unwrap()
}

#[tokio::test]
async fn balance_sends_bearer_token() {
    let server = MockServer::start().await;
    let org = hireflow_core::OrganizationId::generate();

    Mock::given(method("GET"))
        .and(path("/v1/credits/balance"))
        .and(header("authorization", "Bearer session-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "organization_id": org, "balance": 42 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let balance = client(&server).await.get_balance().await.unwrap();
    assert_eq!(balance.balance, 42);
    assert_eq!(balance.organization_id, org);
}

#[tokio::test]
async fn unlock_maps_payment_required() {
    let server = MockServer::start().await;
    let cv = CvId::generate();

    Mock::given(method("POST"))
        .and(path("/v1/cvs/unlock"))
        .and(body_json(json!({ "cv_ids": [cv] })))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "error": {
                "code": "insufficient_credits",
                "message": "insufficient credits: balance=2, required=5",
                "details": { "balance": 2, "required": 5 }
            }
        })))
        .mount(&server)
        .await;

    let err = client(&server).await.unlock_cvs(&[cv]).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::InsufficientCredits {
            balance: 2,
            required: 5
        }
    ));
}

#[tokio::test]
async fn unlock_stats_maps_not_found() {
    let server = MockServer::start().await;
    let job = JobId::generate();

    Mock::given(method("GET"))
        .and(path(format!("/v1/jobs/{job}/unlock-stats")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": "not_found", "message": format!("job not found: {job}") }
        })))
        .mount(&server)
        .await;

    let err = client(&server).await.unlock_stats(job).await.unwrap_err();
    match err {
        ClientError::NotFound { message } => assert!(message.contains(&job.to_string())),
        other => panic!("expected not found, got {other:?}"),
    }
}

#[tokio::test]
async fn unlock_next_by_job_posts_count() {
    let server = MockServer::start().await;
    let job = JobId::generate();

    Mock::given(method("POST"))
        .and(path(format!("/v1/jobs/{job}/unlock-cvs")))
        .and(body_json(json!({ "count": 2 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "unlocked_count": 2,
            "remaining_credits": 8
        })))
        .mount(&server)
        .await;

    let response = client(&server)
        .await
        .unlock_next_by_job(job, 2)
        .await
        .unwrap();
    assert_eq!(response.unlocked_count, 2);
    assert_eq!(response.remaining_credits, 8);
    assert!(response.transaction_id.is_none());
}

#[tokio::test]
async fn history_passes_filters_as_query() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/credits/transactions"))
        .and(query_param("type", "purchase"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "transactions": [],
            "pagination": { "total": 0, "pages": 0, "page": 1, "limit": 5 }
        })))
        .mount(&server)
        .await;

    let page = client(&server)
        .await
        .list_transactions(&HistoryQuery {
            limit: Some(5),
            transaction_type: Some(TransactionType::Purchase),
            ..HistoryQuery::default()
        })
        .await
        .unwrap();
    assert!(page.transactions.is_empty());
    assert_eq!(page.pagination.limit, 5);
}

#[tokio::test]
async fn unexpected_errors_keep_code_and_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/cvs/can-unlock"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": { "code": "ledger_busy", "message": "ledger busy, retry later" }
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .await
        .can_unlock(&[CvId::generate()])
        .await
        .unwrap_err();
    match err {
        ClientError::Api { code, status, .. } => {
            assert_eq!(code, "ledger_busy");
            assert_eq!(status, 503);
        }
        other => panic!("expected api error, got {other:?}"),
    }
}
