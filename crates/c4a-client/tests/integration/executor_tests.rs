use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use c4a_client::ReqwestExecutor;
use c4a_core::error::{ErrorKind, QuotaType};
use c4a_core::traits::{ApiRequest, Executor};
use c4a_core::ClientConfig;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use crate::integration::common::{TEST_KEY, executor, test_config};

#[tokio::test]
async fn sends_api_key_and_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/crawl"))
        .and(header("x-api-key", TEST_KEY))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"url": "https://example.com"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let data = executor(&server)
        .execute(ApiRequest::post("/v1/crawl").with_body(json!({"url": "https://example.com"})))
        .await
        .unwrap();
    assert_eq!(data["success"], true);
}

#[tokio::test]
async fn passes_query_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/crawl/jobs"))
        .and(query_param("status", "failed"))
        .and(query_param("limit", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jobs": []})))
        .expect(1)
        .mount(&server)
        .await;

    executor(&server)
        .execute(
            ApiRequest::get("/v1/crawl/jobs")
                .with_query("status", "failed")
                .with_query("limit", 3),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn empty_body_becomes_empty_object() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/crawl/jobs/job_1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let data = executor(&server)
        .execute(ApiRequest::delete("/v1/crawl/jobs/job_1"))
        .await
        .unwrap();
    assert_eq!(data, json!({}));
}

#[tokio::test]
async fn non_json_body_is_wrapped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let data = executor(&server)
        .execute(ApiRequest::get("/health"))
        .await
        .unwrap();
    assert_eq!(data, json!({"raw": "ok"}));
}

#[tokio::test]
async fn server_errors_are_retried_then_surface_as_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/crawl/jobs/job_1"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"detail": "Internal error"})),
        )
        .expect(3)
        .mount(&server)
        .await;

    let err = executor(&server)
        .execute(ApiRequest::get("/v1/crawl/jobs/job_1"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(err.status_code(), Some(500));
    assert_eq!(err.message(), "Internal error");
    assert_eq!(err.response()["detail"], "Internal error");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn server_error_then_success_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let data = executor(&server)
        .execute(ApiRequest::get("/health"))
        .await
        .unwrap();
    assert_eq!(data["status"], "ok");
}

#[tokio::test]
async fn gateway_timeout_exhausts_retries_as_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/crawl"))
        .respond_with(ResponseTemplate::new(504))
        .expect(3)
        .mount(&server)
        .await;

    let err = executor(&server)
        .execute(ApiRequest::post("/v1/crawl").with_body(json!({"url": "https://slow.test"})))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(err.status_code(), Some(504));
    assert_eq!(err.message(), "HTTP 504");
}

#[tokio::test]
async fn client_errors_fail_without_retry() {
    for (status, detail, kind) in [
        (400, "Invalid URL", ErrorKind::Validation),
        (401, "Invalid API key", ErrorKind::Authentication),
        (404, "Job not found", ErrorKind::NotFound),
        (409, "Conflict", ErrorKind::Generic),
    ] {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/crawl/jobs/job_1"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({"detail": detail})))
            .expect(1)
            .mount(&server)
            .await;

        let err = executor(&server)
            .execute(ApiRequest::get("/v1/crawl/jobs/job_1"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), kind, "status {status}");
        assert_eq!(err.status_code(), Some(status));
        assert_eq!(err.message(), detail);
    }
}

#[tokio::test]
async fn retries_back_off_exponentially() {
    let server = MockServer::start().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    Mock::given(method("GET"))
        .and(path("/v1/crawl/jobs/job_1"))
        .respond_with(move |_: &Request| {
            recorder.lock().unwrap().push(Instant::now());
            ResponseTemplate::new(500)
        })
        .expect(3)
        .mount(&server)
        .await;

    let config = test_config(&server).with_backoff_base(Duration::from_millis(50));
    let started = Instant::now();
    let err = ReqwestExecutor::new(config)
        .unwrap()
        .execute(ApiRequest::get("/v1/crawl/jobs/job_1"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Server);
    assert!(started.elapsed() >= Duration::from_millis(150));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert!(seen[1] - seen[0] >= Duration::from_millis(50));
    assert!(seen[2] - seen[1] >= Duration::from_millis(100));
}

#[tokio::test]
async fn client_errors_do_not_wait_for_backoff() {
    for status in [400, 401, 404] {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/crawl/jobs/job_1"))
            .respond_with(ResponseTemplate::new(status))
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(&server).with_backoff_base(Duration::from_secs(2));
        let started = Instant::now();
        let err = ReqwestExecutor::new(config)
            .unwrap()
            .execute(ApiRequest::get("/v1/crawl/jobs/job_1"))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(status));
        assert!(started.elapsed() < Duration::from_secs(2), "status {status}");
    }
}

#[tokio::test]
async fn rate_limit_carries_reset_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/crawl"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({"detail": "Rate limit exceeded. Try again later."}))
                .insert_header("X-RateLimit-Limit", "60")
                .insert_header("X-RateLimit-Remaining", "0")
                .insert_header("X-RateLimit-Reset", "42"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = executor(&server)
        .execute(ApiRequest::post("/v1/crawl"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RateLimit);
    assert_eq!(err.retry_after(), Some(42));
    assert_eq!(err.rate_limit(), Some(60));
    assert_eq!(err.rate_limit_remaining(), Some(0));
    assert_eq!(err.headers().get("x-ratelimit-reset").map(String::as_str), Some("42"));
}

#[tokio::test]
async fn other_429_is_quota_exceeded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/crawl/async"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({"detail": "Concurrent job limit reached"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = executor(&server)
        .execute(ApiRequest::post("/v1/crawl/async"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
    assert_eq!(err.quota_type(), Some(QuotaType::Concurrent));
    assert_eq!(err.retry_after(), None);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn connection_failure_becomes_timeout() {
    let config = ClientConfig::new(TEST_KEY)
        .unwrap()
        .with_base_url("http://127.0.0.1:1")
        .with_max_retries(2)
        .with_backoff_base(Duration::from_millis(1));

    let err = ReqwestExecutor::new(config)
        .unwrap()
        .execute(ApiRequest::get("/health"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(err.status_code(), None);
}

#[tokio::test]
async fn per_request_timeout_is_retried_then_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .expect(2)
        .mount(&server)
        .await;

    let config = test_config(&server).with_max_retries(2);
    let err = ReqwestExecutor::new(config)
        .unwrap()
        .execute(ApiRequest::get("/health").with_timeout(Duration::from_millis(100)))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(err.message().contains("timed out"));
}
