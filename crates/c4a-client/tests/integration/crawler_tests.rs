use std::time::Duration;

use c4a_core::error::ErrorKind;
use c4a_core::{
    ContextRequest, CrawlRequest, CrawlStrategy, DeepCrawlRequest, JobStatus, ListJobsQuery,
    ScanStatus, SchemaRequest, SchemaType, WaitOptions,
};
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::integration::common::crawler;

fn fast_wait() -> WaitOptions {
    WaitOptions::new()
        .with_poll_interval(Duration::from_millis(10))
        .with_timeout(Duration::from_secs(5))
}

fn job_body(status: &str, completed: u64) -> Value {
    json!({
        "job_id": "job_1",
        "status": status,
        "progress": {"total": 2, "completed": completed, "failed": 0},
        "urls_count": 2,
        "created_at": "2026-01-01T00:00:00Z"
    })
}

async fn mount_once(server: &MockServer, verb: &str, route: &str, body: Value) {
    Mock::given(method(verb))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .up_to_n_times(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn run_returns_crawl_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/crawl"))
        .and(body_partial_json(json!({"url": "https://example.com", "strategy": "http"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": "https://example.com",
            "success": true,
            "status_code": 200,
            "markdown": {"raw_markdown": "# Example Domain", "fit_markdown": "Example"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = CrawlRequest::new().with_strategy(CrawlStrategy::Http);
    let result = crawler(&server)
        .run("https://example.com", &request)
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.status_code, Some(200));
    assert_eq!(result.raw_markdown(), Some("# Example Domain"));
}

#[tokio::test]
async fn run_batch_returns_results_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/crawl/batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"url": "https://a.test", "success": true},
                {"url": "https://b.test", "success": false, "error_message": "DNS failure"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let urls = vec!["https://a.test".to_string(), "https://b.test".to_string()];
    let results = crawler(&server)
        .run_batch(&urls, &CrawlRequest::new())
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[1].error_message.as_deref(), Some("DNS failure"));
}

#[tokio::test]
async fn submit_then_status_has_no_results() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/crawl/async"))
        .and(body_partial_json(json!({"urls": ["https://a.test", "https://b.test"], "priority": 5})))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_body("pending", 0)))
        .expect(1)
        .mount(&server)
        .await;
    mount_once(&server, "GET", "/v1/crawl/jobs/job_1", job_body("running", 1)).await;

    let crawler = crawler(&server);
    let urls = vec!["https://a.test".to_string(), "https://b.test".to_string()];
    let job = crawler
        .run_many(&urls, &CrawlRequest::new(), None)
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Pending);

    let job = crawler.get_job(&job.id, false).await.unwrap();
    assert!(matches!(job.status, JobStatus::Pending | JobStatus::Running));
    assert!(job.results.is_none());
    assert_eq!(job.progress_percent(), 50.0);
}

#[tokio::test]
async fn run_many_waits_and_fetches_results_once() {
    let server = MockServer::start().await;
    mount_once(&server, "POST", "/v1/crawl/async", job_body("pending", 0)).await;

    let mut done = job_body("completed", 2);
    done["results"] = json!([
        {"url": "https://a.test", "success": true, "markdown": "# A"},
        {"url": "https://b.test", "success": true, "markdown": "# B"}
    ]);
    Mock::given(method("GET"))
        .and(path("/v1/crawl/jobs/job_1"))
        .and(query_param("include_results", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(done))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_once(&server, "GET", "/v1/crawl/jobs/job_1", job_body("running", 1)).await;
    mount_once(&server, "GET", "/v1/crawl/jobs/job_1", job_body("completed", 2)).await;

    let urls = vec!["https://a.test".to_string(), "https://b.test".to_string()];
    let job = crawler(&server)
        .run_many(&urls, &CrawlRequest::new(), Some(&fast_wait().with_results(true)))
        .await
        .unwrap();

    assert!(job.is_successful());
    let results = job.results.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].raw_markdown(), Some("# A"));
}

#[tokio::test]
async fn wait_job_times_out_with_last_progress() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/crawl/jobs/job_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_body("running", 1)))
        .mount(&server)
        .await;

    let options = WaitOptions::new()
        .with_poll_interval(Duration::from_millis(20))
        .with_timeout(Duration::from_millis(100));
    let err = crawler(&server).wait_job("job_1", &options).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(err.message().contains("job_1"));
    assert!(err.message().contains("Progress: 50.0%"));
}

#[tokio::test]
async fn list_and_cancel_jobs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/crawl/jobs"))
        .and(query_param("status", "running"))
        .and(query_param("limit", "5"))
        .and(query_param("offset", "0"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"jobs": [job_body("running", 1)]})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/crawl/jobs/job_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let crawler = crawler(&server);
    let jobs = crawler
        .list_jobs(&ListJobsQuery::new().with_status(JobStatus::Running).with_limit(5))
        .await
        .unwrap();
    assert_eq!(jobs.len(), 1);

    crawler.cancel_job(&jobs[0].id).await.unwrap();
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/crawl/jobs/job_missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Job not found"})))
        .expect(1)
        .mount(&server)
        .await;

    let err = crawler(&server)
        .wait_job("job_missing", &fast_wait())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn scan_only_deep_crawl_reports_cache_expiry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/crawl/deep"))
        .and(body_partial_json(json!({"url": "https://docs.example.com", "scan_only": true, "max_urls": 5})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "scan_1", "status": "pending", "strategy": "bfs"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/crawl/deep/jobs/scan_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "scan_1",
            "status": "completed",
            "strategy": "bfs",
            "discovered_urls": 5,
            "cache_expires_at": "2026-01-01T00:30:00Z"
        })))
        .mount(&server)
        .await;

    let request = DeepCrawlRequest::from_url("https://docs.example.com")
        .with_max_urls(5)
        .scan_only(true);
    let outcome = crawler(&server)
        .deep_crawl(&request, Some(&fast_wait()))
        .await
        .unwrap();

    let scan = outcome.as_scan().unwrap();
    assert!(scan.discovered_count <= 5);
    assert!(scan.cache_expires_at.is_some());
}

#[tokio::test]
async fn empty_scan_never_touches_job_endpoints() {
    let server = MockServer::start().await;
    mount_once(
        &server,
        "POST",
        "/v1/crawl/deep",
        json!({"job_id": "scan_2", "status": "pending", "strategy": "map"}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/v1/crawl/deep/jobs/scan_2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "scan_2", "status": "no_urls", "strategy": "map", "discovered_urls": 0
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/crawl/jobs/job_9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_body("running", 0)))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = crawler(&server)
        .deep_crawl(&DeepCrawlRequest::from_url("https://empty.test"), Some(&fast_wait()))
        .await
        .unwrap();

    let scan = outcome.as_scan().unwrap();
    assert_eq!(scan.status, ScanStatus::NoUrls);
    assert_eq!(scan.discovered_count, 0);
}

#[tokio::test]
async fn deep_crawl_follows_spawned_job() {
    let server = MockServer::start().await;
    mount_once(
        &server,
        "POST",
        "/v1/crawl/deep",
        json!({"job_id": "scan_3", "status": "pending", "strategy": "bfs"}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/v1/crawl/deep/jobs/scan_3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "scan_3",
            "status": "completed",
            "strategy": "bfs",
            "discovered_urls": 2,
            "crawl_job_id": "job_9"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/crawl/jobs/job_9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "job_9",
            "status": "partial",
            "progress": {"total": 2, "completed": 1, "failed": 1}
        })))
        .mount(&server)
        .await;

    let outcome = crawler(&server)
        .deep_crawl(&DeepCrawlRequest::from_url("https://docs.example.com"), Some(&fast_wait()))
        .await
        .unwrap();

    let job = outcome.as_job().unwrap();
    assert_eq!(job.id, "job_9");
    assert_eq!(job.status, JobStatus::Partial);
    assert_eq!(job.progress_percent(), 100.0);
}

#[tokio::test]
async fn invalid_deep_crawl_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/crawl/deep"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let request = DeepCrawlRequest {
        url: Some("https://docs.example.com".into()),
        source_job_id: Some("scan_1".into()),
        ..Default::default()
    };
    let err = crawler(&server).deep_crawl(&request, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn cancel_scan_keeps_partial_discoveries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/crawl/deep/jobs/scan_4/cancel"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "scan_4", "status": "running", "discovered_urls": 12
        })))
        .expect(1)
        .mount(&server)
        .await;

    let scan = crawler(&server).cancel_scan("scan_4").await.unwrap();
    assert_eq!(scan.status, ScanStatus::Cancelled);
    assert_eq!(scan.discovered_count, 12);
}

#[tokio::test]
async fn storage_and_health() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/crawl/storage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "used_mb": 40.0, "max_mb": 100.0, "remaining_mb": 60.0, "percent_used": 40.0
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "healthy"})))
        .mount(&server)
        .await;

    let crawler = crawler(&server);
    let storage = crawler.storage().await.unwrap();
    assert_eq!(storage.percent_used, 40.0);

    let health = crawler.health().await.unwrap();
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn download_url_passes_expiry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/crawl/jobs/job_1/download"))
        .and(query_param("expires_in", "3600"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "download_url": "https://files.example.com/job_1.zip"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let url = crawler(&server)
        .download_url("job_1", c4a_client::crawler::DEFAULT_DOWNLOAD_EXPIRY)
        .await
        .unwrap();
    assert_eq!(url, "https://files.example.com/job_1.zip");
}

#[tokio::test]
async fn cancel_scan_with_null_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/crawl/deep/jobs/scan_5/cancel"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "scan_5",
            "status": "cancelled",
            "strategy": null,
            "discovered_urls": 12,
            "queued_urls": null,
            "created_at": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let scan = crawler(&server).cancel_scan("scan_5").await.unwrap();
    assert_eq!(scan.status, ScanStatus::Cancelled);
    assert_eq!(scan.discovered_count, 12);
}

#[tokio::test]
async fn wait_job_on_scan_id_follows_crawl_job() {
    let server = MockServer::start().await;
    mount_once(
        &server,
        "GET",
        "/v1/crawl/deep/jobs/scan_6",
        json!({"job_id": "scan_6", "status": "running", "discovered_urls": 1}),
    )
    .await;
    mount_once(
        &server,
        "GET",
        "/v1/crawl/deep/jobs/scan_6",
        json!({"job_id": "scan_6", "status": "completed", "discovered_urls": 2,
               "crawl_job_id": "job_1"}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/v1/crawl/jobs/job_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_body("completed", 2)))
        .expect(1)
        .mount(&server)
        .await;

    let job = crawler(&server).wait_job("scan_6", &fast_wait()).await.unwrap();
    assert_eq!(job.id, "job_1");
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test]
async fn context_returns_pack_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/context"))
        .and(body_partial_json(json!({
            "query": "rust error handling",
            "strategy": "serper_paa",
            "paa_limit": 3
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "ctx_1",
            "status": "completed",
            "query": "rust error handling",
            "download_url": "https://files.example.com/ctx_1.md",
            "urls_crawled": 15,
            "storage_size_bytes": 524288,
            "duration_ms": 8000,
            "cached": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = crawler(&server)
        .context(&ContextRequest::new("rust error handling"))
        .await
        .unwrap();
    assert_eq!(result.size_mb(), 0.5);
    assert_eq!(result.duration_seconds(), 8.0);
    assert!(result.cached);
}

#[tokio::test]
async fn generate_schema_from_urls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/schema/generate"))
        .and(body_partial_json(json!({
            "urls": ["https://shop.example.com/p/1"],
            "schema_type": "XPATH"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "schema": {"name": "Product", "base_selector": "//div[@class='p']", "fields": [
                {"name": "price", "selector": ".//span", "type": "text"}
            ]},
            "llm_usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let schema = crawler(&server)
        .generate_schema_from_urls(
            &["https://shop.example.com/p/1".to_string()],
            &SchemaRequest::default().with_schema_type(SchemaType::Xpath),
        )
        .await
        .unwrap();
    assert_eq!(schema.name(), Some("Product"));
    assert_eq!(schema.fields().len(), 1);
}
