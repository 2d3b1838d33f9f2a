use std::time::Duration;

use c4a_core::config::ClientConfig;
use c4a_core::context::{ContextRequest, ContextResult};
use c4a_core::deep::{DeepCrawlOutcome, DeepCrawlRequest, DeepCrawlResult};
use c4a_core::error::CloudError;
use c4a_core::job::{Job, ListJobsQuery, WaitOptions};
use c4a_core::job_client::JobClient;
use c4a_core::models::{BatchResult, CrawlRequest, CrawlResult, StorageUsage, decode};
use c4a_core::orchestrator::DeepCrawlOrchestrator;
use c4a_core::schema::{GeneratedSchema, SchemaRequest, SchemaSource};
use c4a_core::traits::{ApiRequest, Executor};
use serde_json::Value;

use crate::executor::ReqwestExecutor;

/// Most URLs a synchronous batch crawl accepts. Larger sets go through jobs.
pub const MAX_BATCH_URLS: usize = 10;

/// Default lifetime of a results download link, in seconds.
pub const DEFAULT_DOWNLOAD_EXPIRY: u64 = 3600;

const SYNC_CRAWL_TIMEOUT: Duration = Duration::from_secs(120);
const CONTEXT_TIMEOUT: Duration = Duration::from_secs(300);
const SCHEMA_TIMEOUT: Duration = Duration::from_secs(60);

/// Entry point of the SDK.
///
/// Owns nothing but an [`Executor`]; jobs and deep crawls are delegated to
/// [`JobClient`] and [`DeepCrawlOrchestrator`] built on clones of it.
///
/// ```no_run
/// # async fn demo() -> Result<(), c4a_core::CloudError> {
/// use c4a_client::Crawler;
/// use c4a_core::{CrawlRequest, WaitOptions};
///
/// let crawler = Crawler::from_env()?;
/// let page = crawler.run("https://example.com", &CrawlRequest::new()).await?;
/// println!("{:?}", page.raw_markdown());
///
/// let urls = vec!["https://a.example".to_string(), "https://b.example".to_string()];
/// let job = crawler
///     .run_many(&urls, &CrawlRequest::new(), Some(&WaitOptions::new()))
///     .await?;
/// println!("{} finished as {}", job.id, job.status);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Crawler<E: Executor = ReqwestExecutor> {
    executor: E,
    jobs: JobClient<E>,
    deep: DeepCrawlOrchestrator<E>,
}

impl Crawler<ReqwestExecutor> {
    pub fn new(config: ClientConfig) -> Result<Self, CloudError> {
        Ok(Self::with_executor(ReqwestExecutor::new(config)?))
    }

    /// Build from the `CRAWL4AI_*` environment variables.
    pub fn from_env() -> Result<Self, CloudError> {
        Ok(Self::with_executor(ReqwestExecutor::from_env()?))
    }
}

impl<E: Executor> Crawler<E> {
    pub fn with_executor(executor: E) -> Self {
        Self {
            jobs: JobClient::new(executor.clone()),
            deep: DeepCrawlOrchestrator::new(executor.clone()),
            executor,
        }
    }

    pub fn jobs(&self) -> &JobClient<E> {
        &self.jobs
    }

    pub fn deep(&self) -> &DeepCrawlOrchestrator<E> {
        &self.deep
    }

    // ---- synchronous crawls ----

    /// Crawl one URL and wait for the result.
    pub async fn run(&self, url: &str, request: &CrawlRequest) -> Result<CrawlResult, CloudError> {
        let data = self
            .executor
            .execute(
                ApiRequest::post("/v1/crawl")
                    .with_body(request.single_body(url))
                    .with_timeout(SYNC_CRAWL_TIMEOUT),
            )
            .await?;
        decode(data, "crawl")
    }

    /// Crawl up to [`MAX_BATCH_URLS`] URLs in one synchronous call.
    pub async fn run_batch(
        &self,
        urls: &[String],
        request: &CrawlRequest,
    ) -> Result<Vec<CrawlResult>, CloudError> {
        if urls.is_empty() || urls.len() > MAX_BATCH_URLS {
            return Err(CloudError::validation(format!(
                "Batch crawl takes 1 to {MAX_BATCH_URLS} URLs, got {}. Use run_many for larger sets.",
                urls.len()
            )));
        }

        let data = self
            .executor
            .execute(
                ApiRequest::post("/v1/crawl/batch")
                    .with_body(request.batch_body(urls))
                    .with_timeout(SYNC_CRAWL_TIMEOUT),
            )
            .await?;
        let batch: BatchResult = decode(data, "batch crawl")?;
        Ok(batch.results)
    }

    // ---- async jobs ----

    /// Submit `urls` as a background job; with `wait`, block until it is terminal.
    pub async fn run_many(
        &self,
        urls: &[String],
        request: &CrawlRequest,
        wait: Option<&WaitOptions>,
    ) -> Result<Job, CloudError> {
        let job = self.jobs.submit(urls, request).await?;
        match wait {
            Some(options) => self.jobs.wait_until_terminal(&job.id, options).await,
            None => Ok(job),
        }
    }

    pub async fn get_job(&self, job_id: &str, include_results: bool) -> Result<Job, CloudError> {
        self.jobs.get(job_id, include_results).await
    }

    /// Wait for a job to finish. Scan ids (`scan_*`) are accepted too, see
    /// [`DeepCrawlOrchestrator::wait_job`].
    pub async fn wait_job(&self, job_id: &str, options: &WaitOptions) -> Result<Job, CloudError> {
        self.deep.wait_job(job_id, options).await
    }

    pub async fn list_jobs(&self, query: &ListJobsQuery) -> Result<Vec<Job>, CloudError> {
        self.jobs.list(query).await
    }

    pub async fn cancel_job(&self, job_id: &str) -> Result<(), CloudError> {
        self.jobs.cancel(job_id).await
    }

    pub async fn download_url(&self, job_id: &str, expires_in: u64) -> Result<String, CloudError> {
        self.jobs.download_url(job_id, expires_in).await
    }

    // ---- deep crawls ----

    pub async fn deep_crawl(
        &self,
        request: &DeepCrawlRequest,
        wait: Option<&WaitOptions>,
    ) -> Result<DeepCrawlOutcome, CloudError> {
        self.deep.deep_crawl(request, wait).await
    }

    pub async fn scan_status(&self, job_id: &str) -> Result<DeepCrawlResult, CloudError> {
        self.deep.scan_status(job_id).await
    }

    pub async fn wait_scan(
        &self,
        job_id: &str,
        options: &WaitOptions,
    ) -> Result<DeepCrawlResult, CloudError> {
        self.deep.wait_scan(job_id, options).await
    }

    pub async fn cancel_scan(&self, job_id: &str) -> Result<DeepCrawlResult, CloudError> {
        self.deep.cancel_scan(job_id).await
    }

    // ---- context and schemas ----

    /// Build a downloadable context pack around a search query.
    pub async fn context(&self, request: &ContextRequest) -> Result<ContextResult, CloudError> {
        let body = request.to_body()?;
        let data = self
            .executor
            .execute(
                ApiRequest::post("/v1/context")
                    .with_body(body)
                    .with_timeout(CONTEXT_TIMEOUT),
            )
            .await?;
        ContextResult::from_value(data)
    }

    /// Have the service write an extraction schema for the sample pages.
    pub async fn generate_schema(
        &self,
        request: &SchemaRequest,
    ) -> Result<GeneratedSchema, CloudError> {
        let body = request.to_body()?;
        let data = self
            .executor
            .execute(
                ApiRequest::post("/v1/schema/generate")
                    .with_body(body)
                    .with_timeout(SCHEMA_TIMEOUT),
            )
            .await?;
        GeneratedSchema::from_value(data)
    }

    /// [`generate_schema`](Self::generate_schema) over pages the service
    /// fetches itself. `options` supplies everything but the source.
    pub async fn generate_schema_from_urls(
        &self,
        urls: &[String],
        options: &SchemaRequest,
    ) -> Result<GeneratedSchema, CloudError> {
        let request = options
            .clone()
            .with_source(SchemaSource::Urls(urls.to_vec()));
        self.generate_schema(&request).await
    }

    // ---- account ----

    pub async fn storage(&self) -> Result<StorageUsage, CloudError> {
        let data = self
            .executor
            .execute(ApiRequest::get("/v1/crawl/storage"))
            .await?;
        decode(data, "storage")
    }

    pub async fn health(&self) -> Result<Value, CloudError> {
        self.executor.execute(ApiRequest::get("/health")).await
    }
}
