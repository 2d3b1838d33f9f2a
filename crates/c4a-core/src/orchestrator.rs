//! Deep crawl orchestration: discovery scans, their optional crawl jobs, and
//! the two-phase scan-then-extract workflow.
//!
//! # Two-phase workflow
//!
//! ```text
//! phase 1: submit(url, scan_only) --> scan_xxx (+ cache_expires_at)
//! phase 2: submit(source_job_id = scan_xxx, crawler_config) --> extraction
//!          over the cached pages, no re-fetch
//! ```

use std::time::Duration;

use tokio::time::Instant;

use crate::deep::{DeepCrawlOutcome, DeepCrawlRequest, DeepCrawlResult, ScanStatus};
use crate::error::CloudError;
use crate::job::{Job, WaitOptions};
use crate::job_client::JobClient;
use crate::poll::poll_until_terminal;
use crate::traits::{ApiRequest, Executor};

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Scan job ids carry this prefix; crawl job ids do not.
pub const SCAN_ID_PREFIX: &str = "scan_";

/// Drives scans and, when a scan spawns one, the follow-up crawl job.
#[derive(Debug, Clone)]
pub struct DeepCrawlOrchestrator<E: Executor> {
    executor: E,
    jobs: JobClient<E>,
}

impl<E: Executor> DeepCrawlOrchestrator<E> {
    pub fn new(executor: E) -> Self {
        Self {
            jobs: JobClient::new(executor.clone()),
            executor,
        }
    }

    /// Submit a scan. Invalid requests fail before any network call.
    pub async fn submit_scan(
        &self,
        request: &DeepCrawlRequest,
    ) -> Result<DeepCrawlResult, CloudError> {
        let body = request.to_body()?;
        let data = self
            .executor
            .execute(
                ApiRequest::post("/v1/crawl/deep")
                    .with_body(body)
                    .with_timeout(SUBMIT_TIMEOUT),
            )
            .await?;

        let scan = DeepCrawlResult::from_value(data)?;
        tracing::info!(
            job_id = %scan.job_id,
            strategy = %request.strategy,
            scan_only = request.scan_only,
            replay = request.source_job_id.is_some(),
            "Scan submitted"
        );
        Ok(scan)
    }

    /// Single non-blocking status read.
    pub async fn scan_status(&self, job_id: &str) -> Result<DeepCrawlResult, CloudError> {
        let data = self
            .executor
            .execute(ApiRequest::get(scan_path(job_id)?))
            .await?;
        DeepCrawlResult::from_value(data)
    }

    /// Poll the scan until it is terminal.
    pub async fn wait_scan(
        &self,
        job_id: &str,
        options: &WaitOptions,
    ) -> Result<DeepCrawlResult, CloudError> {
        poll_until_terminal(
            "scan",
            job_id,
            options,
            || self.scan_status(job_id),
            DeepCrawlResult::is_terminal,
            |scan| {
                format!(
                    "Status: {}, Discovered: {}",
                    scan.status, scan.discovered_count
                )
            },
        )
        .await
    }

    /// Ask the server to stop the scan at its next batch boundary.
    ///
    /// Whatever was discovered so far is kept and reported back.
    pub async fn cancel_scan(&self, job_id: &str) -> Result<DeepCrawlResult, CloudError> {
        let path = format!("{}/cancel", scan_path(job_id)?);
        let data = self.executor.execute(ApiRequest::post(path)).await?;

        let mut scan = DeepCrawlResult::from_value(data)?;
        scan.job_id = job_id.to_string();
        scan.status = ScanStatus::Cancelled;
        tracing::info!(%job_id, discovered = scan.discovered_count, "Scan cancelled");
        Ok(scan)
    }

    /// Submit a scan and, with `wait`, follow it through to the end.
    ///
    /// - no `wait`: the freshly submitted scan
    /// - scan-only, empty, failed, or no crawl job spawned: the terminal scan
    /// - otherwise: the spawned crawl job, awaited with what is left of the
    ///   timeout
    pub async fn deep_crawl(
        &self,
        request: &DeepCrawlRequest,
        wait: Option<&WaitOptions>,
    ) -> Result<DeepCrawlOutcome, CloudError> {
        let submitted = self.submit_scan(request).await?;

        let Some(options) = wait else {
            return Ok(DeepCrawlOutcome::Scan(submitted));
        };

        let started = Instant::now();
        let scan = self.wait_scan(&submitted.job_id, options).await?;

        if request.scan_only || !scan.has_urls() {
            return Ok(DeepCrawlOutcome::Scan(scan));
        }

        match scan.crawl_job_id.as_deref() {
            Some(crawl_job_id) => {
                tracing::info!(
                    scan_id = %scan.job_id,
                    %crawl_job_id,
                    "Scan spawned crawl job, waiting for it"
                );
                let remaining = options.remaining_after(started.elapsed());
                let job = self.jobs.wait_until_terminal(crawl_job_id, &remaining).await?;
                Ok(DeepCrawlOutcome::Job(job))
            }
            None => Ok(DeepCrawlOutcome::Scan(scan)),
        }
    }

    /// Wait on any job id, including a scan id.
    ///
    /// Crawl job ids go straight to [`JobClient::wait_until_terminal`]. For a
    /// `scan_*` id the scan is awaited first; a spawned crawl job is then
    /// awaited on the remaining timeout, and a scan without one is returned
    /// as a job via [`DeepCrawlResult::to_job`].
    pub async fn wait_job(&self, job_id: &str, options: &WaitOptions) -> Result<Job, CloudError> {
        if !job_id.starts_with(SCAN_ID_PREFIX) {
            return self.jobs.wait_until_terminal(job_id, options).await;
        }

        let started = Instant::now();
        let scan = self.wait_scan(job_id, options).await?;

        match scan.crawl_job_id.as_deref() {
            Some(crawl_job_id) if scan.has_urls() => {
                tracing::debug!(scan_id = %job_id, %crawl_job_id, "Following spawned crawl job");
                let remaining = options.remaining_after(started.elapsed());
                self.jobs.wait_until_terminal(crawl_job_id, &remaining).await
            }
            _ => Ok(scan.to_job()),
        }
    }
}

fn scan_path(job_id: &str) -> Result<String, CloudError> {
    if job_id.trim().is_empty() {
        return Err(CloudError::validation("Scan job ID must not be empty"));
    }
    Ok(format!("/v1/crawl/deep/jobs/{job_id}"))
}
