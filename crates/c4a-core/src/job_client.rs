use serde_json::Value;

use crate::error::CloudError;
use crate::job::{Job, ListJobsQuery, WaitOptions};
use crate::models::CrawlRequest;
use crate::poll::poll_until_terminal;
use crate::traits::{ApiRequest, Executor};

const JOBS_PATH: &str = "/v1/crawl/jobs";

/// Submits, inspects and awaits async crawl jobs.
#[derive(Debug, Clone)]
pub struct JobClient<E: Executor> {
    executor: E,
}

impl<E: Executor> JobClient<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    /// Submit `urls` as one background job. Returns the freshly created job.
    ///
    /// A retry after a network failure may submit the job twice; the service
    /// offers no idempotency key to prevent that.
    pub async fn submit(&self, urls: &[String], request: &CrawlRequest) -> Result<Job, CloudError> {
        let body = request.async_body(urls);
        let data = self
            .executor
            .execute(ApiRequest::post("/v1/crawl/async").with_body(body))
            .await?;

        let job = Job::from_value(data)?;
        tracing::info!(job_id = %job.id, urls = urls.len(), "Job submitted");
        Ok(job)
    }

    /// Single status read. `include_results` pulls the (possibly large) results payload.
    pub async fn get(&self, job_id: &str, include_results: bool) -> Result<Job, CloudError> {
        let mut request = ApiRequest::get(job_path(job_id)?);
        if include_results {
            request = request.with_query("include_results", true);
        }
        Job::from_value(self.executor.execute(request).await?)
    }

    /// Poll until the job is terminal.
    ///
    /// Polls never ask for results; when `options.include_results` is set a
    /// single extra read fetches them once the job has finished.
    pub async fn wait_until_terminal(
        &self,
        job_id: &str,
        options: &WaitOptions,
    ) -> Result<Job, CloudError> {
        let job = poll_until_terminal(
            "job",
            job_id,
            options,
            || self.get(job_id, false),
            Job::is_terminal,
            |job| {
                format!(
                    "Status: {}, Progress: {:.1}%",
                    job.status,
                    job.progress_percent()
                )
            },
        )
        .await?;

        if options.include_results {
            return self.get(job_id, true).await;
        }
        Ok(job)
    }

    /// List jobs, filtered and paginated server-side.
    pub async fn list(&self, query: &ListJobsQuery) -> Result<Vec<Job>, CloudError> {
        let mut request = ApiRequest::get(JOBS_PATH)
            .with_query("limit", query.limit)
            .with_query("offset", query.offset);
        if let Some(status) = query.status {
            request = request.with_query("status", status);
        }

        let data = self.executor.execute(request).await?;
        match data.get("jobs") {
            Some(Value::Array(jobs)) => jobs.iter().cloned().map(Job::from_value).collect(),
            _ => Ok(Vec::new()),
        }
    }

    /// Ask the server to cancel a job. The server decides what that means for
    /// jobs that already finished.
    pub async fn cancel(&self, job_id: &str) -> Result<(), CloudError> {
        self.executor
            .execute(ApiRequest::delete(job_path(job_id)?))
            .await?;
        tracing::info!(%job_id, "Job cancellation requested");
        Ok(())
    }

    /// Presigned URL of the job's results archive, valid for `expires_in` seconds.
    pub async fn download_url(&self, job_id: &str, expires_in: u64) -> Result<String, CloudError> {
        let request = ApiRequest::get(format!("{}/download", job_path(job_id)?))
            .with_query("expires_in", expires_in);
        let data = self.executor.execute(request).await?;

        data.get("download_url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CloudError::generic("Response did not contain a download_url"))
    }
}

pub(crate) fn job_path(job_id: &str) -> Result<String, CloudError> {
    if job_id.trim().is_empty() {
        return Err(CloudError::validation("Job ID must not be empty"));
    }
    Ok(format!("{JOBS_PATH}/{job_id}"))
}
