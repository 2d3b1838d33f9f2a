use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CloudError;
use crate::models::{CrawlResult, Usage, decode, null_as_default};

/// Status of an async crawl job on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Partial,
    Failed,
    Cancelled,
    /// Any status string this SDK does not know about. Never terminal.
    #[default]
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Partial => "partial",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Unknown => "unknown",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Partial | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Terminal states that may carry results.
    pub fn has_results(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Partial)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "partial" => Ok(JobStatus::Partial),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// Per-URL progress counters of a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    #[serde(default, deserialize_with = "null_as_default")]
    pub total: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub completed: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub failed: u64,
}

impl JobProgress {
    pub fn new(total: u64, completed: u64, failed: u64) -> Self {
        Self {
            total,
            completed,
            failed,
        }
    }

    /// URLs not yet processed.
    pub fn pending(&self) -> u64 {
        self.total
            .saturating_sub(self.completed)
            .saturating_sub(self.failed)
    }

    /// Share of processed URLs (succeeded or failed), 0-100.
    pub fn percent_complete(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.completed + self.failed) as f64 / self.total as f64 * 100.0
    }
}

/// Snapshot of an async crawl job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "job_id", default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: JobStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub progress: JobProgress,
    #[serde(default, alias = "url_count", deserialize_with = "null_as_default")]
    pub urls_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: String,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub results: Option<Vec<CrawlResult>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub result_size_bytes: Option<u64>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl Job {
    /// Decode a job from an API payload.
    ///
    /// Results are only kept for `completed` and `partial` jobs.
    pub fn from_value(value: Value) -> Result<Self, CloudError> {
        let mut job: Job = decode(value, "job")?;
        if !job.status.has_results() {
            job.results = None;
        }
        Ok(job)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_successful(&self) -> bool {
        self.status == JobStatus::Completed
    }

    pub fn progress_percent(&self) -> f64 {
        self.progress.percent_complete()
    }
}

/// Polling discipline for the wait primitives.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitOptions {
    pub poll_interval: Duration,
    /// `None` or zero waits indefinitely.
    pub timeout: Option<Duration>,
    /// Fetch the results payload once the job is terminal.
    pub include_results: bool,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            timeout: None,
            include_results: false,
        }
    }
}

impl WaitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_results(mut self, include: bool) -> Self {
        self.include_results = include;
        self
    }

    /// Timeout with the "zero means forever" rule applied.
    pub fn deadline(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }
    /// The same options with `elapsed` taken off the deadline.
    ///
    /// A spent budget keeps a 1ms deadline rather than zero, so the next wait
    /// still reads once and then times out instead of waiting forever.
    pub fn remaining_after(&self, elapsed: Duration) -> WaitOptions {
        match self.deadline() {
            Some(limit) => self
                .clone()
                .with_timeout(limit.saturating_sub(elapsed).max(Duration::from_millis(1))),
            None => self.clone(),
        }
    }
}

/// Filter and pagination for listing jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListJobsQuery {
    pub status: Option<JobStatus>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for ListJobsQuery {
    fn default() -> Self {
        Self {
            status: None,
            limit: 20,
            offset: 0,
        }
    }
}

impl ListJobsQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }
}
