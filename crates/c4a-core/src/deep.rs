use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::CloudError;
use crate::job::{Job, JobProgress, JobStatus};
use crate::models::{CrawlStrategy, decode, insert_configs, null_as_default};

/// URL discovery strategy of a deep crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryStrategy {
    /// Sitemap / index based seeding, no link traversal.
    #[default]
    Map,
    Bfs,
    Dfs,
    BestFirst,
    /// A strategy name this client does not know yet.
    #[serde(other)]
    Unknown,
}

impl DiscoveryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryStrategy::Map => "map",
            DiscoveryStrategy::Bfs => "bfs",
            DiscoveryStrategy::Dfs => "dfs",
            DiscoveryStrategy::BestFirst => "best_first",
            DiscoveryStrategy::Unknown => "unknown",
        }
    }

    /// Strategies that follow links from page to page.
    pub fn is_tree(&self) -> bool {
        matches!(
            self,
            DiscoveryStrategy::Bfs | DiscoveryStrategy::Dfs | DiscoveryStrategy::BestFirst
        )
    }
}

impl fmt::Display for DiscoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DiscoveryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "map" => Ok(DiscoveryStrategy::Map),
            "bfs" => Ok(DiscoveryStrategy::Bfs),
            "dfs" => Ok(DiscoveryStrategy::Dfs),
            "best_first" => Ok(DiscoveryStrategy::BestFirst),
            _ => Err(format!("Unknown discovery strategy: {}", s)),
        }
    }
}

/// Status of a scan (discovery) job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
    NoUrls,
    Cancelled,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
            ScanStatus::NoUrls => "no_urls",
            ScanStatus::Cancelled => "cancelled",
            ScanStatus::Unknown => "unknown",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanStatus::Completed | ScanStatus::Failed | ScanStatus::NoUrls | ScanStatus::Cancelled
        )
    }
    /// The equivalent crawl job status. An empty scan finished cleanly.
    pub fn job_status(&self) -> JobStatus {
        match self {
            ScanStatus::Pending => JobStatus::Pending,
            ScanStatus::Running => JobStatus::Running,
            ScanStatus::Completed | ScanStatus::NoUrls => JobStatus::Completed,
            ScanStatus::Failed => JobStatus::Failed,
            ScanStatus::Cancelled => JobStatus::Cancelled,
            ScanStatus::Unknown => JobStatus::Unknown,
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A URL found during discovery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScannedUrl {
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub depth: u32,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub links_found: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub html_size: u64,
}

/// Snapshot of a scan / deep-crawl job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeepCrawlResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub job_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: ScanStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub strategy: DiscoveryStrategy,
    #[serde(rename = "discovered_urls", default, deserialize_with = "null_as_default")]
    pub discovered_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub queued_urls: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: String,
    #[serde(default)]
    pub urls: Option<Vec<ScannedUrl>>,
    #[serde(default)]
    pub html_download_url: Option<String>,
    /// Only set for scan-only results: how long the cached content can be replayed.
    #[serde(default)]
    pub cache_expires_at: Option<String>,
    /// A separate crawl [`Job`] spawned from this scan.
    #[serde(default)]
    pub crawl_job_id: Option<String>,
}

impl DeepCrawlResult {
    pub fn from_value(value: Value) -> Result<Self, CloudError> {
        decode(value, "deep crawl")
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn has_urls(&self) -> bool {
        self.status != ScanStatus::NoUrls && self.discovered_count > 0
    }

    pub fn discovered_urls(&self) -> Vec<&str> {
        self.urls
            .iter()
            .flatten()
            .map(|u| u.url.as_str())
            .collect()
    }
    /// The scan viewed as a job: every discovered URL counts as done.
    pub fn to_job(&self) -> Job {
        Job {
            id: self.job_id.clone(),
            status: self.status.job_status(),
            progress: JobProgress::new(self.discovered_count, self.discovered_count, 0),
            urls_count: self.discovered_count,
            created_at: self.created_at.clone(),
            ..Default::default()
        }
    }
}

/// What a deep crawl resolved to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tag", content = "value", rename_all = "lowercase")]
pub enum DeepCrawlOutcome {
    /// The scan itself: not awaited, scan-only, empty, or no crawl job spawned.
    Scan(DeepCrawlResult),
    /// The crawl job spawned by the scan, awaited to a terminal state.
    Job(Job),
}

impl DeepCrawlOutcome {
    pub fn as_scan(&self) -> Option<&DeepCrawlResult> {
        match self {
            DeepCrawlOutcome::Scan(scan) => Some(scan),
            DeepCrawlOutcome::Job(_) => None,
        }
    }

    pub fn as_job(&self) -> Option<&Job> {
        match self {
            DeepCrawlOutcome::Job(job) => Some(job),
            DeepCrawlOutcome::Scan(_) => None,
        }
    }
}

/// A deep-crawl submission.
///
/// Exactly one of `url` (fresh discovery) or `source_job_id` (replay of a
/// previous scan's cached content) must be set.
#[derive(Debug, Clone, PartialEq)]
pub struct DeepCrawlRequest {
    pub url: Option<String>,
    pub source_job_id: Option<String>,
    pub strategy: DiscoveryStrategy,
    pub max_depth: u32,
    pub max_urls: u32,
    pub scan_only: bool,
    pub crawl_strategy: CrawlStrategy,
    pub priority: u8,
    pub filters: Option<Map<String, Value>>,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub scorers: Option<Value>,
    pub include_html: bool,
    // Map strategy seeding
    pub source: String,
    pub pattern: String,
    pub query: Option<String>,
    pub score_threshold: Option<f64>,
    pub crawler_config: Option<Value>,
    pub browser_config: Option<Value>,
    pub proxy: Option<Value>,
    pub bypass_cache: bool,
    pub webhook_url: Option<String>,
}

impl Default for DeepCrawlRequest {
    fn default() -> Self {
        Self {
            url: None,
            source_job_id: None,
            strategy: DiscoveryStrategy::Bfs,
            max_depth: 3,
            max_urls: 100,
            scan_only: false,
            crawl_strategy: CrawlStrategy::Auto,
            priority: 5,
            filters: None,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            scorers: None,
            include_html: false,
            source: "sitemap".to_string(),
            pattern: "*".to_string(),
            query: None,
            score_threshold: None,
            crawler_config: None,
            browser_config: None,
            proxy: None,
            bypass_cache: false,
            webhook_url: None,
        }
    }
}

impl DeepCrawlRequest {
    /// Fresh discovery starting at `url`.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Phase two of the scan/extract workflow: reuse a scan's cached pages.
    pub fn from_source_job(job_id: impl Into<String>) -> Self {
        Self {
            source_job_id: Some(job_id.into()),
            ..Default::default()
        }
    }

    pub fn with_strategy(mut self, strategy: DiscoveryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_max_urls(mut self, max_urls: u32) -> Self {
        self.max_urls = max_urls;
        self
    }

    pub fn scan_only(mut self, scan_only: bool) -> Self {
        self.scan_only = scan_only;
        self
    }

    pub fn with_crawl_strategy(mut self, strategy: CrawlStrategy) -> Self {
        self.crawl_strategy = strategy;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_filters(mut self, filters: Map<String, Value>) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_include_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exclude_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_scorers(mut self, scorers: Value) -> Self {
        self.scorers = Some(scorers);
        self
    }

    pub fn with_include_html(mut self, include: bool) -> Self {
        self.include_html = include;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_score_threshold(mut self, threshold: f64) -> Self {
        self.score_threshold = Some(threshold);
        self
    }

    pub fn with_crawler_config(mut self, config: Value) -> Self {
        self.crawler_config = Some(config);
        self
    }

    pub fn with_browser_config(mut self, config: Value) -> Self {
        self.browser_config = Some(config);
        self
    }

    pub fn with_proxy(mut self, proxy: Value) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }

    pub fn with_webhook_url(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }

    /// Check the url / source job exclusivity rule.
    pub fn validate(&self) -> Result<(), CloudError> {
        let has_url = self.url.as_deref().is_some_and(|u| !u.trim().is_empty());
        let has_source = self
            .source_job_id
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());

        match (has_url, has_source) {
            (true, true) => Err(CloudError::validation(
                "Provide either 'url' or 'source_job_id', not both",
            )),
            (false, false) => Err(CloudError::validation(
                "Must provide either 'url' or 'source_job_id'",
            )),
            _ => Ok(()),
        }
    }

    /// Body for `POST /v1/crawl/deep`. Validates first.
    pub fn to_body(&self) -> Result<Value, CloudError> {
        self.validate()?;

        let mut body = Map::new();
        body.insert("strategy".into(), json!(self.strategy));
        body.insert("crawl_strategy".into(), json!(self.crawl_strategy));
        body.insert("priority".into(), json!(self.priority));

        if let Some(url) = &self.url {
            body.insert("url".into(), json!(url));
        }
        if let Some(source) = &self.source_job_id {
            body.insert("source_job_id".into(), json!(source));
        }

        if self.strategy.is_tree() {
            body.insert("max_depth".into(), json!(self.max_depth));
            body.insert("max_urls".into(), json!(self.max_urls));

            let filters = self.effective_filters();
            if !filters.is_empty() {
                body.insert("filters".into(), Value::Object(filters));
            }
            if let Some(scorers) = &self.scorers {
                body.insert("scorers".into(), scorers.clone());
            }
            if self.scan_only {
                body.insert("scan_only".into(), Value::Bool(true));
            }
            if self.include_html {
                body.insert("include_html".into(), Value::Bool(true));
            }
        } else {
            let mut seeding = Map::new();
            seeding.insert("source".into(), json!(self.source));
            seeding.insert("pattern".into(), json!(self.pattern));
            if self.max_urls > 0 {
                seeding.insert("max_urls".into(), json!(self.max_urls));
            }
            if let Some(query) = &self.query {
                seeding.insert("query".into(), json!(query));
            }
            if let Some(threshold) = self.score_threshold {
                seeding.insert("score_threshold".into(), json!(threshold));
            }
            body.insert("seeding_config".into(), Value::Object(seeding));
        }

        insert_configs(
            &mut body,
            self.crawler_config.as_ref(),
            self.browser_config.as_ref(),
            self.proxy.as_ref(),
            self.bypass_cache,
        );
        if let Some(webhook) = &self.webhook_url {
            body.insert("webhook_url".into(), json!(webhook));
        }

        Ok(Value::Object(body))
    }

    // Explicit filters plus the include/exclude shortcuts; the shortcuts win on key clashes.
    fn effective_filters(&self) -> Map<String, Value> {
        let mut filters = self.filters.clone().unwrap_or_default();
        if !self.include_patterns.is_empty() {
            filters.insert("include_patterns".into(), json!(self.include_patterns));
        }
        if !self.exclude_patterns.is_empty() {
            filters.insert("exclude_patterns".into(), json!(self.exclude_patterns));
        }
        filters
    }
}
