use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};

use crate::error::CloudError;

/// Decode an API response into a typed model.
pub fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, CloudError> {
    serde_json::from_value(value)
        .map_err(|e| CloudError::generic(format!("Failed to decode {what} response: {e}")))
}

/// Field deserializer that reads JSON `null` as the type's default.
///
/// Use together with `#[serde(default)]` so a missing key behaves the same.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// How the service fetches pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlStrategy {
    /// Headless browser, runs JavaScript.
    #[default]
    Browser,
    /// Plain HTTP fetch, no JavaScript.
    Http,
    /// Let the service pick per URL.
    Auto,
}

impl CrawlStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlStrategy::Browser => "browser",
            CrawlStrategy::Http => "http",
            CrawlStrategy::Auto => "auto",
        }
    }
}

impl fmt::Display for CrawlStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CrawlStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "browser" => Ok(CrawlStrategy::Browser),
            "http" => Ok(CrawlStrategy::Http),
            "auto" => Ok(CrawlStrategy::Auto),
            _ => Err(format!("Unknown crawl strategy: {}", s)),
        }
    }
}

/// Options shared by single, batch and async crawls.
///
/// `crawler_config`, `browser_config` and `proxy` are forwarded verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlRequest {
    pub strategy: CrawlStrategy,
    pub priority: u8,
    pub crawler_config: Option<Value>,
    pub browser_config: Option<Value>,
    pub proxy: Option<Value>,
    pub bypass_cache: bool,
    pub webhook_url: Option<String>,
}

impl Default for CrawlRequest {
    fn default() -> Self {
        Self {
            strategy: CrawlStrategy::Browser,
            priority: 5,
            crawler_config: None,
            browser_config: None,
            proxy: None,
            bypass_cache: false,
            webhook_url: None,
        }
    }
}

impl CrawlRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: CrawlStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
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

    /// Body for `POST /v1/crawl`.
    pub fn single_body(&self, url: &str) -> Value {
        let mut body = self.common_body();
        body.insert("url".into(), json!(url));
        Value::Object(body)
    }

    /// Body for `POST /v1/crawl/batch`.
    pub fn batch_body(&self, urls: &[String]) -> Value {
        let mut body = self.common_body();
        body.insert("urls".into(), json!(urls));
        Value::Object(body)
    }

    /// Body for `POST /v1/crawl/async`.
    pub fn async_body(&self, urls: &[String]) -> Value {
        let mut body = self.common_body();
        body.insert("urls".into(), json!(urls));
        body.insert("priority".into(), json!(self.priority));
        if let Some(webhook) = &self.webhook_url {
            body.insert("webhook_url".into(), json!(webhook));
        }
        Value::Object(body)
    }

    fn common_body(&self) -> Map<String, Value> {
        let mut body = Map::new();
        body.insert("strategy".into(), json!(self.strategy));
        insert_configs(
            &mut body,
            self.crawler_config.as_ref(),
            self.browser_config.as_ref(),
            self.proxy.as_ref(),
            self.bypass_cache,
        );
        body
    }
}

/// Shared tail of every crawl body: opaque configs, proxy, cache bypass.
pub(crate) fn insert_configs(
    body: &mut Map<String, Value>,
    crawler_config: Option<&Value>,
    browser_config: Option<&Value>,
    proxy: Option<&Value>,
    bypass_cache: bool,
) {
    if let Some(config) = crawler_config.filter(|c| !is_empty_value(c)) {
        body.insert("crawler_config".into(), config.clone());
    }
    if let Some(config) = browser_config.filter(|c| !is_empty_value(c)) {
        body.insert("browser_config".into(), config.clone());
    }
    if let Some(proxy) = proxy.filter(|p| !is_empty_value(p)) {
        body.insert("proxy".into(), proxy.clone());
    }
    if bypass_cache {
        body.insert("bypass_cache".into(), Value::Bool(true));
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Markdown renditions of a crawled page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkdownResult {
    #[serde(default)]
    pub raw_markdown: Option<String>,
    #[serde(default)]
    pub markdown_with_citations: Option<String>,
    #[serde(default)]
    pub references_markdown: Option<String>,
    #[serde(default)]
    pub fit_markdown: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MarkdownRepr {
    Text(String),
    Full(MarkdownResult),
}

// Async job results carry a bare string, synchronous crawls the full object.
fn markdown_from_either<'de, D>(deserializer: D) -> Result<Option<MarkdownResult>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<MarkdownRepr>::deserialize(deserializer)?.map(|repr| match repr {
            MarkdownRepr::Text(raw) => MarkdownResult {
                raw_markdown: Some(raw),
                ..Default::default()
            },
            MarkdownRepr::Full(full) => full,
        }),
    )
}

/// Result of crawling a single URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub success: bool,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub cleaned_html: Option<String>,
    #[serde(default)]
    pub fit_html: Option<String>,
    #[serde(default, deserialize_with = "markdown_from_either")]
    pub markdown: Option<MarkdownResult>,
    #[serde(default)]
    pub media: Option<Value>,
    #[serde(default)]
    pub links: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub screenshot: Option<String>,
    #[serde(default)]
    pub pdf: Option<String>,
    #[serde(default)]
    pub extracted_content: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub duration_ms: u64,
    #[serde(default)]
    pub redirected_url: Option<String>,
    #[serde(default)]
    pub crawl_strategy: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl CrawlResult {
    /// Raw markdown, if the page produced any.
    pub fn raw_markdown(&self) -> Option<&str> {
        self.markdown.as_ref()?.raw_markdown.as_deref()
    }
}

/// Response of `POST /v1/crawl/batch`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub results: Vec<CrawlResult>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub succeeded: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub failed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlUsage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub credits_used: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub credits_remaining: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub duration_ms: u64,
    #[serde(default)]
    pub urls_total: Option<u64>,
    #[serde(default)]
    pub urls_succeeded: Option<u64>,
    #[serde(default)]
    pub urls_failed: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub tokens_used: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tokens_remaining: u64,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageMetrics {
    #[serde(default, deserialize_with = "null_as_default")]
    pub bytes_used: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bytes_remaining: u64,
}

/// Resource consumption reported alongside results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub crawl: CrawlUsage,
    #[serde(default)]
    pub llm: Option<LlmUsage>,
    #[serde(default)]
    pub storage: Option<StorageMetrics>,
}

/// Response of `GET /v1/crawl/storage`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageUsage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub used_mb: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub max_mb: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub remaining_mb: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub percent_used: f64,
}
