use std::time::Duration;

use crate::error::CloudError;

pub const DEFAULT_BASE_URL: &str = "https://api.crawl4ai.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

pub const API_KEY_ENV: &str = "CRAWL4AI_API_KEY";
pub const BASE_URL_ENV: &str = "CRAWL4AI_BASE_URL";
pub const TIMEOUT_ENV: &str = "CRAWL4AI_TIMEOUT_SECS";
pub const MAX_RETRIES_ENV: &str = "CRAWL4AI_MAX_RETRIES";

const KEY_PREFIXES: [&str; 2] = ["sk_live_", "sk_test_"];

/// Immutable connection settings handed to the request executor.
#[derive(Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    /// Total attempts per request, including the first one.
    pub max_retries: u32,
    /// Delay before the second attempt; doubles for every attempt after that.
    pub backoff_base: Duration,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("backoff_base", &self.backoff_base)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Result<Self, CloudError> {
        let api_key = api_key.into();
        validate_api_key(&api_key)?;

        Ok(Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
        })
    }

    /// Read configuration from environment variables.
    ///
    /// - `CRAWL4AI_API_KEY` (required)
    /// - `CRAWL4AI_BASE_URL` (optional, defaults to `https://api.crawl4ai.com`)
    /// - `CRAWL4AI_TIMEOUT_SECS` (optional, defaults to 120)
    /// - `CRAWL4AI_MAX_RETRIES` (optional, defaults to 3)
    pub fn from_env() -> Result<Self, CloudError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, CloudError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_ENV).unwrap_or_default();
        let mut config = Self::new(api_key)?;

        if let Some(base_url) = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            config = config.with_base_url(base_url);
        }

        if let Some(raw) = lookup(TIMEOUT_ENV) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                CloudError::validation(format!(
                    "Invalid {TIMEOUT_ENV} '{raw}': must be a whole number of seconds"
                ))
            })?;
            if secs == 0 {
                return Err(CloudError::validation(format!(
                    "{TIMEOUT_ENV} must be at least 1"
                )));
            }
            config = config.with_timeout(Duration::from_secs(secs));
        }

        if let Some(raw) = lookup(MAX_RETRIES_ENV) {
            let retries: u32 = raw.trim().parse().map_err(|_| {
                CloudError::validation(format!(
                    "Invalid {MAX_RETRIES_ENV} '{raw}': must be a positive integer"
                ))
            })?;
            config = config.with_max_retries(retries);
        }

        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// At least one attempt is always made.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    /// Delay inserted after the 0-indexed `attempt` fails: `backoff_base * 2^attempt`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

fn validate_api_key(api_key: &str) -> Result<(), CloudError> {
    if api_key.trim().is_empty() {
        return Err(CloudError::validation(format!(
            "API key is required. Provide it explicitly or set the {API_KEY_ENV} environment variable."
        )));
    }
    if !KEY_PREFIXES.iter().any(|p| api_key.starts_with(p)) {
        return Err(CloudError::validation(
            "Invalid API key format. Expected sk_live_* or sk_test_*",
        ));
    }
    Ok(())
}

fn redact(api_key: &str) -> String {
    let visible: String = api_key.chars().take(8).collect();
    format!("{visible}***")
}
