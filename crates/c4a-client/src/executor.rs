use std::collections::BTreeMap;
use std::sync::Arc;

use c4a_core::config::ClientConfig;
use c4a_core::error::CloudError;
use c4a_core::traits::{ApiRequest, Executor, HttpMethod};
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::{Client, Method, Response};
use serde_json::{Value, json};
use url::Url;

const USER_AGENT: &str = concat!("crawl4ai-cloud-rust/", env!("CARGO_PKG_VERSION"));

/// Request executor backed by a shared reqwest connection pool.
///
/// Retries network failures, client-side timeouts and 5xx responses with
/// exponential backoff (`backoff_base * 2^attempt`). Every other non-success
/// status fails on the first attempt.
#[derive(Clone)]
pub struct ReqwestExecutor {
    client: Client,
    config: Arc<ClientConfig>,
}

impl std::fmt::Debug for ReqwestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Outcome of a single attempt that did not succeed.
enum Failure {
    /// Worth another attempt if any are left.
    Transient(CloudError),
    Fatal(CloudError),
}

impl ReqwestExecutor {
    pub fn new(config: ClientConfig) -> Result<Self, CloudError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| CloudError::generic(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    pub fn from_env() -> Result<Self, CloudError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url, CloudError> {
        let mut url = Url::parse(&format!("{}{}", self.config.base_url, request.path))
            .map_err(|e| CloudError::validation(format!("Invalid request URL: {e}")))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }

    async fn attempt(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&[u8]>,
        request: &ApiRequest,
    ) -> Result<Value, Failure> {
        let mut builder = self
            .client
            .request(method.clone(), url.clone())
            .header("X-API-Key", &self.config.api_key)
            .header(CONTENT_TYPE, "application/json");
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = body {
            builder = builder.body(body.to_vec());
        }

        let response = builder.send().await.map_err(|e| {
            let message = if e.is_timeout() {
                format!("Request timed out: {e}")
            } else if e.is_connect() {
                format!("Connection failed: {e}")
            } else {
                format!("Request failed: {e}")
            };
            Failure::Transient(CloudError::timeout(message))
        })?;

        read_response(response).await
    }
}

impl Executor for ReqwestExecutor {
    async fn execute(&self, request: ApiRequest) -> Result<Value, CloudError> {
        let url = self.url_for(&request)?;
        let method = to_method(request.method);
        let body = request
            .body
            .as_ref()
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| CloudError::generic(format!("Failed to encode request body: {e}")))?;

        let attempts = self.config.max_retries.max(1);
        let mut attempt = 0;
        loop {
            tracing::debug!(method = %request.method, path = %request.path, attempt, "Sending request");

            let err = match self.attempt(&method, &url, body.as_deref(), &request).await {
                Ok(value) => return Ok(value),
                Err(Failure::Fatal(err)) => return Err(err),
                Err(Failure::Transient(err)) => err,
            };

            if attempt + 1 >= attempts {
                tracing::debug!(path = %request.path, attempts, error = %err, "Retries exhausted");
                return Err(err);
            }

            let delay = self.config.backoff_delay(attempt);
            tracing::warn!(
                path = %request.path,
                attempt = attempt + 1,
                max_attempts = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Request failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

async fn read_response(response: Response) -> Result<Value, Failure> {
    let status = response.status().as_u16();
    let headers = lowercase_headers(response.headers());
    let text = response.text().await.map_err(|e| e.to_string());
    classify(status, headers, text)
}

/// Turn a status and its (possibly unreadable) body into a value or a failure.
///
/// An error status is classified even when its body could not be read, so a
/// 4xx stays fatal.
fn classify(
    status: u16,
    headers: BTreeMap<String, String>,
    text: Result<String, String>,
) -> Result<Value, Failure> {
    let body = match text {
        Ok(text) => parse_body(&text),
        Err(e) if status < 400 => {
            return Err(Failure::Transient(CloudError::generic(format!(
                "Failed to read response body: {e}"
            ))));
        }
        Err(e) => {
            tracing::debug!(status, error = %e, "Failed to read error response body");
            json!({})
        }
    };

    if status < 400 {
        return Ok(body);
    }

    let detail = error_detail(&body, status);
    let err = CloudError::from_status(status, detail, body, headers);
    tracing::debug!(status, kind = ?err.kind(), "Request failed: {}", err.message());

    if status >= 500 {
        Err(Failure::Transient(err))
    } else {
        Err(Failure::Fatal(err))
    }
}

/// Empty bodies become `{}`; bodies that are not JSON are kept under `raw`.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(text).unwrap_or_else(|_| json!({ "raw": text }))
}

fn error_detail(body: &Value, status: u16) -> String {
    match body.get("detail") {
        Some(Value::String(detail)) => detail.clone(),
        Some(Value::Null) | None => format!("HTTP {status}"),
        // FastAPI validation errors carry a list of field problems
        Some(other) => other.to_string(),
    }
}

fn lowercase_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            out.entry(name.as_str().to_lowercase())
                .or_insert_with(|| value.to_string());
        }
    }
    out
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Delete => Method::DELETE,
    }
}
