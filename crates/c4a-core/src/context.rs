//! Question-driven context building: the service searches for related
//! questions, crawls the pages it finds, and packages the result for download.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::CloudError;
use crate::models::{decode, null_as_default};

/// A context build request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextRequest {
    pub query: String,
    /// "People also ask" questions to expand the query into.
    pub paa_limit: u32,
    /// Search results crawled per question.
    pub results_per_paa: u32,
}

impl ContextRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            paa_limit: 3,
            results_per_paa: 5,
        }
    }

    pub fn with_paa_limit(mut self, limit: u32) -> Self {
        self.paa_limit = limit;
        self
    }

    pub fn with_results_per_paa(mut self, results: u32) -> Self {
        self.results_per_paa = results;
        self
    }

    pub fn to_body(&self) -> Result<Value, CloudError> {
        if self.query.trim().is_empty() {
            return Err(CloudError::validation("Context query must not be empty"));
        }
        Ok(json!({
            "query": self.query,
            "strategy": "serper_paa",
            "paa_limit": self.paa_limit,
            "results_per_paa": self.results_per_paa,
        }))
    }
}

/// Outcome of a context build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub job_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub query: String,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub urls_crawled: u64,
    #[serde(rename = "storage_size_bytes", default, deserialize_with = "null_as_default")]
    pub size_bytes: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub duration_ms: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cached: bool,
}

impl ContextResult {
    pub fn from_value(value: Value) -> Result<Self, CloudError> {
        decode(value, "context")
    }

    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }
}
