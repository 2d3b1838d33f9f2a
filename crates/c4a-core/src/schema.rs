//! LLM-generated extraction schemas.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::CloudError;
use crate::models::{decode, null_as_default};

/// Most pages the service will fetch for one generation.
pub const MAX_SCHEMA_URLS: usize = 3;

/// Selector language of the generated schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchemaType {
    #[default]
    Css,
    Xpath,
}

impl SchemaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::Css => "CSS",
            SchemaType::Xpath => "XPATH",
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SchemaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "css" => Ok(SchemaType::Css),
            "xpath" => Ok(SchemaType::Xpath),
            _ => Err(format!("Unknown schema type: {}", s)),
        }
    }
}

/// Where the sample pages come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    /// One HTML sample.
    Html(String),
    /// Several samples of the same page layout.
    HtmlSamples(Vec<String>),
    /// Pages the service fetches itself, at most [`MAX_SCHEMA_URLS`].
    Urls(Vec<String>),
}

impl Default for SchemaSource {
    fn default() -> Self {
        SchemaSource::Html(String::new())
    }
}

/// A schema generation request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaRequest {
    pub source: SchemaSource,
    /// What to extract, in plain words.
    pub query: Option<String>,
    pub schema_type: SchemaType,
    /// Example of the JSON each extracted item should look like.
    pub target_json_example: Option<Value>,
    pub llm_config: Option<Value>,
}

impl SchemaRequest {
    pub fn from_html(html: impl Into<String>) -> Self {
        Self {
            source: SchemaSource::Html(html.into()),
            ..Default::default()
        }
    }

    pub fn from_html_samples(samples: Vec<String>) -> Self {
        Self {
            source: SchemaSource::HtmlSamples(samples),
            ..Default::default()
        }
    }

    pub fn from_urls(urls: Vec<String>) -> Self {
        Self {
            source: SchemaSource::Urls(urls),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: SchemaSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_schema_type(mut self, schema_type: SchemaType) -> Self {
        self.schema_type = schema_type;
        self
    }

    pub fn with_target_json_example(mut self, example: Value) -> Self {
        self.target_json_example = Some(example);
        self
    }

    pub fn with_llm_config(mut self, config: Value) -> Self {
        self.llm_config = Some(config);
        self
    }

    pub fn validate(&self) -> Result<(), CloudError> {
        match &self.source {
            SchemaSource::Html(html) if html.trim().is_empty() => {
                Err(CloudError::validation("HTML sample must not be empty"))
            }
            SchemaSource::HtmlSamples(samples) if samples.is_empty() => {
                Err(CloudError::validation("At least one HTML sample is required"))
            }
            SchemaSource::Urls(urls) if urls.is_empty() => {
                Err(CloudError::validation("At least one URL is required"))
            }
            SchemaSource::Urls(urls) if urls.len() > MAX_SCHEMA_URLS => {
                Err(CloudError::validation(format!(
                    "Maximum {} URLs allowed, got {}",
                    MAX_SCHEMA_URLS,
                    urls.len()
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn to_body(&self) -> Result<Value, CloudError> {
        self.validate()?;

        let mut body = Map::new();
        body.insert("schema_type".into(), json!(self.schema_type));
        match &self.source {
            SchemaSource::Html(html) => body.insert("html".into(), json!(html)),
            SchemaSource::HtmlSamples(samples) => body.insert("html".into(), json!(samples)),
            SchemaSource::Urls(urls) => body.insert("urls".into(), json!(urls)),
        };
        if let Some(query) = self.query.as_deref().filter(|q| !q.is_empty()) {
            body.insert("query".into(), json!(query));
        }
        if let Some(example) = &self.target_json_example {
            body.insert("target_json_example".into(), example.clone());
        }
        if let Some(config) = &self.llm_config {
            body.insert("llm_config".into(), config.clone());
        }
        Ok(Value::Object(body))
    }
}

/// Token accounting for one generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaLlmUsage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub prompt_tokens: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub completion_tokens: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSchema {
    #[serde(default, deserialize_with = "null_as_default")]
    pub success: bool,
    /// Ready to use as an extraction strategy's `schema`.
    #[serde(default)]
    pub schema: Option<Value>,
    #[serde(rename = "error_message", default)]
    pub error: Option<String>,
    #[serde(default)]
    pub llm_usage: Option<SchemaLlmUsage>,
}

impl GeneratedSchema {
    pub fn from_value(value: Value) -> Result<Self, CloudError> {
        decode(value, "schema")
    }

    /// Field definitions: the schema itself when it is a list, else its `fields`.
    pub fn fields(&self) -> &[Value] {
        let fields = match &self.schema {
            Some(Value::Array(fields)) => Some(fields),
            Some(schema) => schema.get("fields").and_then(Value::as_array),
            None => None,
        };
        fields.map(Vec::as_slice).unwrap_or_default()
    }

    pub fn name(&self) -> Option<&str> {
        self.schema.as_ref()?.get("name")?.as_str()
    }

    pub fn base_selector(&self) -> Option<&str> {
        let schema = self.schema.as_ref()?;
        schema
            .get("base_selector")
            .or_else(|| schema.get("baseSelector"))
            .and_then(Value::as_str)
    }
}
