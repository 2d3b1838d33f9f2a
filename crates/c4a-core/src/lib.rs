pub mod config;
pub mod context;
pub mod deep;
pub mod error;
pub mod job;
pub mod job_client;
pub mod models;
pub mod orchestrator;
mod poll;
pub mod schema;
pub mod traits;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::ClientConfig;
pub use context::{ContextRequest, ContextResult};
pub use deep::{
    DeepCrawlOutcome, DeepCrawlRequest, DeepCrawlResult, DiscoveryStrategy, ScanStatus, ScannedUrl,
};
pub use error::{CloudError, ErrorDetails, ErrorKind, QuotaType};
pub use job::{Job, JobProgress, JobStatus, ListJobsQuery, WaitOptions};
pub use job_client::JobClient;
pub use models::{
    BatchResult, CrawlRequest, CrawlResult, CrawlStrategy, MarkdownResult, StorageUsage, Usage,
};
pub use orchestrator::{DeepCrawlOrchestrator, SCAN_ID_PREFIX};
pub use schema::{GeneratedSchema, SchemaRequest, SchemaSource, SchemaType};
pub use traits::{ApiRequest, Executor, HttpMethod};
