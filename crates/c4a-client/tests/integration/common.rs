use std::time::Duration;

use c4a_client::{Crawler, ReqwestExecutor};
use c4a_core::ClientConfig;
use wiremock::MockServer;

pub const TEST_KEY: &str = "sk_test_integration";

/// Config pointed at the mock server, with a backoff short enough that
/// retry schedules finish in milliseconds.
pub fn test_config(server: &MockServer) -> ClientConfig {
    ClientConfig::new(TEST_KEY)
        .unwrap()
        .with_base_url(server.uri())
        .with_backoff_base(Duration::from_millis(1))
}

pub fn executor(server: &MockServer) -> ReqwestExecutor {
    ReqwestExecutor::new(test_config(server)).unwrap()
}

pub fn crawler(server: &MockServer) -> Crawler {
    Crawler::new(test_config(server)).unwrap()
}
