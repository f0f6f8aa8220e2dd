//! Connection configuration for the schema archive client.

use std::time::Duration;

/// How to reach the schema archive and authenticate against it.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub request_timeout: Duration,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081/apis/registry/v2".to_string(),
            auth_token: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}
