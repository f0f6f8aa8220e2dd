//! Connection configuration for the discovery-store adapter.

/// How to reach the discovery store and authenticate against it.
#[derive(Debug, Clone)]
pub struct ConsulConfig {
    pub host: String,
    pub port: u16,
    pub token: Option<String>,
    pub datacenter: Option<String>,
    pub tls_enabled: bool,
}

impl ConsulConfig {
    #[must_use]
    pub fn address(&self) -> String {
        let scheme = if self.tls_enabled { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self { host: "localhost".to_string(), port: 8500, token: None, datacenter: None, tls_enabled: false }
    }
}
