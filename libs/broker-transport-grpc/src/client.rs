//! gRPC client transport configuration and connection utilities.
//!
//! This module is responsible only for transport-level configuration:
//! connect/RPC timeouts, HTTP/2 keepalive, and flow-control window sizing.
//! Retry policy (attempt count, backoff) lives here too since the broker has
//! no separate RPC-retry module, but it is applied by the caller around the
//! connect attempt, not around individual RPCs.

use std::time::Duration;

use tonic::transport::{Channel, Endpoint};
use tracing::Instrument;

/// Default HTTP/2 flow-control window. 64 KiB (the tonic/h2 default) is a
/// throughput bottleneck for large module-metadata payloads; the module
/// callback client overrides both directions to this value.
pub const DEFAULT_FLOW_CONTROL_WINDOW: u32 = 100 * 1024 * 1024;

fn duration_to_u64_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Configuration for an outbound gRPC client transport stack.
#[derive(Debug, Clone)]
pub struct GrpcClientConfig {
    /// Timeout for establishing the initial connection.
    pub connect_timeout: Duration,

    /// Timeout for individual RPC calls (applied at transport level).
    pub rpc_timeout: Duration,

    /// Maximum number of connect attempts (1 = no retry).
    pub max_retries: u32,

    /// Base duration for exponential backoff between connect retries.
    pub base_backoff: Duration,

    /// Maximum duration for exponential backoff.
    pub max_backoff: Duration,

    /// Name used in tracing spans and log fields.
    pub service_name: &'static str,

    /// Inbound and outbound HTTP/2 flow-control window, in bytes. `None`
    /// keeps tonic's default.
    pub flow_control_window: Option<u32>,
}

impl Default for GrpcClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            rpc_timeout: Duration::from_secs(30),
            max_retries: 3,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            service_name: "grpc_client",
            flow_control_window: None,
        }
    }
}

impl GrpcClientConfig {
    #[must_use]
    pub fn new(service_name: &'static str) -> Self {
        Self {
            service_name,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub fn with_flow_control_window(mut self, window: u32) -> Self {
        self.flow_control_window = Some(window);
        self
    }
}

fn build_endpoint(uri: String, cfg: &GrpcClientConfig) -> Result<Endpoint, tonic::transport::Error> {
    let mut endpoint = Endpoint::from_shared(uri)?
        .connect_timeout(cfg.connect_timeout)
        .timeout(cfg.rpc_timeout)
        .tcp_keepalive(Some(Duration::from_secs(30)))
        .http2_keep_alive_interval(Duration::from_secs(30))
        .keep_alive_timeout(Duration::from_secs(10))
        .keep_alive_while_idle(true);

    if let Some(window) = cfg.flow_control_window {
        endpoint = endpoint
            .initial_stream_window_size(Some(window))
            .initial_connection_window_size(Some(window));
    }

    Ok(endpoint)
}

/// Connect to a gRPC service with the configured transport stack, no retry.
///
/// # Errors
/// Returns an error if the endpoint URI is malformed or the connection
/// attempt fails.
pub async fn connect_with_stack<TClient>(uri: impl Into<String>, cfg: &GrpcClientConfig) -> anyhow::Result<TClient>
where
    TClient: From<Channel>,
{
    let uri_string = uri.into();
    let span = tracing::debug_span!("grpc_connect", service = cfg.service_name, uri = %uri_string);

    async move {
        let endpoint = build_endpoint(uri_string, cfg)?;
        let channel = endpoint.connect().await?;
        tracing::info!(service_name = cfg.service_name, "gRPC client connected");
        Ok(TClient::from(channel))
    }
    .instrument(span)
    .await
}

/// Connect with exponential backoff between attempts, up to `max_retries`.
///
/// # Errors
/// Returns the final connection error once `max_retries` attempts have all
/// failed.
pub async fn connect_with_retry<TClient>(uri: impl Into<String>, cfg: &GrpcClientConfig) -> anyhow::Result<TClient>
where
    TClient: From<Channel>,
{
    use anyhow::Context;

    let uri_string = uri.into();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        match connect_with_stack::<TClient>(&uri_string, cfg).await {
            Ok(client) => {
                if attempt > 1 {
                    tracing::info!(service = cfg.service_name, attempt, "gRPC connection established after retries");
                }
                return Ok(client);
            }
            Err(e) if attempt <= cfg.max_retries => {
                let backoff = (cfg.base_backoff * attempt).min(cfg.max_backoff);
                tracing::warn!(
                    service = cfg.service_name,
                    attempt,
                    max_retries = cfg.max_retries,
                    error = %e,
                    backoff_ms = duration_to_u64_ms(backoff),
                    "gRPC connection failed, retrying"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                return Err(e).context(format!("failed to connect to {} after {attempt} attempts", cfg.service_name));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_flow_control_override() {
        let cfg = GrpcClientConfig::default();
        assert_eq!(cfg.connect_timeout, Duration::from_secs(10));
        assert_eq!(cfg.max_retries, 3);
        assert!(cfg.flow_control_window.is_none());
    }

    #[test]
    fn builder_sets_flow_control_window() {
        let cfg = GrpcClientConfig::new("module_callback").with_flow_control_window(DEFAULT_FLOW_CONTROL_WINDOW);
        assert_eq!(cfg.flow_control_window, Some(100 * 1024 * 1024));
        assert_eq!(cfg.service_name, "module_callback");
    }

    #[test]
    fn build_endpoint_succeeds_for_valid_uri() {
        let cfg = GrpcClientConfig::default();
        let result = build_endpoint("http://localhost:50051".to_string(), &cfg);
        assert!(result.is_ok());
    }

    #[test]
    fn build_endpoint_fails_for_empty_uri() {
        let cfg = GrpcClientConfig::default();
        let result = build_endpoint(String::new(), &cfg);
        assert!(result.is_err());
    }
}
