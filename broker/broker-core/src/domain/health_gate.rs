//! Health Gate (C3): polls the discovery store until a newly registered
//! instance reports healthy or a deadline fires.

use std::sync::Arc;
use std::time::Duration;

use broker_contracts::traits::DiscoveryStore;
use tokio_util::sync::CancellationToken;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Polls C2's healthy-instance view on a fixed cadence for a single
/// `service_id` until it shows up healthy, the deadline elapses, or the
/// caller cancels.
#[derive(Clone)]
pub struct HealthGate {
    discovery: Arc<dyn DiscoveryStore>,
    poll_interval: Duration,
    deadline: Duration,
    cancellation: CancellationToken,
}

impl HealthGate {
    #[must_use]
    pub fn new(discovery: Arc<dyn DiscoveryStore>) -> Self {
        Self {
            discovery,
            poll_interval: DEFAULT_POLL_INTERVAL,
            deadline: DEFAULT_DEADLINE,
            cancellation: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Replace the gate's own token with one shared across the process
    /// (e.g. the broker's shutdown signal), so cancelling it there aborts
    /// every in-flight wait here too.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// The shared token this `HealthGate`'s waits observe. Cancelling it (or
    /// a parent of it) aborts every in-flight `wait_for_healthy` call, e.g.
    /// on process shutdown.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Returns `true` once `service_id` appears among `service_name`'s
    /// healthy instances, `false` on deadline or cancellation. Store errors
    /// are treated as "not yet healthy" and retried on the next tick; the
    /// Gate never backs off or retries a store call within a tick.
    pub async fn wait_for_healthy(&self, service_name: &str, service_id: &str) -> bool {
        let deadline = tokio::time::Instant::now() + self.deadline;
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                biased;
                () = self.cancellation.cancelled() => return false,
                () = tokio::time::sleep_until(deadline) => return false,
                _ = ticker.tick() => {
                    match self.discovery.list_healthy_instances(service_name).await {
                        Ok(snapshot) => {
                            if snapshot.entries.iter().any(|e| e.service_id == service_id) {
                                return true;
                            }
                        }
                        Err(err) => {
                            tracing::debug!(service_name, service_id, error = %err, "health poll failed, retrying");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use broker_contracts::error::DomainError;
    use broker_contracts::model::{CatalogEntry, CatalogSnapshot, RegisterRequest};

    use super::*;

    struct FlakyThenHealthy {
        calls: AtomicUsize,
        healthy_after: usize,
    }

    #[async_trait]
    impl DiscoveryStore for FlakyThenHealthy {
        async fn register(&self, _request: &RegisterRequest, _service_id: &str) -> Result<(), DomainError> {
            Ok(())
        }

        async fn deregister(&self, _service_id: &str) -> Result<bool, DomainError> {
            Ok(true)
        }

        async fn list_catalog(&self, _name_filter: Option<&str>) -> Result<CatalogSnapshot, DomainError> {
            Ok(CatalogSnapshot { entries: vec![], as_of: chrono::Utc::now(), total_count: 0 })
        }

        async fn list_healthy_instances(&self, _name: &str) -> Result<CatalogSnapshot, DomainError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n + 1 < self.healthy_after {
                return Ok(CatalogSnapshot { entries: vec![], as_of: chrono::Utc::now(), total_count: 0 });
            }
            Ok(CatalogSnapshot {
                entries: vec![CatalogEntry {
                    service_id: "svc-a-1".into(),
                    name: "svc".into(),
                    host: "a".into(),
                    port: 1,
                    version: None,
                    tags: Default::default(),
                    capabilities: Default::default(),
                    http_endpoints: vec![],
                    http_schema_artifact_id: None,
                    http_schema_version: None,
                    metadata: Default::default(),
                    is_module: false,
                    healthy: true,
                }],
                as_of: chrono::Utc::now(),
                total_count: 1,
            })
        }

        async fn is_healthy(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn returns_true_once_instance_turns_healthy() {
        let store = Arc::new(FlakyThenHealthy { calls: AtomicUsize::new(0), healthy_after: 3 });
        let gate = HealthGate::new(store).with_poll_interval(Duration::from_millis(5)).with_deadline(Duration::from_secs(2));
        assert!(gate.wait_for_healthy("svc", "svc-a-1").await);
    }

    #[tokio::test]
    async fn returns_false_on_deadline() {
        let store = Arc::new(FlakyThenHealthy { calls: AtomicUsize::new(0), healthy_after: usize::MAX });
        let gate = HealthGate::new(store).with_poll_interval(Duration::from_millis(5)).with_deadline(Duration::from_millis(30));
        assert!(!gate.wait_for_healthy("svc", "svc-a-1").await);
    }

    #[tokio::test]
    async fn returns_false_on_cancellation() {
        let store = Arc::new(FlakyThenHealthy { calls: AtomicUsize::new(0), healthy_after: usize::MAX });
        let gate = HealthGate::new(store).with_poll_interval(Duration::from_millis(5)).with_deadline(Duration::from_secs(30));
        let token = gate.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });
        assert!(!gate.wait_for_healthy("svc", "svc-a-1").await);
    }
}
