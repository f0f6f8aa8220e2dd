//! Idle-TTL, capacity-capped cache of gRPC channels keyed by logical
//! service name (not by endpoint), so the discovery layer can transparently
//! rotate a module's underlying address within one cached channel.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tonic::transport::Channel;

const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);
const DEFAULT_CAPACITY: usize = 1000;
const GRACEFUL_CLOSE_BUDGET: Duration = Duration::from_millis(500);

struct Entry {
    channel: Channel,
    last_used: parking_lot::Mutex<Instant>,
}

impl Entry {
    fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_used.lock().elapsed()
    }
}

/// Error returned when the cache will not hand out a channel: either it is
/// mid-teardown, or the caller-supplied connect future failed.
#[derive(Debug, thiserror::Error)]
pub enum ChannelCacheError {
    #[error("channel cache is shutting down")]
    ShuttingDown,
    #[error("connect failed: {0}")]
    Connect(#[from] anyhow::Error),
}

/// Shared cache of outbound channels to module instances.
pub struct ChannelCache {
    entries: DashMap<String, Arc<Entry>>,
    ttl: Duration,
    capacity: usize,
    shutting_down: AtomicBool,
}

impl ChannelCache {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_TTL, DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_limits(ttl: Duration, capacity: usize) -> Self {
        Self { entries: DashMap::new(), ttl, capacity, shutting_down: AtomicBool::new(false) }
    }

    /// Return the cached channel for `name`, connecting and caching a new
    /// one via `connect` if absent. Fails without calling `connect` if
    /// teardown has started.
    pub async fn get_or_create<F, Fut>(&self, name: &str, connect: F) -> Result<Channel, ChannelCacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Channel>>,
    {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(ChannelCacheError::ShuttingDown);
        }

        if let Some(entry) = self.entries.get(name) {
            entry.touch();
            return Ok(entry.channel.clone());
        }

        if self.entries.len() >= self.capacity {
            self.evict_least_recently_used();
        }

        let channel = connect().await?;
        let entry = Arc::new(Entry { channel: channel.clone(), last_used: parking_lot::Mutex::new(Instant::now()) });
        self.entries.insert(name.to_string(), entry);
        Ok(channel)
    }

    /// Remove the single oldest (by last-use) entry, ignoring ties.
    fn evict_least_recently_used(&self) {
        let oldest = self
            .entries
            .iter()
            .max_by_key(|e| e.value().idle_for())
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    /// Drop all entries whose idle time exceeds the configured TTL. Meant
    /// to be called periodically by a background sweep task.
    pub fn sweep_expired(&self) {
        let expired: Vec<String> =
            self.entries.iter().filter(|e| e.value().idle_for() >= self.ttl).map(|e| e.key().clone()).collect();
        for key in expired {
            self.entries.remove(&key);
        }
    }

    /// Set the shutting-down flag and drain the cache. Each entry gets a
    /// bounded grace window to let in-flight RPCs finish before the channel
    /// is dropped; after teardown starts, `get_or_create` always fails.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        let keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, entry)) = self.entries.remove(&key) {
                let _ = tokio::time::timeout(GRACEFUL_CLOSE_BUDGET, async move {
                    drop(entry);
                })
                .await;
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ChannelCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tonic::transport::Endpoint;

    use super::*;

    fn dummy_channel() -> Channel {
        Endpoint::from_static("http://localhost:50999").connect_lazy()
    }

    #[tokio::test]
    async fn get_or_create_caches_by_name() {
        let cache = ChannelCache::new();
        let calls = std::sync::atomic::AtomicUsize::new(0);

        let first = cache
            .get_or_create("nodes-registry", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(dummy_channel())
            })
            .await;
        assert!(first.is_ok());

        let second = cache
            .get_or_create("nodes-registry", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(dummy_channel())
            })
            .await;
        assert!(second.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1, "second call should reuse the cached channel");
    }

    #[tokio::test]
    async fn shutdown_rejects_new_channels() {
        let cache = ChannelCache::new();
        cache.shutdown().await;

        let result = cache.get_or_create("nodes-registry", || async { Ok(dummy_channel()) }).await;
        assert!(matches!(result, Err(ChannelCacheError::ShuttingDown)));
    }

    #[tokio::test]
    async fn sweep_expired_drops_idle_entries() {
        let cache = ChannelCache::with_limits(Duration::from_millis(10), 1000);
        cache.get_or_create("nodes-registry", || async { Ok(dummy_channel()) }).await.unwrap();
        assert_eq!(cache.len(), 1);

        tokio::time::sleep(Duration::from_millis(30)).await;
        cache.sweep_expired();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn capacity_cap_evicts_least_recently_used() {
        let cache = ChannelCache::with_limits(Duration::from_secs(3600), 1);
        cache.get_or_create("a", || async { Ok(dummy_channel()) }).await.unwrap();
        cache.get_or_create("b", || async { Ok(dummy_channel()) }).await.unwrap();
        assert_eq!(cache.len(), 1);
    }
}
