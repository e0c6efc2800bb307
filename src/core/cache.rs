use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

type Entries<V> = Arc<RwLock<HashMap<String, CacheEntry<V>>>>;

/// In-memory key/value cache with a fixed TTL.
///
/// Expired entries are ignored on read and removed by a background sweep that
/// runs every `sweep_interval` for as long as the cache is alive. The sweep
/// takes the same write lock as [`TtlCache::set`].
pub struct TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    inner: Entries<V>,
    ttl: Duration,
    sweeper: Option<JoinHandle<()>>,
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates the cache and spawns its sweep task on the current tokio runtime.
    /// Outside a runtime the cache still works, relying on expiry at read time.
    pub fn new(ttl: Duration, sweep_interval: Duration) -> Self {
        let inner: Entries<V> = Arc::new(RwLock::new(HashMap::new()));

        let sweeper = match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn(sweep_loop(Arc::clone(&inner), sweep_interval))),
            Err(_) => {
                warn!("No tokio runtime available, cache sweep disabled");
                None
            }
        };

        Self {
            inner,
            ttl,
            sweeper,
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let cache = self.inner.read().await;
        match cache.get(key) {
            Some(entry) if entry.is_expired(Instant::now()) => {
                debug!("Cache entry expired for key: {}", key);
                None
            }
            Some(entry) => {
                debug!("Cache HIT for key: {}", key);
                Some(entry.value.clone())
            }
            None => {
                debug!("Cache MISS for key: {}", key);
                None
            }
        }
    }

    pub async fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + self.ttl,
        };

        let mut cache = self.inner.write().await;
        debug!("Cache PUT for key: {}", key);
        cache.insert(key, entry);
    }

    /// Removes every expired entry and returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        purge(&self.inner).await
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<V> Drop for TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.take() {
            handle.abort();
        }
    }
}

async fn purge<V>(entries: &Entries<V>) -> usize {
    let mut cache = entries.write().await;
    let now = Instant::now();
    let before = cache.len();
    cache.retain(|_, entry| !entry.is_expired(now));
    before - cache.len()
}

async fn sweep_loop<V>(entries: Entries<V>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let removed = purge(&entries).await;
        if removed > 0 {
            debug!(removed, "Cache sweep removed expired entries");
        }
    }
}
