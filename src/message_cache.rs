use std::{collections::HashMap, fmt::Display, future::Future, sync::Mutex, time::Duration};

use serenity::all::{ChannelId, MessageId};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::metrics::METRICS;

struct CacheEntry<V> {
    value: V,
    fetched_at: Instant,
}

/// Bounded, time-expiring cache in front of "fetch message by id".
///
/// Entries older than the TTL are never served. When over capacity the entry
/// with the oldest fetch time goes first.
pub struct MessageCache<V> {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<(ChannelId, MessageId), CacheEntry<V>>>,
}

impl<V: Clone> MessageCache<V> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Returns the cached snapshot, or runs `fetch` and stores its result.
    /// A failed fetch is logged and reported as `None`.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        channel: ChannelId,
        message: MessageId,
        fetch: F,
    ) -> Option<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Display,
    {
        let key = (channel, message);
        if let Ok(mut entries) = self.entries.lock() {
            self.evict(&mut entries, Instant::now());
            if let Some(hit) = entries.get(&key) {
                METRICS.inc_cache_hit();
                return Some(hit.value.clone());
            }
        }
        METRICS.inc_cache_miss();

        let value = match fetch().await {
            Ok(v) => v,
            Err(e) => {
                warn!(%channel, %message, "message lookup failed: {e}");
                return None;
            }
        };

        if let Ok(mut entries) = self.entries.lock() {
            let now = Instant::now();
            entries.insert(
                key,
                CacheEntry {
                    value: value.clone(),
                    fetched_at: now,
                },
            );
            self.evict(&mut entries, now);
        }
        Some(value)
    }

    fn evict(&self, entries: &mut HashMap<(ChannelId, MessageId), CacheEntry<V>>, now: Instant) {
        let before = entries.len();
        entries.retain(|_, e| now.duration_since(e.fetched_at) <= self.ttl);
        while entries.len() > self.capacity {
            let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.fetched_at)
                .map(|(k, _)| *k)
            else {
                break;
            };
            entries.remove(&oldest);
        }
        if entries.len() != before {
            debug!(evicted = before - entries.len(), "message cache eviction");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn ids(n: u64) -> (ChannelId, MessageId) {
        (ChannelId::new(10), MessageId::new(n))
    }

    #[tokio::test(start_paused = true)]
    async fn hit_within_ttl_skips_fetch() {
        let cache = MessageCache::new(Duration::from_secs(30), 100);
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let fetch = || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>("snapshot")
        };
        let (c, m) = ids(1);
        assert_eq!(cache.get_or_fetch(c, m, fetch).await, Some("snapshot"));
        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(cache.get_or_fetch(c, m, fetch).await, Some("snapshot"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_refetched() {
        let cache = MessageCache::new(Duration::from_secs(30), 100);
        let (c, m) = ids(1);
        cache
            .get_or_fetch(c, m, || async { Ok::<_, String>(1) })
            .await;
        tokio::time::advance(Duration::from_secs(31)).await;
        let got = cache
            .get_or_fetch(c, m, || async { Ok::<_, String>(2) })
            .await;
        assert_eq!(got, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_evicts_oldest_first() {
        let cache = MessageCache::new(Duration::from_secs(30), 3);
        for n in 1..=5u64 {
            let (c, m) = ids(n);
            cache
                .get_or_fetch(c, m, move || async move { Ok::<_, String>(n) })
                .await;
            tokio::time::advance(Duration::from_millis(10)).await;
            assert!(cache.len() <= 3);
        }
        // 1 and 2 were the oldest, so they must be fetched again.
        let (c, m) = ids(1);
        let refetched = cache
            .get_or_fetch(c, m, || async { Ok::<_, String>(100) })
            .await;
        assert_eq!(refetched, Some(100));
        let (c, m) = ids(5);
        let cached = cache
            .get_or_fetch(c, m, || async { Ok::<_, String>(500) })
            .await;
        assert_eq!(cached, Some(5));
    }

    #[tokio::test]
    async fn failed_fetch_is_none_and_not_cached() {
        let cache: MessageCache<u32> = MessageCache::new(Duration::from_secs(30), 10);
        let (c, m) = ids(7);
        let got = cache
            .get_or_fetch(c, m, || async { Err::<u32, _>("unknown message") })
            .await;
        assert_eq!(got, None);
        assert_eq!(cache.len(), 0);
    }
}
