//! In-process cache for the single rendered canvas image.

use std::future::Future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use axum::body::Bytes;
use chrono::{DateTime, Duration, Utc};

use super::clock::Clock;

#[derive(Debug, Default)]
struct Slot {
    bytes: Option<Bytes>,
    rendered_at: Option<DateTime<Utc>>,
    // Bumped by every invalidation; a render that started before the bump
    // must not repopulate the slot.
    generation: u64,
}

#[derive(Debug)]
pub struct SnapshotCache {
    clock: Arc<dyn Clock>,
    slot: RwLock<Slot>,
}

impl SnapshotCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            slot: RwLock::new(Slot::default()),
        }
    }

    /// The cached bytes if they are younger than `ttl`.
    pub fn get(&self, ttl: Duration) -> Option<Bytes> {
        let slot = self.read();
        self.fresh(&slot, ttl)
    }

    /// Stores `bytes` as rendered now; last writer wins.
    pub fn set(&self, bytes: Bytes) {
        let mut slot = self.write();
        self.store(&mut slot, bytes);
    }

    /// Drops the cached bytes regardless of their age.
    pub fn invalidate(&self) {
        let mut slot = self.write();
        slot.bytes = None;
        slot.rendered_at = None;
        slot.generation = slot.generation.wrapping_add(1);
    }

    /// Serves from the cache or renders, stores and returns fresh bytes.
    ///
    /// The caller always gets the bytes it rendered, never a re-read of the
    /// slot. A failed render leaves the slot as it was, and a render that was
    /// overtaken by [`SnapshotCache::invalidate`] is returned but not cached.
    pub async fn get_or_render<F, Fut, E>(&self, ttl: Duration, render: F) -> Result<Bytes, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
    {
        let generation = {
            let slot = self.read();
            if let Some(bytes) = self.fresh(&slot, ttl) {
                return Ok(bytes);
            }
            slot.generation
        };

        let bytes = render().await?;

        let mut slot = self.write();
        if slot.generation == generation {
            self.store(&mut slot, bytes.clone());
        } else {
            tracing::debug!("snapshot invalidated during render, not caching");
        }
        Ok(bytes)
    }

    fn store(&self, slot: &mut Slot, bytes: Bytes) {
        slot.bytes = Some(bytes);
        slot.rendered_at = Some(self.clock.now());
    }

    fn fresh(&self, slot: &Slot, ttl: Duration) -> Option<Bytes> {
        match (&slot.bytes, slot.rendered_at) {
            (Some(bytes), Some(rendered_at)) if self.clock.now() - rendered_at < ttl => {
                Some(bytes.clone())
            }
            _ => None,
        }
    }

    // Nothing panics while holding the lock, so a poisoned guard is still
    // consistent.
    fn read(&self) -> RwLockReadGuard<'_, Slot> {
        self.slot.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slot> {
        self.slot.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::clock::ManualClock;

    const TTL: i64 = 10;

    fn cache(start_secs: i64) -> (SnapshotCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_secs(start_secs));
        (SnapshotCache::new(clock.clone()), clock)
    }

    fn ttl() -> Duration {
        Duration::seconds(TTL)
    }

    #[test]
    fn empty_cache_misses() {
        let (cache, _) = cache(0);
        assert!(cache.get(ttl()).is_none());
    }

    #[test]
    fn entry_expires_at_ttl() {
        let (cache, clock) = cache(100);
        cache.set(Bytes::from_static(b"png"));

        clock.set_secs(100 + TTL - 1);
        assert_eq!(cache.get(ttl()).unwrap(), Bytes::from_static(b"png"));

        clock.set_secs(100 + TTL);
        assert!(cache.get(ttl()).is_none());
    }

    #[test]
    fn invalidate_overrides_live_ttl() {
        let (cache, clock) = cache(0);
        cache.set(Bytes::from_static(b"before"));

        clock.set_secs(1);
        cache.invalidate();
        clock.set_secs(2);
        assert!(cache.get(ttl()).is_none());
    }

    #[tokio::test]
    async fn miss_renders_once_then_serves_cached() {
        let (cache, _) = cache(0);
        let mut renders = 0;

        let first = cache
            .get_or_render(ttl(), || {
                renders += 1;
                async { Ok::<_, ()>(Bytes::from_static(b"v1")) }
            })
            .await
            .unwrap();
        let second = cache
            .get_or_render(ttl(), || async { Ok::<_, ()>(Bytes::from_static(b"v2")) })
            .await
            .unwrap();

        assert_eq!(renders, 1);
        assert_eq!(first, Bytes::from_static(b"v1"));
        assert_eq!(second, Bytes::from_static(b"v1"));
    }

    #[tokio::test]
    async fn failed_render_keeps_previous_entry() {
        let (cache, clock) = cache(0);
        cache.set(Bytes::from_static(b"good"));

        clock.set_secs(TTL + 1);
        let failed = cache
            .get_or_render(ttl(), || async { Err::<Bytes, _>("encoder blew up") })
            .await;
        assert_eq!(failed.unwrap_err(), "encoder blew up");

        // Expired but intact: a longer ttl still sees it.
        assert_eq!(
            cache.get(Duration::seconds(TTL * 10)).unwrap(),
            Bytes::from_static(b"good")
        );
    }

    #[tokio::test]
    async fn rendered_entry_ages_from_render_time() {
        let (cache, clock) = cache(0);
        cache.set(Bytes::from_static(b"old"));

        clock.set_secs(TTL + 5);
        let fresh = cache
            .get_or_render(ttl(), || async { Ok::<_, ()>(Bytes::from_static(b"new")) })
            .await
            .unwrap();
        assert_eq!(fresh, Bytes::from_static(b"new"));

        // Stamped at the re-render, not at the original set.
        clock.set_secs(TTL + 5 + TTL - 1);
        assert_eq!(cache.get(ttl()).unwrap(), Bytes::from_static(b"new"));
        clock.set_secs(TTL + 5 + TTL);
        assert!(cache.get(ttl()).is_none());
    }

    #[tokio::test]
    async fn render_overtaken_by_invalidate_is_not_cached() {
        let (cache, _) = cache(0);

        let served = cache
            .get_or_render(ttl(), || async {
                // A write lands while this render is in flight.
                cache.invalidate();
                Ok::<_, ()>(Bytes::from_static(b"stale"))
            })
            .await
            .unwrap();

        assert_eq!(served, Bytes::from_static(b"stale"));
        assert!(cache.get(ttl()).is_none());
    }
}
