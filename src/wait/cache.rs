//! Duration-keyed cache of wait tokens with a background eviction sweep.
//!
//! Scaled and realtime tokens live in separate maps and age against their own
//! clock. Lookups refresh an entry's last-used time; the sweep drops entries
//! idle for longer than the configured threshold.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::WaitCacheConfig;
use crate::core::time::{HostClock, duration_from_secs};
use super::token::{WaitKind, WaitToken};

struct CacheEntry {
    token: Arc<WaitToken>,
    last_used: Duration,
}

/// Snapshot of cache counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Tokens constructed, including uncached ones handed out while paused
    pub created: u64,
    pub evicted: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    created: AtomicU64,
    evicted: AtomicU64,
}

struct Shared {
    clock: Arc<dyn HostClock>,
    scaled: Mutex<HashMap<Duration, CacheEntry>>,
    realtime: Mutex<HashMap<Duration, CacheEntry>>,
    unused_threshold: Duration,
    counters: Counters,
}

impl Shared {
    fn lookup(&self, duration: Duration, kind: WaitKind) -> Arc<WaitToken> {
        let (map, now) = match kind {
            WaitKind::Scaled => (&self.scaled, self.clock.time()),
            WaitKind::Realtime => (&self.realtime, self.clock.realtime()),
        };

        let mut map = map.lock();
        if let Some(entry) = map.get_mut(&duration) {
            entry.last_used = now;
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(&entry.token);
        }

        let token = Arc::new(WaitToken::new(duration, kind));
        map.insert(duration, CacheEntry { token: Arc::clone(&token), last_used: now });
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        self.counters.created.fetch_add(1, Ordering::Relaxed);
        log::debug!("Cached {:?} wait token for {:?}", kind, duration);
        token
    }

    fn sweep(&self) -> usize {
        let evicted = Self::evict_idle(&self.scaled, self.clock.time(), self.unused_threshold)
            + Self::evict_idle(&self.realtime, self.clock.realtime(), self.unused_threshold);
        self.counters.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
        evicted
    }

    fn evict_idle(
        map: &Mutex<HashMap<Duration, CacheEntry>>,
        now: Duration,
        threshold: Duration,
    ) -> usize {
        let mut map = map.lock();
        let before = map.len();
        map.retain(|_, entry| now.saturating_sub(entry.last_used) <= threshold);
        before - map.len()
    }
}

/// Cache handing out one shared [`WaitToken`] per distinct duration.
pub struct WaitTokenCache {
    shared: Arc<Shared>,
    cleanup_interval: Duration,
    shutdown_token: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl WaitTokenCache {
    /// Create a cache without starting the background sweep
    pub fn new(clock: Arc<dyn HostClock>, config: &WaitCacheConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                clock,
                scaled: Mutex::new(HashMap::new()),
                realtime: Mutex::new(HashMap::new()),
                unused_threshold: config.unused_threshold(),
                counters: Counters::default(),
            }),
            cleanup_interval: config.cleanup_interval(),
            shutdown_token: CancellationToken::new(),
            sweeper: Mutex::new(None),
        }
    }

    /// Get the token for `duration`.
    ///
    /// Realtime tokens requested while the host is paused are built fresh and
    /// never cached.
    pub fn get_token(&self, duration: Duration, realtime: bool) -> Arc<WaitToken> {
        if realtime && self.shared.clock.is_paused() {
            self.shared.counters.created.fetch_add(1, Ordering::Relaxed);
            return Arc::new(WaitToken::new(duration, WaitKind::Realtime));
        }

        let kind = if realtime { WaitKind::Realtime } else { WaitKind::Scaled };
        self.shared.lookup(duration, kind)
    }

    /// Scaled-time token for `secs` seconds.
    ///
    /// Negative and NaN waits map to a zero-length token that is elapsed as
    /// soon as it starts.
    pub fn wait_for_seconds(&self, secs: f32) -> Arc<WaitToken> {
        self.get_token(duration_from_secs(secs), false)
    }

    /// Realtime token for `secs` seconds
    pub fn wait_for_seconds_realtime(&self, secs: f32) -> Arc<WaitToken> {
        self.get_token(duration_from_secs(secs), true)
    }

    /// Run one eviction pass. Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        self.shared.sweep()
    }

    /// Spawn the background sweep on the current tokio runtime.
    ///
    /// Idempotent. Panics if called outside a tokio runtime.
    pub fn start_sweeper(&self) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() || self.shutdown_token.is_cancelled() {
            return;
        }

        let shared = Arc::clone(&self.shared);
        let interval = self.cleanup_interval;
        let token = self.shutdown_token.clone();
        *sweeper = Some(tokio::spawn(async move {
            Self::sweep_loop(shared, interval, token).await;
        }));
        log::debug!("Wait-token sweeper started (interval {:?})", interval);
    }

    async fn sweep_loop(shared: Arc<Shared>, interval: Duration, token: CancellationToken) {
        while !token.is_cancelled() {
            let evicted = shared.sweep();
            if evicted > 0 {
                log::debug!("Wait-token sweep evicted {} entr(ies)", evicted);
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        log::debug!("Wait-token sweeper stopped");
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Cancel the sweeper and wait for it to exit.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::error!("Wait-token sweeper panicked: {}", e);
            }
        }
    }

    /// Number of cached tokens across both maps
    pub fn len(&self) -> usize {
        self.shared.scaled.lock().len() + self.shared.realtime.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.shared.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            created: c.created.load(Ordering::Relaxed),
            evicted: c.evicted.load(Ordering::Relaxed),
        }
    }
}

impl Drop for WaitTokenCache {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::FrameClock;

    fn config(threshold_secs: f32, interval_secs: f32) -> WaitCacheConfig {
        WaitCacheConfig {
            unused_threshold_secs: threshold_secs,
            cleanup_interval_secs: interval_secs,
        }
    }

    fn cache_with_clock(threshold_secs: f32) -> (Arc<FrameClock>, WaitTokenCache) {
        let clock = Arc::new(FrameClock::new());
        let cache = WaitTokenCache::new(clock.clone(), &config(threshold_secs, 60.0));
        (clock, cache)
    }

    #[test]
    fn test_same_duration_shares_token() {
        let (_clock, cache) = cache_with_clock(60.0);

        let a = cache.wait_for_seconds(0.5);
        let b = cache.wait_for_seconds(0.5);
        let c = cache.wait_for_seconds(1.0);

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 2, created: 2, evicted: 0 });
    }

    #[test]
    fn test_scaled_and_realtime_are_separate() {
        let (_clock, cache) = cache_with_clock(60.0);

        let scaled = cache.wait_for_seconds(1.0);
        let realtime = cache.wait_for_seconds_realtime(1.0);

        assert!(!Arc::ptr_eq(&scaled, &realtime));
        assert_eq!(scaled.kind(), WaitKind::Scaled);
        assert_eq!(realtime.kind(), WaitKind::Realtime);
        assert!(Arc::ptr_eq(&realtime, &cache.wait_for_seconds_realtime(1.0)));
    }

    #[test]
    fn test_realtime_while_paused_is_never_cached() {
        let (clock, cache) = cache_with_clock(60.0);
        clock.set_time_scale(0.0);

        let a = cache.wait_for_seconds_realtime(2.0);
        let b = cache.wait_for_seconds_realtime(2.0);

        assert!(!Arc::ptr_eq(&a, &b));
        assert!(cache.is_empty());
        assert_eq!(cache.stats().created, 2);

        // Scaled tokens are still cached while paused
        assert!(Arc::ptr_eq(&cache.wait_for_seconds(2.0), &cache.wait_for_seconds(2.0)));
    }

    #[test]
    fn test_concurrent_lookups_construct_once() {
        let (_clock, cache) = cache_with_clock(60.0);
        let cache = Arc::new(cache);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    (0..100).map(|_| cache.wait_for_seconds(0.25)).collect::<Vec<_>>()
                })
            })
            .collect();

        let tokens: Vec<Arc<WaitToken>> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        assert!(tokens.iter().all(|t| Arc::ptr_eq(t, &tokens[0])));
        assert_eq!(cache.stats().created, 1);
        assert_eq!(cache.stats().hits, 799);
    }

    #[test]
    fn test_negative_and_nan_seconds() {
        let (clock, cache) = cache_with_clock(60.0);

        let negative = cache.wait_for_seconds(-0.5);
        let nan = cache.wait_for_seconds(f32::NAN);
        let realtime = cache.wait_for_seconds_realtime(-3.0);

        assert_eq!(negative.duration(), Duration::ZERO);
        assert!(Arc::ptr_eq(&negative, &nan));
        assert_eq!(realtime.duration(), Duration::ZERO);

        let started = negative.started_at(clock.as_ref());
        assert!(negative.is_elapsed(started, clock.as_ref()));

        assert_eq!(cache.wait_for_seconds(1e30).duration(), Duration::MAX);
    }

    #[test]
    fn test_sweep_evicts_idle_and_keeps_touched() {
        let (clock, cache) = cache_with_clock(10.0);

        let _idle = cache.wait_for_seconds(1.0);
        let busy = cache.wait_for_seconds(2.0);

        clock.advance(Duration::from_secs(6));
        cache.wait_for_seconds(2.0);
        clock.advance(Duration::from_secs(6));

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evicted, 1);

        // The survivor is still the same instance
        assert!(Arc::ptr_eq(&busy, &cache.wait_for_seconds(2.0)));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let (clock, cache) = cache_with_clock(10.0);
        cache.wait_for_seconds(1.0);

        clock.advance(Duration::from_secs(10));
        assert_eq!(cache.sweep(), 0);

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.sweep(), 1);
    }

    #[test]
    fn test_realtime_entries_age_while_paused() {
        let (clock, cache) = cache_with_clock(10.0);
        cache.wait_for_seconds(1.0);
        cache.wait_for_seconds_realtime(1.0);

        clock.set_time_scale(0.0);
        clock.advance(Duration::from_secs(11));

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper_evicts() {
        let clock = Arc::new(FrameClock::new());
        let cache = WaitTokenCache::new(clock.clone(), &config(1.0, 5.0));
        cache.wait_for_seconds(0.1);

        cache.start_sweeper();
        cache.start_sweeper();
        assert!(cache.is_sweeping());

        clock.advance(Duration::from_secs(2));
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert!(cache.is_empty());
        cache.shutdown().await;
        assert!(!cache.is_sweeping());
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_sleep() {
        let clock = Arc::new(FrameClock::new());
        let cache = WaitTokenCache::new(clock, &config(60.0, 3600.0));
        cache.start_sweeper();

        tokio::time::timeout(Duration::from_secs(5), cache.shutdown())
            .await
            .expect("shutdown should not wait for the sweep interval");

        // A cancelled cache does not restart its sweeper
        cache.start_sweeper();
        assert!(!cache.is_sweeping());
    }
}
