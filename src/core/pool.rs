//! Bounded player pool with LRU eviction and pre-loading
//!
//! Structure: IndexMap<url, PlayerHandle>
//! - Order = recency: front is least recently used, back is most recent
//! - O(1) lookup by URL
//! - Eviction pops the front and releases the handle before dropping it
//!
//! The pool is single-owner: every mutating call takes `&mut self`, and the
//! handles it returns borrow the pool, so a handle cannot outlive an eviction
//! or release. Loading happens on `Workers`; no call here blocks on I/O.

use indexmap::IndexMap;
use log::{debug, info};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::event_bus::EventBus;
use super::load_control::LoadControl;
use super::media::MediaBackend;
use super::player::PlayerHandle;
use super::player_events::PoolEvent;
use super::workers::Workers;

/// Default capacity: current item + 2 ahead + 2 behind
pub const MAX_CAPACITY: usize = 5;

/// Pool counters for monitoring
#[derive(Debug, Default)]
pub struct PoolStats {
    created: AtomicU64,
    reused: AtomicU64,
    evicted: AtomicU64,
    released: AtomicU64,
    preload_hits: AtomicU64,
}

impl PoolStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles constructed (by `get` or `preload`)
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// `get` calls served by an existing handle
    pub fn reused(&self) -> u64 {
        self.reused.load(Ordering::Relaxed)
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Handles freed by `release` / `release_all`
    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    /// `preload` calls that found a handle already present
    pub fn preload_hits(&self) -> u64 {
        self.preload_hits.load(Ordering::Relaxed)
    }

    /// Fraction of `get` calls served without construction
    pub fn reuse_rate(&self) -> f64 {
        let reused = self.reused();
        let total = reused + self.created();
        if total == 0 { 0.0 } else { reused as f64 / total as f64 }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Bounded LRU pool of player sessions keyed by source URL.
pub struct PlayerPool {
    players: IndexMap<String, PlayerHandle>,
    capacity: usize,
    load_control: LoadControl,
    backend: Arc<dyn MediaBackend>,
    workers: Arc<Workers>,
    events: EventBus,
    /// Pre-load epoch, shared with `workers`
    epoch: Arc<AtomicU64>,
    stats: Arc<PoolStats>,
}

impl std::fmt::Debug for PlayerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerPool")
            .field("capacity", &self.capacity)
            .field("urls", &self.urls())
            .field("epoch", &self.epoch.load(Ordering::Relaxed))
            .finish()
    }
}

impl PlayerPool {
    /// Create an empty pool.
    ///
    /// # Arguments
    /// * `capacity` - Maximum live sessions (clamped to at least 1)
    /// * `load_control` - Buffering thresholds applied to every session
    /// * `backend` - Media source used to open streams
    /// * `worker_threads` - Loader threads (0 = auto)
    /// * `events` - Bus receiving `PlayerEvent` / `PoolEvent`
    pub fn new(
        capacity: usize,
        load_control: LoadControl,
        backend: Arc<dyn MediaBackend>,
        worker_threads: usize,
        events: EventBus,
    ) -> std::io::Result<Self> {
        let capacity = capacity.max(1);
        let threads = if worker_threads == 0 {
            Workers::default_threads()
        } else {
            worker_threads
        };
        let epoch = Arc::new(AtomicU64::new(0));
        let workers = Arc::new(Workers::new(threads, Arc::clone(&epoch))?);

        debug!("PlayerPool created: capacity={}, workers={}", capacity, threads);

        Ok(Self {
            players: IndexMap::with_capacity(capacity + 1),
            capacity,
            load_control,
            backend,
            workers,
            events,
            epoch,
            stats: Arc::new(PoolStats::new()),
        })
    }

    /// Get the session for `url`, constructing it if needed.
    ///
    /// An existing session becomes most recently used and is rewound to the
    /// start if it had advanced (no seek fires when already at zero). A session
    /// whose pre-load was cancelled starts loading now, even while the stale job
    /// is still queued. Playback is not started;
    /// call `play()` on the returned handle.
    pub fn get(&mut self, url: &str) -> &PlayerHandle {
        debug_assert!(!url.is_empty(), "player URL must not be empty");

        if let Some(index) = self.players.get_index_of(url) {
            // Touch: move to back (most recently used)
            let last = self.players.len() - 1;
            self.players.move_index(index, last);
            PoolStats::bump(&self.stats.reused);

            let handle = &self.players[last];
            handle.rewind_if_advanced();
            // Restarts a cancelled pre-load, including one still queued under
            // an older epoch
            handle.maybe_continue_loading();
            debug!("Pool reuse: {}", url);
            return handle;
        }

        let handle = self.construct(url, false);
        handle.schedule_load();
        self.insert(url, handle)
    }

    /// Warm up a paused session for `url`.
    ///
    /// No-op when a session already exists (no construction, no LRU touch).
    /// Loading runs under the current pre-load epoch and is dropped if
    /// `advance_epoch` is called before a worker picks it up.
    pub fn preload(&mut self, url: &str) {
        debug_assert!(!url.is_empty(), "player URL must not be empty");

        if self.players.contains_key(url) {
            PoolStats::bump(&self.stats.preload_hits);
            return;
        }

        let handle = self.construct(url, true);
        handle.schedule_load_with_epoch(self.epoch.load(Ordering::Relaxed));
        self.insert(url, handle);
        debug!("Pool preload: {}", url);
    }

    /// Free the session for `url` immediately. Absent URL is a no-op.
    pub fn release(&mut self, url: &str) {
        if let Some(handle) = self.players.shift_remove(url) {
            handle.release();
            PoolStats::bump(&self.stats.released);
            self.events.emit(PoolEvent::Released { url: Arc::from(url) });
            debug!("Pool released: {}", url);
        }
    }

    /// Free every session and empty the pool. The pool stays usable.
    pub fn release_all(&mut self) {
        let count = self.players.len();
        for (_, handle) in self.players.drain(..) {
            handle.release();
            PoolStats::bump(&self.stats.released);
        }
        if count > 0 {
            self.events.emit(PoolEvent::Cleared { count });
            info!("Pool cleared: {} players released", count);
        }
    }

    /// Cancel pre-loads that have not started yet. Returns the new epoch.
    pub fn advance_epoch(&self) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Pool epoch: {}", epoch);
        epoch
    }

    /// Look up a session without touching LRU order or rewinding it
    pub fn peek(&self, url: &str) -> Option<&PlayerHandle> {
        self.players.get(url)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.players.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// URLs from least to most recently used
    pub fn urls(&self) -> Vec<&str> {
        self.players.keys().map(String::as_str).collect()
    }

    pub fn stats(&self) -> Arc<PoolStats> {
        Arc::clone(&self.stats)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn load_control(&self) -> &LoadControl {
        &self.load_control
    }

    fn construct(&self, url: &str, preload: bool) -> PlayerHandle {
        PoolStats::bump(&self.stats.created);
        self.events.emit(PoolEvent::Created { url: Arc::from(url), preload });
        PlayerHandle::new(
            url,
            self.load_control.clone(),
            Arc::clone(&self.backend),
            Arc::clone(&self.workers),
            self.events.emitter(),
        )
    }

    /// Insert as most recently used, then evict down to capacity
    fn insert(&mut self, url: &str, handle: PlayerHandle) -> &PlayerHandle {
        self.players.insert(url.to_string(), handle);
        while self.players.len() > self.capacity {
            if !self.evict_oldest() {
                break;
            }
        }
        &self.players[self.players.len() - 1]
    }

    /// Release and drop the least recently used session
    fn evict_oldest(&mut self) -> bool {
        let Some((url, handle)) = self.players.shift_remove_index(0) else {
            return false;
        };
        handle.release();
        PoolStats::bump(&self.stats.evicted);
        debug!("LRU evicted: {}", url);
        self.events.emit(PoolEvent::Evicted { url: Arc::from(url.as_str()) });
        true
    }
}

impl Drop for PlayerPool {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::media::SyntheticBackend;
    use crate::core::player::PlaybackState;
    use std::time::{Duration, Instant};

    fn pool_with(backend: Arc<SyntheticBackend>) -> PlayerPool {
        PlayerPool::new(MAX_CAPACITY, LoadControl::default(), backend, 2, EventBus::new()).unwrap()
    }

    fn pool() -> PlayerPool {
        pool_with(Arc::new(SyntheticBackend::default()))
    }

    fn wait_for(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_capacity_invariant() {
        let mut pool = pool();
        for i in 0..20 {
            if i % 3 == 0 {
                pool.preload(&format!("u{}", i));
            } else {
                pool.get(&format!("u{}", i));
            }
            assert!(pool.len() <= MAX_CAPACITY);
        }
        assert_eq!(pool.len(), MAX_CAPACITY);
        assert_eq!(pool.stats().evicted(), 15);
    }

    #[test]
    fn test_lru_eviction_order() {
        let mut pool = pool();
        for url in ["A", "B", "C", "D", "E", "A", "F"] {
            pool.get(url);
        }

        assert!(!pool.contains("B"));
        assert_eq!(pool.urls(), vec!["C", "D", "E", "A", "F"]);
    }

    #[test]
    fn test_get_reuses_session() {
        let mut pool = pool();
        let first = pool.get("clip").id();
        let second = pool.get("clip");

        assert_eq!(second.id(), first);
        assert_eq!(second.url(), "clip");
        assert_eq!(pool.stats().created(), 1);
        assert_eq!(pool.stats().reused(), 1);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_preload_no_duplicate() {
        let backend = Arc::new(SyntheticBackend::default());
        let mut pool = pool_with(Arc::clone(&backend));

        pool.preload("p");
        let id = pool.peek("p").map(|h| h.id());
        pool.preload("p");
        pool.get("x");
        pool.preload("x");

        assert_eq!(pool.stats().created(), 2);
        assert_eq!(pool.stats().preload_hits(), 2);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.peek("p").map(|h| h.id()), id);
    }

    #[test]
    fn test_preload_existing_does_not_touch() {
        let mut pool = pool();
        pool.get("a");
        pool.get("b");
        pool.preload("a");
        assert_eq!(pool.urls(), vec!["a", "b"]);
    }

    #[test]
    fn test_preload_stays_paused() {
        let mut pool = pool();
        pool.preload("warm");

        let handle = pool.peek("warm").unwrap();
        assert!(wait_for(|| handle.state() == PlaybackState::Ready));
        assert!(!handle.play_when_ready());
        assert!(!handle.is_playing());
    }

    #[test]
    fn test_release_idempotent() {
        let mut pool = pool();
        pool.get("a");
        pool.get("b");

        pool.release("missing");
        assert_eq!(pool.urls(), vec!["a", "b"]);

        pool.release("a");
        pool.release("a");
        assert_eq!(pool.urls(), vec!["b"]);
        assert_eq!(pool.stats().released(), 1);
    }

    #[test]
    fn test_release_all_then_fresh_sessions() {
        let mut pool = pool();
        let old = pool.get("a").id();
        pool.preload("b");

        pool.release_all();
        assert_eq!(pool.len(), 0);
        assert!(pool.is_empty());

        let fresh = pool.get("a");
        assert_ne!(fresh.id(), old);
        assert_eq!(fresh.position(), Duration::ZERO);
        assert_eq!(pool.stats().created(), 3);
    }

    #[test]
    fn test_reset_on_reuse() {
        let mut pool = pool();
        let handle = pool.get("clip");
        handle.play();
        assert!(wait_for(|| handle.state() == PlaybackState::Ready));
        handle.advance(Duration::from_millis(200));
        assert!(handle.position() > Duration::ZERO);

        let handle = pool.get("clip");
        assert_eq!(handle.position(), Duration::ZERO);
        assert_eq!(handle.seek_count(), 1);
    }

    #[test]
    fn test_no_redundant_seek_at_zero() {
        let mut pool = pool();
        pool.get("clip");
        let handle = pool.get("clip");
        assert_eq!(handle.position(), Duration::ZERO);
        assert_eq!(handle.seek_count(), 0);
    }

    #[test]
    fn test_eviction_releases_handle() {
        let mut pool = pool();
        let rx = pool.events().channel::<PoolEvent>();
        for i in 0..=MAX_CAPACITY {
            pool.get(&format!("v{}", i));
        }

        let evicted: Vec<PoolEvent> = rx
            .try_iter()
            .filter(|e| matches!(e, PoolEvent::Evicted { .. }))
            .collect();
        assert_eq!(evicted, vec![PoolEvent::Evicted { url: Arc::from("v0") }]);
    }

    #[test]
    fn test_stale_preload_started_by_get() {
        // One slow worker: the first job blocks it while the preload is queued
        let backend = Arc::new(
            SyntheticBackend::new(Duration::from_secs(60)).with_delay(Duration::from_millis(20)),
        );
        let mut pool = PlayerPool::new(
            MAX_CAPACITY,
            LoadControl::default(),
            backend,
            1,
            EventBus::new(),
        )
        .unwrap();

        pool.get("busy");
        pool.preload("next");
        pool.advance_epoch();
        pool.release("busy");

        // Cancelled preload leaves the session idle
        assert!(wait_for(|| !pool.peek("next").unwrap().is_loading()));
        assert_eq!(pool.peek("next").unwrap().state(), PlaybackState::Idle);

        let handle = pool.get("next");
        assert!(wait_for(|| handle.state() == PlaybackState::Ready));
    }

    #[test]
    fn test_get_takes_over_queued_stale_preload() {
        let backend = Arc::new(
            SyntheticBackend::new(Duration::from_secs(60)).with_delay(Duration::from_millis(20)),
        );
        let mut pool = PlayerPool::new(
            MAX_CAPACITY,
            LoadControl::default(),
            backend,
            1,
            EventBus::new(),
        )
        .unwrap();

        // "busy" occupies the only worker while the preload sits in the queue
        pool.get("busy");
        pool.preload("next");
        assert!(!pool.peek("next").unwrap().has_started());
        pool.advance_epoch();

        let handle = pool.get("next");
        handle.play();
        assert!(handle.has_started());
        assert!(wait_for(|| handle.state() == PlaybackState::Ready));
        assert!(handle.bytes_loaded() > 0);
    }

    #[test]
    fn test_capacity_clamped() {
        let pool = PlayerPool::new(
            0,
            LoadControl::default(),
            Arc::new(SyntheticBackend::default()),
            1,
            EventBus::new(),
        )
        .unwrap();
        assert_eq!(pool.capacity(), 1);
    }

    #[test]
    fn test_drop_releases_everything() {
        let bus = EventBus::new();
        let rx = bus.channel::<PoolEvent>();
        {
            let mut pool = PlayerPool::new(
                MAX_CAPACITY,
                LoadControl::default(),
                Arc::new(SyntheticBackend::default()),
                1,
                bus.clone(),
            )
            .unwrap();
            pool.get("a");
            pool.preload("b");
        }
        assert!(rx.try_iter().any(|e| e == PoolEvent::Cleared { count: 2 }));
    }
}
