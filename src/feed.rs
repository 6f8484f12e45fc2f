//! Vertical shorts feed driving the player pool
//!
//! **Page change**: pause the previous item, cancel stale pre-loads, get and
//! play the current item, then pre-load its neighbours (default +1, +2, -1)
//! once the debounce delay has passed.
//!
//! **Teardown**: `dismiss()` (or dropping the pager) releases every player
//! exactly once.

use anyhow::{Context, Result, bail};
use log::{debug, info};
use std::ops::Range;
use std::path::Path;
use std::time::Duration;

use crate::core::{DebouncedPreloader, PlayerHandle, PlayerPool};

/// Load feed URLs from a file: either a JSON array of strings, or one URL per
/// line with blank lines and `#` comments skipped.
pub fn load_feed<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read feed: {}", path.display()))?;
    parse_feed(&text).with_context(|| format!("Invalid feed: {}", path.display()))
}

pub fn parse_feed(text: &str) -> Result<Vec<String>> {
    let items: Vec<String> = if text.trim_start().starts_with('[') {
        serde_json::from_str(text).context("Feed JSON must be an array of URL strings")?
    } else {
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect()
    };

    if items.iter().any(|u| u.is_empty()) {
        bail!("Feed contains an empty URL");
    }
    Ok(items)
}

/// Pages visited when starting at `start` and scrolling through `pages` items
/// (all remaining when None). `start` is clamped to the last item.
pub fn page_range(len: usize, start: usize, pages: Option<usize>) -> Range<usize> {
    let start = start.min(len.saturating_sub(1));
    let end = match pages {
        Some(n) => start.saturating_add(n).min(len),
        None => len,
    };
    start..end.max(start)
}

pub struct FeedPager {
    items: Vec<String>,
    pool: PlayerPool,
    preloader: DebouncedPreloader,
    offsets: Vec<i64>,
    current: Option<usize>,
}

impl std::fmt::Debug for FeedPager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedPager")
            .field("items", &self.items.len())
            .field("current", &self.current)
            .field("pool", &self.pool)
            .finish()
    }
}

impl FeedPager {
    pub fn new(items: Vec<String>, pool: PlayerPool, offsets: Vec<i64>, preload_delay_ms: u64) -> Self {
        info!("Feed: {} items, preload offsets {:?}", items.len(), offsets);
        Self {
            items,
            pool,
            preloader: DebouncedPreloader::new(preload_delay_ms),
            offsets,
            current: None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn current_page(&self) -> Option<usize> {
        self.current
    }

    pub fn pool(&self) -> &PlayerPool {
        &self.pool
    }

    /// Player of the current page, without touching LRU order
    pub fn current_player(&self) -> Option<&PlayerHandle> {
        let url = self.items.get(self.current?)?;
        self.pool.peek(url)
    }

    /// Pages to pre-load around `page`, in offset order, skipping out-of-range
    pub fn neighbours(&self, page: usize) -> Vec<usize> {
        self.offsets
            .iter()
            .filter_map(|&off| page.checked_add_signed(off as isize))
            .filter(|&p| p != page && p < self.items.len())
            .collect()
    }

    /// Switch to `page`. Returns None when out of range.
    pub fn set_page(&mut self, page: usize) -> Option<&PlayerHandle> {
        if page >= self.items.len() {
            debug!("Feed: page {} out of range ({} items)", page, self.items.len());
            return None;
        }

        if let Some(prev) = self.current_player() {
            prev.pause();
        }
        self.current = Some(page);
        self.pool.advance_epoch();

        let handle = self.pool.get(&self.items[page]);
        handle.play();
        debug!("Feed: page {} -> {}", page, handle.url());

        self.preloader.schedule(page);
        self.preload_due();
        self.current_player()
    }

    /// Frame tick: advance the current player's clock and fire due pre-loads.
    pub fn tick(&mut self, elapsed: Duration) {
        self.preload_due();
        if let Some(handle) = self.current_player() {
            handle.advance(elapsed);
        }
    }

    fn preload_due(&mut self) {
        let Some(page) = self.preloader.tick() else {
            return;
        };
        // Never pre-load so much that the current page gets evicted
        let budget = self.pool.capacity().saturating_sub(1);
        for neighbour in self.neighbours(page).into_iter().take(budget) {
            self.pool.preload(&self.items[neighbour]);
        }
    }

    /// Feed screen closed: release every player.
    pub fn dismiss(mut self) {
        self.preloader.cancel();
        self.pool.release_all();
        info!("Feed dismissed");
    }
}
