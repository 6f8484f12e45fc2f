//! Debounced neighbour pre-loading for the feed pager.
//!
//! During a fling the feed changes page many times per second. Warming players
//! for every intermediate page would churn the pool, so:
//! 1. The current page's player is requested immediately
//! 2. Neighbour pre-loads fire once the page has been stable for `delay`
//!
//! A zero delay makes `tick()` fire on the very next call.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct DebouncedPreloader {
    delay: Duration,
    /// Pending page and when it becomes due
    pending: Option<(usize, Instant)>,
}

impl Default for DebouncedPreloader {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DebouncedPreloader {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            pending: None,
        }
    }

    pub fn set_delay(&mut self, delay_ms: u64) {
        self.delay = Duration::from_millis(delay_ms);
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay.as_millis() as u64
    }

    /// Schedule neighbour pre-load for `page`; resets the timer if pending.
    pub fn schedule(&mut self, page: usize) {
        self.pending = Some((page, Instant::now() + self.delay));
        log::trace!("Preload scheduled for page {} in {}ms", page, self.delay.as_millis());
    }

    pub fn cancel(&mut self) {
        if self.pending.take().is_some() {
            log::trace!("Pending preload cancelled");
        }
    }

    /// Returns the page to pre-load around once its delay has elapsed.
    pub fn tick(&mut self) -> Option<usize> {
        let (page, due) = self.pending?;
        if Instant::now() >= due {
            self.pending = None;
            Some(page)
        } else {
            None
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_page(&self) -> Option<usize> {
        self.pending.map(|(page, _)| page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_delay_fires_immediately() {
        let mut preloader = DebouncedPreloader::default();
        preloader.schedule(3);
        assert_eq!(preloader.tick(), Some(3));
        assert!(preloader.tick().is_none());
    }

    #[test]
    fn test_waits_for_delay() {
        let mut preloader = DebouncedPreloader::new(100);
        preloader.schedule(1);
        assert!(preloader.tick().is_none());
        assert!(preloader.is_pending());
    }

    #[test]
    fn test_trigger_after_delay() {
        let mut preloader = DebouncedPreloader::new(10);
        preloader.schedule(4);
        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(preloader.tick(), Some(4));
        assert!(!preloader.is_pending());
    }

    #[test]
    fn test_reschedule_keeps_latest_page() {
        let mut preloader = DebouncedPreloader::new(50);
        preloader.schedule(1);
        std::thread::sleep(Duration::from_millis(30));
        preloader.schedule(2);

        assert!(preloader.tick().is_none());
        assert_eq!(preloader.pending_page(), Some(2));

        preloader.cancel();
        assert!(!preloader.is_pending());
    }
}
