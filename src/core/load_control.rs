//! Buffering thresholds for player sessions
//!
//! Tuned for a vertical shorts feed: playback may start after half a second of
//! media, while loading keeps going up to thirty seconds ahead to ride out
//! network jitter.
//!
//! Loading uses hysteresis between `min_buffer` and `max_buffer`:
//! - below `min_buffer` -> always load
//! - at or above `max_buffer` -> stop
//! - in between -> keep whatever was decided last time

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadControl {
    /// Buffer below which loading always continues
    pub min_buffer_ms: u64,
    /// Buffer at which loading stops
    pub max_buffer_ms: u64,
    /// Buffer required before first playback is considered ready
    pub buffer_for_playback_ms: u64,
    /// Buffer required to resume after a stall
    pub buffer_for_playback_after_rebuffer_ms: u64,
    /// Optional byte budget for the forward buffer
    pub target_buffer_bytes: Option<usize>,
    /// Ignore `target_buffer_bytes` while time thresholds are unmet
    pub prioritize_time_over_size_thresholds: bool,
}

impl Default for LoadControl {
    fn default() -> Self {
        Self {
            min_buffer_ms: 1_500,
            max_buffer_ms: 30_000,
            buffer_for_playback_ms: 500,
            buffer_for_playback_after_rebuffer_ms: 750,
            target_buffer_bytes: None,
            prioritize_time_over_size_thresholds: true,
        }
    }
}

impl LoadControl {
    pub fn min_buffer(&self) -> Duration {
        Duration::from_millis(self.min_buffer_ms)
    }

    pub fn max_buffer(&self) -> Duration {
        Duration::from_millis(self.max_buffer_ms.max(self.min_buffer_ms))
    }

    pub fn buffer_for_playback(&self) -> Duration {
        Duration::from_millis(self.buffer_for_playback_ms)
    }

    pub fn buffer_for_playback_after_rebuffer(&self) -> Duration {
        Duration::from_millis(self.buffer_for_playback_after_rebuffer_ms)
    }

    /// Decide whether the loader should fetch another chunk.
    ///
    /// `was_loading` is the previous decision, used inside the hysteresis band.
    pub fn should_continue_loading(
        &self,
        buffered: Duration,
        buffered_bytes: usize,
        was_loading: bool,
    ) -> bool {
        if buffered >= self.max_buffer() {
            return false;
        }

        let target_reached = self
            .target_buffer_bytes
            .is_some_and(|target| buffered_bytes >= target);

        if buffered < self.min_buffer() {
            // Time threshold unmet: size limit only applies when not prioritized
            return self.prioritize_time_over_size_thresholds || !target_reached;
        }

        was_loading && !target_reached
    }

    /// Whether enough media is buffered to (re)start playback
    pub fn should_start_playback(&self, buffered: Duration, rebuffering: bool, exhausted: bool) -> bool {
        if exhausted {
            return true;
        }
        let needed = if rebuffering {
            self.buffer_for_playback_after_rebuffer()
        } else {
            self.buffer_for_playback()
        };
        buffered >= needed
    }
}
