//! REELPOOL - bounded video player pool for vertical shorts feeds
//!
//! Re-exports all modules for use by the binary target.

// Core engine (pool, players, media sources, workers, events)
pub mod core;

// App modules
pub mod cli;
pub mod feed;
pub mod paths;
pub mod settings;

// Re-export commonly used types from core
pub use core::event_bus::{downcast_event, BoxedEvent, EventBus, EventEmitter};
pub use core::{
    DiskCache, HttpBackend, LoadControl, MediaBackend, PlaybackState, PlayerEvent, PlayerHandle,
    PlayerPool, PoolEvent, SyntheticBackend, MAX_CAPACITY,
};

pub use feed::FeedPager;
pub use settings::PoolSettings;
