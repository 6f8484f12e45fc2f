//! Core engine modules - pool, player sessions, media sources, workers, events
//!
//! These modules form the playback engine, independent of any UI.

pub mod debounced_preloader;
pub mod disk_cache;
pub mod event_bus;
pub mod http_source;
pub mod load_control;
pub mod media;
pub mod player;
pub mod player_events;
pub mod pool;
pub mod workers;

// Re-exports for convenience
pub use debounced_preloader::DebouncedPreloader;
pub use disk_cache::DiskCache;
pub use event_bus::EventBus;
pub use http_source::{HttpBackend, HttpSettings};
pub use load_control::LoadControl;
pub use media::{MediaBackend, MediaChunk, MediaError, MediaStream, SyntheticBackend};
pub use player::{PlaybackState, PlayerHandle};
pub use player_events::{PlayerEvent, PlayerEventKind, PoolEvent};
pub use pool::{PlayerPool, PoolStats, MAX_CAPACITY};
pub use workers::Workers;
