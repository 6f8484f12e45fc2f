//! Player session and pool events.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::player::PlaybackState;

// === Session ===

#[derive(Clone, Debug, PartialEq)]
pub enum PlayerEventKind {
    StateChanged { from: PlaybackState, to: PlaybackState },
    Seeked { position: Duration },
    LoadingChanged(bool),
    Released,
}

/// Emitted by a `PlayerHandle`; `session` tells apart successive handles for the same URL.
#[derive(Clone, Debug)]
pub struct PlayerEvent {
    pub session: Uuid,
    pub url: Arc<str>,
    pub kind: PlayerEventKind,
}

// === Pool ===

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PoolEvent {
    Created { url: Arc<str>, preload: bool },
    Evicted { url: Arc<str> },
    Released { url: Arc<str> },
    Cleared { count: usize },
}
