//! Player session bound to a single media URL
//!
//! A `PlayerHandle` is the pool's unit of ownership. It keeps playback state
//! (position, play flag, volume, buffering state) and a forward buffer filled by
//! a loader running on the shared `Workers`.
//!
//! # Buffering model
//!
//! The loader pulls `MediaChunk`s from a `MediaStream` and appends them to a
//! queue of buffered chunks. `advance()` is the caller's playback clock: it
//! consumes buffered media while the session is `Ready` and playing. Loading
//! follows `LoadControl` hysteresis and is re-scheduled from `advance()` when the
//! buffer drains below the minimum.
//!
//! # States
//!
//! `Idle` -> `Buffering` -> `Ready` <-> `Buffering` (rebuffer) -> `Ended`.
//! Any failure moves to `Error`; `release()` moves to `Released` from anywhere.
//!
//! All control methods take `&self` and never block on I/O: the stream mutex is
//! only held by the loader, and control paths use `try_lock` on it.

use log::{debug, trace, warn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use super::event_bus::EventEmitter;
use super::load_control::LoadControl;
use super::media::{MediaBackend, MediaStream};
use super::player_events::{PlayerEvent, PlayerEventKind};
use super::workers::{JobQueue, Workers};

/// Session playback state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    /// Constructed, loading not started
    Idle,
    /// Waiting for enough buffered media
    Buffering,
    /// Can play (or is playing)
    Ready,
    /// Played to the end of the stream
    Ended,
    /// Stream failed to open or read
    Error(String),
    /// Freed by the pool; the handle must not be used further
    Released,
}

impl PlaybackState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlaybackState::Error(_) | PlaybackState::Released)
    }
}

#[derive(Debug)]
struct BufferedChunk {
    duration: Duration,
    bytes: usize,
}

#[derive(Debug)]
struct SessionState {
    playback: PlaybackState,
    position: Duration,
    play_when_ready: bool,
    volume: f32,
    /// Forward buffer, front = next to play
    buffer: VecDeque<BufferedChunk>,
    buffered: Duration,
    buffered_bytes: usize,
    /// Media time the stream will deliver next
    load_position: Duration,
    /// Stream delivered its last chunk
    exhausted: bool,
    /// Last load-continuation decision (hysteresis input)
    loading_wanted: bool,
    /// Playback stalled after having been ready
    rebuffering: bool,
    /// Bump on seek so an in-flight chunk from the old stream is discarded
    stream_generation: u64,
    bytes_loaded: u64,
}

impl SessionState {
    fn new() -> Self {
        Self {
            playback: PlaybackState::Idle,
            position: Duration::ZERO,
            play_when_ready: false,
            volume: 1.0,
            buffer: VecDeque::new(),
            buffered: Duration::ZERO,
            buffered_bytes: 0,
            load_position: Duration::ZERO,
            exhausted: false,
            loading_wanted: true,
            rebuffering: false,
            stream_generation: 0,
            bytes_loaded: 0,
        }
    }
}

/// Loader bookkeeping: at most one loader job per session is queued or running
#[derive(Debug, Default)]
struct LoaderClaim {
    /// Bumped on every claim; a job holding an older ticket was superseded
    ticket: u64,
    /// A loader job is queued or running
    active: bool,
    /// Epoch of a queued pre-load job that no worker has started yet
    queued_epoch: Option<u64>,
}

/// State shared between the handle and its loader jobs
struct Session {
    id: Uuid,
    url: Arc<str>,
    load_control: LoadControl,
    backend: Arc<dyn MediaBackend>,
    events: EventEmitter,
    state: Mutex<SessionState>,
    /// Open stream and the generation it was opened for
    stream: Mutex<Option<(u64, Box<dyn MediaStream>)>>,
    claim: Mutex<LoaderClaim>,
    released: AtomicBool,
    seeks: AtomicU64,
}

impl Session {
    fn lock_claim(&self) -> std::sync::MutexGuard<'_, LoaderClaim> {
        self.claim.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, kind: PlayerEventKind) {
        self.events.emit(PlayerEvent {
            session: self.id,
            url: Arc::clone(&self.url),
            kind,
        });
    }

    /// Change state under the lock; returns the event to emit after unlocking
    fn transition(state: &mut SessionState, to: PlaybackState) -> Option<PlayerEventKind> {
        if state.playback == to || state.playback == PlaybackState::Released {
            return None;
        }
        let from = std::mem::replace(&mut state.playback, to.clone());
        Some(PlayerEventKind::StateChanged { from, to })
    }

    fn wants_more(&self, state: &SessionState) -> bool {
        !state.exhausted
            && !state.playback.is_terminal()
            && self.load_control.should_continue_loading(
                state.buffered,
                state.buffered_bytes,
                state.loading_wanted,
            )
    }

    /// Re-evaluate readiness after the buffer changed
    fn update_readiness(&self, state: &mut SessionState) -> Option<PlayerEventKind> {
        match state.playback {
            PlaybackState::Idle | PlaybackState::Buffering => {
                if self.load_control.should_start_playback(
                    state.buffered,
                    state.rebuffering,
                    state.exhausted,
                ) {
                    state.rebuffering = false;
                    if state.exhausted && state.buffer.is_empty() {
                        Self::transition(state, PlaybackState::Ended)
                    } else {
                        Self::transition(state, PlaybackState::Ready)
                    }
                } else {
                    Self::transition(state, PlaybackState::Buffering)
                }
            }
            _ => None,
        }
    }
}

/// Chunks read per loader job before the worker is handed to the next job
const CHUNKS_PER_SLICE: usize = 4;

/// Owns a session's loader claim. Dropping it (loader finished, or job dropped
/// unexecuted by a stale epoch or worker shutdown) clears the claim unless a
/// newer claim superseded it.
struct LoadingGuard {
    session: Arc<Session>,
    ticket: u64,
    slices: u32,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        {
            let mut claim = self.session.lock_claim();
            if claim.ticket == self.ticket {
                claim.active = false;
                claim.queued_epoch = None;
            }
        }
        if self.session.released.load(Ordering::SeqCst) {
            // Loader is gone, nobody else will drop the stream
            if let Ok(mut stream) = self.session.stream.try_lock() {
                stream.take();
            }
        }
    }
}

enum LoadStep {
    Continue,
    Done,
}

/// One loader slice: read up to `CHUNKS_PER_SLICE` chunks, then re-enqueue
/// behind other sessions' jobs if load control still wants more.
fn run_loader(mut guard: LoadingGuard, queue: JobQueue) {
    let session = Arc::clone(&guard.session);
    {
        let mut claim = session.lock_claim();
        if claim.ticket != guard.ticket {
            trace!("Loader superseded before start: {}", session.url);
            return;
        }
        claim.queued_epoch = None;
    }

    if guard.slices == 0 {
        trace!("Loader start: {}", session.url);
        session.emit(PlayerEventKind::LoadingChanged(true));
    }
    guard.slices += 1;

    for _ in 0..CHUNKS_PER_SLICE {
        if let LoadStep::Done = load_chunk(&session) {
            finish_loader(&session);
            return;
        }
    }

    let next = queue.clone();
    if !queue.execute(move || run_loader(guard, next)) {
        finish_loader(&session);
    }
}

fn finish_loader(session: &Session) {
    session.emit(PlayerEventKind::LoadingChanged(false));
    trace!("Loader stop: {}", session.url);
}

/// Fetch one chunk into the forward buffer
fn load_chunk(session: &Session) -> LoadStep {
    if session.released.load(Ordering::SeqCst) {
        return LoadStep::Done;
    }

    let (generation, start) = {
        let mut state = session.state.lock().unwrap_or_else(|e| e.into_inner());
        let wanted = session.wants_more(&state);
        state.loading_wanted = wanted;
        if !wanted {
            return LoadStep::Done;
        }
        let event = if state.playback == PlaybackState::Idle {
            Session::transition(&mut state, PlaybackState::Buffering)
        } else {
            None
        };
        let out = (state.stream_generation, state.load_position);
        drop(state);
        if let Some(kind) = event {
            session.emit(kind);
        }
        out
    };

    let result = {
        let mut slot = session.stream.lock().unwrap_or_else(|e| e.into_inner());
        let stale = slot.as_ref().is_none_or(|(g, _)| *g != generation);
        if stale {
            match session.backend.open(&session.url, start) {
                Ok(stream) => *slot = Some((generation, stream)),
                Err(e) => {
                    fail(session, e.to_string());
                    return LoadStep::Done;
                }
            }
        }
        match slot.as_mut() {
            Some((_, stream)) => stream.read_chunk(),
            None => return LoadStep::Done,
        }
    };

    let mut state = session.state.lock().unwrap_or_else(|e| e.into_inner());
    if state.stream_generation != generation || state.playback == PlaybackState::Released {
        // Seek or release happened while reading
        return LoadStep::Continue;
    }
    let event = match result {
        Ok(Some(chunk)) => {
            state.load_position += chunk.duration;
            state.buffered += chunk.duration;
            state.buffered_bytes += chunk.len();
            state.bytes_loaded += chunk.len() as u64;
            state.buffer.push_back(BufferedChunk {
                duration: chunk.duration,
                bytes: chunk.len(),
            });
            session.update_readiness(&mut state)
        }
        Ok(None) => {
            trace!("Stream exhausted: {} at {:?}", session.url, state.load_position);
            state.exhausted = true;
            session.update_readiness(&mut state)
        }
        Err(e) => {
            drop(state);
            fail(session, e.to_string());
            return LoadStep::Done;
        }
    };
    drop(state);
    if let Some(kind) = event {
        session.emit(kind);
    }
    LoadStep::Continue
}

fn fail(session: &Session, message: String) {
    warn!("Player {} failed: {}", session.url, message);
    let event = {
        let mut state = session.state.lock().unwrap_or_else(|e| e.into_inner());
        Session::transition(&mut state, PlaybackState::Error(message))
    };
    if let Some(kind) = event {
        session.emit(kind);
    }
}

/// Live playback session owned by a `PlayerPool`.
pub struct PlayerHandle {
    session: Arc<Session>,
    workers: Arc<Workers>,
}

impl std::fmt::Debug for PlayerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerHandle")
            .field("id", &self.session.id)
            .field("url", &self.session.url)
            .field("state", &self.state())
            .field("position", &self.position())
            .finish()
    }
}

impl PlayerHandle {
    /// Construct a paused session. No loading is scheduled yet.
    pub(crate) fn new(
        url: &str,
        load_control: LoadControl,
        backend: Arc<dyn MediaBackend>,
        workers: Arc<Workers>,
        events: EventEmitter,
    ) -> Self {
        let session = Arc::new(Session {
            id: Uuid::new_v4(),
            url: Arc::from(url),
            load_control,
            backend,
            events,
            state: Mutex::new(SessionState::new()),
            stream: Mutex::new(None),
            claim: Mutex::new(LoaderClaim::default()),
            released: AtomicBool::new(false),
            seeks: AtomicU64::new(0),
        });
        debug!("Player created: {} ({})", url, session.id);
        Self { session, workers }
    }

    fn state_guard(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.session.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a loader now, unless one is already queued or running.
    ///
    /// A pre-load still queued under an older epoch will be dropped
    /// unexecuted, so its claim is taken over instead of waited on.
    pub(crate) fn schedule_load(&self) {
        if let Some(guard) = self.claim_loader(None) {
            let queue = self.workers.queue();
            self.workers.execute(move || run_loader(guard, queue));
        }
    }

    /// Start a loader only if `epoch` is still current when a worker picks it up.
    pub(crate) fn schedule_load_with_epoch(&self, epoch: u64) {
        if let Some(guard) = self.claim_loader(Some(epoch)) {
            let queue = self.workers.queue();
            self.workers.execute_with_epoch(epoch, move || run_loader(guard, queue));
        }
    }

    fn claim_loader(&self, epoch: Option<u64>) -> Option<LoadingGuard> {
        if self.session.released.load(Ordering::SeqCst) {
            return None;
        }
        let mut claim = self.session.lock_claim();
        if claim.active {
            let current = self.workers.current_epoch();
            let stale = epoch.is_none() && claim.queued_epoch.is_some_and(|e| e < current);
            if !stale {
                return None;
            }
            trace!("Superseding stale pre-load: {}", self.session.url);
        }
        claim.ticket += 1;
        claim.active = true;
        claim.queued_epoch = epoch;
        Some(LoadingGuard {
            session: Arc::clone(&self.session),
            ticket: claim.ticket,
            slices: 0,
        })
    }

    /// Kick the loader if load control wants more data
    pub(crate) fn maybe_continue_loading(&self) {
        let wanted = {
            let state = self.state_guard();
            self.session.wants_more(&state)
        };
        if wanted {
            self.schedule_load();
        }
    }

    /// Free the session. Idempotent; never blocks on I/O.
    pub(crate) fn release(&self) {
        if self.session.released.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut state = self.state_guard();
            state.playback = PlaybackState::Released;
            state.play_when_ready = false;
            state.buffer.clear();
            state.buffered = Duration::ZERO;
            state.buffered_bytes = 0;
        }
        // A running loader holds the stream; it drops it on exit
        if let Ok(mut stream) = self.session.stream.try_lock() {
            stream.take();
        }
        debug!("Player released: {} ({})", self.session.url, self.session.id);
        self.session.emit(PlayerEventKind::Released);
    }

    // ========== Identity & observation ==========

    /// Session id, unique per construction
    pub fn id(&self) -> Uuid {
        self.session.id
    }

    pub fn url(&self) -> &str {
        &self.session.url
    }

    pub fn state(&self) -> PlaybackState {
        self.state_guard().playback.clone()
    }

    pub fn position(&self) -> Duration {
        self.state_guard().position
    }

    /// Media buffered ahead of the playback position
    pub fn buffered_ahead(&self) -> Duration {
        self.state_guard().buffered
    }

    pub fn bytes_loaded(&self) -> u64 {
        self.state_guard().bytes_loaded
    }

    /// A loader job is queued or running
    pub fn is_loading(&self) -> bool {
        self.session.lock_claim().active
    }

    /// Whether loading has begun, or is queued unconditionally.
    ///
    /// A pre-load waiting on its epoch does not count: it may still be cancelled.
    pub fn has_started(&self) -> bool {
        if self.state_guard().playback != PlaybackState::Idle {
            return true;
        }
        let claim = self.session.lock_claim();
        claim.active && claim.queued_epoch.is_none()
    }

    /// Number of seeks issued on this session
    pub fn seek_count(&self) -> u64 {
        self.session.seeks.load(Ordering::SeqCst)
    }

    // ========== Control ==========

    pub fn play(&self) {
        let mut state = self.state_guard();
        if !state.playback.is_terminal() {
            state.play_when_ready = true;
        }
    }

    pub fn pause(&self) {
        self.state_guard().play_when_ready = false;
    }

    pub fn is_playing(&self) -> bool {
        let state = self.state_guard();
        state.play_when_ready && state.playback == PlaybackState::Ready
    }

    pub fn play_when_ready(&self) -> bool {
        self.state_guard().play_when_ready
    }

    pub fn set_volume(&self, volume: f32) {
        self.state_guard().volume = volume.clamp(0.0, 1.0);
    }

    pub fn volume(&self) -> f32 {
        self.state_guard().volume
    }

    /// Reposition playback. The forward buffer is discarded and the stream
    /// reopened at `position`; the disk cache serves bytes already fetched.
    pub fn seek_to(&self, position: Duration) {
        let event = {
            let mut state = self.state_guard();
            if state.playback.is_terminal() {
                return;
            }
            state.position = position;
            state.load_position = position;
            state.buffer.clear();
            state.buffered = Duration::ZERO;
            state.buffered_bytes = 0;
            state.exhausted = false;
            state.rebuffering = false;
            state.loading_wanted = true;
            state.stream_generation += 1;
            if state.playback == PlaybackState::Idle {
                None
            } else {
                Session::transition(&mut state, PlaybackState::Buffering)
            }
        };

        self.session.seeks.fetch_add(1, Ordering::SeqCst);
        trace!("Seek {} -> {:?}", self.session.url, position);
        if let Some(kind) = event {
            self.session.emit(kind);
        }
        self.session.emit(PlayerEventKind::Seeked { position });

        if self.has_started() {
            self.schedule_load();
        }
    }

    /// Seek to zero unless already there
    pub(crate) fn rewind_if_advanced(&self) {
        if self.position() > Duration::ZERO {
            self.seek_to(Duration::ZERO);
        }
    }

    /// Playback clock tick: consume buffered media if playing.
    pub fn advance(&self, elapsed: Duration) {
        let event = {
            let mut state = self.state_guard();
            if state.playback != PlaybackState::Ready || !state.play_when_ready {
                None
            } else {
                let mut remaining = elapsed;
                while !remaining.is_zero() {
                    let Some(front) = state.buffer.front_mut() else {
                        break;
                    };
                    let step = remaining.min(front.duration);
                    // Bytes leave the buffer proportionally to media time
                    let bytes = if step == front.duration {
                        front.bytes
                    } else {
                        (front.bytes as u128 * step.as_nanos() / front.duration.as_nanos().max(1)) as usize
                    };
                    front.duration -= step;
                    front.bytes -= bytes;
                    if front.duration.is_zero() {
                        state.buffer.pop_front();
                    }
                    state.position += step;
                    state.buffered = state.buffered.saturating_sub(step);
                    state.buffered_bytes = state.buffered_bytes.saturating_sub(bytes);
                    remaining -= step;
                }

                if state.buffer.is_empty() {
                    if state.exhausted {
                        Session::transition(&mut state, PlaybackState::Ended)
                    } else {
                        state.rebuffering = true;
                        Session::transition(&mut state, PlaybackState::Buffering)
                    }
                } else {
                    None
                }
            }
        };

        if let Some(kind) = event {
            self.session.emit(kind);
        }
        self.maybe_continue_loading();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_bus::EventBus;
    use crate::core::media::SyntheticBackend;
    use std::time::Instant;

    fn workers() -> Arc<Workers> {
        Arc::new(Workers::new(2, Arc::new(AtomicU64::new(0))).unwrap())
    }

    fn handle_with(backend: Arc<SyntheticBackend>, bus: &EventBus) -> PlayerHandle {
        PlayerHandle::new(
            "https://cdn/clip.mp4",
            LoadControl::default(),
            backend,
            workers(),
            bus.emitter(),
        )
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
    fn test_new_handle_is_idle_and_paused() {
        let bus = EventBus::new();
        let handle = handle_with(Arc::new(SyntheticBackend::default()), &bus);

        assert_eq!(handle.state(), PlaybackState::Idle);
        assert_eq!(handle.position(), Duration::ZERO);
        assert!(!handle.play_when_ready());
        assert!(!handle.has_started());
        assert_eq!(handle.volume(), 1.0);
    }

    #[test]
    fn test_load_reaches_ready_and_stops_at_max_buffer() {
        let bus = EventBus::new();
        let backend = Arc::new(
            SyntheticBackend::new(Duration::from_secs(120)).with_chunks(Duration::from_secs(1), 1000),
        );
        let handle = handle_with(Arc::clone(&backend), &bus);

        handle.schedule_load();
        assert!(wait_for(|| handle.state() == PlaybackState::Ready));
        assert!(wait_for(|| !handle.is_loading()));

        // Loading stops at the 30s max buffer
        assert_eq!(handle.buffered_ahead(), Duration::from_secs(30));
        assert_eq!(backend.opens(), 1);
    }

    #[test]
    fn test_play_consumes_buffer_until_ended() {
        let bus = EventBus::new();
        let backend = Arc::new(
            SyntheticBackend::new(Duration::from_secs(2)).with_chunks(Duration::from_millis(500), 100),
        );
        let handle = handle_with(backend, &bus);

        handle.schedule_load();
        assert!(wait_for(|| handle.buffered_ahead() == Duration::from_secs(2)));
        // Loader stops only after seeing end of stream
        assert!(wait_for(|| !handle.is_loading()));
        assert_eq!(handle.state(), PlaybackState::Ready);

        // Paused: clock does not move
        handle.advance(Duration::from_millis(300));
        assert_eq!(handle.position(), Duration::ZERO);

        handle.play();
        assert!(handle.is_playing());
        handle.advance(Duration::from_millis(1250));
        assert_eq!(handle.position(), Duration::from_millis(1250));
        assert_eq!(handle.buffered_ahead(), Duration::from_millis(750));

        handle.advance(Duration::from_secs(5));
        assert_eq!(handle.position(), Duration::from_secs(2));
        assert_eq!(handle.state(), PlaybackState::Ended);
    }

    #[test]
    fn test_underrun_rebuffers() {
        let bus = EventBus::new();
        let backend = Arc::new(
            SyntheticBackend::new(Duration::from_secs(60))
                .with_chunks(Duration::from_millis(500), 10)
                .with_delay(Duration::from_millis(30)),
        );
        let handle = handle_with(backend, &bus);
        handle.play();
        handle.schedule_load();
        assert!(wait_for(|| handle.state() == PlaybackState::Ready));

        // Consume faster than the simulated network delivers
        handle.advance(Duration::from_secs(10));
        assert_eq!(handle.state(), PlaybackState::Buffering);
        // Resumes once the after-rebuffer threshold is met
        assert!(wait_for(|| handle.state() == PlaybackState::Ready));
        assert!(handle.buffered_ahead() >= Duration::from_millis(750));
    }

    #[test]
    fn test_open_failure_reports_error() {
        let bus = EventBus::new();
        let rx = bus.channel::<PlayerEvent>();
        let backend = Arc::new(SyntheticBackend::default());
        backend.fail_url("https://cdn/clip.mp4");
        let handle = handle_with(backend, &bus);

        handle.schedule_load();
        assert!(wait_for(|| matches!(handle.state(), PlaybackState::Error(_))));

        let saw_error = rx.try_iter().any(|e| {
            matches!(e.kind, PlayerEventKind::StateChanged { to: PlaybackState::Error(_), .. })
        });
        assert!(saw_error);
        // Play on a failed session is ignored
        handle.play();
        assert!(!handle.play_when_ready());
    }

    #[test]
    fn test_seek_counts_and_resets_buffer() {
        let bus = EventBus::new();
        let backend = Arc::new(
            SyntheticBackend::new(Duration::from_secs(10)).with_chunks(Duration::from_millis(500), 10),
        );
        let handle = handle_with(Arc::clone(&backend), &bus);
        handle.schedule_load();
        assert!(wait_for(|| handle.state() == PlaybackState::Ready && !handle.is_loading()));

        handle.play();
        handle.advance(Duration::from_secs(3));
        handle.seek_to(Duration::ZERO);
        assert_eq!(handle.seek_count(), 1);
        assert_eq!(handle.position(), Duration::ZERO);

        // Stream reopened from the start and fully buffered again
        assert!(wait_for(|| handle.buffered_ahead() == Duration::from_secs(10)));
        assert_eq!(backend.opens(), 2);
    }

    #[test]
    fn test_rewind_skips_seek_at_zero() {
        let bus = EventBus::new();
        let handle = handle_with(Arc::new(SyntheticBackend::default()), &bus);

        handle.rewind_if_advanced();
        assert_eq!(handle.seek_count(), 0);
    }

    #[test]
    fn test_release_is_terminal_and_idempotent() {
        let bus = EventBus::new();
        let rx = bus.channel::<PlayerEvent>();
        let handle = handle_with(Arc::new(SyntheticBackend::default()), &bus);
        handle.schedule_load();

        handle.release();
        handle.release();
        assert_eq!(handle.state(), PlaybackState::Released);
        assert!(wait_for(|| !handle.is_loading()));

        handle.play();
        handle.seek_to(Duration::from_secs(1));
        assert!(!handle.play_when_ready());
        assert_eq!(handle.seek_count(), 0);

        let released = rx
            .try_iter()
            .filter(|e| e.kind == PlayerEventKind::Released)
            .count();
        assert_eq!(released, 1);
    }

    #[test]
    fn test_loaders_share_a_single_worker() {
        let bus = EventBus::new();
        let backend: Arc<SyntheticBackend> = Arc::new(
            SyntheticBackend::new(Duration::from_secs(120))
                .with_chunks(Duration::from_millis(250), 10)
                .with_delay(Duration::from_millis(10)),
        );
        let workers = Arc::new(Workers::new(1, Arc::new(AtomicU64::new(0))).unwrap());
        let open = |url: &str| {
            PlayerHandle::new(
                url,
                LoadControl::default(),
                backend.clone(),
                Arc::clone(&workers),
                bus.emitter(),
            )
        };

        let previous = open("https://cdn/previous.mp4");
        previous.schedule_load();
        assert!(wait_for(|| previous.state() == PlaybackState::Ready));

        // Previous page keeps filling toward 30s; the new page must not wait for it
        let current = open("https://cdn/current.mp4");
        current.play();
        current.schedule_load();
        assert!(wait_for(|| current.state() == PlaybackState::Ready));
        assert!(previous.buffered_ahead() < LoadControl::default().max_buffer());
        assert!(previous.is_loading());
    }

    #[test]
    fn test_volume_clamped() {
        let bus = EventBus::new();
        let handle = handle_with(Arc::new(SyntheticBackend::default()), &bus);
        handle.set_volume(1.7);
        assert_eq!(handle.volume(), 1.0);
        handle.set_volume(-0.2);
        assert_eq!(handle.volume(), 0.0);
    }
}
