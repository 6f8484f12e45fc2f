//! Media source abstraction - what a player session pulls bytes from
//!
//! A `MediaBackend` opens streams for a URL at a start position. A `MediaStream`
//! yields chunks of encoded media, each tagged with the media time it covers.
//! Decoding is not modelled here: a chunk's duration is all the player needs for
//! buffer accounting.
//!
//! Two backends ship with the crate:
//! - `HttpBackend` (see `http_source`) - range requests through the disk cache
//! - `SyntheticBackend` - in-memory clips for offline runs and tests

use log::trace;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Errors reported by media backends and streams
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    InvalidUrl(String),
    Http(u16),
    Network(String),
    Io(String),
    Unavailable(String),
}

impl std::fmt::Display for MediaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaError::InvalidUrl(u) => write!(f, "Invalid media URL: {}", u),
            MediaError::Http(status) => write!(f, "HTTP status {}", status),
            MediaError::Network(e) => write!(f, "Network error: {}", e),
            MediaError::Io(e) => write!(f, "I/O error: {}", e),
            MediaError::Unavailable(e) => write!(f, "Media unavailable: {}", e),
        }
    }
}

impl std::error::Error for MediaError {}

impl From<std::io::Error> for MediaError {
    fn from(e: std::io::Error) -> Self {
        MediaError::Io(e.to_string())
    }
}

/// One unit of fetched media
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaChunk {
    pub bytes: Vec<u8>,
    /// Media time covered by these bytes
    pub duration: Duration,
}

impl MediaChunk {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Sequential reader over one media source.
///
/// `Ok(None)` marks end of stream. Implementations may block on I/O; they are
/// only ever driven from worker threads.
pub trait MediaStream: Send {
    fn read_chunk(&mut self) -> Result<Option<MediaChunk>, MediaError>;
}

/// Factory for media streams (the decoding/network subsystem).
pub trait MediaBackend: Send + Sync {
    /// Open `url` positioned at media time `start`.
    fn open(&self, url: &str, start: Duration) -> Result<Box<dyn MediaStream>, MediaError>;
}

/// In-memory backend producing silent clips of a known length.
///
/// Unknown URLs get `default_length`. URLs registered with `fail_url` refuse to
/// open, which is how tests drive the error path.
#[derive(Debug)]
pub struct SyntheticBackend {
    clips: Mutex<HashMap<String, Duration>>,
    failing: Mutex<HashSet<String>>,
    default_length: Duration,
    chunk_duration: Duration,
    chunk_bytes: usize,
    chunk_delay: Duration,
    opens: AtomicU64,
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new(Duration::from_secs(15))
    }
}

impl SyntheticBackend {
    pub fn new(default_length: Duration) -> Self {
        Self {
            clips: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            default_length,
            chunk_duration: Duration::from_millis(250),
            chunk_bytes: 64 * 1024,
            chunk_delay: Duration::ZERO,
            opens: AtomicU64::new(0),
        }
    }

    /// Media time and size of each produced chunk
    pub fn with_chunks(mut self, duration: Duration, bytes: usize) -> Self {
        self.chunk_duration = duration.max(Duration::from_millis(1));
        self.chunk_bytes = bytes;
        self
    }

    /// Sleep this long before each chunk (simulated network)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn add_clip(&self, url: &str, length: Duration) {
        self.clips
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), length);
    }

    pub fn fail_url(&self, url: &str) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string());
    }

    /// Number of successful and failed `open` calls so far
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    fn clip_length(&self, url: &str) -> Duration {
        self.clips
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .copied()
            .unwrap_or(self.default_length)
    }
}

impl MediaBackend for SyntheticBackend {
    fn open(&self, url: &str, start: Duration) -> Result<Box<dyn MediaStream>, MediaError> {
        self.opens.fetch_add(1, Ordering::Relaxed);

        if url.is_empty() {
            return Err(MediaError::InvalidUrl(url.to_string()));
        }
        if self.failing.lock().unwrap_or_else(|e| e.into_inner()).contains(url) {
            return Err(MediaError::Unavailable(url.to_string()));
        }

        let length = self.clip_length(url);
        trace!("Synthetic open: {} at {:?} (length {:?})", url, start, length);

        Ok(Box::new(SyntheticStream {
            cursor: start.min(length),
            length,
            chunk_duration: self.chunk_duration,
            chunk_bytes: self.chunk_bytes,
            chunk_delay: self.chunk_delay,
        }))
    }
}

struct SyntheticStream {
    cursor: Duration,
    length: Duration,
    chunk_duration: Duration,
    chunk_bytes: usize,
    chunk_delay: Duration,
}

impl MediaStream for SyntheticStream {
    fn read_chunk(&mut self) -> Result<Option<MediaChunk>, MediaError> {
        if self.cursor >= self.length {
            return Ok(None);
        }
        if !self.chunk_delay.is_zero() {
            std::thread::sleep(self.chunk_delay);
        }

        let duration = self.chunk_duration.min(self.length - self.cursor);
        // Last chunk shrinks proportionally
        let bytes = (self.chunk_bytes as u128 * duration.as_nanos()
            / self.chunk_duration.as_nanos()) as usize;
        self.cursor += duration;

        Ok(Some(MediaChunk {
            bytes: vec![0u8; bytes],
            duration,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(stream: &mut dyn MediaStream) -> (Duration, usize, usize) {
        let mut total = Duration::ZERO;
        let mut bytes = 0;
        let mut chunks = 0;
        while let Some(chunk) = stream.read_chunk().unwrap() {
            total += chunk.duration;
            bytes += chunk.len();
            chunks += 1;
        }
        (total, bytes, chunks)
    }

    #[test]
    fn test_synthetic_stream_covers_clip() {
        let backend = SyntheticBackend::new(Duration::from_secs(1))
            .with_chunks(Duration::from_millis(300), 300);
        let mut stream = backend.open("https://cdn/a.mp4", Duration::ZERO).unwrap();

        let (total, bytes, chunks) = drain(stream.as_mut());
        assert_eq!(total, Duration::from_secs(1));
        assert_eq!(chunks, 4); // 300 + 300 + 300 + 100
        assert_eq!(bytes, 1000);
        assert!(stream.read_chunk().unwrap().is_none());
    }

    #[test]
    fn test_synthetic_open_at_offset() {
        let backend = SyntheticBackend::new(Duration::from_secs(2))
            .with_chunks(Duration::from_millis(500), 10);
        let mut stream = backend.open("x", Duration::from_millis(1500)).unwrap();

        let (total, _, chunks) = drain(stream.as_mut());
        assert_eq!(total, Duration::from_millis(500));
        assert_eq!(chunks, 1);
    }

    #[test]
    fn test_synthetic_failures_and_counter() {
        let backend = SyntheticBackend::default();
        backend.fail_url("bad");

        assert!(matches!(
            backend.open("bad", Duration::ZERO),
            Err(MediaError::Unavailable(_))
        ));
        assert!(matches!(
            backend.open("", Duration::ZERO),
            Err(MediaError::InvalidUrl(_))
        ));
        assert!(backend.open("good", Duration::ZERO).is_ok());
        assert_eq!(backend.opens(), 3);
    }

    #[test]
    fn test_registered_clip_length() {
        let backend = SyntheticBackend::new(Duration::from_secs(60))
            .with_chunks(Duration::from_millis(250), 1);
        backend.add_clip("short", Duration::from_millis(500));
        let mut stream = backend.open("short", Duration::ZERO).unwrap();
        assert_eq!(drain(stream.as_mut()).0, Duration::from_millis(500));
    }
}
