//! HTTP media backend - byte-range fetching through the disk cache
//!
//! Streams read fixed-size chunks with `Range: bytes=a-b` requests. Every chunk
//! is looked up in the `DiskCache` first and written back after a network
//! fetch, so revisiting a clip (or seeking back to its start) does not
//! re-download bytes already on disk.
//!
//! Media time is estimated from a nominal bitrate: this layer does not demux,
//! it only needs a duration per chunk for buffer accounting.

use log::{debug, trace};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::RANGE;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::disk_cache::DiskCache;
use super::media::{MediaBackend, MediaChunk, MediaError, MediaStream};

/// Network knobs for `HttpBackend`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Bytes requested per range request
    pub chunk_bytes: usize,
    /// Assumed stream bitrate, used to convert bytes to media time
    pub nominal_bitrate_kbps: u32,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            chunk_bytes: 256 * 1024,
            nominal_bitrate_kbps: 2_000,
            connect_timeout_secs: 8,
            read_timeout_secs: 8,
            user_agent: concat!("reelpool/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpSettings {
    fn bytes_per_sec(&self) -> u64 {
        (self.nominal_bitrate_kbps.max(1) as u64 * 1000) / 8
    }

    pub fn bytes_to_duration(&self, bytes: u64) -> Duration {
        Duration::from_secs_f64(bytes as f64 / self.bytes_per_sec() as f64)
    }

    pub fn duration_to_bytes(&self, d: Duration) -> u64 {
        (d.as_secs_f64() * self.bytes_per_sec() as f64) as u64
    }
}

/// Backend opening HTTP(S) URLs with a shared client and disk cache
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    cache: Arc<DiskCache>,
    settings: HttpSettings,
}

impl HttpBackend {
    pub fn new(settings: HttpSettings, cache: Arc<DiskCache>) -> Result<Self, MediaError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .timeout(Duration::from_secs(settings.read_timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| MediaError::Network(e.to_string()))?;

        debug!(
            "HttpBackend: chunk={} KB, bitrate={} kbps, cache={}",
            settings.chunk_bytes / 1024,
            settings.nominal_bitrate_kbps,
            cache.dir().display()
        );

        Ok(Self { client, cache, settings })
    }

    pub fn cache(&self) -> &Arc<DiskCache> {
        &self.cache
    }
}

impl MediaBackend for HttpBackend {
    fn open(&self, url: &str, start: Duration) -> Result<Box<dyn MediaStream>, MediaError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(MediaError::InvalidUrl(url.to_string()));
        }

        let offset = self.settings.duration_to_bytes(start);
        trace!("HttpBackend open: {} at byte {}", url, offset);

        Ok(Box::new(HttpStream {
            client: self.client.clone(),
            cache: Arc::clone(&self.cache),
            settings: self.settings.clone(),
            url: url.to_string(),
            offset,
            eof: false,
        }))
    }
}

struct HttpStream {
    client: Client,
    cache: Arc<DiskCache>,
    settings: HttpSettings,
    url: String,
    offset: u64,
    eof: bool,
}

impl HttpStream {
    fn fetch(&self, len: usize) -> Result<Option<Vec<u8>>, MediaError> {
        let last = self.offset + len as u64 - 1;
        let response = self
            .client
            .get(&self.url)
            .header(RANGE, format!("bytes={}-{}", self.offset, last))
            .send()
            .map_err(|e| MediaError::Network(e.to_string()))?;

        match response.status() {
            StatusCode::RANGE_NOT_SATISFIABLE => Ok(None),
            StatusCode::PARTIAL_CONTENT => {
                let body = response.bytes().map_err(|e| MediaError::Network(e.to_string()))?;
                Ok(Some(body.to_vec()))
            }
            StatusCode::OK => {
                // Server ignored the range: slice the window out of the full body
                let body = response.bytes().map_err(|e| MediaError::Network(e.to_string()))?;
                let start = (self.offset as usize).min(body.len());
                let end = (start + len).min(body.len());
                if self.offset == 0 {
                    // Whole resource in hand; cache all of it
                    self.cache.append(&self.url, 0, &body)?;
                }
                Ok(Some(body[start..end].to_vec()))
            }
            status => Err(MediaError::Http(status.as_u16())),
        }
    }
}

impl MediaStream for HttpStream {
    fn read_chunk(&mut self) -> Result<Option<MediaChunk>, MediaError> {
        if self.eof {
            return Ok(None);
        }
        let len = self.settings.chunk_bytes.max(1);

        let bytes = match self.cache.read(&self.url, self.offset, len)? {
            Some(hit) => hit,
            None => match self.fetch(len)? {
                Some(body) => {
                    self.cache.append(&self.url, self.offset, &body)?;
                    body
                }
                None => Vec::new(),
            },
        };

        if bytes.is_empty() {
            self.eof = true;
            return Ok(None);
        }

        self.offset += bytes.len() as u64;
        let duration = self.settings.bytes_to_duration(bytes.len() as u64);
        Ok(Some(MediaChunk { bytes, duration }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitrate_conversion() {
        let settings = HttpSettings {
            nominal_bitrate_kbps: 800,
            ..HttpSettings::default()
        };
        // 800 kbps = 100_000 bytes/s
        assert_eq!(settings.duration_to_bytes(Duration::from_secs(2)), 200_000);
        assert_eq!(settings.bytes_to_duration(50_000), Duration::from_millis(500));
    }

    #[test]
    fn test_rejects_non_http_urls() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(DiskCache::open(dir.path(), 1 << 20).unwrap());
        let backend = HttpBackend::new(HttpSettings::default(), cache).unwrap();

        assert!(matches!(
            backend.open("ftp://example/x.mp4", Duration::ZERO),
            Err(MediaError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_cached_bytes_served_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(DiskCache::open(dir.path(), 1 << 20).unwrap());
        // Unroutable host: any network access would fail the read
        let url = "http://127.0.0.1:9/clip.mp4";
        cache.append(url, 0, &[7u8; 1000]).unwrap();

        let settings = HttpSettings {
            chunk_bytes: 400,
            nominal_bitrate_kbps: 8,
            ..HttpSettings::default()
        };
        let backend = HttpBackend::new(settings, cache).unwrap();
        let mut stream = backend.open(url, Duration::ZERO).unwrap();

        let first = stream.read_chunk().unwrap().unwrap();
        assert_eq!(first.len(), 400);
        // 8 kbps = 1000 bytes/s
        assert_eq!(first.duration, Duration::from_millis(400));
        let second = stream.read_chunk().unwrap().unwrap();
        let third = stream.read_chunk().unwrap().unwrap();
        assert_eq!(second.len() + third.len(), 600);
    }
}
