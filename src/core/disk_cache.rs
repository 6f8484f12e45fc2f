//! Disk-backed media byte cache keyed by URL
//!
//! Each URL maps to one file (`<uuid-v5>.bin`) holding the contiguous prefix of
//! the resource fetched so far. Reads inside the prefix are served from disk;
//! appends that extend the prefix are written through. Non-contiguous writes are
//! ignored, so a file never has holes.
//!
//! Total size is bounded: when an append pushes the cache over `max_bytes`,
//! least-recently-used files are deleted (never the one being written).

use log::{debug, trace, warn};
use lru::LruCache;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

const FILE_EXT: &str = "bin";

#[derive(Debug)]
struct CacheIndex {
    /// key -> cached prefix length, LRU ordered
    entries: LruCache<String, u64>,
    total: u64,
}

#[derive(Debug)]
pub struct DiskCache {
    dir: PathBuf,
    max_bytes: u64,
    index: Mutex<CacheIndex>,
}

impl DiskCache {
    /// Open (or create) a cache directory and index existing files.
    pub fn open(dir: impl Into<PathBuf>, max_bytes: u64) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        // Oldest modified first, so the newest end up most recently used
        let mut existing: Vec<(String, u64, std::time::SystemTime)> = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXT) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let meta = entry.metadata()?;
            let modified = meta.modified().unwrap_or(std::time::UNIX_EPOCH);
            existing.push((key, meta.len(), modified));
        }
        existing.sort_by_key(|(_, _, modified)| *modified);

        let mut entries = LruCache::unbounded();
        let mut total = 0;
        for (key, len, _) in existing {
            total += len;
            entries.put(key, len);
        }

        debug!(
            "DiskCache opened: {} ({} files, {} KB, limit {} MB)",
            dir.display(),
            entries.len(),
            total / 1024,
            max_bytes / 1024 / 1024
        );

        let cache = Self {
            dir,
            max_bytes,
            index: Mutex::new(CacheIndex { entries, total }),
        };
        cache.evict_over_limit(None);
        Ok(cache)
    }

    /// Stable file key for a URL
    pub fn key(url: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, url.as_bytes()).simple().to_string()
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, FILE_EXT))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Length of the cached prefix for `url` (0 when absent)
    pub fn cached_len(&self, url: &str) -> u64 {
        let key = Self::key(url);
        self.index
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .peek(&key)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_bytes(&self) -> u64 {
        self.index.lock().unwrap_or_else(|e| e.into_inner()).total
    }

    pub fn len(&self) -> usize {
        self.index.lock().unwrap_or_else(|e| e.into_inner()).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read up to `len` bytes at `offset`, if the prefix covers `offset`.
    ///
    /// Returns `Ok(None)` on a miss; a hit may be shorter than `len` when the
    /// prefix ends early.
    pub fn read(&self, url: &str, offset: u64, len: usize) -> io::Result<Option<Vec<u8>>> {
        let key = Self::key(url);
        let available = {
            let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
            match index.entries.get(&key) {
                Some(&cached) if cached > offset => cached - offset,
                _ => return Ok(None),
            }
        };

        let want = (len as u64).min(available) as usize;
        let mut file = match fs::File::open(self.path_for(&key)) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("DiskCache file vanished for {}, dropping entry", url);
                self.forget(&key);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; want];
        file.read_exact(&mut buf)?;

        trace!("DiskCache hit: {} @{} ({} bytes)", url, offset, want);
        Ok(Some(buf))
    }

    /// Append bytes fetched at `offset`.
    ///
    /// Only extends the prefix: data starting past the end is dropped, and an
    /// overlap is trimmed. Returns the new prefix length.
    pub fn append(&self, url: &str, offset: u64, bytes: &[u8]) -> io::Result<u64> {
        let key = Self::key(url);
        let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        let cached = index.entries.get(&key).copied().unwrap_or(0);

        let end = offset + bytes.len() as u64;
        if offset > cached || end <= cached {
            return Ok(cached);
        }
        let fresh = &bytes[(cached - offset) as usize..];

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(&key))?;
        file.write_all(fresh)?;

        index.entries.put(key.clone(), end);
        index.total += fresh.len() as u64;
        drop(index);

        self.evict_over_limit(Some(&key));
        Ok(end)
    }

    /// Drop the cached bytes for one URL
    pub fn remove(&self, url: &str) -> io::Result<()> {
        let key = Self::key(url);
        if self.forget(&key) {
            remove_file_if_exists(&self.path_for(&key))?;
        }
        Ok(())
    }

    /// Drop everything
    pub fn clear(&self) -> io::Result<()> {
        let keys: Vec<String> = {
            let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
            let keys = index.entries.iter().map(|(k, _)| k.clone()).collect();
            index.entries.clear();
            index.total = 0;
            keys
        };
        for key in keys {
            remove_file_if_exists(&self.path_for(&key))?;
        }
        debug!("DiskCache cleared: {}", self.dir.display());
        Ok(())
    }

    fn forget(&self, key: &str) -> bool {
        let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        match index.entries.pop(key) {
            Some(len) => {
                index.total = index.total.saturating_sub(len);
                true
            }
            None => false,
        }
    }

    fn evict_over_limit(&self, keep: Option<&str>) {
        loop {
            let victim = {
                let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
                if index.total <= self.max_bytes {
                    return;
                }
                // Skip the entry being written; if it is the only one left, stop
                let Some((key, len)) = index.entries.pop_lru() else {
                    return;
                };
                if keep == Some(key.as_str()) {
                    let only_one = index.entries.is_empty();
                    index.entries.put(key.clone(), len);
                    // Re-insert made it MRU; try the next oldest
                    if only_one {
                        return;
                    }
                    continue;
                }
                index.total = index.total.saturating_sub(len);
                key
            };

            if let Err(e) = remove_file_if_exists(&self.path_for(&victim)) {
                warn!("DiskCache failed to delete {}: {}", victim, e);
            } else {
                debug!("DiskCache evicted {}", victim);
            }
        }
    }
}

fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
