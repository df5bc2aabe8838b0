//! Tiered TTL cache for entry metadata, directory listings and file bodies.
//!
//! The cache is the synchronous-response buffer of the projection: kernel
//! callbacks must answer within bounded latency, so everything the async
//! side learns is parked here and read back under a shared lock. Three
//! keyed stores exist because the three consumers (placeholder resolution,
//! enumeration, data delivery) have different value shapes and lifetimes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::config::DEFAULT_CACHE_TTL;
use crate::types::{DirListing, FileContent, FileInfo, VaultPath};

/// File bodies above this size are not retained.
pub const MAX_CACHED_CONTENT: usize = 1024 * 1024;

/// An expired-entry sweep runs after this many info-set operations.
const SWEEP_EVERY_INFO_SETS: u64 = 100;

/// A sweep also runs whenever a map grows past this many entries.
const SOFT_ENTRY_CEILING: usize = 4096;

struct Timed<T> {
    value: T,
    stamp: Instant,
}

impl<T> Timed<T> {
    fn new(value: T) -> Self {
        Timed {
            value,
            stamp: Instant::now(),
        }
    }

    fn is_live(&self, ttl: Duration) -> bool {
        self.stamp.elapsed() < ttl
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub estimated_bytes: usize,
}

/// Thread-safe, TTL-bounded cache with separate keyed stores for file info,
/// directory listings and file content.
pub struct ContentCache {
    info: RwLock<HashMap<VaultPath, Timed<FileInfo>>>,
    listings: RwLock<HashMap<VaultPath, Timed<DirListing>>>,
    content: RwLock<HashMap<VaultPath, Timed<FileContent>>>,
    ttl: RwLock<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
    info_sets: AtomicU64,
}

impl Default for ContentCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl ContentCache {
    pub fn new(ttl: Duration) -> Self {
        ContentCache {
            info: RwLock::new(HashMap::new()),
            listings: RwLock::new(HashMap::new()),
            content: RwLock::new(HashMap::new()),
            ttl: RwLock::new(ttl),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            info_sets: AtomicU64::new(0),
        }
    }

    /// Changes the liveness window for subsequent reads.
    pub fn set_ttl(&self, ttl: Duration) {
        *self.ttl.write() = ttl;
    }

    fn current_ttl(&self) -> Duration {
        *self.ttl.read()
    }

    pub fn set_info(&self, path: VaultPath, info: FileInfo) {
        self.info.write().insert(path, Timed::new(info));
        let sets = self.info_sets.fetch_add(1, Ordering::Relaxed) + 1;
        if sets % SWEEP_EVERY_INFO_SETS == 0 || self.info.read().len() > SOFT_ENTRY_CEILING {
            self.sweep_expired();
        }
    }

    pub fn get_info(&self, path: &VaultPath) -> Option<FileInfo> {
        self.lookup(&self.info, path)
    }

    /// Stores a listing; the replacement is atomic, readers never observe a
    /// partially updated listing.
    pub fn set_listing(&self, path: VaultPath, listing: DirListing) {
        self.listings.write().insert(path, Timed::new(listing));
    }

    pub fn get_listing(&self, path: &VaultPath) -> Option<DirListing> {
        self.lookup(&self.listings, path)
    }

    /// Stores file content. Writes above [`MAX_CACHED_CONTENT`] are silently
    /// ignored to bound memory.
    pub fn set_content(&self, path: VaultPath, content: FileContent) {
        if content.len() > MAX_CACHED_CONTENT {
            tracing::debug!(%path, size = content.len(), "content above cache ceiling, not retained");
            return;
        }
        self.content.write().insert(path, Timed::new(content));
    }

    pub fn get_content(&self, path: &VaultPath) -> Option<FileContent> {
        self.lookup(&self.content, path)
    }

    fn lookup<T: Clone>(
        &self,
        map: &RwLock<HashMap<VaultPath, Timed<T>>>,
        path: &VaultPath,
    ) -> Option<T> {
        let guard = map.read();
        match guard.get(path) {
            Some(entry) if entry.is_live(self.current_ttl()) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Removes `path` from all three maps and drops the cached listing of
    /// its parent, whose snapshot no longer reflects the child. Idempotent.
    pub fn invalidate(&self, path: &VaultPath) {
        self.info.write().remove(path);
        self.listings.write().remove(path);
        self.content.write().remove(path);
        if let Some(parent) = path.parent() {
            self.listings.write().remove(&parent);
        }
    }

    /// Clears all maps.
    pub fn invalidate_all(&self) {
        self.info.write().clear();
        self.listings.write().clear();
        self.content.write().clear();
    }

    /// Drops expired entries from all maps.
    pub fn sweep_expired(&self) {
        let ttl = self.current_ttl();
        self.info.write().retain(|_, e| e.is_live(ttl));
        self.listings.write().retain(|_, e| e.is_live(ttl));
        self.content.write().retain(|_, e| e.is_live(ttl));
    }

    pub fn stats(&self) -> CacheStats {
        let info = self.info.read();
        let listings = self.listings.read();
        let content = self.content.read();

        let estimated_bytes = info
            .values()
            .map(|e| std::mem::size_of::<FileInfo>() + e.value.name.len())
            .sum::<usize>()
            + listings
                .values()
                .map(|e| e.value.estimated_bytes())
                .sum::<usize>()
            + content.values().map(|e| e.value.len()).sum::<usize>();

        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: info.len() + listings.len() + content.len(),
            estimated_bytes,
        }
    }
}
