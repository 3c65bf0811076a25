//! Per-worker LRU file cache.
//!
//! Byte-budgeted map from resolved file path to file contents.
//! Lookups take the shared lock and refresh the entry's access stamp
//! through an atomic, so the hot path never needs the exclusive
//! lock; eviction tolerates a stale stamp because it only needs a
//! valid total order, not real-time currency. `current_size` is
//! mutated exclusively under the write lock and is exact at every
//! observation point.

use chttp_core::constants::{MAX_CACHE_ENTRIES, MAX_CACHE_ENTRY_BYTES};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

struct CacheEntry {
    data: Arc<[u8]>,
    last_access: AtomicU64,
}

struct CacheInner {
    entries: HashMap<PathBuf, CacheEntry>,
    current_size: usize,
}

/// Thread-safe, byte-budgeted LRU cache of file contents.
pub struct FileCache {
    inner: RwLock<CacheInner>,
    max_size: usize,
    tick: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FileCache {
    /// Cache with the given byte budget. Entry count is additionally
    /// capped at `MAX_CACHE_ENTRIES`.
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: RwLock::new(CacheInner {
                entries: HashMap::new(),
                current_size: 0,
            }),
            max_size,
            tick: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn read_inner(&self) -> RwLockReadGuard<'_, CacheInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, CacheInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Look up cached contents, refreshing the LRU stamp on a hit.
    pub fn get(&self, key: &Path) -> Option<Arc<[u8]>> {
        let inner = self.read_inner();
        match inner.entries.get(key) {
            Some(entry) => {
                entry.last_access.store(self.next_tick(), Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(&entry.data))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or replace. Entries over the per-entry cap or the whole
    /// budget are refused. Older entries are evicted oldest-stamp
    /// first until the new one fits. Returns whether it was inserted.
    pub fn put(&self, key: &Path, data: Arc<[u8]>) -> bool {
        let size = data.len();
        if size > MAX_CACHE_ENTRY_BYTES || size > self.max_size {
            return false;
        }

        let mut inner = self.write_inner();

        // Replacement: the old size leaves the budget first
        if let Some(old) = inner.entries.remove(key) {
            inner.current_size -= old.data.len();
        }

        while (inner.current_size + size > self.max_size
            || inner.entries.len() >= MAX_CACHE_ENTRIES)
            && !inner.entries.is_empty()
        {
            Self::evict_oldest(&mut inner);
        }

        if inner.current_size + size > self.max_size {
            return false;
        }

        inner.entries.insert(
            key.to_path_buf(),
            CacheEntry {
                data,
                last_access: AtomicU64::new(self.next_tick()),
            },
        );
        inner.current_size += size;
        true
    }

    fn evict_oldest(inner: &mut CacheInner) {
        let oldest = inner
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access.load(Ordering::Relaxed))
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            if let Some(entry) = inner.entries.remove(&key) {
                inner.current_size -= entry.data.len();
            }
        }
    }

    /// Resident bytes.
    pub fn current_size(&self) -> usize {
        self.read_inner().current_size
    }

    /// Resident entry count.
    pub fn len(&self) -> usize {
        self.read_inner().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Debug counter: lookups that found an entry.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Debug counter: lookups that missed.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
