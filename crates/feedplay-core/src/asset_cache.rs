//! Decoded asset cache
//!
//! Handles:
//! - Single-flight loading keyed by source location
//! - Manifest discovery through the injected [`AssetLoader`]
//! - Idle-TTL expiry and LRU eviction
//! - Purge epochs so a load started before a purge never repopulates the cache

use crate::{
    manifest::{resolve_location, AssetLoader},
    types::*,
};
use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::Serialize;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Cached decoded-resource reference with metadata
///
/// Immutable once built; shared by every player bound to the same source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetHandle {
    /// Location the presentation layer asked for
    pub source_key: Url,
    /// Location the player should open
    pub resolved: Url,
    /// What discovery found at the location
    pub kind: ManifestKind,
    /// Total duration (zero when unknown)
    pub duration: Duration,
    /// Natural size, if known
    pub natural_size: Option<NaturalSize>,
    /// Width over height
    pub aspect_ratio: f64,
    /// When the handle was built
    pub created_at: DateTime<Utc>,
    /// True when loading failed and the raw location is used blind
    pub degraded: bool,
}

impl AssetHandle {
    /// Fallback handle used when resolution or metadata loading fails
    pub fn degraded(source_key: Url) -> Self {
        Self {
            resolved: source_key.clone(),
            source_key,
            kind: ManifestKind::Direct,
            duration: Duration::ZERO,
            natural_size: None,
            aspect_ratio: DEFAULT_ASPECT_RATIO,
            created_at: Utc::now(),
            degraded: true,
        }
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.duration.as_secs_f64()
    }
}

/// Asset cache configuration
#[derive(Debug, Clone)]
pub struct AssetCacheConfig {
    /// Maximum cached assets
    pub capacity: usize,
    /// Idle time before an entry expires
    pub ttl: Duration,
    /// Timeout for each manifest probe
    pub probe_timeout: Duration,
}

impl Default for AssetCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 30,
            ttl: Duration::from_secs(600),
            probe_timeout: Duration::from_secs(3),
        }
    }
}

struct CacheEntry {
    handle: Arc<AssetHandle>,
    last_accessed: Instant,
}

type LoadCell = Arc<OnceCell<Arc<AssetHandle>>>;

/// A shared load and the callers currently waiting on it
struct InFlight {
    cell: LoadCell,
    waiters: usize,
}

struct CacheState {
    entries: LruCache<Url, CacheEntry>,
    in_flight: HashMap<Url, InFlight>,
    epoch: u64,
}

/// Unregisters a waiter that leaves `get_or_load` without finishing,
/// dropping the in-flight entry once nobody is left to drive the load
struct WaiterGuard<'a> {
    cache: &'a AssetCache,
    source_key: &'a Url,
    cell: LoadCell,
    armed: bool,
}

impl WaiterGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.cache.lock();
        let abandoned = match state.in_flight.get_mut(self.source_key) {
            Some(entry) if Arc::ptr_eq(&entry.cell, &self.cell) => {
                entry.waiters = entry.waiters.saturating_sub(1);
                entry.waiters == 0
            }
            _ => false,
        };
        if abandoned {
            state.in_flight.remove(self.source_key);
            debug!(source = %self.source_key, "Abandoned load dropped");
        }
    }
}

/// Cache of decoded assets keyed by source location
pub struct AssetCache {
    config: AssetCacheConfig,
    loader: Arc<dyn AssetLoader>,
    state: Mutex<CacheState>,
    loads: AtomicU64,
}

impl AssetCache {
    /// Create a new asset cache
    pub fn new(config: AssetCacheConfig, loader: Arc<dyn AssetLoader>) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            loader,
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                in_flight: HashMap::new(),
                epoch: 0,
            }),
            loads: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get a cached asset or load it
    ///
    /// Concurrent callers for the same key share a single underlying load.
    /// Failures never surface: a degraded handle is returned instead (and not
    /// cached, so the next request tries again).
    #[instrument(skip(self), fields(source = %source_key))]
    pub async fn get_or_load(&self, source_key: &Url) -> Arc<AssetHandle> {
        let (cell, epoch) = {
            let mut state = self.lock();
            let now = Instant::now();

            if let Some(entry) = state.entries.get_mut(source_key) {
                if now.duration_since(entry.last_accessed) < self.config.ttl {
                    entry.last_accessed = now;
                    return Arc::clone(&entry.handle);
                }
            }
            if state.entries.pop(source_key).is_some() {
                debug!("Cached asset expired");
            }

            let epoch = state.epoch;
            let in_flight = state
                .in_flight
                .entry(source_key.clone())
                .or_insert_with(|| InFlight {
                    cell: Arc::new(OnceCell::new()),
                    waiters: 0,
                });
            in_flight.waiters += 1;
            (Arc::clone(&in_flight.cell), epoch)
        };

        let guard = WaiterGuard {
            cache: self,
            source_key,
            cell: Arc::clone(&cell),
            armed: true,
        };
        let loaded = Arc::clone(cell.get_or_init(|| self.load(source_key)).await);
        guard.disarm();

        let mut state = self.lock();
        if state
            .in_flight
            .get(source_key)
            .is_some_and(|current| Arc::ptr_eq(&current.cell, &cell))
        {
            state.in_flight.remove(source_key);
        }

        if state.epoch != epoch {
            debug!("Cache purged during load, result not cached");
            return loaded;
        }
        if loaded.degraded {
            return loaded;
        }

        let now = Instant::now();
        if let Some(entry) = state.entries.get_mut(source_key) {
            entry.last_accessed = now;
            return Arc::clone(&entry.handle);
        }
        let evicted = state.entries.push(
            source_key.clone(),
            CacheEntry {
                handle: Arc::clone(&loaded),
                last_accessed: now,
            },
        );
        if let Some((evicted, _)) = evicted {
            debug!(source = %evicted, "Evicting least recently used asset");
        }
        loaded
    }

    async fn load(&self, source_key: &Url) -> Arc<AssetHandle> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let resolved =
            resolve_location(self.loader.as_ref(), source_key, self.config.probe_timeout).await;

        let handle = match self.loader.load(&resolved.url).await {
            Ok(metadata) => AssetHandle {
                source_key: source_key.clone(),
                resolved: resolved.url,
                kind: resolved.kind,
                duration: metadata.duration,
                natural_size: metadata.natural_size,
                aspect_ratio: metadata
                    .natural_size
                    .map(|s| s.aspect_ratio())
                    .unwrap_or(DEFAULT_ASPECT_RATIO),
                created_at: Utc::now(),
                degraded: false,
            },
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "Asset load failed, using degraded handle");
                AssetHandle::degraded(source_key.clone())
            }
        };

        debug!(
            resolved = %handle.resolved,
            kind = %handle.kind,
            duration_s = handle.duration_secs(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Asset loaded"
        );

        Arc::new(handle)
    }

    /// Peek at a cached asset without loading or refreshing it
    pub fn get(&self, source_key: &Url) -> Option<Arc<AssetHandle>> {
        self.lock()
            .entries
            .peek(source_key)
            .map(|entry| Arc::clone(&entry.handle))
    }

    /// Returns true if the key is cached
    pub fn contains(&self, source_key: &Url) -> bool {
        self.lock().entries.contains(source_key)
    }

    /// Last access time of a cached entry
    pub fn last_accessed(&self, source_key: &Url) -> Option<Instant> {
        self.lock().entries.peek(source_key).map(|entry| entry.last_accessed)
    }

    /// Remove a single entry
    pub fn remove(&self, source_key: &Url) -> Option<Arc<AssetHandle>> {
        self.lock().entries.pop(source_key).map(|entry| entry.handle)
    }

    /// Drop entries idle for longer than the TTL, returning how many were dropped
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.config.ttl;
        let mut state = self.lock();
        let expired: Vec<Url> = state
            .entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_accessed) >= ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.entries.pop(key);
        }
        expired.len()
    }

    /// Drop every entry and orphan in-flight loads
    pub fn purge_all(&self) {
        let mut state = self.lock();
        let dropped = state.entries.len();
        state.entries.clear();
        state.in_flight.clear();
        state.epoch += 1;
        info!(dropped, epoch = state.epoch, "Asset cache purged");
    }

    /// Number of cached assets
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of loads currently in flight
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Total underlying loads started since creation
    pub fn loads_started(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }
}
