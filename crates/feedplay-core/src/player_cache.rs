//! Live player cache
//!
//! One [`PlayerHandle`] per content id, persisting across presentation
//! contexts (feed cell and full-screen viewer share the handle). Entries
//! flagged displayed are exempt from LRU eviction; a memory-pressure purge
//! drops everything regardless.

use crate::{
    asset_cache::AssetHandle,
    player::{PlayerBackend, PlayerHandle, PlayerOptions},
    types::*,
    Error, Result,
};
use lru::LruCache;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Retry policy for preparing players
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts before giving up
    pub max_attempts: u32,
    /// Backoff after the first failure; grows linearly per attempt
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

/// Player cache configuration
#[derive(Debug, Clone)]
pub struct PlayerCacheConfig {
    /// Maximum non-displayed players kept
    pub capacity: usize,
    /// Hints for newly created players
    pub options: PlayerOptions,
    /// Prepare retry policy
    pub retry: RetryPolicy,
}

impl Default for PlayerCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 15,
            options: PlayerOptions::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Cache of live players keyed by content id
pub struct PlayerCache {
    config: PlayerCacheConfig,
    backend: Arc<dyn PlayerBackend>,
    /// Most recently used first; bounded by hand since displayed entries
    /// do not count against capacity
    entries: Mutex<LruCache<ContentId, Arc<PlayerHandle>>>,
}

impl PlayerCache {
    /// Create a new player cache
    pub fn new(config: PlayerCacheConfig, backend: Arc<dyn PlayerBackend>) -> Self {
        Self {
            config,
            backend,
            entries: Mutex::new(LruCache::unbounded()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<ContentId, Arc<PlayerHandle>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get the player for a content id, creating one bound to `asset` on miss
    pub fn get_or_create(&self, content_id: &ContentId, asset: Arc<AssetHandle>) -> Arc<PlayerHandle> {
        let mut entries = self.lock();

        if let Some(handle) = entries.get(content_id) {
            return Arc::clone(handle);
        }

        let handle = Arc::new(PlayerHandle::new(
            content_id.clone(),
            asset,
            self.config.options.clone(),
            Arc::clone(&self.backend),
        ));
        debug!(content_id = %content_id, source = %handle.asset().source_key, "Player created");

        entries.put(content_id.clone(), Arc::clone(&handle));
        Self::evict_lru(&mut entries, self.config.capacity, Some(content_id));
        handle
    }

    /// Drop the oldest non-displayed players until they fit `capacity`,
    /// never touching `keep`
    fn evict_lru(
        entries: &mut LruCache<ContentId, Arc<PlayerHandle>>,
        capacity: usize,
        keep: Option<&ContentId>,
    ) {
        let mut evictable = entries.iter().filter(|(_, handle)| !handle.is_displayed()).count();

        while evictable > capacity {
            let oldest = entries
                .iter()
                .rev()
                .find(|(id, handle)| !handle.is_displayed() && Some(*id) != keep)
                .map(|(id, _)| id.clone());

            let Some(id) = oldest else { break };
            if let Some(handle) = entries.pop(&id) {
                handle.pause();
                debug!(content_id = %id, "Evicting least recently used player");
            }
            evictable -= 1;
        }
    }

    /// Get a player without creating or refreshing it
    pub fn get(&self, content_id: &ContentId) -> Option<Arc<PlayerHandle>> {
        self.lock().peek(content_id).map(Arc::clone)
    }

    /// Prepare a player's decode pipeline, retrying with linear backoff
    ///
    /// Succeeds immediately if the player is already ready. Once attempts are
    /// exhausted the player is marked unavailable and the error is returned
    /// so the presentation layer can offer a retry.
    #[instrument(skip(self), fields(content_id = %content_id))]
    pub async fn prepare(&self, content_id: &ContentId) -> Result<Arc<PlayerHandle>> {
        let handle = self
            .get(content_id)
            .ok_or_else(|| Error::PlayerNotFound(content_id.to_string()))?;

        if handle.status().is_ready() {
            return Ok(handle);
        }
        handle.set_status(PlayerStatus::Pending);

        let max_attempts = self.config.retry.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match handle.prepare_backend().await {
                Ok(()) => {
                    handle.set_status(PlayerStatus::Ready);
                    debug!(attempt, "Player ready");
                    return Ok(handle);
                }
                Err(e) => {
                    warn!(attempt, max_attempts, error = %e, "Player prepare failed");
                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.retry.base_delay * attempt).await;
                    }
                }
            }
        }

        handle.set_status(PlayerStatus::Unavailable {
            attempts: max_attempts,
        });
        Err(Error::PlaybackUnavailable {
            content_id: content_id.to_string(),
            attempts: max_attempts,
        })
    }

    /// Seek a player back to the start without dropping it
    pub async fn reset(&self, content_id: &ContentId) -> Result<()> {
        if let Some(handle) = self.get(content_id) {
            handle.seek(0.0, SeekTolerance::Exact).await?;
        }
        Ok(())
    }

    /// Pause a player; no-op if absent
    pub fn pause(&self, content_id: &ContentId) {
        if let Some(handle) = self.get(content_id) {
            handle.pause();
        }
    }

    /// Mute or unmute a player; no-op if absent
    pub fn set_muted(&self, content_id: &ContentId, muted: bool) {
        if let Some(handle) = self.get(content_id) {
            handle.set_muted(muted);
        }
    }

    /// Flag a player as on screen (exempt from eviction) or not
    ///
    /// This is the only visibility signal the caches consult. Clearing the
    /// flag may immediately evict other players that were kept over capacity.
    pub fn set_displayed(&self, content_id: &ContentId, displayed: bool) {
        let mut entries = self.lock();
        if let Some(handle) = entries.get(content_id) {
            handle.set_displayed(displayed);
        }
        if !displayed {
            Self::evict_lru(&mut entries, self.config.capacity, None);
        }
    }

    /// Pause and drop a specific player
    pub fn remove(&self, content_id: &ContentId) -> Option<Arc<PlayerHandle>> {
        let handle = self.lock().pop(content_id)?;
        handle.pause();
        Some(handle)
    }

    /// Pause every player without dropping any
    pub fn pause_all(&self) {
        for handle in self.handles() {
            handle.pause();
        }
    }

    /// Pause and drop every player, displayed or not
    pub fn purge_all(&self) {
        let drained: Vec<_> = {
            let mut entries = self.lock();
            let drained: Vec<Arc<PlayerHandle>> = entries.iter().map(|(_, handle)| Arc::clone(handle)).collect();
            entries.clear();
            drained
        };
        for handle in &drained {
            handle.pause();
        }
        info!(dropped = drained.len(), "Player cache purged");
    }

    /// All cached players
    pub fn handles(&self) -> Vec<Arc<PlayerHandle>> {
        self.lock().iter().map(|(_, handle)| Arc::clone(handle)).collect()
    }

    /// Players currently flagged displayed
    pub fn displayed_handles(&self) -> Vec<Arc<PlayerHandle>> {
        self.lock()
            .iter()
            .filter(|(_, handle)| handle.is_displayed())
            .map(|(_, handle)| Arc::clone(handle))
            .collect()
    }

    pub fn contains(&self, content_id: &ContentId) -> bool {
        self.lock().contains(content_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of players subject to eviction
    pub fn evictable_len(&self) -> usize {
        self.lock()
            .iter()
            .filter(|(_, handle)| !handle.is_displayed())
            .count()
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }
}
