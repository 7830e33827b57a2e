//! Feed media facade
//!
//! [`MediaFeed`] builds every service from one [`FeedConfig`], wires them
//! together and exposes the entry points the presentation layer and the OS
//! adapter call.

use crate::{
    asset_cache::{AssetCache, AssetCacheConfig},
    config::FeedConfig,
    coordinator::PlaybackCoordinator,
    lifecycle::{LifecycleGuard, ReattachReport},
    manifest::{AssetLoader, HlsAssetLoader},
    player::{HeadlessBackend, PlayerBackend, PlayerHandle, PlayerOptions},
    player_cache::{PlayerCache, PlayerCacheConfig, RetryPolicy},
    scheduler::{EnqueueOutcome, LoadRequest, LoadScheduler, SchedulerConfig},
    stall::{StallConfig, StallMonitor, StallStatus},
    types::*,
    Result,
};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, instrument};
use url::Url;

/// Aggregate diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedStatus {
    pub cached_assets: usize,
    pub loads_in_flight: usize,
    pub cached_players: usize,
    pub displayed_players: usize,
    pub groups: usize,
    pub backgrounded: bool,
    pub stall: StallStatus,
}

/// Owns and wires the feed media services
pub struct MediaFeed {
    config: FeedConfig,
    asset_cache: Arc<AssetCache>,
    player_cache: Arc<PlayerCache>,
    coordinator: Arc<PlaybackCoordinator>,
    monitor: Arc<StallMonitor>,
    scheduler: Arc<LoadScheduler>,
    lifecycle: LifecycleGuard,
    probe: Mutex<Option<JoinHandle<()>>>,
}

impl MediaFeed {
    /// Build the services
    ///
    /// Must be called from within a tokio runtime; the scheduler's
    /// dispatcher is spawned immediately.
    pub fn new(
        config: FeedConfig,
        loader: Arc<dyn AssetLoader>,
        backend: Arc<dyn PlayerBackend>,
    ) -> Result<Self> {
        config.validate()?;

        let asset_cache = Arc::new(AssetCache::new(
            AssetCacheConfig {
                capacity: config.asset_cache_capacity,
                ttl: config.asset_ttl(),
                probe_timeout: config.probe_timeout(),
            },
            loader,
        ));

        let player_cache = Arc::new(PlayerCache::new(
            PlayerCacheConfig {
                capacity: config.player_cache_capacity,
                options: PlayerOptions {
                    forward_buffer_secs: config.forward_buffer_secs,
                    peak_bitrate: config.peak_bitrate,
                },
                retry: RetryPolicy {
                    max_attempts: config.playback_retry_attempts,
                    base_delay: Duration::from_millis(config.playback_retry_delay_ms),
                },
            },
            backend,
        ));

        let monitor = Arc::new(StallMonitor::new(
            StallConfig {
                probe_interval: Duration::from_millis(config.probe_interval_ms),
                threshold: Duration::from_millis(config.stall_threshold_ms),
                cooldown: Duration::from_millis(config.cooldown_ms),
                escalation_count: config.escalation_count,
                escalation_window: Duration::from_millis(config.escalation_window_ms),
            },
            Arc::clone(&asset_cache),
            Arc::clone(&player_cache),
        ));

        let scheduler = LoadScheduler::new(
            SchedulerConfig {
                max_concurrency: config.max_concurrent_loads,
                normal_delay: Duration::from_millis(config.normal_delay_ms),
                low_delay: Duration::from_millis(config.low_delay_ms),
                dispatch_pause: Duration::from_millis(config.dispatch_pause_ms),
                burst_threshold: config.burst_threshold,
                burst_window: Duration::from_millis(config.burst_window_ms),
                burst_min_gap: Duration::from_millis(config.burst_min_gap_ms),
            },
            Arc::clone(&asset_cache),
            Arc::clone(&monitor),
        );

        let coordinator = Arc::new(PlaybackCoordinator::new());
        let lifecycle = LifecycleGuard::new(
            Arc::clone(&player_cache),
            Arc::clone(&coordinator),
            config.extended_idle(),
        );

        info!(
            asset_capacity = config.asset_cache_capacity,
            player_capacity = config.player_cache_capacity,
            max_loads = config.max_concurrent_loads,
            "Media feed created"
        );

        Ok(Self {
            config,
            asset_cache,
            player_cache,
            coordinator,
            monitor,
            scheduler,
            lifecycle,
            probe: Mutex::new(None),
        })
    }

    /// Build with the HTTP/file loader and the headless backend
    pub fn with_http(config: FeedConfig) -> Result<Self> {
        let loader = HlsAssetLoader::new(config.request_timeout())?;
        Self::new(config, Arc::new(loader), Arc::new(HeadlessBackend))
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn asset_cache(&self) -> &Arc<AssetCache> {
        &self.asset_cache
    }

    pub fn player_cache(&self) -> &Arc<PlayerCache> {
        &self.player_cache
    }

    pub fn coordinator(&self) -> &Arc<PlaybackCoordinator> {
        &self.coordinator
    }

    pub fn monitor(&self) -> &Arc<StallMonitor> {
        &self.monitor
    }

    pub fn scheduler(&self) -> &Arc<LoadScheduler> {
        &self.scheduler
    }

    pub fn lifecycle(&self) -> &LifecycleGuard {
        &self.lifecycle
    }

    /// Get a prepared player for on-screen content
    ///
    /// Loads the asset directly (sharing any in-flight preload), binds or
    /// reuses the player and prepares it with retries.
    #[instrument(skip(self), fields(content_id = %content_id, source = %source_key))]
    pub async fn player_for(&self, content_id: &ContentId, source_key: &Url) -> Result<Arc<PlayerHandle>> {
        let asset = self.asset_cache.get_or_load(source_key).await;
        self.player_cache.get_or_create(content_id, asset);
        self.player_cache.prepare(content_id).await
    }

    /// Queue a background asset load
    pub fn preload(&self, content_id: impl Into<ContentId>, source_key: Url, priority: Priority) -> EnqueueOutcome {
        self.scheduler
            .enqueue(LoadRequest::new(content_id, source_key, priority))
    }

    /// Drop a queued or in-flight preload (content scrolled away)
    pub fn cancel_preload(&self, content_id: &ContentId) -> bool {
        self.scheduler.cancel(content_id)
    }

    /// Start the stall probe on the current runtime; no-op if running
    pub fn start_stall_probe(&self) {
        let mut probe = self.probe.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if probe.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        *probe = Some(self.monitor.spawn_probe());
    }

    /// OS memory-pressure signal
    pub fn on_memory_warning(&self) {
        self.monitor.emergency_cleanup("memory warning");
    }

    pub fn on_background_enter(&self) -> usize {
        self.lifecycle.on_background_enter()
    }

    pub async fn on_foreground_enter(&self) -> ReattachReport {
        self.lifecycle.on_foreground_enter().await
    }

    pub fn status(&self) -> FeedStatus {
        FeedStatus {
            cached_assets: self.asset_cache.len(),
            loads_in_flight: self.asset_cache.in_flight(),
            cached_players: self.player_cache.len(),
            displayed_players: self.player_cache.displayed_handles().len(),
            groups: self.coordinator.group_count(),
            backgrounded: self.lifecycle.is_backgrounded(),
            stall: self.monitor.status(),
        }
    }

    /// Stop the probe and the dispatcher, aborting all loads
    pub fn shutdown(&self) {
        if let Some(task) = self
            .probe
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            task.abort();
        }
        self.scheduler.shutdown();
    }
}

impl Drop for MediaFeed {
    fn drop(&mut self) {
        if let Some(task) = self
            .probe
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            task.abort();
        }
    }
}
