//! Player handles
//!
//! A [`PlayerHandle`] is the live playback state for one content id, bound to
//! a shared [`AssetHandle`]. Decoding and rendering live behind the
//! [`PlayerBackend`] trait; the handle tracks what the presentation layer
//! needs to draw (position, mute, play intent, visibility, detachment).

use crate::{asset_cache::AssetHandle, types::*, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::debug;

/// Hints handed to the backend when a player is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerOptions {
    /// Seconds of media to buffer ahead of the playhead
    pub forward_buffer_secs: f64,
    /// Peak bitrate cap in bits per second (0 = let the transport decide)
    pub peak_bitrate: u64,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            forward_buffer_secs: 30.0,
            peak_bitrate: 0,
        }
    }
}

/// Decoder/renderer behind a player handle
#[async_trait]
pub trait PlayerBackend: Send + Sync {
    /// Build the decode pipeline for an asset; resolves once it can render
    async fn prepare(&self, asset: &AssetHandle, options: &PlayerOptions) -> Result<()>;

    /// Seek and return the position actually landed on
    async fn seek(&self, asset: &AssetHandle, position: f64, tolerance: SeekTolerance) -> Result<f64>;
}

/// Backend with no decoder attached
///
/// Prepares instantly and lands seeks exactly, clamped to the asset duration.
/// Used by the CLI and by hosts that drive rendering themselves.
#[derive(Debug, Default, Clone)]
pub struct HeadlessBackend;

#[async_trait]
impl PlayerBackend for HeadlessBackend {
    async fn prepare(&self, _asset: &AssetHandle, _options: &PlayerOptions) -> Result<()> {
        Ok(())
    }

    async fn seek(&self, asset: &AssetHandle, position: f64, _tolerance: SeekTolerance) -> Result<f64> {
        let position = position.max(0.0);
        if asset.duration.is_zero() {
            Ok(position)
        } else {
            Ok(position.min(asset.duration_secs()))
        }
    }
}

/// Snapshot of a player's mutable state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackState {
    /// Playhead in seconds
    pub position: f64,
    pub muted: bool,
    pub playing: bool,
    /// Play rate (0 when paused)
    pub rate: f64,
    /// Currently on screen; exempt from LRU eviction
    pub displayed: bool,
    /// Surface disconnected; the presentation layer shows a placeholder
    pub detached: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            position: 0.0,
            muted: true,
            playing: false,
            rate: 0.0,
            displayed: false,
            detached: false,
        }
    }
}

/// Live player for one content id
pub struct PlayerHandle {
    content_id: ContentId,
    asset: Arc<AssetHandle>,
    options: PlayerOptions,
    backend: Arc<dyn PlayerBackend>,
    state: Mutex<PlaybackState>,
    status_tx: watch::Sender<PlayerStatus>,
}

impl PlayerHandle {
    /// Create a player bound to an asset
    pub fn new(
        content_id: ContentId,
        asset: Arc<AssetHandle>,
        options: PlayerOptions,
        backend: Arc<dyn PlayerBackend>,
    ) -> Self {
        let (status_tx, _) = watch::channel(PlayerStatus::Pending);
        Self {
            content_id,
            asset,
            options,
            backend,
            state: Mutex::new(PlaybackState::default()),
            status_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PlaybackState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn content_id(&self) -> &ContentId {
        &self.content_id
    }

    pub fn asset(&self) -> &Arc<AssetHandle> {
        &self.asset
    }

    pub fn options(&self) -> &PlayerOptions {
        &self.options
    }

    /// Copy of the current playback state
    pub fn snapshot(&self) -> PlaybackState {
        self.lock().clone()
    }

    pub fn position(&self) -> f64 {
        self.lock().position
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }

    pub fn is_muted(&self) -> bool {
        self.lock().muted
    }

    pub fn rate(&self) -> f64 {
        self.lock().rate
    }

    pub fn is_displayed(&self) -> bool {
        self.lock().displayed
    }

    pub fn is_detached(&self) -> bool {
        self.lock().detached
    }

    /// Start or resume playback
    pub fn play(&self) {
        let mut state = self.lock();
        state.playing = true;
        state.rate = 1.0;
    }

    pub fn pause(&self) {
        let mut state = self.lock();
        state.playing = false;
        state.rate = 0.0;
    }

    pub fn set_muted(&self, muted: bool) {
        self.lock().muted = muted;
    }

    /// Report the playhead (called by the renderer)
    pub fn update_position(&self, position: f64) {
        self.lock().position = position.max(0.0);
    }

    pub(crate) fn set_displayed(&self, displayed: bool) {
        self.lock().displayed = displayed;
    }

    pub(crate) fn set_detached(&self, detached: bool) {
        self.lock().detached = detached;
    }

    /// Seek through the backend and record the landed position
    pub async fn seek(&self, position: f64, tolerance: SeekTolerance) -> Result<f64> {
        let landed = self.backend.seek(&self.asset, position, tolerance).await?;
        self.lock().position = landed;
        debug!(content_id = %self.content_id, requested = position, landed, "Seek complete");
        Ok(landed)
    }

    pub(crate) async fn prepare_backend(&self) -> Result<()> {
        self.backend.prepare(&self.asset, &self.options).await
    }

    /// Current readiness
    pub fn status(&self) -> PlayerStatus {
        *self.status_tx.borrow()
    }

    /// Subscribe to readiness changes
    pub fn subscribe_status(&self) -> watch::Receiver<PlayerStatus> {
        self.status_tx.subscribe()
    }

    /// Wait until the player leaves `Pending`
    pub async fn wait_ready(&self) -> PlayerStatus {
        let mut rx = self.status_tx.subscribe();
        let status = match rx.wait_for(|status| *status != PlayerStatus::Pending).await {
            Ok(status) => *status,
            // The sender lives as long as the handle
            Err(_) => self.status(),
        };
        status
    }

    pub(crate) fn set_status(&self, status: PlayerStatus) {
        self.status_tx.send_replace(status);
    }
}

impl std::fmt::Debug for PlayerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerHandle")
            .field("content_id", &self.content_id)
            .field("source", &self.asset.source_key.as_str())
            .field("state", &self.snapshot())
            .field("status", &self.status())
            .finish()
    }
}
