//! Background/foreground handling
//!
//! When the app leaves the foreground every on-screen player is paused and
//! its surface detached, remembering where it was. Coming back restores the
//! position exactly and resumes only what the coordinator still wants
//! playing. After a long absence every cached player is rebuilt the same way.

use crate::{coordinator::PlaybackCoordinator, player::PlayerHandle, player_cache::PlayerCache, types::*};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Playback state captured when a surface is detached
#[derive(Debug, Clone, PartialEq)]
pub struct DetachedState {
    pub content_id: ContentId,
    pub cached_position: f64,
    pub was_playing: bool,
    pub original_muted: bool,
    pub detached_at: Instant,
}

impl DetachedState {
    fn capture(handle: &PlayerHandle, now: Instant) -> Self {
        let snapshot = handle.snapshot();
        Self {
            content_id: handle.content_id().clone(),
            cached_position: snapshot.position,
            was_playing: snapshot.playing,
            original_muted: snapshot.muted,
            detached_at: now,
        }
    }
}

/// Summary of a foreground transition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReattachReport {
    /// Players reattached at their cached position
    pub restored: usize,
    /// Restored players that resumed playing
    pub resumed: usize,
    /// Players gone from the cache, not ready, or whose restore seek failed
    pub skipped: usize,
    /// Whether the absence counted as extended idle
    pub extended_idle: bool,
}

#[derive(Default)]
struct GuardState {
    detached: HashMap<ContentId, DetachedState>,
    backgrounded_at: Option<Instant>,
}

/// Detaches and restores players across app lifecycle transitions
pub struct LifecycleGuard {
    player_cache: Arc<PlayerCache>,
    coordinator: Arc<PlaybackCoordinator>,
    extended_idle: Duration,
    state: Mutex<GuardState>,
}

impl LifecycleGuard {
    pub fn new(
        player_cache: Arc<PlayerCache>,
        coordinator: Arc<PlaybackCoordinator>,
        extended_idle: Duration,
    ) -> Self {
        Self {
            player_cache,
            coordinator,
            extended_idle,
            state: Mutex::new(GuardState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pause and detach every displayed player
    ///
    /// Returns how many players were detached.
    pub fn on_background_enter(&self) -> usize {
        let now = Instant::now();
        let handles = self.player_cache.displayed_handles();

        let mut state = self.lock();
        state.backgrounded_at.get_or_insert(now);

        let mut detached = 0;
        for handle in handles {
            if state.detached.contains_key(handle.content_id()) {
                continue;
            }
            let captured = DetachedState::capture(&handle, now);
            handle.pause();
            handle.set_detached(true);
            debug!(
                content_id = %captured.content_id,
                position = captured.cached_position,
                was_playing = captured.was_playing,
                "Player detached"
            );
            state.detached.insert(captured.content_id.clone(), captured);
            detached += 1;
        }

        info!(detached, "Entered background");
        detached
    }

    /// Reattach detached players, restore their position and resume
    /// those the coordinator still wants playing
    #[instrument(skip(self))]
    pub async fn on_foreground_enter(&self) -> ReattachReport {
        let now = Instant::now();
        let (mut detached, backgrounded_at) = {
            let mut state = self.lock();
            (std::mem::take(&mut state.detached), state.backgrounded_at.take())
        };

        let away = backgrounded_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or_default();
        let mut report = ReattachReport {
            extended_idle: backgrounded_at.is_some() && away >= self.extended_idle,
            ..Default::default()
        };

        if report.extended_idle {
            info!(away_s = away.as_secs(), "Extended idle, rebuilding every cached player");
            for handle in self.player_cache.handles() {
                if detached.contains_key(handle.content_id()) {
                    continue;
                }
                let captured = DetachedState::capture(&handle, now);
                handle.pause();
                handle.set_detached(true);
                detached.insert(captured.content_id.clone(), captured);
            }
        }

        let mut states: Vec<_> = detached.into_values().collect();
        states.sort_by(|a, b| a.content_id.cmp(&b.content_id));

        for captured in states {
            let Some(handle) = self.player_cache.get(&captured.content_id) else {
                debug!(content_id = %captured.content_id, "Detached player no longer cached");
                report.skipped += 1;
                continue;
            };

            handle.set_detached(false);
            if !handle.status().is_ready() {
                // Rebuilt on next prepare
                handle.set_status(PlayerStatus::Pending);
                debug!(content_id = %captured.content_id, "Player not ready, marked for reload");
                report.skipped += 1;
                continue;
            }

            handle.set_muted(captured.original_muted);
            if let Err(e) = handle
                .seek(captured.cached_position, SeekTolerance::Exact)
                .await
            {
                // Left paused where it is
                warn!(content_id = %captured.content_id, error = %e, "Restore seek failed");
                report.skipped += 1;
                continue;
            }

            if captured.was_playing && self.wants_playing(&handle) {
                handle.play();
                report.resumed += 1;
            }
            report.restored += 1;
        }

        info!(
            restored = report.restored,
            resumed = report.resumed,
            skipped = report.skipped,
            "Entered foreground"
        );
        report
    }

    /// Grouped players follow the coordinator; ungrouped ones (the
    /// full-screen viewer) resume while displayed
    fn wants_playing(&self, handle: &PlayerHandle) -> bool {
        let content_id = handle.content_id();
        if self.coordinator.tracks(content_id) {
            self.coordinator.is_current(content_id)
        } else {
            handle.is_displayed()
        }
    }

    /// Players currently detached
    pub fn detached_count(&self) -> usize {
        self.lock().detached.len()
    }

    pub fn detached_state(&self, content_id: &ContentId) -> Option<DetachedState> {
        self.lock().detached.get(content_id).cloned()
    }

    pub fn is_backgrounded(&self) -> bool {
        self.lock().backgrounded_at.is_some()
    }
}
