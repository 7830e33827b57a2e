//! UI-thread stall monitoring
//!
//! A repeating probe records when it last ran. If the gap between two ticks
//! exceeds the threshold the thread was blocked: new loads are held back for
//! a cooldown, and repeated stalls in a short window trigger an emergency
//! purge of every cache.
//!
//! The probe must run on the UI-serving runtime to observe it; drive it with
//! [`StallMonitor::tick`] from the host's frame loop or spawn it with
//! [`StallMonitor::spawn_probe`] on that runtime.

use crate::{asset_cache::AssetCache, player_cache::PlayerCache, scheduler::LoadScheduler};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

/// Stall monitor configuration
#[derive(Debug, Clone)]
pub struct StallConfig {
    /// Probe interval
    pub probe_interval: Duration,
    /// Gap between ticks that counts as a stall
    pub threshold: Duration,
    /// Admission cooldown after a stall
    pub cooldown: Duration,
    /// Stalls inside the window that trigger an emergency purge
    pub escalation_count: usize,
    /// Rolling escalation window
    pub escalation_window: Duration,
}

impl Default for StallConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_millis(50),
            threshold: Duration::from_millis(100),
            cooldown: Duration::from_secs(2),
            escalation_count: 3,
            escalation_window: Duration::from_secs(5),
        }
    }
}

/// Result of one probe tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Tick arrived on time
    Healthy,
    /// Tick arrived late; cooldown started
    Stall { gap: Duration },
    /// Too many stalls; every cache was purged
    Emergency,
}

/// Diagnostics snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StallStatus {
    pub active_loads: usize,
    pub max_loads: usize,
    pub pending_loads: usize,
    /// Cooling down or out of load slots
    pub under_load: bool,
    pub cooling_down: bool,
    pub total_stalls: u64,
    pub emergencies: u64,
    pub since_last_stall: Option<Duration>,
}

#[derive(Default)]
struct MonitorState {
    last_tick: Option<Instant>,
    recent: VecDeque<Instant>,
    total_stalls: u64,
    emergencies: u64,
    last_stall: Option<Instant>,
    cooldown_until: Option<Instant>,
}

/// Watches the UI-serving thread for stalls
pub struct StallMonitor {
    config: StallConfig,
    asset_cache: Arc<AssetCache>,
    player_cache: Arc<PlayerCache>,
    scheduler: OnceLock<Weak<LoadScheduler>>,
    state: Mutex<MonitorState>,
}

impl StallMonitor {
    pub fn new(config: StallConfig, asset_cache: Arc<AssetCache>, player_cache: Arc<PlayerCache>) -> Self {
        Self {
            config,
            asset_cache,
            player_cache,
            scheduler: OnceLock::new(),
            state: Mutex::new(MonitorState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn attach_scheduler(&self, scheduler: Weak<LoadScheduler>) {
        if self.scheduler.set(scheduler).is_err() {
            warn!("Stall monitor already has a scheduler attached");
        }
    }

    fn scheduler(&self) -> Option<Arc<LoadScheduler>> {
        self.scheduler.get().and_then(Weak::upgrade)
    }

    pub fn config(&self) -> &StallConfig {
        &self.config
    }

    /// Record a probe tick at the current time
    pub fn tick(&self) -> ProbeOutcome {
        self.tick_at(Instant::now())
    }

    /// Record a probe tick at `now`
    pub fn tick_at(&self, now: Instant) -> ProbeOutcome {
        let gap = {
            let mut state = self.lock();
            let gap = state.last_tick.map(|last| now.saturating_duration_since(last));
            state.last_tick = Some(now);
            gap
        };

        match gap {
            Some(gap) if gap > self.config.threshold => {
                warn!(gap_ms = gap.as_millis() as u64, "UI thread stall detected");
                if self.record_stall_at(now) {
                    ProbeOutcome::Emergency
                } else {
                    ProbeOutcome::Stall { gap }
                }
            }
            _ => ProbeOutcome::Healthy,
        }
    }

    /// Record a stall observed by other means; returns true if it escalated
    pub fn record_stall(&self) -> bool {
        self.record_stall_at(Instant::now())
    }

    fn record_stall_at(&self, now: Instant) -> bool {
        let escalate = {
            let mut state = self.lock();
            state.total_stalls += 1;
            state.last_stall = Some(now);
            state.cooldown_until = Some(now + self.config.cooldown);
            state.recent.push_back(now);
            while let Some(first) = state.recent.front() {
                if now.saturating_duration_since(*first) > self.config.escalation_window {
                    state.recent.pop_front();
                } else {
                    break;
                }
            }
            state.recent.len() >= self.config.escalation_count
        };

        if escalate {
            self.emergency_cleanup("repeated UI stalls");
        }
        escalate
    }

    /// Cancel every load and purge both caches
    ///
    /// Also the response to an OS memory-pressure signal.
    pub fn emergency_cleanup(&self, reason: &str) {
        error!(reason, "Emergency cleanup");

        if let Some(scheduler) = self.scheduler() {
            scheduler.cancel_all();
        }
        self.player_cache.purge_all();
        self.asset_cache.purge_all();

        let mut state = self.lock();
        state.recent.clear();
        state.emergencies += 1;
    }

    /// End of the admission cooldown, if one is active
    pub fn cooldown_until(&self) -> Option<Instant> {
        let now = Instant::now();
        self.lock().cooldown_until.filter(|until| *until > now)
    }

    pub fn is_cooling_down(&self) -> bool {
        self.cooldown_until().is_some()
    }

    pub fn total_stalls(&self) -> u64 {
        self.lock().total_stalls
    }

    /// Diagnostics snapshot
    pub fn status(&self) -> StallStatus {
        let now = Instant::now();
        let (cooling_down, total_stalls, emergencies, since_last_stall) = {
            let state = self.lock();
            (
                state.cooldown_until.is_some_and(|until| until > now),
                state.total_stalls,
                state.emergencies,
                state.last_stall.map(|at| now.saturating_duration_since(at)),
            )
        };

        let (active_loads, pending_loads, max_loads) = match self.scheduler() {
            Some(scheduler) => (
                scheduler.active_count(),
                scheduler.pending_count(),
                scheduler.max_concurrency(),
            ),
            None => (0, 0, 0),
        };

        StallStatus {
            active_loads,
            max_loads,
            pending_loads,
            under_load: cooling_down || (max_loads > 0 && active_loads >= max_loads),
            cooling_down,
            total_stalls,
            emergencies,
            since_last_stall,
        }
    }

    /// Spawn the repeating probe on the current runtime
    ///
    /// The task stops on its own once the monitor is dropped.
    pub fn spawn_probe(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = Arc::downgrade(self);
        let period = self.config.probe_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(monitor) = monitor.upgrade() else {
                    debug!("Stall monitor dropped, probe exiting");
                    break;
                };
                monitor.tick();
            }
        })
    }
}
