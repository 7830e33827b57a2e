//! Priority load scheduling
//!
//! Gates asset loads through a fixed number of slots. Requests that cannot
//! start right away are queued with a release time staggered by priority
//! tier; a background dispatcher drains the queue as slots free up, the
//! stall cooldown ends and the burst throttle allows.

use crate::{asset_cache::AssetCache, stall::StallMonitor, types::*};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Loads allowed in flight at once
    pub max_concurrency: usize,
    /// Stagger per queue position for normal requests
    pub normal_delay: Duration,
    /// Stagger per queue position for low requests
    pub low_delay: Duration,
    /// Pause between two non-high dispatches
    pub dispatch_pause: Duration,
    /// Starts inside the burst window above which throttling applies
    pub burst_threshold: usize,
    pub burst_window: Duration,
    /// Minimum gap between starts while throttled
    pub burst_min_gap: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            normal_delay: Duration::from_millis(100),
            low_delay: Duration::from_millis(300),
            dispatch_pause: Duration::from_millis(100),
            burst_threshold: 10,
            burst_window: Duration::from_secs(60),
            burst_min_gap: Duration::from_millis(500),
        }
    }
}

/// A request to load one asset
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub content_id: ContentId,
    pub source_key: Url,
    pub priority: Priority,
    pub enqueued_at: Instant,
}

impl LoadRequest {
    pub fn new(content_id: impl Into<ContentId>, source_key: Url, priority: Priority) -> Self {
        Self {
            content_id: content_id.into(),
            source_key,
            priority,
            enqueued_at: Instant::now(),
        }
    }
}

/// What `enqueue` did with a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnqueueOutcome {
    /// Load started immediately
    Started,
    /// Queued behind other work
    Queued,
    /// Queued because a stall cooldown is active
    Deferred,
    /// Dropped by the burst throttle
    Throttled,
    /// Already pending or in flight
    Duplicate,
}

impl std::fmt::Display for EnqueueOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnqueueOutcome::Started => write!(f, "started"),
            EnqueueOutcome::Queued => write!(f, "queued"),
            EnqueueOutcome::Deferred => write!(f, "deferred"),
            EnqueueOutcome::Throttled => write!(f, "throttled"),
            EnqueueOutcome::Duplicate => write!(f, "duplicate"),
        }
    }
}

struct PendingLoad {
    request: LoadRequest,
    release_at: Instant,
}

struct ActiveLoad {
    ticket: u64,
    task: JoinHandle<()>,
}

/// Frees a load's slot when its task ends, however it ends
struct SlotGuard {
    scheduler: Weak<LoadScheduler>,
    content_id: ContentId,
    ticket: u64,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler.upgrade() {
            scheduler.finish(&self.content_id, self.ticket);
        }
    }
}

#[derive(Default)]
struct SchedulerState {
    pending: Vec<PendingLoad>,
    active: HashMap<ContentId, ActiveLoad>,
    recent_starts: VecDeque<Instant>,
    last_dispatch: Option<Instant>,
    next_ticket: u64,
}

impl SchedulerState {
    fn prune_starts(&mut self, now: Instant, window: Duration) {
        while let Some(first) = self.recent_starts.front() {
            if now.saturating_duration_since(*first) > window {
                self.recent_starts.pop_front();
            } else {
                break;
            }
        }
    }

    /// When the burst throttle lifts, if it is engaged
    fn throttled_until(&mut self, now: Instant, config: &SchedulerConfig) -> Option<Instant> {
        self.prune_starts(now, config.burst_window);
        if self.recent_starts.len() <= config.burst_threshold {
            return None;
        }
        let resume = *self.recent_starts.back()? + config.burst_min_gap;
        (resume > now).then_some(resume)
    }

    fn is_known(&self, content_id: &ContentId) -> bool {
        self.active.contains_key(content_id)
            || self.pending.iter().any(|p| &p.request.content_id == content_id)
    }
}

/// Concurrency-limited, priority-ordered asset load scheduler
pub struct LoadScheduler {
    config: SchedulerConfig,
    asset_cache: Arc<AssetCache>,
    monitor: Arc<StallMonitor>,
    state: Mutex<SchedulerState>,
    wake: Arc<Notify>,
    me: Weak<LoadScheduler>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl LoadScheduler {
    /// Create the scheduler and start its dispatcher
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: SchedulerConfig, asset_cache: Arc<AssetCache>, monitor: Arc<StallMonitor>) -> Arc<Self> {
        let scheduler = Arc::new_cyclic(|me| Self {
            config,
            asset_cache,
            monitor: Arc::clone(&monitor),
            state: Mutex::new(SchedulerState::default()),
            wake: Arc::new(Notify::new()),
            me: me.clone(),
            dispatcher: Mutex::new(None),
        });
        monitor.attach_scheduler(Arc::downgrade(&scheduler));

        let task = tokio::spawn(run_dispatcher(
            Arc::downgrade(&scheduler),
            Arc::clone(&scheduler.wake),
        ));
        *scheduler
            .dispatcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(task);

        info!(max_concurrency = scheduler.config.max_concurrency, "Load scheduler started");
        scheduler
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Submit a load request
    pub fn enqueue(&self, request: LoadRequest) -> EnqueueOutcome {
        let now = Instant::now();
        let cooldown = self.monitor.cooldown_until();
        let mut state = self.lock();

        if state.active.contains_key(&request.content_id) {
            return EnqueueOutcome::Duplicate;
        }
        if let Some(existing) = state
            .pending
            .iter_mut()
            .find(|p| p.request.content_id == request.content_id)
        {
            if request.priority.rank() > existing.request.priority.rank() {
                debug!(content_id = %request.content_id, priority = %request.priority, "Pending load upgraded");
                existing.request.priority = request.priority;
                if request.priority == Priority::High {
                    existing.release_at = now;
                }
                drop(state);
                self.wake.notify_one();
            }
            return EnqueueOutcome::Duplicate;
        }

        if state.throttled_until(now, &self.config).is_some() {
            warn!(content_id = %request.content_id, "Load burst throttled, request dropped");
            return EnqueueOutcome::Throttled;
        }

        let outcome = if cooldown.is_some() {
            EnqueueOutcome::Deferred
        } else if state.active.len() < self.config.max_concurrency {
            self.start_load(&mut state, request, now);
            return EnqueueOutcome::Started;
        } else {
            EnqueueOutcome::Queued
        };

        let position = state.pending.len() as u32;
        let stagger = match request.priority {
            Priority::High => Duration::ZERO,
            Priority::Normal => self.config.normal_delay * position,
            Priority::Low => self.config.low_delay * position,
        };
        debug!(
            content_id = %request.content_id,
            priority = %request.priority,
            position,
            outcome = %outcome,
            "Load queued"
        );
        state.pending.push(PendingLoad {
            request,
            release_at: now + stagger,
        });
        drop(state);
        self.wake.notify_one();
        outcome
    }

    fn start_load(&self, state: &mut SchedulerState, request: LoadRequest, now: Instant) {
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        let cache = Arc::clone(&self.asset_cache);
        let content_id = request.content_id.clone();
        let source_key = request.source_key;
        let waited_ms = now.saturating_duration_since(request.enqueued_at).as_millis() as u64;
        let slot = SlotGuard {
            scheduler: self.me.clone(),
            content_id: content_id.clone(),
            ticket,
        };

        let task = tokio::spawn(async move {
            let asset = cache.get_or_load(&source_key).await;
            debug!(content_id = %slot.content_id, degraded = asset.degraded, "Scheduled load finished");
            drop(slot);
        });

        debug!(content_id = %content_id, priority = %request.priority, waited_ms, "Load started");
        state.active.insert(content_id, ActiveLoad { ticket, task });
        state.recent_starts.push_back(now);
    }

    fn finish(&self, content_id: &ContentId, ticket: u64) {
        {
            let mut state = self.lock();
            if state
                .active
                .get(content_id)
                .is_some_and(|active| active.ticket == ticket)
            {
                state.active.remove(content_id);
            }
        }
        self.wake.notify_one();
    }

    /// Start every queued load that is allowed to start now
    ///
    /// Returns when the dispatcher should look again, or `None` to wait for
    /// the next wake-up.
    fn dispatch_due(&self) -> Option<Instant> {
        let now = Instant::now();
        let cooldown = self.monitor.cooldown_until();
        let mut state = self.lock();

        loop {
            if state.pending.is_empty() {
                return None;
            }
            if let Some(until) = cooldown {
                return Some(until);
            }
            if state.active.len() >= self.config.max_concurrency {
                return None;
            }
            if let Some(until) = state.throttled_until(now, &self.config) {
                return Some(until);
            }

            let next = state
                .pending
                .iter()
                .enumerate()
                .filter(|(_, p)| p.release_at <= now)
                .max_by_key(|(index, p)| (p.request.priority.rank(), std::cmp::Reverse(*index)))
                .map(|(index, p)| (index, p.request.priority));

            let Some((index, priority)) = next else {
                return state.pending.iter().map(|p| p.release_at).min();
            };

            if priority != Priority::High {
                if let Some(last) = state.last_dispatch {
                    let resume = last + self.config.dispatch_pause;
                    if resume > now {
                        return Some(resume);
                    }
                }
            }

            let pending = state.pending.remove(index);
            self.start_load(&mut state, pending.request, now);
            state.last_dispatch = Some(now);
        }
    }

    /// Drop a pending request or abort an in-flight load
    ///
    /// Returns false for unknown or already completed ids.
    pub fn cancel(&self, content_id: &ContentId) -> bool {
        let (cancelled, aborted) = {
            let mut state = self.lock();
            if let Some(index) = state
                .pending
                .iter()
                .position(|p| &p.request.content_id == content_id)
            {
                state.pending.remove(index);
                (true, None)
            } else if let Some(active) = state.active.remove(content_id) {
                (true, Some(active))
            } else {
                (false, None)
            }
        };
        if let Some(active) = aborted {
            active.task.abort();
        }

        if cancelled {
            debug!(content_id = %content_id, "Load cancelled");
            self.wake.notify_one();
        }
        cancelled
    }

    /// Drop every pending request and abort every in-flight load
    pub fn cancel_all(&self) -> usize {
        let (pending, active) = {
            let mut state = self.lock();
            let pending = state.pending.len();
            state.pending.clear();
            let active: Vec<_> = state.active.drain().collect();
            (pending, active)
        };
        for (_, load) in &active {
            load.task.abort();
        }
        let cancelled = pending + active.len();
        info!(cancelled, "All loads cancelled");
        self.wake.notify_one();
        cancelled
    }

    pub fn is_pending(&self, content_id: &ContentId) -> bool {
        self.lock()
            .pending
            .iter()
            .any(|p| &p.request.content_id == content_id)
    }

    pub fn is_active(&self, content_id: &ContentId) -> bool {
        self.lock().active.contains_key(content_id)
    }

    /// Pending or in flight
    pub fn is_scheduled(&self, content_id: &ContentId) -> bool {
        self.lock().is_known(content_id)
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn max_concurrency(&self) -> usize {
        self.config.max_concurrency
    }

    /// Stop the dispatcher and abort all loads
    pub fn shutdown(&self) {
        self.cancel_all();
        if let Some(task) = self
            .dispatcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            task.abort();
        }
        info!("Load scheduler stopped");
    }
}

impl Drop for LoadScheduler {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        for (_, load) in state.active.drain() {
            load.task.abort();
        }
        if let Some(task) = self
            .dispatcher
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            task.abort();
        }
    }
}

async fn run_dispatcher(scheduler: Weak<LoadScheduler>, wake: Arc<Notify>) {
    loop {
        let next = match scheduler.upgrade() {
            Some(scheduler) => scheduler.dispatch_due(),
            None => break,
        };

        match next {
            Some(deadline) => {
                tokio::select! {
                    _ = wake.notified() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => wake.notified().await,
        }
    }
    debug!("Load dispatcher exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset_cache::AssetCacheConfig;
    use crate::manifest::{AssetLoader, ResourceMetadata};
    use crate::player::HeadlessBackend;
    use crate::player_cache::{PlayerCache, PlayerCacheConfig};
    use crate::stall::StallConfig;
    use crate::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Loader that records concurrency and start times; paths containing
    /// "panic" blow up mid-load
    #[derive(Default)]
    struct SlowLoader {
        delay: Duration,
        current: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
        starts: Mutex<Vec<(String, Instant)>>,
    }

    impl SlowLoader {
        fn order(&self) -> Vec<String> {
            self.starts.lock().unwrap().iter().map(|(path, _)| path.clone()).collect()
        }

        fn started_at(&self, path: &str) -> Instant {
            self.starts
                .lock()
                .unwrap()
                .iter()
                .find(|(p, _)| p == path)
                .map(|(_, at)| *at)
                .unwrap()
        }
    }

    #[async_trait]
    impl AssetLoader for SlowLoader {
        async fn exists(&self, _url: &Url) -> Result<bool> {
            Ok(false)
        }

        async fn load(&self, url: &Url) -> Result<ResourceMetadata> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.starts.lock().unwrap().push((url.path().to_string(), Instant::now()));
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            if url.path().contains("panic") {
                panic!("decoder blew up on {}", url);
            }
            Ok(ResourceMetadata {
                duration: Duration::from_secs(10),
                natural_size: None,
            })
        }
    }

    struct Fixture {
        loader: Arc<SlowLoader>,
        assets: Arc<AssetCache>,
        monitor: Arc<StallMonitor>,
        scheduler: Arc<LoadScheduler>,
    }

    fn fixture(config: SchedulerConfig) -> Fixture {
        fixture_with_delay(config, Duration::from_secs(1))
    }

    fn fixture_with_delay(config: SchedulerConfig, delay: Duration) -> Fixture {
        let loader = Arc::new(SlowLoader {
            delay,
            ..Default::default()
        });
        let assets = Arc::new(AssetCache::new(
            AssetCacheConfig::default(),
            Arc::clone(&loader) as Arc<dyn AssetLoader>,
        ));
        let players = Arc::new(PlayerCache::new(PlayerCacheConfig::default(), Arc::new(HeadlessBackend)));
        let monitor = Arc::new(StallMonitor::new(StallConfig::default(), Arc::clone(&assets), players));
        let scheduler = LoadScheduler::new(config, Arc::clone(&assets), Arc::clone(&monitor));
        Fixture {
            loader,
            assets,
            monitor,
            scheduler,
        }
    }

    fn request(name: &str, priority: Priority) -> LoadRequest {
        let url = Url::parse(&format!("https://video.example.com/{}.mp4", name)).unwrap();
        LoadRequest::new(name, url, priority)
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_limit_with_cancel() {
        let f = fixture(SchedulerConfig {
            max_concurrency: 2,
            ..Default::default()
        });

        let outcomes: Vec<_> = (0..10)
            .map(|n| f.scheduler.enqueue(request(&format!("v{}", n), Priority::Low)))
            .collect();
        assert_eq!(&outcomes[..2], &[EnqueueOutcome::Started, EnqueueOutcome::Started]);
        assert!(outcomes[2..].iter().all(|o| *o == EnqueueOutcome::Queued));
        assert_eq!(f.scheduler.pending_count(), 8);

        assert!(f.scheduler.cancel(&ContentId::from("v9")));
        assert!(!f.scheduler.cancel(&ContentId::from("unknown")));

        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(f.loader.calls.load(Ordering::SeqCst), 9);
        assert!(f.loader.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(f.scheduler.active_count(), 0);
        assert_eq!(f.scheduler.pending_count(), 0);
        assert_eq!(f.assets.len(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_high_priority_jumps_queue() {
        let f = fixture(SchedulerConfig {
            max_concurrency: 1,
            ..Default::default()
        });

        assert_eq!(f.scheduler.enqueue(request("a", Priority::Normal)), EnqueueOutcome::Started);
        assert_eq!(f.scheduler.enqueue(request("b", Priority::Low)), EnqueueOutcome::Queued);
        assert_eq!(f.scheduler.enqueue(request("c", Priority::High)), EnqueueOutcome::Queued);

        tokio::time::sleep(Duration::from_secs(10)).await;
        let order = f.loader.order();
        assert_eq!(order, vec!["/a.mp4", "/c.mp4", "/b.mp4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_upgrades_priority() {
        let f = fixture(SchedulerConfig {
            max_concurrency: 1,
            ..Default::default()
        });

        f.scheduler.enqueue(request("a", Priority::Low));
        assert_eq!(f.scheduler.enqueue(request("a", Priority::High)), EnqueueOutcome::Duplicate);
        f.scheduler.enqueue(request("b", Priority::Low));
        f.scheduler.enqueue(request("c", Priority::Low));
        assert_eq!(f.scheduler.enqueue(request("c", Priority::High)), EnqueueOutcome::Duplicate);
        assert!(f.scheduler.is_pending(&ContentId::from("c")));

        tokio::time::sleep(Duration::from_secs(10)).await;
        let order = f.loader.order();
        assert_eq!(order, vec!["/a.mp4", "/c.mp4", "/b.mp4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_throttle_drops_requests() {
        let f = fixture(SchedulerConfig {
            max_concurrency: 10,
            burst_threshold: 2,
            ..Default::default()
        });

        for name in ["a", "b", "c"] {
            assert_eq!(f.scheduler.enqueue(request(name, Priority::Normal)), EnqueueOutcome::Started);
        }
        assert_eq!(f.scheduler.enqueue(request("d", Priority::Normal)), EnqueueOutcome::Throttled);
        assert!(!f.scheduler.is_scheduled(&ContentId::from("d")));

        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(f.scheduler.enqueue(request("d", Priority::Normal)), EnqueueOutcome::Started);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_defers_until_it_ends() {
        let f = fixture(SchedulerConfig::default());
        f.monitor.record_stall();

        assert_eq!(f.scheduler.enqueue(request("a", Priority::High)), EnqueueOutcome::Deferred);
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(f.loader.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(f.loader.calls.load(Ordering::SeqCst), 1);
        assert!(f.assets.contains(&request("a", Priority::High).source_key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_active_frees_slot() {
        let f = fixture(SchedulerConfig {
            max_concurrency: 1,
            ..Default::default()
        });
        f.scheduler.enqueue(request("a", Priority::High));
        f.scheduler.enqueue(request("b", Priority::High));
        tokio::task::yield_now().await;

        assert!(f.scheduler.cancel(&ContentId::from("a")));
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(!f.assets.contains(&request("a", Priority::High).source_key));
        assert!(f.assets.contains(&request("b", Priority::High).source_key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_and_status() {
        let f = fixture(SchedulerConfig {
            max_concurrency: 2,
            ..Default::default()
        });
        for n in 0..5 {
            f.scheduler.enqueue(request(&format!("v{}", n), Priority::Normal));
        }
        let status = f.monitor.status();
        assert_eq!(status.active_loads, 2);
        assert_eq!(status.max_loads, 2);
        assert!(status.under_load);

        assert_eq!(f.scheduler.cancel_all(), 5);
        assert_eq!(f.scheduler.active_count(), 0);
        assert_eq!(f.scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tier_stagger_and_dispatch_pause() {
        let f = fixture_with_delay(
            SchedulerConfig {
                max_concurrency: 2,
                ..Default::default()
            },
            Duration::from_millis(10),
        );
        let t0 = Instant::now();

        assert_eq!(f.scheduler.enqueue(request("a", Priority::Normal)), EnqueueOutcome::Started);
        assert_eq!(f.scheduler.enqueue(request("b", Priority::Normal)), EnqueueOutcome::Started);
        // Positions 0..3 in the queue
        for (name, priority) in [
            ("c", Priority::Normal),
            ("d", Priority::Normal),
            ("e", Priority::Low),
            ("f", Priority::Low),
        ] {
            assert_eq!(f.scheduler.enqueue(request(name, priority)), EnqueueOutcome::Queued);
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(f.loader.order(), vec!["/a.mp4", "/b.mp4", "/c.mp4", "/d.mp4", "/e.mp4", "/f.mp4"]);

        let at = |name: &str| f.loader.started_at(&format!("/{}.mp4", name)) - t0;
        assert_eq!(at("a"), Duration::ZERO);
        // Position 0 is released at once and runs when a slot frees
        assert_eq!(at("c"), Duration::from_millis(10));
        // Released at 100ms but held until 100ms after the previous dispatch
        assert_eq!(at("d"), Duration::from_millis(110));
        assert!(at("d") - at("c") >= f.scheduler.config().dispatch_pause);
        // Low tier: position x 300ms
        assert_eq!(at("e"), Duration::from_millis(600));
        assert_eq!(at("f"), Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_high_is_not_staggered() {
        let f = fixture_with_delay(
            SchedulerConfig {
                max_concurrency: 1,
                ..Default::default()
            },
            Duration::from_millis(10),
        );
        let t0 = Instant::now();

        f.scheduler.enqueue(request("a", Priority::Normal));
        f.scheduler.enqueue(request("b", Priority::Low));
        f.scheduler.enqueue(request("c", Priority::Low));
        assert_eq!(f.scheduler.enqueue(request("h", Priority::High)), EnqueueOutcome::Queued);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(f.loader.order()[1], "/h.mp4");
        assert_eq!(f.loader.started_at("/h.mp4") - t0, Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_load_releases_slot() {
        let f = fixture_with_delay(
            SchedulerConfig {
                max_concurrency: 1,
                ..Default::default()
            },
            Duration::from_millis(50),
        );

        assert_eq!(f.scheduler.enqueue(request("panic", Priority::High)), EnqueueOutcome::Started);
        assert_eq!(f.scheduler.enqueue(request("good", Priority::Normal)), EnqueueOutcome::Queued);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(f.scheduler.active_count(), 0);
        assert_eq!(f.scheduler.pending_count(), 0);
        assert!(f.assets.contains(&request("good", Priority::Normal).source_key));
        assert!(!f.assets.contains(&request("panic", Priority::High).source_key));
        assert_eq!(f.assets.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_loads_clear_in_flight() {
        let f = fixture(SchedulerConfig {
            max_concurrency: 5,
            ..Default::default()
        });
        for n in 0..5 {
            let outcome = f.scheduler.enqueue(request(&format!("v{}", n), Priority::High));
            assert_eq!(outcome, EnqueueOutcome::Started);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(f.assets.in_flight(), 5);

        for n in 0..5 {
            assert!(f.scheduler.cancel(&ContentId::from(format!("v{}", n))));
        }
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(f.scheduler.active_count(), 0);
        assert_eq!(f.assets.in_flight(), 0);
        assert!(f.assets.is_empty());
    }
}
