//! Integration tests for Feedplay Core

use async_trait::async_trait;
use feedplay_core::{
    AssetCache, AssetCacheConfig, AssetHandle, AssetLoader, ContentId, EnqueueOutcome, FeedConfig, GroupId,
    HeadlessBackend, ManifestKind, MediaFeed, PlaybackCoordinator, PlaybackMode, PlaybackSequence,
    PlayerCache, PlayerCacheConfig, PlayerStatus, Priority, ResourceMetadata, Result,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

// =============================================================================
// Helpers
// =============================================================================

/// Loader serving a fixed set of manifests, slowly, counting what it does
#[derive(Default)]
struct CdnLoader {
    manifests: HashSet<String>,
    load_delay: Duration,
    loads: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl CdnLoader {
    fn with_manifests(manifests: &[&str], load_delay: Duration) -> Self {
        Self {
            manifests: manifests.iter().map(|m| m.to_string()).collect(),
            load_delay,
            ..Default::default()
        }
    }
}

#[async_trait]
impl AssetLoader for CdnLoader {
    async fn exists(&self, url: &Url) -> Result<bool> {
        Ok(self.manifests.contains(url.as_str()))
    }

    async fn load(&self, _url: &Url) -> Result<ResourceMetadata> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.load_delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(ResourceMetadata {
            duration: Duration::from_secs(60),
            natural_size: None,
        })
    }
}

fn video(n: usize) -> Url {
    Url::parse(&format!("https://cdn.example.com/videos/{}/", n)).unwrap()
}

fn ids(names: &[&str]) -> Vec<ContentId> {
    names.iter().map(|n| ContentId::from(*n)).collect()
}

fn feed_with(config: FeedConfig, loader: Arc<CdnLoader>) -> MediaFeed {
    MediaFeed::new(config, loader, Arc::new(HeadlessBackend)).unwrap()
}

// =============================================================================
// Asset Cache
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_share_one_load() {
    let loader = Arc::new(CdnLoader::with_manifests(&[], Duration::from_millis(500)));
    let cache = Arc::new(AssetCache::new(AssetCacheConfig::default(), loader.clone()));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_or_load(&video(1)).await })
        })
        .collect();

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap());
    }

    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_manifest_fallback_order() {
    let multi = "https://cdn.example.com/videos/1/master.m3u8";
    let single = "https://cdn.example.com/videos/2/playlist.m3u8";
    let loader = Arc::new(CdnLoader::with_manifests(&[multi, single], Duration::ZERO));
    let cache = AssetCache::new(AssetCacheConfig::default(), loader);

    let first = cache.get_or_load(&video(1)).await;
    assert_eq!(first.kind, ManifestKind::MultiVariant);
    assert_eq!(first.resolved.as_str(), multi);

    let second = cache.get_or_load(&video(2)).await;
    assert_eq!(second.kind, ManifestKind::SingleVariant);
    assert_eq!(second.resolved.as_str(), single);

    let third = cache.get_or_load(&video(3)).await;
    assert_eq!(third.kind, ManifestKind::Direct);
    assert_eq!(third.resolved, video(3));
}

// =============================================================================
// Player Cache
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_player_cache_capacity_spares_displayed() {
    let loader = Arc::new(CdnLoader::default());
    let assets = AssetCache::new(AssetCacheConfig::default(), loader);
    let players = PlayerCache::new(
        PlayerCacheConfig {
            capacity: 15,
            ..Default::default()
        },
        Arc::new(HeadlessBackend),
    );

    for n in 0..3 {
        let id = ContentId::new(format!("shown-{}", n));
        players.get_or_create(&id, assets.get_or_load(&video(100 + n)).await);
        players.set_displayed(&id, true);
        tokio::time::advance(Duration::from_millis(10)).await;
    }
    for n in 0..20 {
        let id = ContentId::new(format!("post-{}", n));
        players.get_or_create(&id, assets.get_or_load(&video(n)).await);
        tokio::time::advance(Duration::from_millis(10)).await;
    }

    assert_eq!(players.evictable_len(), 15);
    assert_eq!(players.len(), 18);
    assert!(players.contains(&ContentId::from("shown-0")));
    assert!(!players.contains(&ContentId::from("post-0")));
    assert!(players.contains(&ContentId::from("post-19")));
}

// =============================================================================
// Playback Coordination
// =============================================================================

#[test]
fn test_sequential_group_has_one_current() {
    let names = ["a", "b", "c", "d"];
    let mut sequence = PlaybackSequence::new(ids(&names));
    while sequence.mode() == PlaybackMode::Sequential {
        let current: Vec<_> = names
            .iter()
            .filter(|n| sequence.should_play(&ContentId::from(**n)))
            .collect();
        assert_eq!(current.len(), 1);
        sequence.on_item_finished();
    }
}

#[test]
fn test_finishing_chain_ends_idle() {
    let coordinator = PlaybackCoordinator::new();
    let group = GroupId::from("cell");
    coordinator.setup(&group, ids(&["a", "b", "c", "d"]));

    let mut played = vec![coordinator.current(&group).unwrap()];
    for _ in 0..3 {
        assert_eq!(coordinator.on_item_finished(&group), PlaybackMode::Sequential);
        played.push(coordinator.current(&group).unwrap());
    }
    assert_eq!(played, ids(&["a", "b", "c", "d"]));

    assert_eq!(coordinator.on_item_finished(&group), PlaybackMode::Idle);
    assert_eq!(coordinator.current(&group), None);
    assert_eq!(coordinator.on_item_finished(&group), PlaybackMode::Idle);

    coordinator.restart(&group);
    assert_eq!(coordinator.current(&group), Some(ContentId::from("a")));
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_background_round_trip_restores_position() {
    let feed = feed_with(FeedConfig::default(), Arc::new(CdnLoader::default()));
    let id = ContentId::from("a");
    let player = feed.player_for(&id, &video(1)).await.unwrap();
    assert_eq!(player.status(), PlayerStatus::Ready);

    feed.coordinator().setup(&GroupId::from("cell"), vec![id.clone()]);
    feed.player_cache().set_displayed(&id, true);
    player.play();
    player.update_position(12.5);

    assert_eq!(feed.on_background_enter(), 1);
    assert!(!player.is_playing());
    assert!(player.is_detached());

    tokio::time::advance(Duration::from_secs(10)).await;
    let report = feed.on_foreground_enter().await;

    assert_eq!(report.resumed, 1);
    assert_eq!(player.position(), 12.5);
    assert!(player.is_playing());
    assert!(!player.is_detached());
}

// =============================================================================
// Stall Monitoring
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_repeated_stalls_purge_everything() {
    let loader = Arc::new(CdnLoader::with_manifests(&[], Duration::from_secs(2)));
    let feed = feed_with(FeedConfig::default(), loader);

    let player = feed
        .player_cache()
        .get_or_create(&ContentId::from("a"), Arc::new(AssetHandle::degraded(video(1))));
    player.play();
    feed.preload("b", video(2), Priority::Normal);
    assert_eq!(feed.status().stall.active_loads, 1);

    for _ in 0..3 {
        feed.monitor().record_stall();
        tokio::time::advance(Duration::from_millis(100)).await;
    }

    let status = feed.status();
    assert_eq!(status.cached_assets, 0);
    assert_eq!(status.cached_players, 0);
    assert_eq!(status.stall.active_loads, 0);
    assert_eq!(status.stall.pending_loads, 0);
    assert_eq!(status.stall.total_stalls, 3);
    assert!(!player.is_playing());
}

// =============================================================================
// Load Scheduling
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_two_slots_ten_low_requests() {
    let loader = Arc::new(CdnLoader::with_manifests(&[], Duration::from_secs(1)));
    let feed = feed_with(
        FeedConfig {
            max_concurrent_loads: 2,
            ..Default::default()
        },
        Arc::clone(&loader),
    );

    let outcomes: Vec<_> = (0..10)
        .map(|n| feed.preload(format!("post-{}", n), video(n), Priority::Low))
        .collect();
    assert_eq!(
        outcomes.iter().filter(|o| **o == EnqueueOutcome::Started).count(),
        2
    );
    assert!(feed.cancel_preload(&ContentId::from("post-5")));

    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(loader.loads.load(Ordering::SeqCst), 9);
    assert!(loader.peak.load(Ordering::SeqCst) <= 2);
    assert!(!feed.asset_cache().contains(&video(5)));
    assert_eq!(feed.asset_cache().len(), 9);
    feed.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_preloads_leave_nothing_in_flight() {
    let loader = Arc::new(CdnLoader::with_manifests(&[], Duration::from_secs(5)));
    let feed = feed_with(
        FeedConfig {
            max_concurrent_loads: 5,
            ..Default::default()
        },
        Arc::clone(&loader),
    );

    for n in 0..5 {
        assert_eq!(
            feed.preload(format!("post-{}", n), video(n), Priority::High),
            EnqueueOutcome::Started
        );
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(feed.status().loads_in_flight, 5);

    for n in 0..5 {
        assert!(feed.cancel_preload(&ContentId::from(format!("post-{}", n))));
    }
    tokio::time::sleep(Duration::from_secs(60)).await;

    let status = feed.status();
    assert_eq!(status.loads_in_flight, 0);
    assert_eq!(status.stall.active_loads, 0);
    assert_eq!(status.cached_assets, 0);
    feed.shutdown();
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("feed.json");
    std::fs::write(&path, r#"{ "player_cache_capacity": 8, "extended_idle_ms": 60000 }"#).unwrap();

    let config = FeedConfig::from_file(&path).unwrap();
    assert_eq!(config.player_cache_capacity, 8);
    assert_eq!(config.extended_idle(), Duration::from_secs(60));
    assert_eq!(config.asset_cache_capacity, 30);
}
