//! Feedplay Core - Feed Video Playback Engine
//!
//! This crate keeps a scrolling feed of short videos smooth:
//! - Manifest discovery against the transcoder's published playlists
//! - Single-flight asset cache with TTL and LRU eviction
//! - Live player cache that never evicts what is on screen
//! - Priority load scheduling with burst throttling
//! - UI stall detection with cooldown and emergency purge
//! - Sequential playback across multi-video groups
//! - Background/foreground detach and restore
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          MediaFeed                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │   Manifest   │  │    Load      │  │    Stall     │           │
//! │  │  Discovery   │  │  Scheduler   │◄─┤   Monitor    │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │                 │                 │ purge             │
//! │         └────────┬────────┘                 │                   │
//! │           ┌──────┴──────┐            ┌──────┴──────┐            │
//! │           │    Asset    │◄───────────┤   Player    │            │
//! │           │    Cache    │  handles   │    Cache    │            │
//! │           └─────────────┘            └──────┬──────┘            │
//! │                                             │                   │
//! │  ┌──────────────┐                    ┌──────┴──────┐            │
//! │  │   Playback   ├───────────────────►│  Lifecycle  │            │
//! │  │ Coordinator  │                    │    Guard    │            │
//! │  └──────────────┘                    └─────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod manifest;
pub mod asset_cache;
pub mod player;
pub mod player_cache;
pub mod scheduler;
pub mod stall;
pub mod coordinator;
pub mod lifecycle;
pub mod feed;

pub use error::{Error, Result};
pub use types::*;
pub use config::FeedConfig;
pub use manifest::{resolve_location, AssetLoader, HlsAssetLoader, ResolvedLocation, ResourceMetadata};
pub use asset_cache::{AssetCache, AssetCacheConfig, AssetHandle};
pub use player::{HeadlessBackend, PlaybackState, PlayerBackend, PlayerHandle, PlayerOptions};
pub use player_cache::{PlayerCache, PlayerCacheConfig, RetryPolicy};
pub use scheduler::{EnqueueOutcome, LoadRequest, LoadScheduler, SchedulerConfig};
pub use stall::{ProbeOutcome, StallConfig, StallMonitor, StallStatus};
pub use coordinator::{PlaybackCoordinator, PlaybackMode, PlaybackSequence};
pub use lifecycle::{DetachedState, LifecycleGuard, ReattachReport};
pub use feed::{FeedStatus, MediaFeed};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version
pub fn init() {
    tracing::info!(version = VERSION, "Feedplay Core initialized");
}
