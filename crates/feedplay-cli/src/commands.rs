//! CLI command implementations

use crate::output::{format_secs, to_json, OutputFormat};
use anyhow::{bail, Context};
use feedplay_core::{ContentId, EnqueueOutcome, FeedConfig, MediaFeed, Priority};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Load and validate a configuration file
pub fn load_config(path: &Path) -> anyhow::Result<FeedConfig> {
    let config =
        FeedConfig::from_file(path).with_context(|| format!("Failed to load config from {}", path.display()))?;
    debug!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

/// Accept either a URL or a local path
///
/// Local directories become directory URLs so manifest discovery probes
/// inside them.
pub fn parse_location(location: &str) -> anyhow::Result<Url> {
    if let Ok(url) = Url::parse(location) {
        return Ok(url);
    }

    let path = std::fs::canonicalize(location).with_context(|| format!("No such location: {}", location))?;
    let url = if path.is_dir() {
        Url::from_directory_path(&path)
    } else {
        Url::from_file_path(&path)
    };
    url.map_err(|_| anyhow::anyhow!("Cannot convert {} to a URL", path.display()))
}

/// Resolve a content location
pub async fn resolve(config: FeedConfig, location: &str, format: &str) -> anyhow::Result<()> {
    let url = parse_location(location)?;
    let feed = MediaFeed::with_http(config).context("Failed to build media feed")?;

    info!(location = %url, "Resolving");
    let asset = feed.asset_cache().get_or_load(&url).await;
    feed.shutdown();

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", to_json(asset.as_ref())),
        OutputFormat::Text => {
            println!("Resolved: {}", asset.source_key);
            println!("  Manifest: {} ({})", asset.resolved, asset.kind);
            println!("  Duration: {}", format_secs(asset.duration_secs()));
            match asset.natural_size {
                Some(size) => println!("  Size: {}x{}", size.width, size.height),
                None => println!("  Size: unknown"),
            }
            println!("  Aspect ratio: {:.3}", asset.aspect_ratio);
            if asset.degraded {
                println!("  Warning: load failed, location would be played blind");
            }
        }
    }

    if asset.degraded {
        bail!("could not load {}", location);
    }
    Ok(())
}

#[derive(Serialize)]
struct PreloadEntry {
    content_id: ContentId,
    location: String,
    outcome: EnqueueOutcome,
    cached: bool,
}

#[derive(Serialize)]
struct PreloadReport {
    elapsed_ms: u64,
    timed_out: bool,
    entries: Vec<PreloadEntry>,
    status: feedplay_core::FeedStatus,
}

/// Push locations through the scheduler and wait for them to settle
pub async fn preload(
    config: FeedConfig,
    locations: &[String],
    priority: &str,
    timeout_secs: u64,
    format: &str,
) -> anyhow::Result<()> {
    let priority = Priority::parse(priority)
        .with_context(|| format!("Unknown priority '{}' (expected high, normal or low)", priority))?;
    let urls = locations
        .iter()
        .map(|l| parse_location(l))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let feed = MediaFeed::with_http(config).context("Failed to build media feed")?;
    feed.start_stall_probe();

    let started = Instant::now();
    let mut entries: Vec<PreloadEntry> = locations
        .iter()
        .zip(&urls)
        .enumerate()
        .map(|(i, (location, url))| {
            let content_id = ContentId::new(format!("item-{}", i));
            let outcome = feed.preload(content_id.clone(), url.clone(), priority);
            PreloadEntry {
                content_id,
                location: location.clone(),
                outcome,
                cached: false,
            }
        })
        .collect();

    info!(count = entries.len(), priority = %priority, "Preloads submitted");

    let deadline = started + Duration::from_secs(timeout_secs);
    let scheduler = feed.scheduler();
    let timed_out = loop {
        if scheduler.active_count() == 0 && scheduler.pending_count() == 0 {
            break false;
        }
        if Instant::now() >= deadline {
            warn!(
                active = scheduler.active_count(),
                pending = scheduler.pending_count(),
                "Preload timed out"
            );
            break true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    };

    for (entry, url) in entries.iter_mut().zip(&urls) {
        entry.cached = feed.asset_cache().contains(url);
    }
    let report = PreloadReport {
        elapsed_ms: started.elapsed().as_millis() as u64,
        timed_out,
        entries,
        status: feed.status(),
    };
    feed.shutdown();

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", to_json(&report)),
        OutputFormat::Text => {
            println!("Preloaded {} location(s) in {}ms", report.entries.len(), report.elapsed_ms);
            for entry in &report.entries {
                println!(
                    "  {} {} [{}] {}",
                    if entry.cached { "OK  " } else { "MISS" },
                    entry.content_id,
                    entry.outcome,
                    entry.location
                );
            }
            let stall = &report.status.stall;
            println!("\nScheduler:");
            println!("  Active loads: {}/{}", stall.active_loads, stall.max_loads);
            println!("  Pending loads: {}", stall.pending_loads);
            println!("  Cached assets: {}", report.status.cached_assets);
            println!("Stall monitor:");
            println!("  Cooling down: {}", stall.cooling_down);
            println!("  Total stalls: {}", stall.total_stalls);
            if report.timed_out {
                println!("\nTimed out after {}s", timeout_secs);
            }
        }
    }

    if report.timed_out {
        bail!("preload did not finish within {}s", timeout_secs);
    }
    Ok(())
}

/// Print or write the effective configuration
pub fn show_config(config: &FeedConfig, output: Option<PathBuf>) -> anyhow::Result<()> {
    let json = config.to_json();
    match output {
        Some(path) => {
            std::fs::write(&path, &json).with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Configuration written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
