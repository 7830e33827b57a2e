//! Manifest discovery and metadata loading
//!
//! The transcoding service publishes, at a stable content location, either a
//! multi-variant playlist (preferred) or a single-variant playlist. Discovery
//! probes those well-known names in priority order and falls back to the raw
//! location when neither answers.

mod hls;

pub use hls::{parse_metadata, HlsAssetLoader};

use crate::{Error, ManifestKind, NaturalSize, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Name of the multi-variant playlist written by the transcoder
pub const MULTI_VARIANT_MANIFEST: &str = "master.m3u8";

/// Name of the single-variant playlist written by the transcoder
pub const SINGLE_VARIANT_MANIFEST: &str = "playlist.m3u8";

/// Metadata extracted from a playable resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceMetadata {
    /// Total duration (zero when unknown or live)
    pub duration: Duration,
    /// Natural size of the best variant, if advertised
    pub natural_size: Option<NaturalSize>,
}

/// Source of playable resources
///
/// Implementations must be cheap to call concurrently; the caches call
/// `exists` for discovery and `load` once per cold miss.
#[async_trait]
pub trait AssetLoader: Send + Sync {
    /// Lightweight existence check for a candidate manifest
    async fn exists(&self, url: &Url) -> Result<bool>;

    /// Load duration and size metadata from a resolved resource
    async fn load(&self, url: &Url) -> Result<ResourceMetadata>;
}

/// Outcome of manifest discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    pub url: Url,
    pub kind: ManifestKind,
}

/// Returns true if the location names a directory rather than a file
pub fn is_directory_like(url: &Url) -> bool {
    let path = url.path();
    if path.ends_with('/') {
        return true;
    }
    match path.rsplit('/').next() {
        Some(last) => !last.contains('.'),
        None => true,
    }
}

/// Candidate manifests for a directory-like location, in probe order
pub fn candidate_manifests(location: &Url) -> Vec<(Url, ManifestKind)> {
    let mut base = location.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    [
        (MULTI_VARIANT_MANIFEST, ManifestKind::MultiVariant),
        (SINGLE_VARIANT_MANIFEST, ManifestKind::SingleVariant),
    ]
    .into_iter()
    .filter_map(|(name, kind)| base.join(name).ok().map(|url| (url, kind)))
    .collect()
}

/// Resolve a source location to the manifest that should be played
///
/// Each probe is bounded by `probe_timeout`; probe errors and timeouts are
/// absorbed and the next candidate is tried.
pub async fn resolve_location(
    loader: &dyn AssetLoader,
    location: &Url,
    probe_timeout: Duration,
) -> ResolvedLocation {
    if !is_directory_like(location) {
        return ResolvedLocation {
            url: location.clone(),
            kind: ManifestKind::Direct,
        };
    }

    for (candidate, kind) in candidate_manifests(location) {
        match tokio::time::timeout(probe_timeout, loader.exists(&candidate)).await {
            Ok(Ok(true)) => {
                debug!(url = %candidate, kind = %kind, "Manifest found");
                return ResolvedLocation { url: candidate, kind };
            }
            Ok(Ok(false)) => {
                debug!(url = %candidate, "Manifest absent");
            }
            Ok(Err(e)) => {
                debug!(url = %candidate, error = %e, "Manifest probe failed");
            }
            Err(_) => {
                let e = Error::ProbeTimeout {
                    url: candidate.to_string(),
                };
                warn!(error = %e, timeout_ms = probe_timeout.as_millis() as u64, "Manifest probe failed");
            }
        }
    }

    debug!(url = %location, "No manifest found, using location directly");
    ResolvedLocation {
        url: location.clone(),
        kind: ManifestKind::Direct,
    }
}
