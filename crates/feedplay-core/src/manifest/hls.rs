//! HLS asset loader
//!
//! Implements:
//! - HEAD existence probes for candidate manifests
//! - Master playlists (best variant size, duration from the first variant)
//! - Media playlists (summed segment duration)
//! - `file://` locations for locally transcoded content

use crate::{error::Error, NaturalSize, Result};
use super::{AssetLoader, ResourceMetadata};
use async_trait::async_trait;
use bytes::Bytes;
use m3u8_rs::Playlist;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Metadata read from a single playlist document
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistMetadata {
    /// Summed segment duration (media playlists with an end list)
    pub duration: Option<Duration>,
    /// Largest advertised variant resolution (master playlists)
    pub natural_size: Option<NaturalSize>,
    /// A variant to fetch for duration (master playlists)
    pub variant_uri: Option<String>,
}

/// Parse playlist content into metadata
pub fn parse_metadata(content: &[u8]) -> Result<PlaylistMetadata> {
    let playlist = m3u8_rs::parse_playlist_res(content)
        .map_err(|e| Error::ManifestParse(format!("Failed to parse HLS playlist: {:?}", e)))?;

    match playlist {
        Playlist::MasterPlaylist(master) => {
            let variants: Vec<_> = master.variants.iter().filter(|v| !v.is_i_frame).collect();

            // Resolutions that do not fit u32 are dropped rather than truncated
            let natural_size = variants
                .iter()
                .filter_map(|v| v.resolution)
                .filter_map(|r| Some((r, u32::try_from(r.width).ok()?, u32::try_from(r.height).ok()?)))
                .max_by_key(|(r, _, _)| r.width.saturating_mul(r.height))
                .map(|(_, width, height)| NaturalSize::new(width, height));

            Ok(PlaylistMetadata {
                duration: None,
                natural_size,
                variant_uri: variants.first().map(|v| v.uri.clone()),
            })
        }
        Playlist::MediaPlaylist(media) => {
            let duration = if media.end_list {
                Duration::try_from_secs_f32(media.segments.iter().map(|s| s.duration).sum()).ok()
            } else {
                None
            };

            Ok(PlaylistMetadata {
                duration,
                natural_size: None,
                variant_uri: None,
            })
        }
    }
}

/// Returns true if the location looks like an HLS playlist
fn is_playlist_url(url: &Url) -> bool {
    let path = url.path().to_lowercase();
    path.ends_with(".m3u8") || path.ends_with(".m3u")
}

/// Asset loader backed by HTTP(S) and the local filesystem
pub struct HlsAssetLoader {
    client: Client,
}

impl HlsAssetLoader {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn local_path(url: &Url) -> Result<PathBuf> {
        url.to_file_path().map_err(|_| Error::Resolution {
            location: url.to_string(),
        })
    }

    async fn fetch(&self, url: &Url) -> Result<Bytes> {
        if url.scheme() == "file" {
            return Ok(Bytes::from(tokio::fs::read(Self::local_path(url)?).await?));
        }

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::ManifestFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::ManifestFetch(format!("{} returned {}", url, response.status())));
        }

        response
            .bytes()
            .await
            .map_err(|e| Error::ManifestFetch(e.to_string()))
    }
}

#[async_trait]
impl AssetLoader for HlsAssetLoader {
    #[instrument(skip(self))]
    async fn exists(&self, url: &Url) -> Result<bool> {
        if url.scheme() == "file" {
            return Ok(tokio::fs::try_exists(Self::local_path(url)?).await?);
        }

        let response = self.client.head(url.clone()).send().await?;
        Ok(response.status().is_success())
    }

    #[instrument(skip(self))]
    async fn load(&self, url: &Url) -> Result<ResourceMetadata> {
        if !is_playlist_url(url) {
            // Progressive files are handed to the player as-is
            if !self.exists(url).await? {
                return Err(Error::Resolution {
                    location: url.to_string(),
                });
            }
            return Ok(ResourceMetadata {
                duration: Duration::ZERO,
                natural_size: None,
            });
        }

        let content = self.fetch(url).await?;
        let mut metadata = parse_metadata(&content)?;

        if metadata.duration.is_none() {
            if let Some(variant) = metadata.variant_uri.take() {
                let variant_url = url.join(&variant)?;
                debug!(variant = %variant_url, "Fetching variant playlist for duration");
                let variant_content = self.fetch(&variant_url).await?;
                metadata.duration = parse_metadata(&variant_content)?.duration;
            }
        }

        Ok(ResourceMetadata {
            duration: metadata.duration.unwrap_or(Duration::ZERO),
            natural_size: metadata.natural_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "#EXTM3U
#EXT-X-VERSION:3

#EXT-X-STREAM-INF:BANDWIDTH=2500000,RESOLUTION=1280x720,CODECS=\"avc1.64001f,mp4a.40.2\"
high/playlist.m3u8

#EXT-X-STREAM-INF:BANDWIDTH=1000000,RESOLUTION=854x480,CODECS=\"avc1.64001f,mp4a.40.2\"
medium/playlist.m3u8
";

    const MEDIA: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:4
#EXT-X-PLAYLIST-TYPE:VOD
#EXTINF:4.0,
segment0.ts
#EXTINF:4.0,
segment1.ts
#EXTINF:2.5,
segment2.ts
#EXT-X-ENDLIST
";

    #[test]
    fn test_master_metadata() {
        let metadata = parse_metadata(MASTER.as_bytes()).unwrap();
        assert_eq!(metadata.natural_size, Some(NaturalSize::new(1280, 720)));
        assert_eq!(metadata.variant_uri.as_deref(), Some("high/playlist.m3u8"));
        assert!(metadata.duration.is_none());
    }

    #[test]
    fn test_media_metadata() {
        let metadata = parse_metadata(MEDIA.as_bytes()).unwrap();
        assert_eq!(metadata.duration, Some(Duration::from_secs_f32(10.5)));
        assert!(metadata.natural_size.is_none());
    }

    #[test]
    fn test_oversized_resolution_is_ignored() {
        let master = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=9000000,RESOLUTION=5000000000x5000000000
huge/playlist.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=1000000,RESOLUTION=854x480
medium/playlist.m3u8
";
        let metadata = parse_metadata(master.as_bytes()).unwrap();
        assert_eq!(metadata.natural_size, Some(NaturalSize::new(854, 480)));
        assert_eq!(metadata.variant_uri.as_deref(), Some("huge/playlist.m3u8"));
    }

    #[test]
    fn test_playlist_url_detection() {
        assert!(is_playlist_url(&Url::parse("https://cdn.example.com/a/master.m3u8").unwrap()));
        assert!(!is_playlist_url(&Url::parse("https://cdn.example.com/a/clip.mp4").unwrap()));
    }

    #[tokio::test]
    async fn test_load_master_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("high")).unwrap();
        std::fs::write(dir.path().join("master.m3u8"), MASTER).unwrap();
        std::fs::write(dir.path().join("high/playlist.m3u8"), MEDIA).unwrap();

        let loader = HlsAssetLoader::new(Duration::from_secs(5)).unwrap();
        let master = Url::from_file_path(dir.path().join("master.m3u8")).unwrap();

        assert!(loader.exists(&master).await.unwrap());
        let metadata = loader.load(&master).await.unwrap();
        assert_eq!(metadata.natural_size, Some(NaturalSize::new(1280, 720)));
        assert_eq!(metadata.duration, Duration::from_secs_f32(10.5));
    }

    #[tokio::test]
    async fn test_missing_file_does_not_exist() {
        let dir = tempfile::tempdir().unwrap();
        let loader = HlsAssetLoader::new(Duration::from_secs(5)).unwrap();
        let missing = Url::from_file_path(dir.path().join("master.m3u8")).unwrap();
        assert!(!loader.exists(&missing).await.unwrap());
        assert!(loader.load(&missing).await.is_err());
    }
}
