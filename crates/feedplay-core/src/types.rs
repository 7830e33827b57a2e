//! Core types for Feedplay

use serde::{Deserialize, Serialize};

/// Stable identifier of a piece of feed content (one player per id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentId(pub String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ContentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ContentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a visible media group (e.g. one feed cell with several videos)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl From<&str> for GroupId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Load priority tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// On-screen content, dispatched as soon as a slot frees
    High,
    /// Near-screen content
    Normal,
    /// Speculative preloads
    Low,
}

impl Priority {
    /// Higher rank dispatches first
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 2,
            Priority::Normal => 1,
            Priority::Low => 0,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "high" => Some(Priority::High),
            "normal" => Some(Priority::Normal),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// Natural (display) size of a video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NaturalSize {
    pub width: u32,
    pub height: u32,
}

impl NaturalSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width over height, falling back to 16:9 for degenerate sizes
    pub fn aspect_ratio(&self) -> f64 {
        if self.width == 0 || self.height == 0 {
            DEFAULT_ASPECT_RATIO
        } else {
            self.width as f64 / self.height as f64
        }
    }
}

impl std::fmt::Display for NaturalSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Aspect ratio assumed when nothing better is known
pub const DEFAULT_ASPECT_RATIO: f64 = 16.0 / 9.0;

/// What a source location resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestKind {
    /// Multi-variant (master) playlist
    MultiVariant,
    /// Single-variant (media) playlist
    SingleVariant,
    /// The raw location, used unresolved
    Direct,
}

impl std::fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestKind::MultiVariant => write!(f, "multi-variant"),
            ManifestKind::SingleVariant => write!(f, "single-variant"),
            ManifestKind::Direct => write!(f, "direct"),
        }
    }
}

/// Readiness of a player's decode pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlayerStatus {
    /// Not prepared yet (or invalidated and awaiting a lazy reload)
    Pending,
    /// Prepared and able to render frames
    Ready,
    /// Retries exhausted; the presentation layer shows a retry affordance
    Unavailable { attempts: u32 },
}

impl PlayerStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, PlayerStatus::Ready)
    }
}

impl std::fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerStatus::Pending => write!(f, "pending"),
            PlayerStatus::Ready => write!(f, "ready"),
            PlayerStatus::Unavailable { attempts } => write!(f, "unavailable ({} attempts)", attempts),
        }
    }
}

/// Seek precision requested from a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeekTolerance {
    /// Land exactly on the position, decoding a fresh frame
    Exact,
    /// Nearest keyframe is acceptable
    Keyframe,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_rank() {
        assert!(Priority::High.rank() > Priority::Normal.rank());
        assert!(Priority::Normal.rank() > Priority::Low.rank());
        assert_eq!(Priority::parse("LOW"), Some(Priority::Low));
        assert_eq!(Priority::parse("urgent"), None);
    }

    #[test]
    fn test_aspect_ratio_fallback() {
        assert_eq!(NaturalSize::new(0, 0).aspect_ratio(), DEFAULT_ASPECT_RATIO);
        assert_eq!(NaturalSize::new(1080, 1920).aspect_ratio(), 0.5625);
    }

    #[test]
    fn test_content_id_display() {
        let id = ContentId::from("1789");
        assert_eq!(id.to_string(), "1789");
        assert_eq!(id.as_str(), "1789");
    }
}
