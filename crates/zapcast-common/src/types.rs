//! Common types for Zapcast

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for users
pub type UserId = Uuid;

/// Unique identifier for gateway instances (sending accounts)
pub type InstanceId = Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for campaign contacts
pub type ContactId = Uuid;

/// Unique identifier for API keys
pub type ApiKeyId = Uuid;

/// Kind of media attached to a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
    #[serde(other)]
    Unknown,
}

impl MediaKind {
    /// MIME type sent to the gateway for this kind
    pub fn mime_type(&self) -> &'static str {
        match self {
            MediaKind::Image => "image/jpeg",
            MediaKind::Video => "video/mp4",
            MediaKind::Audio => "audio/mpeg",
            MediaKind::Document => "application/pdf",
            MediaKind::Unknown => "application/octet-stream",
        }
    }

    /// Name used by the gateway's `mediatype` field
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
            MediaKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaKind {
    type Err = std::convert::Infallible;

    /// Never fails: anything unrecognized maps to `Unknown`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "image" => MediaKind::Image,
            "video" => MediaKind::Video,
            "audio" => MediaKind::Audio,
            "document" => MediaKind::Document,
            _ => MediaKind::Unknown,
        })
    }
}

/// Media reference attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub url: String,
    pub kind: MediaKind,
}

impl MediaAttachment {
    pub fn new(url: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }

    /// Build from the loosely-typed (url, type) pair stored on campaigns.
    /// A missing or blank URL means no media.
    pub fn from_parts(url: Option<&str>, kind: Option<&str>) -> Option<Self> {
        let url = url.map(str::trim).filter(|u| !u.is_empty())?;
        let kind = kind
            .and_then(|k| k.parse().ok())
            .unwrap_or(MediaKind::Unknown);
        Some(Self::new(url, kind))
    }
}
