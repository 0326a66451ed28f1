//! Render parameters carried by `video_clip` jobs.
//!
//! The coordinator treats these as opaque JSON; the producer validates them
//! on the way in and the worker decodes them on the way out.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Longest clip we will render, in seconds.
pub const MAX_CLIP_DURATION_SECS: f64 = 180.0;

/// How the source frame is fitted into the output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutMode {
    /// Keep the source 16:9 frame
    #[default]
    Landscape,
    /// Fill a 9:16 frame, cropping the sides
    PortraitCrop,
    /// Fit into a 9:16 frame with padding
    PortraitFit,
}

impl LayoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutMode::Landscape => "landscape",
            LayoutMode::PortraitCrop => "portrait-crop",
            LayoutMode::PortraitFit => "portrait-fit",
        }
    }

    /// Output aspect ratio label.
    pub fn aspect_ratio(&self) -> &'static str {
        match self {
            LayoutMode::Landscape => "16:9",
            LayoutMode::PortraitCrop | LayoutMode::PortraitFit => "9:16",
        }
    }
}

impl fmt::Display for LayoutMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown layout mode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown layout mode: {0}")]
pub struct LayoutModeParseError(pub String);

impl FromStr for LayoutMode {
    type Err = LayoutModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "" | "landscape" => Ok(LayoutMode::Landscape),
            "portrait-crop" | "portrait_crop" => Ok(LayoutMode::PortraitCrop),
            "portrait-fit" | "portrait_fit" => Ok(LayoutMode::PortraitFit),
            other => Err(LayoutModeParseError(other.to_string())),
        }
    }
}

/// Publishing destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Tiktok,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Tiktok => "tiktok",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Source video reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VideoSource {
    /// YouTube video ID
    #[validate(length(min = 1, max = 64))]
    pub youtube_video_id: String,
}

/// Metadata used when publishing the rendered clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate, Default)]
#[serde(rename_all = "camelCase")]
pub struct PublishMetadata {
    #[validate(length(max = 100))]
    #[serde(default)]
    pub title: String,
    #[validate(length(max = 5000))]
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// public, unlisted or private
    #[serde(default = "default_visibility")]
    pub visibility: String,
    #[serde(default = "default_is_short")]
    pub is_short: bool,
}

fn default_visibility() -> String {
    "public".to_string()
}

fn default_is_short() -> bool {
    true
}

/// Parameters for a `video_clip` job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_time_range"))]
pub struct ClipPayload {
    /// Clip record this render belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_id: Option<String>,

    #[validate(nested)]
    pub source: VideoSource,

    /// Start of the range, seconds
    pub start: f64,

    /// End of the range, seconds
    pub end: f64,

    #[serde(default)]
    pub layout_mode: LayoutMode,

    #[serde(default)]
    pub platforms: Vec<Platform>,

    #[validate(nested)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish: Option<PublishMetadata>,
}

fn validate_time_range(payload: &ClipPayload) -> Result<(), ValidationError> {
    if !payload.start.is_finite() || !payload.end.is_finite() {
        return Err(ValidationError::new("time_range_not_finite"));
    }
    if payload.start < 0.0 || payload.end <= payload.start {
        return Err(ValidationError::new("invalid_time_range"));
    }
    if payload.end - payload.start > MAX_CLIP_DURATION_SECS {
        return Err(ValidationError::new("clip_too_long"));
    }
    Ok(())
}

impl ClipPayload {
    pub fn new(youtube_video_id: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            clip_id: None,
            source: VideoSource {
                youtube_video_id: youtube_video_id.into(),
            },
            start,
            end,
            layout_mode: LayoutMode::default(),
            platforms: Vec::new(),
            publish: None,
        }
    }

    pub fn with_layout(mut self, layout_mode: LayoutMode) -> Self {
        self.layout_mode = layout_mode;
        self
    }

    pub fn with_platforms(mut self, platforms: Vec<Platform>) -> Self {
        self.platforms = platforms;
        self
    }

    pub fn with_clip_id(mut self, clip_id: impl Into<String>) -> Self {
        self.clip_id = Some(clip_id.into());
        self
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_payload() {
        let payload = ClipPayload::new("dQw4w9WgXcQ", 10.0, 40.0)
            .with_layout(LayoutMode::PortraitCrop)
            .with_platforms(vec![Platform::Youtube]);
        assert!(payload.validate().is_ok());
        assert_eq!(payload.duration(), 30.0);
    }

    #[test]
    fn test_rejects_bad_ranges() {
        assert!(ClipPayload::new("abc", 10.0, 10.0).validate().is_err());
        assert!(ClipPayload::new("abc", -1.0, 10.0).validate().is_err());
        assert!(ClipPayload::new("abc", 0.0, 500.0).validate().is_err());
        assert!(ClipPayload::new("abc", 0.0, f64::NAN).validate().is_err());
    }

    #[test]
    fn test_rejects_empty_video_id() {
        assert!(ClipPayload::new("", 0.0, 10.0).validate().is_err());
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::json!({
            "clipId": "clip-1",
            "source": { "youtubeVideoId": "abc123" },
            "start": 1.5,
            "end": 20,
            "layoutMode": "portrait-fit",
            "platforms": ["youtube", "tiktok"]
        });
        let payload: ClipPayload = serde_json::from_value(json).unwrap();
        assert_eq!(payload.layout_mode, LayoutMode::PortraitFit);
        assert_eq!(payload.platforms, vec![Platform::Youtube, Platform::Tiktok]);
        assert_eq!(payload.layout_mode.aspect_ratio(), "9:16");
    }

    #[test]
    fn test_layout_mode_parsing() {
        assert_eq!("".parse::<LayoutMode>().unwrap(), LayoutMode::Landscape);
        assert_eq!("portrait-crop".parse::<LayoutMode>().unwrap(), LayoutMode::PortraitCrop);
        assert!("square".parse::<LayoutMode>().is_err());
    }
}
