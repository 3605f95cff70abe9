//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::defaults;
use crate::error::{ReelflowError, Result};
use crate::frame::PixelFormat;
use crate::time::FrameRate;

/// Output format every decoder session is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
}

impl VideoFormat {
    pub const fn new(width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        Self {
            width,
            height,
            pixel_format,
        }
    }

    /// Bytes of pixel data in one tightly packed frame.
    pub fn frame_size(&self) -> usize {
        self.pixel_format.frame_size(self.width, self.height)
    }
}

impl Default for VideoFormat {
    fn default() -> Self {
        Self::new(defaults::VIDEO_WIDTH, defaults::VIDEO_HEIGHT, PixelFormat::Rgba8)
    }
}

/// Settings shared by every workflow of one engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub video: VideoFormat,
    pub frame_rate: FrameRate,
    pub track_count: usize,
    pub buffer_pool_size: usize,
    pub max_idle_players: usize,
    pub render_timeout_ms: u64,
    pub init_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            video: VideoFormat::default(),
            frame_rate: FrameRate::default(),
            track_count: defaults::TRACK_COUNT,
            buffer_pool_size: defaults::BUFFER_POOL_SIZE,
            max_idle_players: defaults::MAX_IDLE_PLAYERS,
            render_timeout_ms: defaults::RENDER_TIMEOUT_MS,
            init_timeout_ms: defaults::INIT_TIMEOUT_MS,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a JSON file. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Parse and validate a configuration from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no workflow can run with.
    pub fn validate(&self) -> Result<()> {
        if self.video.width == 0 || self.video.height == 0 {
            return Err(ReelflowError::InvalidParameter(format!(
                "video size {}x{} must be non-zero",
                self.video.width, self.video.height
            )));
        }
        if !self.frame_rate.is_valid() {
            return Err(ReelflowError::InvalidParameter(format!(
                "frame rate {}/{} is not valid",
                self.frame_rate.numerator, self.frame_rate.denominator
            )));
        }
        if self.track_count == 0 {
            return Err(ReelflowError::InvalidParameter(
                "track_count must be at least 1".into(),
            ));
        }
        if self.buffer_pool_size == 0 {
            return Err(ReelflowError::InvalidParameter(
                "buffer_pool_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.buffer_pool_size, 5);
        assert_eq!(config.video.width, 640);
        assert_eq!(config.video.height, 480);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "track_count": 4, "render_timeout_ms": 250 }"#)
            .unwrap();
        assert_eq!(config.track_count, 4);
        assert_eq!(config.render_timeout(), Duration::from_millis(250));
        assert_eq!(config.buffer_pool_size, defaults::BUFFER_POOL_SIZE);
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let mut config = EngineConfig::default();
        config.buffer_pool_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ReelflowError::InvalidParameter(_))
        ));

        let err = EngineConfig::from_json_str(
            r#"{ "video": { "width": 0, "height": 10, "pixel_format": "Rgba8" } }"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_malformed_json_is_serialization_error() {
        assert!(matches!(
            EngineConfig::from_json_str("{ not json"),
            Err(ReelflowError::Serialization(_))
        ));
    }
}
