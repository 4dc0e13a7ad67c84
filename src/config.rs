//! Buffer pool geometry

use crate::format::AudioFormat;
use crate::{AudioError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of buffers in the pool
pub const DEFAULT_BUFFER_COUNT: usize = 10;

/// Default capacity of each buffer in bytes
pub const DEFAULT_BUFFER_CAPACITY: usize = 2048;

/// Configuration for an output session
///
/// The pool is allocated once at open time and never resized, so both values
/// are fixed for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of platform buffers in the pool
    /// More buffers = more audio queued ahead of the device
    pub buffer_count: usize,

    /// Capacity of each buffer in bytes
    /// Must hold a whole number of frames
    pub buffer_capacity: usize,
}

impl EngineConfig {
    /// Small pool for short latency
    /// 4 × 1024 bytes ≈ 93ms of 8-bit mono @ 44.1kHz
    pub const fn low_latency() -> Self {
        EngineConfig {
            buffer_count: 4,
            buffer_capacity: 1024,
        }
    }

    /// Pool sized for glitch-free playback
    /// 10 × 2048 bytes ≈ 464ms of 8-bit mono @ 44.1kHz
    pub const fn stable() -> Self {
        EngineConfig {
            buffer_count: DEFAULT_BUFFER_COUNT,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }

    /// Parse a JSON configuration; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| AudioError::ConfigError(format!("Failed to parse engine config: {}", e)))
    }

    /// Check the geometry against the format it will stream
    pub fn validate(&self, format: &AudioFormat) -> Result<()> {
        if self.buffer_count == 0 {
            return Err(AudioError::ConfigError(
                "buffer count must be greater than 0".into(),
            ));
        }
        if self.buffer_capacity == 0 {
            return Err(AudioError::ConfigError(
                "buffer capacity must be greater than 0".into(),
            ));
        }
        let frame = format.bytes_per_frame();
        if self.buffer_capacity % frame != 0 {
            return Err(AudioError::ConfigError(format!(
                "buffer capacity {} is not a multiple of the {}-byte frame",
                self.buffer_capacity, frame
            )));
        }
        Ok(())
    }

    /// Bytes held by a fully primed pool
    pub fn pool_bytes(&self) -> usize {
        self.buffer_count * self.buffer_capacity
    }

    /// Audio held by a fully primed pool
    pub fn latency(&self, format: &AudioFormat) -> Duration {
        format.duration_of(self.pool_bytes())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::stable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_stable() {
        let config = EngineConfig::default();
        assert_eq!(config.buffer_count, 10);
        assert_eq!(config.buffer_capacity, 2048);
        assert_eq!(config, EngineConfig::stable());
    }

    #[test]
    fn test_latency() {
        let format = AudioFormat::mono_8bit(44_100);
        let ms = EngineConfig::low_latency().latency(&format).as_secs_f32() * 1000.0;
        assert!(ms > 90.0 && ms < 95.0);
    }

    #[test]
    fn test_validate_rejects_partial_frames() {
        let config = EngineConfig {
            buffer_count: 2,
            buffer_capacity: 1022,
        };
        assert!(config.validate(&AudioFormat::mono_8bit(44_100)).is_ok());
        assert!(matches!(
            config.validate(&AudioFormat::stereo_16bit(44_100)),
            Err(AudioError::ConfigError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_pool() {
        let format = AudioFormat::mono_8bit(44_100);
        let no_buffers = EngineConfig {
            buffer_count: 0,
            ..EngineConfig::default()
        };
        let no_capacity = EngineConfig {
            buffer_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(no_buffers.validate(&format).is_err());
        assert!(no_capacity.validate(&format).is_err());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = EngineConfig::from_json(r#"{ "buffer_count": 3 }"#).unwrap();
        assert_eq!(config.buffer_count, 3);
        assert_eq!(config.buffer_capacity, DEFAULT_BUFFER_CAPACITY);

        assert!(matches!(
            EngineConfig::from_json("{ not json"),
            Err(AudioError::ConfigError(_))
        ));
    }
}
