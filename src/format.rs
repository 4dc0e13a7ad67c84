//! PCM stream format description
//!
//! An [`AudioFormat`] is fixed for the lifetime of an output session. Payload
//! bytes are interleaved frames; 8-bit samples are unsigned (silence = 128),
//! wider samples are signed little-endian, matching the WAV convention.

use crate::{AudioError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bits per sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum SampleResolution {
    /// 8-bit unsigned
    Bits8,
    /// 16-bit signed little-endian
    Bits16,
    /// 24-bit signed little-endian, packed in 3 bytes
    Bits24,
    /// 32-bit signed little-endian
    Bits32,
}

impl SampleResolution {
    /// Number of bits per sample
    pub const fn bits(self) -> u16 {
        match self {
            SampleResolution::Bits8 => 8,
            SampleResolution::Bits16 => 16,
            SampleResolution::Bits24 => 24,
            SampleResolution::Bits32 => 32,
        }
    }

    /// Number of bytes one sample occupies in the payload
    pub const fn bytes(self) -> usize {
        self.bits() as usize / 8
    }
}

impl TryFrom<u16> for SampleResolution {
    type Error = AudioError;

    fn try_from(bits: u16) -> Result<Self> {
        match bits {
            8 => Ok(SampleResolution::Bits8),
            16 => Ok(SampleResolution::Bits16),
            24 => Ok(SampleResolution::Bits24),
            32 => Ok(SampleResolution::Bits32),
            other => Err(AudioError::UnsupportedFormat(format!(
                "{other}-bit samples are not supported (expected 8, 16, 24 or 32)"
            ))),
        }
    }
}

impl From<SampleResolution> for u16 {
    fn from(resolution: SampleResolution) -> Self {
        resolution.bits()
    }
}

/// Immutable description of the PCM stream handed to an output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Frames per second
    pub sample_rate: u32,
    /// Sample width
    pub resolution: SampleResolution,
    /// Interleaved channels per frame
    pub channels: u16,
}

impl AudioFormat {
    /// Create a format from raw parameters, validating the bit depth
    pub fn new(sample_rate: u32, sample_resolution_bits: u16, channels: u16) -> Result<Self> {
        let format = AudioFormat {
            sample_rate,
            resolution: SampleResolution::try_from(sample_resolution_bits)?,
            channels,
        };
        format.validate()?;
        Ok(format)
    }

    /// Unsigned 8-bit mono, the mixer's native output
    pub const fn mono_8bit(sample_rate: u32) -> Self {
        AudioFormat {
            sample_rate,
            resolution: SampleResolution::Bits8,
            channels: 1,
        }
    }

    /// Signed 16-bit stereo (CD layout at 44.1 kHz)
    pub const fn stereo_16bit(sample_rate: u32) -> Self {
        AudioFormat {
            sample_rate,
            resolution: SampleResolution::Bits16,
            channels: 2,
        }
    }

    /// Check that a device could be opened for this format
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(AudioError::UnsupportedFormat(
                "sample rate must be greater than 0".into(),
            ));
        }
        if self.channels == 0 {
            return Err(AudioError::UnsupportedFormat(
                "channel count must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Bits per sample as a plain integer
    pub const fn sample_resolution_bits(&self) -> u16 {
        self.resolution.bits()
    }

    /// Bytes per sample
    pub const fn bytes_per_sample(&self) -> usize {
        self.resolution.bytes()
    }

    /// Bytes per interleaved frame (one sample for every channel)
    pub const fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// Whole frames contained in `bytes`; a trailing partial frame is ignored
    pub fn frames_in(&self, bytes: usize) -> usize {
        bytes / self.bytes_per_frame().max(1)
    }

    /// Playback time of `bytes` of payload at this format
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let frames = self.frames_in(bytes) as u64;
        let rate = u64::from(self.sample_rate.max(1));
        Duration::from_nanos(frames * 1_000_000_000 / rate)
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Hz, {}-bit, {} ch",
            self.sample_rate,
            self.resolution.bits(),
            self.channels
        )
    }
}
