//! Buffered streaming PCM output
//!
//! Drives a platform audio device continuously from a raw PCM payload by
//! refilling a fixed pool of platform-owned buffers as they drain. Observers
//! registered with [`AudioOutput::watch`] are told the number of buffers still
//! submitted to the device every time that count is recomputed, which is the
//! backpressure signal a mixer uses to decide when to produce the next chunk.
//!
//! # Features
//! - Fixed buffer pool with explicit Free/Playing state per buffer
//! - Completion-driven refill shared by `write` priming and the audio thread
//! - Lock released before every platform call and watcher notification
//! - Swappable platforms behind the [`platform::AudioPlatform`] trait
//!
//! # Crate feature flags
//! - `export-wav` (default): [`platform::wav::WavPlatform`], renders to a WAV file via `hound`
//! - `streaming` (opt-in): [`platform::rodio::RodioPlatform`], real device output via `rodio`
//!
//! # Quick start
//! ## Deterministic playback (no device)
//! ```
//! use hearnow_audio::platform::manual::ManualPlatform;
//! use hearnow_audio::{AudioFormat, AudioOutput, EngineConfig};
//!
//! let platform = ManualPlatform::new();
//! let format = AudioFormat::mono_8bit(44_100);
//! let output = AudioOutput::open_with(&platform, format, EngineConfig::default()).unwrap();
//!
//! output.write(vec![128u8; 5000]).unwrap();
//! assert_eq!(output.samples_pending(), 3);
//!
//! // Each completion event either refills a buffer or retires it.
//! assert_eq!(platform.run_until_idle(), 3);
//! assert_eq!(output.samples_pending(), 0);
//! output.close();
//! ```
//!
//! ## Device playback
//! ```no_run
//! # #[cfg(feature = "streaming")]
//! # {
//! use hearnow_audio::{AudioFormat, AudioOutput};
//!
//! let output = AudioOutput::open(AudioFormat::mono_8bit(44_100)).unwrap();
//! output.watch(|pending| println!("{pending} buffers queued"))
//!     .unwrap();
//! output.write(vec![128u8; 44_100]).unwrap();
//! # }
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod engine;
pub mod format;
pub mod pcm;
pub mod platform;

/// Error types for audio output operations
#[derive(thiserror::Error, Debug)]
pub enum AudioError {
    /// No output device could be created (no hardware, no backend compiled in)
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The requested PCM format cannot be played
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// Invalid engine configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Memory for the buffer pool or watcher list could not be reserved
    #[error("Allocation failed: {0}")]
    Allocation(String),

    /// The platform refused to fill or enqueue a buffer
    #[error("Buffer {buffer} submission failed: {reason}")]
    Submission {
        /// Buffer that could not be submitted
        buffer: platform::BufferId,
        /// Platform-provided reason
        reason: String,
    },

    /// IO error from filesystem or device
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// WAV rendering error
    #[cfg(feature = "export-wav")]
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for AudioError {
    /// Converts a String into `AudioError::Other`.
    ///
    /// Prefer the specific variants where the failure class is known; this
    /// conversion exists for `map_err(|e| format!(..))?` call sites.
    fn from(msg: String) -> Self {
        AudioError::Other(msg)
    }
}

impl From<&str> for AudioError {
    fn from(msg: &str) -> Self {
        AudioError::Other(msg.to_string())
    }
}

/// Result type for audio output operations
pub type Result<T> = std::result::Result<T, AudioError>;

// Public API exports
pub use config::EngineConfig;
pub use engine::AudioOutput;
pub use format::{AudioFormat, SampleResolution};
pub use platform::{default_platform, AudioPlatform, BufferId, CompletionHandler, OutputQueue};
