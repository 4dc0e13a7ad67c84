//! Platform audio queue abstraction
//!
//! This module defines the capability interface the engine drives. A platform
//! owns the hardware-visible buffer memory and the audio thread; the engine
//! only references buffers by [`BufferId`] and decides what goes into them.
//!
//! # Backends
//! - [`manual::ManualPlatform`]: completions are driven by the caller (tests, offline use)
//! - `wav::WavPlatform` (`export-wav`): renders submitted buffers to a WAV file
//! - `rodio::RodioPlatform` (`streaming`): plays on the default output device
//!
//! # Important
//!
//! Implementations must not hold any internal lock while invoking the
//! [`CompletionHandler`]: the handler calls straight back into
//! [`OutputQueue::fill`] and [`OutputQueue::enqueue`].

use crate::format::AudioFormat;
use crate::Result;
use std::fmt;
use std::sync::Arc;

pub mod manual;

#[cfg(feature = "streaming")]
#[cfg_attr(docsrs, doc(cfg(feature = "streaming")))]
pub mod rodio;

#[cfg(feature = "export-wav")]
#[cfg_attr(docsrs, doc(cfg(feature = "export-wav")))]
pub mod wav;

/// Handle to a platform-owned buffer
///
/// Identity is by handle, never by content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Callback the platform invokes on its audio thread when a buffer has drained
///
/// The queue the buffer belongs to is passed back so the handler can refill
/// and resubmit without keeping its own reference to it.
pub type CompletionHandler = Arc<dyn Fn(&dyn OutputQueue, BufferId) + Send + Sync>;

/// An opened output device with its buffer queue
///
/// All methods take `&self`: the engine calls them from the producer thread
/// and from inside the completion handler on the audio thread.
pub trait OutputQueue: Send + Sync {
    /// Allocate one platform buffer of `capacity` bytes
    fn allocate_buffer(&self, capacity: usize) -> Result<BufferId>;

    /// Copy `data` into the buffer's memory, replacing its previous contents
    ///
    /// `data.len()` never exceeds the capacity the buffer was allocated with.
    fn fill(&self, buffer: BufferId, data: &[u8]) -> Result<()>;

    /// Submit a filled buffer for playback
    ///
    /// The platform later hands the buffer back through the completion handler.
    fn enqueue(&self, buffer: BufferId) -> Result<()>;

    /// Prime and start the device
    ///
    /// The engine calls this exactly once, after the first `write` has primed
    /// the pool.
    fn start(&self) -> Result<()>;

    /// Stop the device and release its buffers
    ///
    /// Blocks until the audio thread has stopped; no completion is delivered
    /// after this returns.
    ///
    /// May also be called from inside the completion handler (a watcher
    /// dropping the last [`AudioOutput`](crate::AudioOutput)). The audio
    /// thread cannot wait for itself, so in that case the queue is only marked
    /// disposed and the device stops after the handler returns.
    fn dispose(&self);
}

/// Factory for output queues on one kind of audio subsystem
pub trait AudioPlatform {
    /// Backend name (e.g. "rodio", "wav")
    fn name(&self) -> &'static str;

    /// Create an output device for `format`
    ///
    /// Fails if the subsystem cannot play the format or has no device.
    fn open_queue(
        &self,
        format: &AudioFormat,
        on_complete: CompletionHandler,
    ) -> Result<Arc<dyn OutputQueue>>;
}

/// Create the platform selected at build time
pub fn default_platform() -> Result<Box<dyn AudioPlatform>> {
    #[cfg(feature = "streaming")]
    {
        Ok(Box::new(self::rodio::RodioPlatform::new()))
    }

    #[cfg(not(feature = "streaming"))]
    {
        Err(crate::AudioError::DeviceUnavailable(
            "no device backend compiled in (enable the `streaming` feature)".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_id_display() {
        assert_eq!(BufferId(7).to_string(), "#7");
    }

    #[cfg(not(feature = "streaming"))]
    #[test]
    fn test_default_platform_without_device_backend() {
        assert!(matches!(
            default_platform(),
            Err(crate::AudioError::DeviceUnavailable(_))
        ));
    }
}
