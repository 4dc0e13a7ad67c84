//! Buffered streaming-playback engine
//!
//! An [`AudioOutput`] streams one payload at a time through a fixed pool of
//! platform buffers. `write` installs a new payload and primes every Free
//! buffer from it; afterwards each completion event coming back from the
//! platform either refills the drained buffer from the payload and resubmits
//! it, or, once the payload is exhausted, retires it.
//!
//! # Thread Safety
//! - Producer thread: `write`, `watch`, `samples_pending`, `close`
//! - Platform audio thread: completion handler
//! - One `parking_lot::Mutex` guards the cursor, the buffer tags and the
//!   started flag; it is never held across a platform call or a watcher
//!   notification
//! - The pending count is mirrored into an atomic for lock-free reads

mod cursor;
mod pool;
mod watchers;

pub use cursor::{Chunk, PlaybackCursor};
pub use pool::{BufferPool, BufferState};
pub use watchers::{WatchCallback, WatcherRegistry};

use crate::config::EngineConfig;
use crate::format::AudioFormat;
use crate::platform::{default_platform, AudioPlatform, BufferId, CompletionHandler, OutputQueue};
use crate::Result;
use log::{debug, trace, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

/// What caused a buffer to be serviced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// `write` priming a buffer it believes is Free
    Prime,
    /// The platform handing a drained buffer back
    Completion,
}

struct EngineState {
    cursor: PlaybackCursor,
    pool: BufferPool,
    started: bool,
    closing: bool,
}

impl EngineState {
    /// Refill-or-retire decision for `buffer`, made under the guard
    ///
    /// Returns the chunk to copy into the buffer when it should be (re)submitted.
    fn plan(&mut self, buffer: BufferId) -> Option<Chunk> {
        if !self.closing {
            if let Some(chunk) = self.cursor.take_chunk(self.pool.capacity()) {
                self.pool.mark_playing(buffer);
                return Some(chunk);
            }
        }
        self.pool.mark_free(buffer);
        None
    }
}

struct Shared {
    state: Mutex<EngineState>,
    pending: AtomicU32,
    watchers: WatcherRegistry,
}

impl Shared {
    fn pending(&self) -> u32 {
        self.pending.load(Ordering::Relaxed)
    }

    /// Fill-and-submit for one buffer, shared by write priming and completions
    fn service(&self, queue: &dyn OutputQueue, buffer: BufferId, trigger: Trigger) -> Result<()> {
        let chunk = {
            let mut state = self.state.lock();
            match state.pool.state_of(buffer) {
                None => {
                    warn!("Ignoring completion for unknown buffer {}", buffer);
                    return Ok(());
                }
                Some(BufferState::Playing) if trigger == Trigger::Prime => return Ok(()),
                Some(_) => {}
            }
            let chunk = state.plan(buffer);
            self.pending
                .store(state.pool.playing_count(), Ordering::Relaxed);
            chunk
        };

        let result = match chunk {
            Some(chunk) => self.submit(queue, buffer, &chunk),
            None => Ok(()),
        };

        self.watchers.notify(self.pending());
        result
    }

    /// Copy `chunk` into the buffer and hand it to the device
    ///
    /// A buffer the platform refuses is retired so the pending count keeps
    /// matching what the device actually holds. The chunk it carried is
    /// already consumed from the cursor and is never played.
    fn submit(&self, queue: &dyn OutputQueue, buffer: BufferId, chunk: &Chunk) -> Result<()> {
        trace!("Submitting {} bytes in buffer {}", chunk.len(), buffer);
        let outcome = queue
            .fill(buffer, chunk.bytes())
            .and_then(|()| queue.enqueue(buffer));

        if let Err(err) = outcome {
            let mut state = self.state.lock();
            state.pool.mark_free(buffer);
            self.pending
                .store(state.pool.playing_count(), Ordering::Relaxed);
            return Err(err);
        }
        Ok(())
    }
}

/// An open audio output session
///
/// Created by [`AudioOutput::open`]; dropping it (or calling
/// [`AudioOutput::close`]) disposes the device.
pub struct AudioOutput {
    shared: Arc<Shared>,
    queue: Arc<dyn OutputQueue>,
    buffers: Vec<BufferId>,
    format: AudioFormat,
    config: EngineConfig,
    platform: &'static str,
    closed: bool,
}

impl AudioOutput {
    /// Open an output on the platform selected at build time with the default pool
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` when no device backend is compiled in or no
    /// hardware is present, and `UnsupportedFormat` when the device cannot play
    /// `format`. Either is fatal for the session.
    pub fn open(format: AudioFormat) -> Result<Self> {
        let platform = default_platform()?;
        Self::open_with(platform.as_ref(), format, EngineConfig::default())
    }

    /// Open an output on `platform` with an explicit pool geometry
    pub fn open_with<P>(platform: &P, format: AudioFormat, config: EngineConfig) -> Result<Self>
    where
        P: AudioPlatform + ?Sized,
    {
        format.validate()?;
        config.validate(&format)?;

        let shared = Arc::new(Shared {
            state: Mutex::new(EngineState {
                cursor: PlaybackCursor::new(),
                pool: BufferPool::empty(config.buffer_capacity),
                started: false,
                closing: false,
            }),
            pending: AtomicU32::new(0),
            watchers: WatcherRegistry::new(),
        });

        let queue = platform.open_queue(&format, completion_handler(Arc::downgrade(&shared)))?;

        let pool = match BufferPool::allocate(
            queue.as_ref(),
            config.buffer_count,
            config.buffer_capacity,
        ) {
            Ok(pool) => pool,
            Err(err) => {
                queue.dispose();
                return Err(err);
            }
        };
        let buffers = pool.ids().collect();
        shared.state.lock().pool = pool;

        debug!(
            "Opened {} output ({}) with {} x {} byte buffers",
            platform.name(),
            format,
            config.buffer_count,
            config.buffer_capacity
        );

        Ok(AudioOutput {
            shared,
            queue,
            buffers,
            format,
            config,
            platform: platform.name(),
            closed: false,
        })
    }

    /// The format this output was opened with
    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    /// The pool geometry this output was opened with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Name of the platform backing this output
    pub fn platform(&self) -> &'static str {
        self.platform
    }

    /// Register an observer of the pending-buffer count
    ///
    /// The callback runs after every recomputation of the count (on the
    /// producer thread during `write`, on the audio thread for completions),
    /// including when the value did not change. Watchers are notified in
    /// registration order and stay registered for the life of the output.
    pub fn watch<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.shared.watchers.register(Arc::new(callback))
    }

    /// Replace the streaming payload and kick-start every Free buffer
    ///
    /// Unconsumed bytes of the previous payload are discarded. Buffers already
    /// submitted keep playing what was copied into them, so the new payload is
    /// heard after at most one buffer's worth of old audio per slot. The device
    /// is started on the first call.
    ///
    /// # Errors
    ///
    /// Returns the first submission failure while priming (the affected buffer
    /// is left Free; the rest of the pool is still primed), or the device's
    /// start failure. A start failure leaves the output unstarted, so the next
    /// `write` tries again.
    ///
    /// A refused buffer drops the chunk it was filled with: playback skips
    /// those bytes and continues with the next chunk. The same happens, with
    /// only a log entry, when a refill fails on the audio thread.
    pub fn write(&self, data: Vec<u8>) -> Result<()> {
        let len = data.len();
        self.shared.state.lock().cursor.replace(data);
        trace!("Installed {} byte payload", len);

        let mut first_error = None;
        for &buffer in &self.buffers {
            if let Err(err) = self.shared.service(self.queue.as_ref(), buffer, Trigger::Prime) {
                warn!("Failed to prime buffer {}: {}", buffer, err);
                first_error.get_or_insert(err);
            }
        }

        let needs_start = {
            let mut state = self.shared.state.lock();
            !std::mem::replace(&mut state.started, true)
        };
        if needs_start {
            if let Err(err) = self.queue.start() {
                self.shared.state.lock().started = false;
                return Err(err);
            }
            debug!("Started {} output", self.platform);
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Number of buffers currently submitted to the device
    ///
    /// A relaxed read: it reflects the count as of a recent completion, not
    /// necessarily one racing on the audio thread right now.
    pub fn samples_pending(&self) -> u32 {
        self.shared.pending()
    }

    /// Release the payload, the device and its buffers, and every watcher
    ///
    /// Consuming the handle rules out both double-close and a `write` racing
    /// the teardown.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        {
            let mut state = self.shared.state.lock();
            state.closing = true;
            state.cursor.clear();
        }

        // Completions still in flight see `closing` and retire their buffer.
        self.queue.dispose();

        {
            let mut state = self.shared.state.lock();
            state.pool.release();
            self.shared.pending.store(0, Ordering::Relaxed);
        }
        self.shared.watchers.clear();

        debug!("Closed {} output", self.platform);
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Completion handler registered with the platform
///
/// Holds the engine weakly so a queue outliving its output delivers nothing.
fn completion_handler(shared: Weak<Shared>) -> CompletionHandler {
    Arc::new(move |queue: &dyn OutputQueue, buffer: BufferId| {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        trace!("Buffer {} completed", buffer);
        if let Err(err) = shared.service(queue, buffer, Trigger::Completion) {
            warn!("Failed to resubmit buffer {}: {}", buffer, err);
        }
    })
}
