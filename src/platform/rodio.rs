//! Device output using rodio
//!
//! The rodio `OutputStream` is not `Send`, so it lives on a dedicated thread
//! for the whole session. Playback goes through a [`Source`] that pulls
//! enqueued buffers in order, decodes them to `f32`, and fires the completion
//! handler on rodio's audio thread once a buffer has been consumed. While
//! nothing is queued (or before `start`) the source plays short blocks of
//! silence to keep the stream alive.
//!
//! Disposing from inside the completion handler (a watcher dropping the last
//! handle) runs on the audio thread itself: the queue is marked disposed and
//! the device thread is told to stop, but nothing waits for it.

use super::{AudioPlatform, BufferId, CompletionHandler, OutputQueue};
use crate::format::AudioFormat;
use crate::pcm;
use crate::{AudioError, Result};
use log::{debug, error};
use parking_lot::Mutex;
use rodio::{OutputStream, Sink, Source};
use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Frames of silence played per underrun check
const SILENCE_FRAMES: usize = 256;

thread_local! {
    /// Address of the queue whose completion handler this thread is running
    static IN_COMPLETION: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as inside `queue`'s completion handler until dropped
struct CompletionScope {
    previous: usize,
}

impl CompletionScope {
    fn enter(queue: &RodioQueue) -> Self {
        let previous = IN_COMPLETION.with(|current| current.replace(queue.addr()));
        CompletionScope { previous }
    }

    fn active(queue: &RodioQueue) -> bool {
        IN_COMPLETION.with(|current| current.get() == queue.addr())
    }
}

impl Drop for CompletionScope {
    fn drop(&mut self) {
        IN_COMPLETION.with(|current| current.set(self.previous));
    }
}

/// Platform playing on the system's default output device
#[derive(Debug, Clone, Copy, Default)]
pub struct RodioPlatform;

impl RodioPlatform {
    /// Create the platform; the device is only touched on `open_queue`
    pub fn new() -> Self {
        RodioPlatform
    }
}

impl AudioPlatform for RodioPlatform {
    fn name(&self) -> &'static str {
        "rodio"
    }

    fn open_queue(
        &self,
        format: &AudioFormat,
        on_complete: CompletionHandler,
    ) -> Result<Arc<dyn OutputQueue>> {
        format.validate()?;

        let queue = Arc::new(RodioQueue::new(*format, on_complete));

        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let source = BufferSource::new(Arc::clone(&queue));

        let handle = thread::Builder::new()
            .name("hn-audio-output".into())
            .spawn(move || {
                // Create output stream
                let (stream, stream_handle) = match OutputStream::try_default() {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = ready_tx.send(Err(AudioError::DeviceUnavailable(format!(
                            "Failed to create audio stream: {}",
                            e
                        ))));
                        return;
                    }
                };

                // Create sink for playback
                let sink = match Sink::try_new(&stream_handle) {
                    Ok(sink) => sink,
                    Err(e) => {
                        let _ = ready_tx.send(Err(AudioError::DeviceUnavailable(format!(
                            "Failed to create audio sink: {}",
                            e
                        ))));
                        return;
                    }
                };

                sink.append(source);
                let _ = ready_tx.send(Ok(()));

                // Hold the stream open until disposed (or the queue is dropped)
                let _ = shutdown_rx.recv();
                sink.stop();
                drop(stream);
            })?;

        let ready = ready_rx.recv().unwrap_or_else(|_| {
            Err(AudioError::DeviceUnavailable(
                "audio output thread exited during setup".into(),
            ))
        });
        if let Err(err) = ready {
            let _ = handle.join();
            return Err(err);
        }

        *queue.device.lock() = Some(DeviceThread {
            shutdown: shutdown_tx,
            handle,
        });
        debug!("Opened rodio output ({})", format);
        Ok(queue)
    }
}

struct DeviceThread {
    shutdown: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct QueueState {
    /// Buffer memory, indexed by `BufferId`: (storage, filled length)
    buffers: Vec<(Vec<u8>, usize)>,
    queued: VecDeque<BufferId>,
}

/// Queue handed out by [`RodioPlatform`]
pub struct RodioQueue {
    state: Mutex<QueueState>,
    /// Held while a completion runs so `dispose` can wait for it
    gate: Mutex<()>,
    disposed: AtomicBool,
    started: AtomicBool,
    format: AudioFormat,
    on_complete: CompletionHandler,
    device: Mutex<Option<DeviceThread>>,
}

impl RodioQueue {
    /// A queue with no device thread attached yet
    fn new(format: AudioFormat, on_complete: CompletionHandler) -> Self {
        RodioQueue {
            state: Mutex::new(QueueState::default()),
            gate: Mutex::new(()),
            disposed: AtomicBool::new(false),
            started: AtomicBool::new(false),
            format,
            on_complete,
            device: Mutex::new(None),
        }
    }

    /// Decode the next queued buffer into `out`; returns its id
    fn next_buffer(&self, out: &mut Vec<f32>) -> Option<BufferId> {
        if !self.started.load(Ordering::Acquire) {
            return None;
        }
        let mut state = self.state.lock();
        let buffer = state.queued.pop_front()?;
        out.clear();
        if let Some((storage, filled)) = state.buffers.get(buffer.0 as usize) {
            pcm::decode_f32_into(self.format.resolution, &storage[..*filled], out);
        }
        Some(buffer)
    }

    /// Run the completion handler unless disposed; returns `false` once disposed
    fn complete(&self, buffer: BufferId) -> bool {
        let _gate = self.gate.lock();
        if self.is_disposed() {
            return false;
        }
        let _scope = CompletionScope::enter(self);
        (self.on_complete)(self, buffer);
        !self.is_disposed()
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn addr(&self) -> usize {
        self as *const RodioQueue as usize
    }
}

impl OutputQueue for RodioQueue {
    fn allocate_buffer(&self, capacity: usize) -> Result<BufferId> {
        let mut state = self.state.lock();
        let id = BufferId(state.buffers.len() as u32);
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(capacity)
            .map_err(|e| AudioError::Allocation(format!("buffer {id}: {e}")))?;
        storage.resize(capacity, 0);
        state.buffers.push((storage, 0));
        Ok(id)
    }

    fn fill(&self, buffer: BufferId, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        let (storage, filled) =
            state
                .buffers
                .get_mut(buffer.0 as usize)
                .ok_or_else(|| AudioError::Submission {
                    buffer,
                    reason: "unknown buffer".into(),
                })?;
        if data.len() > storage.len() {
            return Err(AudioError::Submission {
                buffer,
                reason: format!("{} bytes exceed capacity {}", data.len(), storage.len()),
            });
        }
        storage[..data.len()].copy_from_slice(data);
        *filled = data.len();
        Ok(())
    }

    fn enqueue(&self, buffer: BufferId) -> Result<()> {
        if self.is_disposed() {
            return Err(AudioError::Submission {
                buffer,
                reason: "device disposed".into(),
            });
        }
        let mut state = self.state.lock();
        if buffer.0 as usize >= state.buffers.len() {
            return Err(AudioError::Submission {
                buffer,
                reason: "unknown buffer".into(),
            });
        }
        state.queued.push_back(buffer);
        Ok(())
    }

    fn start(&self) -> Result<()> {
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    fn dispose(&self) {
        // The gate is already held by this thread when called from a completion
        let reentrant = CompletionScope::active(self);
        if reentrant {
            self.disposed.store(true, Ordering::Release);
        } else {
            // Waits for a completion running on the audio thread
            let _gate = self.gate.lock();
            self.disposed.store(true, Ordering::Release);
        }

        let device = self.device.lock().take();
        if let Some(device) = device {
            let _ = device.shutdown.send(());
            if reentrant {
                // The stream cannot close until this callback returns; detach
                debug!("Disposed from the audio thread, not joining the output thread");
            } else if device.handle.join().is_err() {
                error!("Audio output thread panicked");
            }
        }

        let mut state = self.state.lock();
        state.queued.clear();
        state.buffers.clear();
        debug!("Disposed rodio output");
    }
}

/// Audio source that plays enqueued buffers back to back
struct BufferSource {
    queue: Arc<RodioQueue>,
    /// Decoded samples of the buffer being played
    samples: Vec<f32>,
    pos: usize,
    current: Option<BufferId>,
}

impl BufferSource {
    fn new(queue: Arc<RodioQueue>) -> Self {
        BufferSource {
            queue,
            samples: Vec::new(),
            pos: 0,
            current: None,
        }
    }
}

impl Source for BufferSource {
    fn current_frame_len(&self) -> Option<usize> {
        // Format never changes within a session
        None
    }

    fn channels(&self) -> u16 {
        self.queue.format.channels
    }

    fn sample_rate(&self) -> u32 {
        self.queue.format.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

impl Iterator for BufferSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        loop {
            if self.pos < self.samples.len() {
                let sample = self.samples[self.pos];
                self.pos += 1;
                return Some(sample);
            }

            // Current buffer fully consumed: hand it back
            if let Some(buffer) = self.current.take() {
                if !self.queue.complete(buffer) {
                    return None;
                }
            } else if self.queue.is_disposed() {
                return None;
            }

            self.pos = 0;
            match self.queue.next_buffer(&mut self.samples) {
                Some(buffer) => self.current = Some(buffer),
                None => {
                    // Underrun - a block of silence keeps the stream alive
                    // without polling the queue for every sample
                    self.samples.clear();
                    self.samples
                        .resize(SILENCE_FRAMES * usize::from(self.queue.format.channels), 0.0);
                }
            }
        }
    }
}
