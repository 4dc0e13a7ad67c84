//! WAV file rendering platform
//!
//! Submitted buffers are appended to a WAV file by a dedicated drain thread,
//! which then hands each buffer back through the completion handler. There is
//! no real-time pacing: a payload renders as fast as the disk accepts it, which
//! makes this backend suitable for offline rendering and for exercising the
//! engine against a genuinely concurrent completion thread.

use super::{AudioPlatform, BufferId, CompletionHandler, OutputQueue};
use crate::format::AudioFormat;
use crate::pcm;
use crate::{AudioError, Result};
use log::{debug, error};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type Writer = hound::WavWriter<BufWriter<File>>;

/// Platform that records everything it is asked to play into a WAV file
#[derive(Debug, Clone)]
pub struct WavPlatform {
    path: PathBuf,
}

impl WavPlatform {
    /// Render into the file at `path` (created or truncated on open)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        WavPlatform { path: path.into() }
    }

    /// Target file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AudioPlatform for WavPlatform {
    fn name(&self) -> &'static str {
        "wav"
    }

    fn open_queue(
        &self,
        format: &AudioFormat,
        on_complete: CompletionHandler,
    ) -> Result<Arc<dyn OutputQueue>> {
        format.validate()?;

        let spec = hound::WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: format.sample_resolution_bits(),
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(&self.path, spec)?;

        let queue = Arc::new(WavQueue {
            state: Mutex::new(DrainState::default()),
            wake: Condvar::new(),
            format: *format,
            on_complete,
            worker: Mutex::new(None),
        });

        let drain = Arc::clone(&queue);
        let handle = thread::Builder::new()
            .name("hn-wav-drain".into())
            .spawn(move || drain.run(writer))?;
        *queue.worker.lock() = Some(handle);

        debug!("Rendering to {}", self.path.display());
        Ok(queue)
    }
}

#[derive(Default)]
struct DrainState {
    /// Buffer memory, indexed by `BufferId`: (storage, filled length)
    buffers: Vec<(Vec<u8>, usize)>,
    queued: VecDeque<BufferId>,
    started: bool,
    shutdown: bool,
}

impl DrainState {
    fn buffer_mut(&mut self, buffer: BufferId) -> Result<&mut (Vec<u8>, usize)> {
        self.buffers
            .get_mut(buffer.0 as usize)
            .ok_or_else(|| AudioError::Submission {
                buffer,
                reason: "unknown buffer".into(),
            })
    }
}

/// Queue handed out by [`WavPlatform`]
pub struct WavQueue {
    state: Mutex<DrainState>,
    wake: Condvar,
    format: AudioFormat,
    on_complete: CompletionHandler,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WavQueue {
    /// Drain thread: write each queued buffer, then complete it
    fn run(&self, mut writer: Writer) {
        let frame = self.format.bytes_per_frame();
        let mut scratch = Vec::new();
        let mut failed = false;

        loop {
            let buffer = {
                let mut state = self.state.lock();
                while !state.shutdown && !(state.started && !state.queued.is_empty()) {
                    self.wake.wait(&mut state);
                }
                if state.shutdown {
                    break;
                }
                let Some(buffer) = state.queued.pop_front() else {
                    continue;
                };
                scratch.clear();
                if let Ok((storage, filled)) = state.buffer_mut(buffer) {
                    // Only whole frames reach the file
                    scratch.extend_from_slice(&storage[..*filled - *filled % frame]);
                }
                buffer
            };

            if !failed {
                if let Err(err) = write_samples(&mut writer, &self.format, &scratch) {
                    error!("WAV write failed, discarding further audio: {}", err);
                    failed = true;
                }
            }

            (self.on_complete)(self, buffer);
        }

        if let Err(err) = writer.finalize() {
            error!("Failed to finalize WAV file: {}", err);
        }
        debug!("WAV drain thread exiting");
    }
}

fn write_samples(writer: &mut Writer, format: &AudioFormat, bytes: &[u8]) -> Result<()> {
    for sample in pcm::samples_i32(format.resolution, bytes) {
        writer.write_sample(sample)?;
    }
    Ok(())
}

impl OutputQueue for WavQueue {
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
        let (storage, filled) = state.buffer_mut(buffer)?;
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
        let mut state = self.state.lock();
        if state.shutdown {
            return Err(AudioError::Submission {
                buffer,
                reason: "renderer stopped".into(),
            });
        }
        state.buffer_mut(buffer)?;
        state.queued.push_back(buffer);
        self.wake.notify_one();
        Ok(())
    }

    fn start(&self) -> Result<()> {
        self.state.lock().started = true;
        self.wake.notify_one();
        Ok(())
    }

    fn dispose(&self) {
        {
            let mut state = self.state.lock();
            state.shutdown = true;
            state.queued.clear();
        }
        self.wake.notify_all();

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            // Disposing from the completion handler must not join itself
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                error!("WAV drain thread panicked");
            }
        }
        self.state.lock().buffers.clear();
    }
}
