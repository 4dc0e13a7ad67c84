//! Caller-driven platform
//!
//! Buffers go into a FIFO when enqueued and stay there until the owner calls
//! [`ManualPlatform::complete_next`], which runs the completion handler on the
//! calling thread. This makes drain order and timing fully deterministic, so it
//! backs the crate's tests and any offline driver that wants to pull audio at
//! its own pace.

use super::{AudioPlatform, BufferId, CompletionHandler, OutputQueue};
use crate::format::AudioFormat;
use crate::{AudioError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

/// A buffer as it was handed to the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Buffer that was enqueued
    pub buffer: BufferId,
    /// Bytes the buffer held at enqueue time
    pub bytes: Vec<u8>,
}

#[derive(Default)]
struct Controls {
    queue: Option<Arc<ManualQueue>>,
    fail_open: Option<String>,
    fail_next_enqueue: Option<String>,
    fail_next_start: Option<String>,
}

/// Platform whose completions are triggered explicitly
///
/// Cloning shares the same device, so a clone can drive completions from
/// another thread.
#[derive(Clone, Default)]
pub struct ManualPlatform {
    controls: Arc<Mutex<Controls>>,
}

impl ManualPlatform {
    /// Create a platform with no open queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open_queue` fail with `DeviceUnavailable`
    pub fn fail_open(&self, reason: impl Into<String>) {
        self.controls.lock().fail_open = Some(reason.into());
    }

    /// Make the next `enqueue` on the open queue fail
    pub fn fail_next_enqueue(&self, reason: impl Into<String>) {
        self.controls.lock().fail_next_enqueue = Some(reason.into());
    }

    /// Make the next `start` on the open queue fail with `DeviceUnavailable`
    pub fn fail_next_start(&self, reason: impl Into<String>) {
        self.controls.lock().fail_next_start = Some(reason.into());
    }

    fn queue(&self) -> Option<Arc<ManualQueue>> {
        self.controls.lock().queue.clone()
    }

    /// Drain the oldest enqueued buffer and run the completion handler for it
    ///
    /// Returns the drained buffer, or `None` when nothing is queued.
    pub fn complete_next(&self) -> Option<BufferId> {
        self.queue()?.complete_next()
    }

    /// Complete buffers until the queue is empty; returns the number of
    /// completion events delivered
    pub fn run_until_idle(&self) -> usize {
        let mut events = 0;
        while self.complete_next().is_some() {
            events += 1;
        }
        events
    }

    /// Number of buffers currently enqueued
    pub fn queued_len(&self) -> usize {
        self.queue().map_or(0, |q| q.state.lock().queued.len())
    }

    /// Every submission so far, in enqueue order
    pub fn submissions(&self) -> Vec<Submission> {
        self.queue()
            .map(|q| q.state.lock().submissions.clone())
            .unwrap_or_default()
    }

    /// Number of buffers allocated on the open queue
    pub fn buffer_count(&self) -> usize {
        self.queue().map_or(0, |q| q.state.lock().buffers.len())
    }

    /// How many times the open queue was started successfully
    pub fn start_count(&self) -> usize {
        self.queue().map_or(0, |q| q.state.lock().start_count)
    }

    /// Whether the open queue has been disposed
    pub fn is_disposed(&self) -> bool {
        self.queue().is_some_and(|q| q.state.lock().disposed)
    }
}

impl AudioPlatform for ManualPlatform {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn open_queue(
        &self,
        format: &AudioFormat,
        on_complete: CompletionHandler,
    ) -> Result<Arc<dyn OutputQueue>> {
        let mut controls = self.controls.lock();
        if let Some(reason) = controls.fail_open.take() {
            return Err(AudioError::DeviceUnavailable(reason));
        }
        format.validate()?;

        let queue = Arc::new(ManualQueue {
            state: Mutex::new(QueueState::default()),
            controls: Arc::downgrade(&self.controls),
            on_complete,
        });
        controls.queue = Some(Arc::clone(&queue));
        Ok(queue)
    }
}

#[derive(Default)]
struct QueueState {
    /// Buffer memory, indexed by `BufferId`: (storage, filled length)
    buffers: Vec<(Vec<u8>, usize)>,
    queued: VecDeque<BufferId>,
    submissions: Vec<Submission>,
    start_count: usize,
    disposed: bool,
}

impl QueueState {
    fn buffer_mut(&mut self, buffer: BufferId) -> Result<&mut (Vec<u8>, usize)> {
        self.buffers
            .get_mut(buffer.0 as usize)
            .ok_or_else(|| AudioError::Submission {
                buffer,
                reason: "unknown buffer".into(),
            })
    }
}

/// Queue handed out by [`ManualPlatform`]
pub struct ManualQueue {
    state: Mutex<QueueState>,
    controls: Weak<Mutex<Controls>>,
    on_complete: CompletionHandler,
}

impl ManualQueue {
    /// Take a pending injected failure, if the platform is still around
    fn injected(&self, take: impl FnOnce(&mut Controls) -> Option<String>) -> Option<String> {
        let controls = self.controls.upgrade()?;
        let mut controls = controls.lock();
        take(&mut *controls)
    }

    fn complete_next(&self) -> Option<BufferId> {
        let buffer = {
            let mut state = self.state.lock();
            if state.disposed {
                return None;
            }
            state.queued.pop_front()?
        };
        (self.on_complete)(self, buffer);
        Some(buffer)
    }
}

impl OutputQueue for ManualQueue {
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
        if let Some(reason) = self.injected(|controls| controls.fail_next_enqueue.take()) {
            return Err(AudioError::Submission { buffer, reason });
        }

        let mut state = self.state.lock();
        if state.disposed {
            return Err(AudioError::Submission {
                buffer,
                reason: "queue disposed".into(),
            });
        }
        let (storage, filled) = state.buffer_mut(buffer)?;
        let bytes = storage[..*filled].to_vec();
        state.submissions.push(Submission { buffer, bytes });
        state.queued.push_back(buffer);
        Ok(())
    }

    fn start(&self) -> Result<()> {
        if let Some(reason) = self.injected(|controls| controls.fail_next_start.take()) {
            return Err(AudioError::DeviceUnavailable(reason));
        }
        self.state.lock().start_count += 1;
        Ok(())
    }

    fn dispose(&self) {
        let mut state = self.state.lock();
        state.disposed = true;
        state.queued.clear();
        state.buffers.clear();
    }
}
