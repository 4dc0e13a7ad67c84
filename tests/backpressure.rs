use hearnow_audio::platform::manual::ManualPlatform;
use hearnow_audio::{AudioFormat, AudioOutput, EngineConfig};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Wake-up signal raised by the watcher
#[derive(Default)]
struct Signal {
    raised: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    fn raise(&self) {
        *self.raised.lock() = true;
        self.cond.notify_all();
    }

    fn wait(&self, timeout: Duration) {
        let mut raised = self.raised.lock();
        if !*raised {
            self.cond.wait_for(&mut raised, timeout);
        }
        *raised = false;
    }
}

/// Producer that only hands over the next block once the device went idle,
/// with completions delivered on a separate thread.
#[test]
fn producer_waits_for_drain_between_blocks() {
    let platform = ManualPlatform::new();
    let output = AudioOutput::open_with(
        &platform,
        AudioFormat::mono_8bit(11_025),
        EngineConfig {
            buffer_count: 4,
            buffer_capacity: 256,
        },
    )
    .unwrap();

    let signal = Arc::new(Signal::default());
    let notifications = Arc::new(AtomicUsize::new(0));
    {
        let signal = Arc::clone(&signal);
        let notifications = Arc::clone(&notifications);
        output
            .watch(move |pending: u32| {
                assert!(pending <= 4);
                notifications.fetch_add(1, Ordering::Relaxed);
                signal.raise();
            })
            .unwrap();
    }

    let stop = Arc::new(AtomicBool::new(false));
    let driver = {
        let platform = platform.clone();
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut events = 0usize;
            while !stop.load(Ordering::Acquire) {
                match platform.complete_next() {
                    Some(_) => events += 1,
                    None => thread::yield_now(),
                }
            }
            events
        })
    };

    let blocks: Vec<usize> = vec![600, 1024, 1, 2000, 333];
    for (tag, &len) in blocks.iter().enumerate() {
        output.write(vec![tag as u8; len]).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while output.samples_pending() > 0 {
            assert!(Instant::now() < deadline, "block {} never drained", tag);
            signal.wait(Duration::from_millis(10));
        }
    }

    stop.store(true, Ordering::Release);
    let events = driver.join().unwrap();

    // Every block reached the device in full; nothing of one block leaked into another.
    let submissions = platform.submissions();
    for (tag, &len) in blocks.iter().enumerate() {
        let delivered: usize = submissions
            .iter()
            .flat_map(|s| s.bytes.iter())
            .filter(|&&b| b == tag as u8)
            .count();
        assert_eq!(delivered, len, "block {}", tag);
    }

    let expected_events: usize = blocks.iter().map(|len| len.div_ceil(256)).sum();
    assert_eq!(events, expected_events);
    assert_eq!(submissions.len(), expected_events);
    assert!(notifications.load(Ordering::Relaxed) >= blocks.len() * 4);
    assert_eq!(platform.queued_len(), 0);

    output.close();
    assert!(platform.is_disposed());
}

/// Completions racing a stream of writes never push the count past the pool.
#[test]
fn concurrent_writes_and_completions_keep_count_consistent() {
    let platform = ManualPlatform::new();
    let output = AudioOutput::open_with(
        &platform,
        AudioFormat::mono_8bit(8_000),
        EngineConfig {
            buffer_count: 3,
            buffer_capacity: 64,
        },
    )
    .unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let driver = {
        let platform = platform.clone();
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::Acquire) {
                if platform.complete_next().is_none() {
                    thread::yield_now();
                }
            }
        })
    };

    for round in 0..200u32 {
        output.write(vec![0; (round as usize * 37) % 500]).unwrap();
        assert!(output.samples_pending() <= 3);
    }

    let deadline = Instant::now() + Duration::from_secs(10);
    while output.samples_pending() > 0 && Instant::now() < deadline {
        thread::yield_now();
    }
    stop.store(true, Ordering::Release);
    driver.join().unwrap();

    assert_eq!(output.samples_pending(), 0);
    assert_eq!(platform.queued_len(), 0);
}
