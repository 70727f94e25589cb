//! Background acquisition thread shared by the mock devices
//!
//! Generates one item per period on its own thread and pushes it through
//! the source's `ItemCallback`, the same way a real device driver would.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use contracts::{DataItem, ItemCallback};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

/// Item generator, called with a running sample counter
pub type ItemGenerator = Box<dyn FnMut(u64) -> DataItem + Send>;

/// Acquisition thread handle
#[derive(Debug, Default)]
pub struct MockAcquisition {
    listening: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl MockAcquisition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start producing at `rate_hz`
    ///
    /// Idempotent: a second call while running is ignored.
    pub fn start(
        &self,
        device: &str,
        rate_hz: f64,
        mut generate: ItemGenerator,
        callback: ItemCallback,
    ) {
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }

        let device = device.to_string();
        let listening = Arc::clone(&self.listening);
        let interval = Duration::from_secs_f64(1.0 / rate_hz.max(f64::MIN_POSITIVE));

        let spawned = thread::Builder::new()
            .name(format!("acquire-{device}"))
            .spawn(move || {
                let mut sample: u64 = 0;
                debug!(device = %device, rate_hz, "mock acquisition started");

                while listening.load(Ordering::Relaxed) {
                    let item = generate(sample);
                    trace!(
                        device = %device,
                        sample,
                        timestamp_ns = item.timestamp_ns(),
                        "mock item produced"
                    );
                    callback(item);
                    sample += 1;
                    thread::park_timeout(interval);
                }

                debug!(device = %device, samples = sample, "mock acquisition stopped");
            });

        match spawned {
            Ok(handle) => *self.handle.lock() = Some(handle),
            Err(e) => {
                warn!(error = %e, "failed to spawn acquisition thread");
                self.listening.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Stop producing and wait for the thread to exit
    pub fn stop(&self) {
        self.listening.store(false, Ordering::SeqCst);
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        // stop() may run on the acquisition thread when it drops the last
        // reference to its source.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        handle.thread().unpark();
        if handle.join().is_err() {
            warn!("acquisition thread panicked");
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Relaxed)
    }
}

impl Drop for MockAcquisition {
    fn drop(&mut self) {
        self.stop();
    }
}
