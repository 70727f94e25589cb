//! Background save worker
//!
//! Periodically flushes a source's unsaved items from its own thread so the
//! tick never blocks on disk I/O. Holds only a `Weak` to the source: the
//! source owns the worker, not the other way round.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::DataSource;

/// Handle to a running background save thread
#[derive(Debug)]
pub struct BackgroundSaver {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundSaver {
    /// Start saving `source`'s pending items every `interval`
    pub fn spawn(source: Weak<DataSource>, interval: Duration) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let running_flag = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("background-saver".to_string())
            .spawn(move || {
                while running_flag.load(Ordering::SeqCst) {
                    thread::park_timeout(interval);
                    let Some(source) = source.upgrade() else {
                        debug!("source dropped, background saver exiting");
                        return;
                    };
                    let saved = source.save_buffer();
                    if saved > 0 {
                        debug!(source = %source.name(), saved, "background save pass");
                    }
                }

                // Final flush so nothing tagged during the session is lost.
                if let Some(source) = source.upgrade() {
                    let saved = source.save_buffer();
                    info!(source = %source.name(), saved, "background saver stopped");
                }
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Signal the worker and wait for its final flush
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let Some(handle) = self.handle.take() else {
            return;
        };

        // The last strong reference to the source may be dropped on the
        // worker itself; it cannot join its own thread.
        if handle.thread().id() == thread::current().id() {
            return;
        }

        handle.thread().unpark();
        if handle.join().is_err() {
            warn!("background saver thread panicked");
        }
    }
}

impl Drop for BackgroundSaver {
    fn drop(&mut self) {
        self.stop();
    }
}
