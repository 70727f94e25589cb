//! Periodic tick driver
//!
//! Runs `DataSourceManager::on_tick` on a tokio interval. The manager is
//! shared behind a mutex so user actions (add, record, scrub) can be issued
//! from elsewhere between ticks.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::DataSourceManager;

/// Shared manager handle
pub type SharedManager = Arc<Mutex<DataSourceManager>>;

/// Handle to a running tick loop
#[derive(Debug)]
pub struct ManagerRunner {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<u64>,
}

impl ManagerRunner {
    /// Start ticking `manager` at its configured rate
    ///
    /// A change of the tick rate takes effect on the following tick. Ticks
    /// are skipped, not bunched, when the loop falls behind.
    pub fn spawn(manager: SharedManager) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut period = manager.lock().tick_interval();
            let mut ticker = new_ticker(period);
            let mut ticks = 0u64;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                let next_period = {
                    let mut manager = manager.lock();
                    if manager.is_update_timer_on() {
                        manager.on_tick();
                        ticks += 1;
                    }
                    manager.tick_interval()
                };

                if next_period != period {
                    debug!(?period, ?next_period, "tick period changed");
                    period = next_period;
                    ticker = new_ticker(period);
                }
            }

            info!(ticks, "tick loop stopped");
            ticks
        });

        Self { shutdown, handle }
    }

    /// Stop the loop and wait for it; returns the number of ticks run
    pub async fn shutdown(self) -> u64 {
        let _ = self.shutdown.send(true);
        self.handle.await.unwrap_or(0)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

fn new_ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}
