//! Periodic expiry sweep

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::store::QueryResultCache;

/// Shortest interval the sweep loop accepts
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Longest interval; larger periods overflow the timer's deadline
const MAX_INTERVAL: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Background task that removes expired entries on a fixed interval
///
/// Holds only a weak reference, so dropping the last `Arc` to the cache ends
/// the loop on its next tick. Dropping the scheduler stops it as well.
#[derive(Debug)]
pub struct CleanupScheduler {
    stop_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    interval: Duration,
}

impl CleanupScheduler {
    /// Start sweeping at the cache's configured interval
    pub fn start(cache: &Arc<QueryResultCache>) -> Self {
        Self::with_interval(cache, cache.config().cleanup_interval())
    }

    /// Start sweeping at an explicit interval
    pub fn with_interval(cache: &Arc<QueryResultCache>, interval: Duration) -> Self {
        let interval = interval.clamp(MIN_INTERVAL, MAX_INTERVAL);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run(Arc::downgrade(cache), interval, stop_rx));

        info!(interval_ms = interval.as_millis() as u64, "Cache cleanup scheduler started");

        Self {
            stop_tx,
            handle: Mutex::new(Some(handle)),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Signal the loop to exit; calling more than once is harmless
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn is_running(&self) -> bool {
        match self.handle.lock() {
            Ok(guard) => guard.as_ref().map_or(false, |h| !h.is_finished()),
            Err(_) => false,
        }
    }

    /// Stop and wait for the loop to exit
    pub async fn shutdown(&self) {
        self.stop();

        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(e) => {
                warn!("Failed to acquire scheduler lock: {}", e);
                None
            }
        };

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Cache cleanup task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for CleanupScheduler {
    fn drop(&mut self) {
        self.stop_tx.send_replace(true);
    }
}

async fn run(cache: Weak<QueryResultCache>, period: Duration, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(cache) = cache.upgrade() else {
                    debug!("Cache dropped, stopping cleanup scheduler");
                    break;
                };

                match cache.clear_expired() {
                    Ok(0) => {}
                    Ok(removed) => debug!(removed, "Scheduled cleanup removed expired entries"),
                    Err(e) => warn!("Scheduled cache cleanup failed: {}", e),
                }
            }
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }

    info!("Cache cleanup scheduler stopped");
}
