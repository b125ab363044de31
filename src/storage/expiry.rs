//! Background Expiry Sweeper
//!
//! This module implements a background task that periodically scans the table
//! for expired keys and removes them. This is called "active expiry" as opposed
//! to "lazy expiry" (which happens on access).
//!
//! ## Why Do We Need This?
//!
//! Lazy expiry (checking on access) is efficient but has a problem:
//! If a key expires and is never accessed again, it will stay in memory forever!
//!
//! ## Design
//!
//! Each storage instance owns its own sweeper; there is no process-wide one.
//! The sweeper:
//! 1. Sleeps for a fixed interval (default: one hour)
//! 2. Wakes up and sweeps every shard
//! 3. Logs statistics about the cleanup
//!
//! The sweeper always runs on a dedicated thread driving a single-threaded
//! Tokio runtime. Synchronous callers need no runtime of their own, and a
//! storage built inside a short-lived runtime keeps sweeping after that
//! runtime is gone.

use crate::storage::StorageEngine;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Builder;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Default interval between sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
    interval: Duration,
}

impl ExpirySweeper {
    /// Starts the expiry sweeper in the background.
    ///
    /// # Errors
    ///
    /// Fails if the sweeper thread or its runtime cannot be created.
    ///
    /// # Example
    ///
    /// ```
    /// use memstore::storage::{ExpirySweeper, StorageEngine};
    /// use std::sync::Arc;
    /// use std::time::Duration;
    ///
    /// let engine = Arc::new(StorageEngine::new());
    /// let sweeper = ExpirySweeper::start(engine, Duration::from_secs(60)).unwrap();
    ///
    /// // Sweeper runs in the background...
    ///
    /// // Dropping the sweeper will stop it
    /// drop(sweeper);
    /// ```
    pub fn start(engine: Arc<StorageEngine>, interval: Duration) -> std::io::Result<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        spawn_detached(sweeper_loop(engine, interval, shutdown_rx))?;

        info!(interval_secs = interval.as_secs_f64(), "Background expiry sweeper started");

        Ok(Self {
            shutdown_tx,
            interval,
        })
    }

    /// Returns the interval between sweeps.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true once [`ExpirySweeper::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Stops the expiry sweeper.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!("Background expiry sweeper stopped");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

// The sweeper gets its own thread and runtime so it lives exactly as long as
// its handle, not as long as whichever runtime happened to be current.
fn spawn_detached<F>(task: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let runtime = Builder::new_current_thread().enable_time().build()?;
    std::thread::Builder::new()
        .name("memstore-sweeper".to_string())
        .spawn(move || runtime.block_on(task))?;
    Ok(())
}

/// The main sweeper loop.
async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        // Wait for the interval or shutdown signal
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let expired = engine.cleanup_expired();

        if expired > 0 {
            debug!(
                expired = expired,
                keys_remaining = engine.len(),
                "Expired keys cleaned up"
            );
        } else {
            trace!("Expiry sweep found nothing to remove");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_sweeper_cleans_expired_keys() {
        let engine = Arc::new(StorageEngine::new());

        // Add some keys with short TTL
        for i in 0..10 {
            engine.set_with_ttl(
                Bytes::from(format!("key{}", i)),
                Bytes::from("value"),
                Duration::from_millis(50),
            );
        }

        // Add a persistent key
        engine.set(Bytes::from("persistent"), Bytes::from("value"));

        assert_eq!(engine.len(), 11);

        let _sweeper = ExpirySweeper::start(Arc::clone(&engine), Duration::from_millis(10)).unwrap();

        // Wait for keys to expire and be cleaned up
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Only the persistent key should remain
        assert_eq!(engine.len(), 1);
        assert!(engine.exists(b"persistent"));
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_drop() {
        let engine = Arc::new(StorageEngine::new());

        {
            let _sweeper =
                ExpirySweeper::start(Arc::clone(&engine), Duration::from_millis(10)).unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            // Sweeper is dropped here
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The loop released its handle on the engine
        assert_eq!(Arc::strong_count(&engine), 1);

        engine.set_with_ttl(
            Bytes::from("key"),
            Bytes::from("value"),
            Duration::from_millis(10),
        );

        // Nothing sweeps any more, so the entry stays until it is read
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(engine.len(), 1);
        assert!(engine.get(b"key").is_none());
    }

    #[test]
    fn test_sweeper_outlives_creating_runtime() {
        let engine = Arc::new(StorageEngine::new());

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let sweeper = runtime
            .block_on(async {
                ExpirySweeper::start(Arc::clone(&engine), Duration::from_millis(20))
            })
            .unwrap();
        drop(runtime);

        engine.set_with_ttl(
            Bytes::from("key"),
            Bytes::from("value"),
            Duration::from_millis(50),
        );
        std::thread::sleep(Duration::from_millis(300));

        assert!(!sweeper.is_stopped());
        assert!(engine.is_empty());
    }

    #[test]
    fn test_sweeper_without_runtime() {
        let engine = Arc::new(StorageEngine::new());
        engine.set_with_ttl(
            Bytes::from("key"),
            Bytes::from("value"),
            Duration::from_millis(10),
        );

        let sweeper = ExpirySweeper::start(Arc::clone(&engine), Duration::from_millis(10)).unwrap();
        std::thread::sleep(Duration::from_millis(200));

        assert!(engine.is_empty());

        sweeper.stop();
        assert!(sweeper.is_stopped());
    }
}
