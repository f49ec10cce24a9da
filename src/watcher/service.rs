use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::{OraError, OraResult};
use crate::shelf::storage::Storage;
use crate::watcher::dispatch::Dispatcher;
use crate::watcher::tracker::ChangeTracker;

/// Periodically lists a tracker so external changes surface as events.
///
/// Each tick is an ordinary top-level [`ChangeTracker::list`]. A failed
/// listing is logged and polling carries on.
pub struct PollService {
    handle: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    interval: Duration,
}

impl PollService {
    /// Starts polling on the current tokio runtime. The first listing runs
    /// immediately.
    pub fn spawn<S, D>(tracker: Arc<ChangeTracker<S, D>>, interval: Duration) -> Self
    where
        S: Storage + 'static,
        D: Dispatcher + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        if let Err(e) = tracker.list().await {
                            warn!(error = %e, "poll listing failed");
                        }
                    }
                }
            }

            debug!("poll service stopped");
        });

        PollService {
            handle: Some(handle),
            shutdown_tx: Some(shutdown_tx),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops polling and waits for an in-flight listing to finish.
    pub async fn shutdown(&mut self) -> OraResult<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .map_err(|e| OraError::Other(format!("poll task failed: {e}")))?;
        }

        Ok(())
    }
}

impl Drop for PollService {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
