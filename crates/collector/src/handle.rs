//! Running collector task and its stop channel

use crate::collector::{Collector, CollectorState};
use crate::error::CollectorError;
use crate::session::SessionReport;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

type CollectorTask = JoinHandle<Result<Option<SessionReport>, CollectorError>>;

/// A collector running on its own task
pub struct CollectorHandle {
    task: CollectorTask,
    stop_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<CollectorState>,
    grace: Duration,
}

impl CollectorHandle {
    pub fn spawn(collector: Collector) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let state_rx = collector.subscribe();
        let grace = collector.config().shutdown_grace();
        let task = tokio::spawn(collector.run(stop_rx));
        Self {
            task,
            stop_tx,
            state_rx,
            grace,
        }
    }

    pub fn state(&self) -> CollectorState {
        *self.state_rx.borrow()
    }

    /// Receiver for state transitions
    pub fn states(&self) -> watch::Receiver<CollectorState> {
        self.state_rx.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Ask the loop to stop after the current cycle
    pub fn request_stop(&self) {
        if self.stop_tx.send(true).is_ok() {
            info!("Stop requested");
        }
    }

    /// Request a stop and wait up to the grace period for the final flush.
    /// The task is aborted if it overruns.
    pub async fn stop(mut self) -> Result<Option<SessionReport>, CollectorError> {
        self.request_stop();
        match tokio::time::timeout(self.grace, &mut self.task).await {
            Ok(joined) => joined.map_err(|e| CollectorError::TaskFailed(e.to_string()))?,
            Err(_) => {
                warn!("Collector did not stop within {:?}, aborting", self.grace);
                self.task.abort();
                Err(CollectorError::ShutdownTimeout(self.grace))
            }
        }
    }

    /// Wait for the collector to finish, stopping it once `signal` resolves
    pub async fn run_until<F>(mut self, signal: F) -> Result<Option<SessionReport>, CollectorError>
    where
        F: Future<Output = ()>,
    {
        let finished = tokio::select! {
            joined = &mut self.task => Some(joined),
            _ = signal => None,
        };
        match finished {
            Some(joined) => joined.map_err(|e| CollectorError::TaskFailed(e.to_string()))?,
            None => {
                info!("Shutdown signal received");
                self.stop().await
            }
        }
    }

    /// Wait for the collector to finish on its own
    pub async fn wait(self) -> Result<Option<SessionReport>, CollectorError> {
        self.task
            .await
            .map_err(|e| CollectorError::TaskFailed(e.to_string()))?
    }
}
