//! Graceful shutdown coordination.
//!
//! Background tasks (session sweeper, resource loaders) register with the
//! coordinator and terminate on the broadcast signal; shutdown drains them
//! under a timeout and aborts stragglers.

use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Shutdown coordinator for graceful termination.
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    tasks: JoinSet<()>,
}

impl ShutdownCoordinator {
    /// Create a new coordinator.
    #[must_use]
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            tasks: JoinSet::new(),
        }
    }

    /// Get a shutdown signal receiver.
    #[must_use]
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.shutdown_tx.subscribe(),
        }
    }

    /// Spawn a tracked background task that stops on the shutdown signal.
    pub fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.subscribe();
        self.tasks.spawn(async move {
            tokio::select! {
                () = future => {
                    info!(task = name, "Background task completed");
                }
                () = shutdown.into_recv() => {
                    info!(task = name, "Background task cancelled by shutdown");
                }
            }
        });
    }

    /// Signal shutdown and drain tasks, aborting after the timeout.
    pub async fn shutdown(mut self, timeout: Duration) {
        info!("Initiating graceful shutdown");
        let _ = self.shutdown_tx.send(());

        let drained = tokio::time::timeout(timeout, async {
            while let Some(result) = self.tasks.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "Task failed during shutdown");
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("Shutdown timeout reached, aborting remaining tasks");
            self.tasks.abort_all();
        }
        info!("Shutdown complete");
    }

    /// Number of tracked tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Shutdown signal receiver.
pub struct ShutdownSignal {
    receiver: broadcast::Receiver<()>,
}

impl ShutdownSignal {
    /// Wait for the shutdown signal.
    pub async fn recv(&mut self) {
        let _ = self.receiver.recv().await;
    }

    /// Wait for the shutdown signal, consuming the receiver.
    pub async fn into_recv(mut self) {
        let _ = self.receiver.recv().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_tasks_stop_on_shutdown() {
        let mut coordinator = ShutdownCoordinator::new();
        let stopped = Arc::new(AtomicBool::new(false));

        let flag = stopped.clone();
        coordinator.spawn("forever", async move {
            std::future::pending::<()>().await;
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(coordinator.task_count(), 1);

        coordinator.shutdown(Duration::from_secs(1)).await;
        assert!(!stopped.load(Ordering::SeqCst), "task body must be cancelled, not completed");
    }

    #[tokio::test]
    async fn test_completed_task_drains() {
        let mut coordinator = ShutdownCoordinator::new();
        coordinator.spawn("quick", async {});
        coordinator.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_signal_reaches_subscribers() {
        let coordinator = ShutdownCoordinator::new();
        let mut signal = coordinator.subscribe();
        coordinator.shutdown(Duration::from_millis(100)).await;
        tokio::time::timeout(Duration::from_secs(1), signal.recv())
            .await
            .expect("signal must arrive");
    }
}
