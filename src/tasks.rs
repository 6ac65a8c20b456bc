// ABOUTME: Periodic background tasks with explicit shutdown handles
// ABOUTME: Used by the revocation snapshot refresh and the nonce cache purge
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 QToken Contributors

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Handle to a periodic task
///
/// Dropping the handle closes the shutdown channel, which also stops the task.
#[derive(Debug)]
pub struct BackgroundTask {
    name: &'static str,
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl BackgroundTask {
    /// Task name for logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the task has exited
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Signal shutdown and wait for the task to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.join.await {
            warn!(task = self.name, "Background task ended abnormally: {e}");
        }
    }
}

/// Run `job` every `period`, starting one period from now
pub fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, mut job: F) -> BackgroundTask
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    let join = tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = interval.tick() => job().await,
                _ = shutdown_rx.recv() => {
                    debug!(task = name, "Background task received shutdown signal");
                    break;
                }
            }
        }
    });

    BackgroundTask {
        name,
        shutdown_tx,
        join,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_runs_until_shutdown() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let task = spawn_periodic("counter", Duration::from_millis(5), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(task.name(), "counter");
        task.shutdown().await;

        let after_shutdown = runs.load(Ordering::SeqCst);
        assert!(after_shutdown >= 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(runs.load(Ordering::SeqCst), after_shutdown);
    }
}
