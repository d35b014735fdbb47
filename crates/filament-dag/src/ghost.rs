//! The ghost driver: a background task that keeps confirmations moving.
//!
//! Real transactions only confirm when later transactions endorse them, so an
//! idle ledger would strand everything below the threshold. Each tick the
//! driver submits a genesis-signed no-op through the normal submission path —
//! raising `in_degree` on live tips — and then checkpoints the DAG.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::DagEngine;

/// Handle to the running driver. Holds the task so shutdown can be
/// coordinated: cooperative cancel plus join, with abort-on-drop as the
/// fallback when the handle is dropped without an explicit shutdown.
pub struct GhostDriver {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl GhostDriver {
    /// Start the driver against `engine`, ticking every `interval`.
    pub fn spawn(engine: Arc<DagEngine>, interval: Duration) -> Self {
        let (shutdown, mut rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            loop {
                match engine.submit(engine.build_ghost()) {
                    Ok(id) => debug!(id = %id, "ghost transaction woven"),
                    Err(e) => warn!(error = %e, "ghost transaction rejected"),
                }
                // The in-memory DAG stays authoritative: a failed write is
                // logged and retried on the next tick.
                if let Err(e) = engine.checkpoint() {
                    warn!(error = %e, "checkpoint failed; retrying next tick");
                }

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = rx.changed() => {
                        if *rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("ghost driver stopped");
        });
        Self {
            shutdown,
            task: Some(task),
        }
    }

    /// Cooperatively stop the driver and wait for the loop to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for GhostDriver {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use filament_crypto::SigningKeyPair;

    #[tokio::test]
    async fn driver_weaves_ghosts_and_checkpoints() {
        let dir = std::env::temp_dir().join("filament_ghost_driver_test");
        let _ = std::fs::remove_dir_all(&dir);
        let config = EngineConfig::new(&dir);
        let engine = DagEngine::open(config, SigningKeyPair::generate()).unwrap();

        let driver = GhostDriver::spawn(Arc::clone(&engine), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(200)).await;
        driver.shutdown().await;

        assert!(engine.vertex_count() > 1, "ghosts should have been woven");
        assert!(engine.is_acyclic());
        assert!(
            dir.join("shared").join("dag.json").is_file(),
            "each tick should checkpoint"
        );
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let dir = std::env::temp_dir().join("filament_ghost_shutdown_test");
        let _ = std::fs::remove_dir_all(&dir);
        let engine = DagEngine::open(EngineConfig::new(&dir), SigningKeyPair::generate()).unwrap();

        let driver = GhostDriver::spawn(Arc::clone(&engine), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        driver.shutdown().await;

        let count = engine.vertex_count();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.vertex_count(), count, "no ticks after shutdown");
    }
}
