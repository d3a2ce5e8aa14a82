//! Scheduler module for running periodic check cycles.

mod cycle;

pub use cycle::*;

use crate::db::DbError;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

/// Runs a check cycle on a fixed interval.
///
/// Cycles never overlap: a tick that arrives while a cycle is still running
/// is skipped, and manual triggers share the same guard.
pub struct Scheduler {
    orchestrator: CheckOrchestrator,
    interval: Duration,
    cycle_lock: Mutex<()>,
    stop: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new(orchestrator: CheckOrchestrator, interval: Duration) -> Self {
        let (stop, _) = broadcast::channel(1);
        Self {
            orchestrator,
            interval,
            cycle_lock: Mutex::new(()),
            stop,
        }
    }

    /// Start the periodic loop. The first cycle runs immediately.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = self.clone();
        let mut stop_rx = self.stop.subscribe();

        tracing::info!("Starting scheduler, check interval {:?}", self.interval);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    _ = interval.tick() => {
                        match scheduler.try_run_cycle().await {
                            Some(Ok(_)) => {}
                            Some(Err(e)) => tracing::error!("Check cycle failed: {}", e),
                            None => tracing::warn!("Previous check cycle still running, skipping tick"),
                        }
                    }
                }
            }

            tracing::info!("Scheduler stopped");
        })
    }

    /// Stop the periodic loop after the current cycle.
    pub fn stop(&self) {
        let _ = self.stop.send(());
    }

    /// Run one cycle now, or return `None` if a cycle is already running.
    pub async fn try_run_cycle(&self) -> Option<Result<CycleReport, DbError>> {
        let _guard = self.cycle_lock.try_lock().ok()?;
        Some(self.orchestrator.run_cycle().await)
    }
}
