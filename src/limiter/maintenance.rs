//! Limiter maintenance
//!
//! Two independent periodic tasks keep the client registry bounded: an idle
//! eviction sweep on a short period and a map rebuild on a long one. Both
//! stop when the shared cancellation token fires.
//!
//! ```text
//! MaintenanceScheduler (Idle) --start()--> MaintenanceHandle (Running)
//!                                               |
//!                                          shutdown()
//!                                               v
//!                                           (Stopped)
//! ```

use crate::limiter::registry::ClientRegistry;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Lifecycle state of the maintenance tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceState {
    Running,
    Stopped,
}

/// Maintenance routines that have not been started yet.
pub struct MaintenanceScheduler {
    registry: Arc<ClientRegistry>,
    cleanup_interval: Duration,
    idle_timeout: Duration,
    rebuild_interval: Duration,
}

/// Running maintenance tasks.
pub struct MaintenanceHandle {
    cancel: CancellationToken,
    cleanup: JoinHandle<()>,
    rebuild: JoinHandle<()>,
}

impl MaintenanceScheduler {
    pub fn new(
        registry: Arc<ClientRegistry>,
        cleanup_interval: Duration,
        idle_timeout: Duration,
        rebuild_interval: Duration,
    ) -> Self {
        Self {
            registry,
            cleanup_interval,
            idle_timeout,
            rebuild_interval,
        }
    }

    /// Launches the eviction and rebuild tasks. Must be called from within a
    /// tokio runtime.
    pub fn start(self, cancel: CancellationToken) -> MaintenanceHandle {
        info!(
            "Starting limiter maintenance (sweep every {:?}, idle after {:?}, rebuild every {:?})",
            self.cleanup_interval, self.idle_timeout, self.rebuild_interval
        );

        let idle_timeout = self.idle_timeout;
        let cleanup = spawn_periodic(
            "eviction",
            self.cleanup_interval,
            Arc::clone(&self.registry),
            cancel.clone(),
            move |registry| {
                let evicted = registry.evict_idle(idle_timeout);
                if evicted > 0 {
                    debug!(
                        "Evicted {} idle clients, {} remaining",
                        evicted,
                        registry.len()
                    );
                }
            },
        );

        let rebuild = spawn_periodic(
            "rebuild",
            self.rebuild_interval,
            self.registry,
            cancel.clone(),
            |registry| {
                let stats = registry.rebuild();
                debug!(
                    "Rebuilt client map: {} entries, capacity {} -> {}",
                    stats.entries, stats.capacity_before, stats.capacity_after
                );
            },
        );

        MaintenanceHandle {
            cancel,
            cleanup,
            rebuild,
        }
    }
}

/// Runs `sweep` every `period` (first run one period after start) until
/// `cancel` fires. A period too long to schedule ends the task immediately.
fn spawn_periodic<F>(
    name: &'static str,
    period: Duration,
    registry: Arc<ClientRegistry>,
    cancel: CancellationToken,
    sweep: F,
) -> JoinHandle<()>
where
    F: Fn(&ClientRegistry) + Send + 'static,
{
    tokio::spawn(async move {
        let Some(first_tick) = Instant::now().checked_add(period) else {
            error!("Limiter {} period {:?} is out of range, task not started", name, period);
            return;
        };
        let mut ticker = tokio::time::interval_at(first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Limiter {} task stopped", name);
                    break;
                }
                _ = ticker.tick() => sweep(registry.as_ref()),
            }
        }
    })
}

impl MaintenanceHandle {
    pub fn state(&self) -> MaintenanceState {
        if self.cancel.is_cancelled() || (self.cleanup.is_finished() && self.rebuild.is_finished())
        {
            MaintenanceState::Stopped
        } else {
            MaintenanceState::Running
        }
    }

    /// Delivers the cancellation signal and waits for both tasks to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();

        for (name, task) in [("eviction", self.cleanup), ("rebuild", self.rebuild)] {
            if let Err(e) = task.await {
                warn!("Limiter {} task ended abnormally: {}", name, e);
            }
        }

        info!("Limiter maintenance stopped");
    }
}
