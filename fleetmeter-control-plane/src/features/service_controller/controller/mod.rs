use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::features::service_controller::service::ServiceController;

/// Drives one service controller on a fixed tick.
#[derive(Clone)]
pub struct ReconcileLoop {
    service: Arc<ServiceController>,
    interval: Duration,
}

impl ReconcileLoop {
    pub fn new(service: Arc<ServiceController>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Runs until `shutdown` flips to true or its sender goes away. Placed
    /// tasks stay placed when the loop stops.
    pub fn spawn_periodic_reconcile(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.service.reconcile().await {
                            Ok(outcome) if outcome.is_noop() => debug!("Service already converged"),
                            Ok(outcome) => debug!(
                                started = outcome.started.len(),
                                stopped = outcome.stopped.len(),
                                "Reconcile pass applied changes"
                            ),
                            Err(error) => warn!(error = %error, "Reconcile pass failed"),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Reconcile loop stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}
