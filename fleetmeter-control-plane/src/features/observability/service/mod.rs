use crate::features::observability::repo::ObservabilityRepository;
use crate::shared::error::ControlPlaneResult;
use crate::shared::types::{PoolKind, ReconcileOutcome};
use std::sync::Arc;

pub struct ObservabilityService {
    repo: Arc<ObservabilityRepository>,
}

impl ObservabilityService {
    pub fn new(repo: Arc<ObservabilityRepository>) -> Self {
        Self { repo }
    }

    pub fn record_reconcile(
        &self,
        service: &str,
        pool: PoolKind,
        outcome: &ReconcileOutcome,
        desired: u32,
        running: usize,
        seconds: f64,
    ) {
        let pool = pool.as_str();
        if !outcome.started.is_empty() {
            self.repo
                .inc_tasks_started(service, pool, outcome.started.len() as u64);
        }
        if !outcome.stopped.is_empty() {
            self.repo
                .inc_tasks_stopped(service, pool, outcome.stopped.len() as u64);
        }
        self.repo.set_running_tasks(service, running as f64);
        self.repo
            .set_capacity_shortfall(service, (desired as f64 - running as f64).max(0.0));
        self.repo.observe_reconcile_latency(service, seconds);
    }

    pub fn record_delivery(&self, handler: &str, success: bool) {
        let outcome = if success { "delivered" } else { "failed" };
        self.repo.inc_event_delivery(handler, outcome);
    }

    pub fn set_pool_available(&self, pool: PoolKind, units: Option<u32>) {
        if let Some(units) = units {
            self.repo.set_pool_available_units(pool.as_str(), units as f64);
        }
    }

    pub fn delivery_count(&self, handler: &str, success: bool) -> f64 {
        let outcome = if success { "delivered" } else { "failed" };
        self.repo.event_delivery_count(handler, outcome)
    }

    pub fn render_metrics(&self) -> ControlPlaneResult<String> {
        self.repo.render_metrics()
    }
}
