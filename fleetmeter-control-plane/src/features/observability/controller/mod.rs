use crate::features::observability::repo::ObservabilityRepository;
use crate::features::observability::service::ObservabilityService;
use crate::shared::error::ControlPlaneResult;
use crate::shared::types::{PoolKind, ReconcileOutcome};
use std::sync::Arc;

/// Metrics facade handed to every component. Each control plane owns its
/// own registry.
pub struct ObservabilityController {
    service: ObservabilityService,
}

impl ObservabilityController {
    pub fn new() -> ControlPlaneResult<Self> {
        let repo = Arc::new(ObservabilityRepository::new()?);
        Ok(Self {
            service: ObservabilityService::new(repo),
        })
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
        self.service
            .record_reconcile(service, pool, outcome, desired, running, seconds);
    }

    pub fn record_delivery(&self, handler: &str, success: bool) {
        self.service.record_delivery(handler, success);
    }

    pub fn set_pool_available(&self, pool: PoolKind, units: Option<u32>) {
        self.service.set_pool_available(pool, units);
    }

    pub fn delivery_count(&self, handler: &str, success: bool) -> f64 {
        self.service.delivery_count(handler, success)
    }

    pub fn render_metrics(&self) -> ControlPlaneResult<String> {
        self.service.render_metrics()
    }
}
