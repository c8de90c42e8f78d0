use crate::features::cluster_registry::repo::PoolRepository;
use crate::features::observability::controller::ObservabilityController;
use crate::shared::error::{ControlPlaneError, ControlPlaneResult};
use crate::shared::types::{Capacity, CapacityPool, Placement, PoolKind};
use std::sync::Arc;
use tracing::{debug, info};

/// Tracks the capacity pools of the cluster and hands out placements.
pub struct ClusterRegistry {
    repo: Arc<dyn PoolRepository>,
    metrics: Option<Arc<ObservabilityController>>,
}

impl ClusterRegistry {
    pub fn new(repo: Arc<dyn PoolRepository>) -> Self {
        Self {
            repo,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ObservabilityController>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn register_pool(
        &self,
        kind: PoolKind,
        capacity: Capacity,
    ) -> ControlPlaneResult<CapacityPool> {
        let pool = self.repo.upsert(kind, capacity).await?;
        info!(pool = %kind, %capacity, allocated = pool.allocated_count(), "Capacity pool registered");
        self.publish_available(&pool);
        Ok(pool)
    }

    /// Same as registering again; kept separate so scaling shows up in logs.
    pub async fn resize_pool(
        &self,
        kind: PoolKind,
        capacity: Capacity,
    ) -> ControlPlaneResult<CapacityPool> {
        self.pool(kind).await?;
        let pool = self.repo.upsert(kind, capacity).await?;
        info!(pool = %kind, %capacity, available = %pool.available(), "Capacity pool resized");
        self.publish_available(&pool);
        Ok(pool)
    }

    /// Tear a pool down. Refused while tasks still occupy slots.
    pub async fn deregister_pool(&self, kind: PoolKind) -> ControlPlaneResult<()> {
        let pool = self.repo.remove_if_idle(kind).await?;
        info!(pool = %kind, pool_id = %pool.pool_id, "Capacity pool deregistered");
        if let Some(metrics) = &self.metrics {
            metrics.set_pool_available(kind, Some(0));
        }
        Ok(())
    }

    pub async fn pool(&self, kind: PoolKind) -> ControlPlaneResult<CapacityPool> {
        self.repo
            .get(kind)
            .await?
            .ok_or_else(|| ControlPlaneError::UnknownPool(kind.to_string()))
    }

    pub async fn available_capacity(&self, kind: PoolKind) -> ControlPlaneResult<Capacity> {
        Ok(self.pool(kind).await?.available())
    }

    pub async fn list_pools(&self) -> ControlPlaneResult<Vec<CapacityPool>> {
        self.repo.list().await
    }

    pub async fn allocate(&self, kind: PoolKind) -> ControlPlaneResult<Placement> {
        let placement = self.repo.allocate(kind).await?;
        debug!(pool = %kind, slot = placement.slot, "Placement allocated");
        self.refresh_available(kind).await;
        Ok(placement)
    }

    pub async fn release(&self, placement: Placement) -> ControlPlaneResult<()> {
        if !self.repo.release(placement).await? {
            debug!(pool = %placement.pool_kind, slot = placement.slot, "Released slot was not allocated");
        }
        self.refresh_available(placement.pool_kind).await;
        Ok(())
    }

    async fn refresh_available(&self, kind: PoolKind) {
        if self.metrics.is_none() {
            return;
        }
        if let Ok(Some(pool)) = self.repo.get(kind).await {
            self.publish_available(&pool);
        }
    }

    fn publish_available(&self, pool: &CapacityPool) {
        if let Some(metrics) = &self.metrics {
            metrics.set_pool_available(pool.kind, pool.available().units());
        }
    }
}
