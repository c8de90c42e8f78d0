use crate::shared::error::{lock_poisoned, ControlPlaneError, ControlPlaneResult};
use crate::shared::types::{Capacity, CapacityPool, Placement, PoolKind};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Repository trait for capacity pool storage
#[async_trait]
pub trait PoolRepository: Send + Sync {
    /// Create a pool, or replace the capacity of an existing one (keeping its slots)
    async fn upsert(&self, kind: PoolKind, capacity: Capacity) -> ControlPlaneResult<CapacityPool>;

    async fn get(&self, kind: PoolKind) -> ControlPlaneResult<Option<CapacityPool>>;

    /// Take the lowest free slot of the pool
    async fn allocate(&self, kind: PoolKind) -> ControlPlaneResult<Placement>;

    /// Return a slot; false when it was not allocated
    async fn release(&self, placement: Placement) -> ControlPlaneResult<bool>;

    /// Remove a pool that has no allocated slots
    async fn remove_if_idle(&self, kind: PoolKind) -> ControlPlaneResult<CapacityPool>;

    async fn list(&self) -> ControlPlaneResult<Vec<CapacityPool>>;
}

/// In-memory implementation of pool repository
#[derive(Clone, Default)]
pub struct InMemoryPoolRepository {
    storage: Arc<RwLock<BTreeMap<PoolKind, CapacityPool>>>,
}

impl InMemoryPoolRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PoolRepository for InMemoryPoolRepository {
    async fn upsert(&self, kind: PoolKind, capacity: Capacity) -> ControlPlaneResult<CapacityPool> {
        let mut storage = self.storage.write().map_err(|_| lock_poisoned())?;
        let pool = storage
            .entry(kind)
            .and_modify(|pool| pool.resize(capacity))
            .or_insert_with(|| CapacityPool::new(kind, capacity));
        Ok(pool.clone())
    }

    async fn get(&self, kind: PoolKind) -> ControlPlaneResult<Option<CapacityPool>> {
        let storage = self.storage.read().map_err(|_| lock_poisoned())?;
        Ok(storage.get(&kind).cloned())
    }

    async fn allocate(&self, kind: PoolKind) -> ControlPlaneResult<Placement> {
        let mut storage = self.storage.write().map_err(|_| lock_poisoned())?;
        let pool = storage
            .get_mut(&kind)
            .ok_or_else(|| ControlPlaneError::UnknownPool(kind.to_string()))?;
        Ok(pool.allocate()?)
    }

    async fn release(&self, placement: Placement) -> ControlPlaneResult<bool> {
        let mut storage = self.storage.write().map_err(|_| lock_poisoned())?;
        let pool = storage
            .get_mut(&placement.pool_kind)
            .ok_or_else(|| ControlPlaneError::UnknownPool(placement.pool_kind.to_string()))?;
        Ok(pool.release(placement.slot))
    }

    async fn remove_if_idle(&self, kind: PoolKind) -> ControlPlaneResult<CapacityPool> {
        let mut storage = self.storage.write().map_err(|_| lock_poisoned())?;
        let pool = storage
            .get(&kind)
            .ok_or_else(|| ControlPlaneError::UnknownPool(kind.to_string()))?;
        if pool.allocated_count() > 0 {
            return Err(ControlPlaneError::ValidationError(format!(
                "{} still has {} allocated units",
                pool.pool_id,
                pool.allocated_count()
            )));
        }
        storage
            .remove(&kind)
            .ok_or_else(|| ControlPlaneError::UnknownPool(kind.to_string()))
    }

    async fn list(&self) -> ControlPlaneResult<Vec<CapacityPool>> {
        let storage = self.storage.read().map_err(|_| lock_poisoned())?;
        Ok(storage.values().cloned().collect())
    }
}
