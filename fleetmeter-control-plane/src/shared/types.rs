use serde::{Deserialize, Serialize};

pub use fleetmeter_core::{
    Capacity, CapacityPool, EventPattern, LifecycleEvent, Placement, PoolKind, ServiceRecord,
    StatusEntry, TaskInstance, TaskStatus, WorkloadDefinition,
};

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub started: Vec<TaskInstance>,
    pub stopped: Vec<TaskInstance>,
}

impl ReconcileOutcome {
    pub fn is_noop(&self) -> bool {
        self.started.is_empty() && self.stopped.is_empty()
    }
}

/// How one event fared across the matching rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub matched: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// What the status handler did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    Created,
    Updated,
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    pub inserted: usize,
    pub skipped: usize,
}

/// Request to register or replace a capacity pool
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPoolRequest {
    pub kind: PoolKind,
    /// Absent means unbounded.
    #[serde(default)]
    pub capacity: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolResponse {
    pub pool_id: String,
    pub kind: PoolKind,
    pub capacity: Capacity,
    pub available: Capacity,
    pub allocated: usize,
}

impl From<&CapacityPool> for PoolResponse {
    fn from(pool: &CapacityPool) -> Self {
        Self {
            pool_id: pool.pool_id.clone(),
            kind: pool.kind,
            capacity: pool.capacity,
            available: pool.available(),
            allocated: pool.allocated_count(),
        }
    }
}

/// Request to change the capacity of an existing pool
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizePoolRequest {
    /// Absent means unbounded.
    #[serde(default)]
    pub capacity: Option<u32>,
}

/// Request to change a service's desired replica count
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetDesiredRequest {
    pub count: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResponse {
    pub service_name: String,
    pub desired_count: u32,
    pub running_count: usize,
    pub pool_kind: PoolKind,
    pub workload_id: String,
}
