//! Capacity pools and slot placement.
//!
//! A pool hands out numbered slots. Bounded pools never hand out more slots
//! than their capacity; unbounded pools always find a free slot. Slots are
//! handed out lowest-first so placement order is deterministic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::{CoreError, Result};

/// Compute class a pool provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    /// Fixed-size instance pool.
    Fixed,
    /// Elastic, on-demand pool.
    Elastic,
}

impl PoolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolKind::Fixed => "fixed",
            PoolKind::Elastic => "elastic",
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(PoolKind::Fixed),
            "elastic" => Ok(PoolKind::Elastic),
            other => Err(CoreError::UnknownPool(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capacity {
    Bounded(u32),
    Unbounded,
}

impl Capacity {
    pub fn from_units(units: Option<u32>) -> Self {
        units.map(Capacity::Bounded).unwrap_or(Capacity::Unbounded)
    }

    pub fn units(&self) -> Option<u32> {
        match self {
            Capacity::Bounded(units) => Some(*units),
            Capacity::Unbounded => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Capacity::Bounded(0))
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capacity::Bounded(units) => write!(f, "{units}"),
            Capacity::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// The pool slot a task occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub pool_kind: PoolKind,
    pub slot: u32,
}

impl Placement {
    pub fn new(pool_kind: PoolKind, slot: u32) -> Self {
        Self { pool_kind, slot }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityPool {
    pub pool_id: String,
    pub kind: PoolKind,
    pub capacity: Capacity,
    allocated: BTreeSet<u32>,
}

impl CapacityPool {
    pub fn new(kind: PoolKind, capacity: Capacity) -> Self {
        Self {
            pool_id: format!("{kind}-pool"),
            kind,
            capacity,
            allocated: BTreeSet::new(),
        }
    }

    /// Units still free. After a shrink below the allocated count this is
    /// zero until enough slots are released.
    pub fn available(&self) -> Capacity {
        match self.capacity {
            Capacity::Bounded(units) => {
                let used = u32::try_from(self.allocated.len()).unwrap_or(u32::MAX);
                Capacity::Bounded(units.saturating_sub(used))
            }
            Capacity::Unbounded => Capacity::Unbounded,
        }
    }

    pub fn allocated_count(&self) -> usize {
        self.allocated.len()
    }

    pub fn allocate(&mut self) -> Result<Placement> {
        if self.available().is_exhausted() {
            return Err(CoreError::CapacityExhausted(format!(
                "{} has no free units (capacity {})",
                self.pool_id, self.capacity
            )));
        }

        let slot = (0..=u32::MAX)
            .find(|slot| !self.allocated.contains(slot))
            .ok_or_else(|| CoreError::CapacityExhausted(self.pool_id.clone()))?;
        self.allocated.insert(slot);
        Ok(Placement::new(self.kind, slot))
    }

    /// Returns false when the slot was not allocated.
    pub fn release(&mut self, slot: u32) -> bool {
        self.allocated.remove(&slot)
    }

    pub fn resize(&mut self, capacity: Capacity) {
        if let Capacity::Bounded(units) = capacity {
            if (units as usize) < self.allocated.len() {
                warn!(
                    pool_id = %self.pool_id,
                    capacity = units,
                    allocated = self.allocated.len(),
                    "Pool shrunk below its allocated slots"
                );
            }
        }
        self.capacity = capacity;
    }
}
