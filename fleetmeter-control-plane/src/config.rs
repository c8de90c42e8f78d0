use std::net::SocketAddr;
use std::time::Duration;

use crate::shared::error::{ControlPlaneError, ControlPlaneResult};
use crate::shared::types::Capacity;

pub const DEFAULT_ADMIN_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_WORKLOAD_IMAGE: &str = "public.ecr.aws/nginx/nginx:latest";

/// Runtime settings for the control plane binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPlaneConfig {
    pub admin_addr: SocketAddr,
    pub reconcile_interval: Duration,
    pub fixed_pool_capacity: Capacity,
    pub elastic_pool_capacity: Capacity,
    pub fixed_service_desired: u32,
    pub elastic_service_desired: u32,
    pub workload_image: String,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            admin_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            reconcile_interval: Duration::from_secs(10),
            fixed_pool_capacity: Capacity::Bounded(2),
            elastic_pool_capacity: Capacity::Unbounded,
            fixed_service_desired: 4,
            elastic_service_desired: 2,
            workload_image: DEFAULT_WORKLOAD_IMAGE.to_string(),
        }
    }
}

impl ControlPlaneConfig {
    pub fn from_env() -> ControlPlaneResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys keep their defaults; set but
    /// unparsable keys are rejected.
    pub fn from_lookup<F>(lookup: F) -> ControlPlaneResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let reconcile_secs: u64 = parse_or(
            get("RECONCILE_INTERVAL_SECS"),
            "RECONCILE_INTERVAL_SECS",
            defaults.reconcile_interval.as_secs(),
        )?;
        if reconcile_secs == 0 {
            return Err(ControlPlaneError::ValidationError(
                "RECONCILE_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            admin_addr: parse_or(get("ADMIN_ADDR"), "ADMIN_ADDR", defaults.admin_addr)?,
            reconcile_interval: Duration::from_secs(reconcile_secs),
            fixed_pool_capacity: capacity_or(
                get("FIXED_POOL_CAPACITY"),
                "FIXED_POOL_CAPACITY",
                defaults.fixed_pool_capacity,
            )?,
            elastic_pool_capacity: capacity_or(
                get("ELASTIC_POOL_CAPACITY"),
                "ELASTIC_POOL_CAPACITY",
                defaults.elastic_pool_capacity,
            )?,
            fixed_service_desired: parse_or(
                get("FIXED_SERVICE_DESIRED"),
                "FIXED_SERVICE_DESIRED",
                defaults.fixed_service_desired,
            )?,
            elastic_service_desired: parse_or(
                get("ELASTIC_SERVICE_DESIRED"),
                "ELASTIC_SERVICE_DESIRED",
                defaults.elastic_service_desired,
            )?,
            workload_image: get("WORKLOAD_IMAGE").unwrap_or(defaults.workload_image),
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> ControlPlaneResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.parse::<T>().map_err(|error| {
            ControlPlaneError::ValidationError(format!("{key}={value}: {error}"))
        }),
    }
}

/// `unbounded` (any case) or a unit count.
fn capacity_or(raw: Option<String>, key: &str, default: Capacity) -> ControlPlaneResult<Capacity> {
    match raw {
        Some(value) if value.eq_ignore_ascii_case("unbounded") => Ok(Capacity::Unbounded),
        Some(value) => Ok(Capacity::Bounded(parse_or(Some(value), key, 0)?)),
        None => Ok(default),
    }
}
