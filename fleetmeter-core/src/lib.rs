pub mod event;
pub mod pool;
pub mod status;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub use event::{EventPattern, LifecycleEvent, TaskStateDetail, LIFECYCLE_SOURCE, TASK_STATE_CHANGE};
pub use pool::{Capacity, CapacityPool, Placement, PoolKind};
pub use status::{run_time_secs, StatusEntry, TaskGroup};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("Invalid task ID: {0}")]
    InvalidTaskId(String),
    #[error("Invalid workload definition: {0}")]
    InvalidWorkload(String),
    #[error("Unknown capacity pool: {0}")]
    UnknownPool(String),
    #[error("Capacity exhausted: {0}")]
    CapacityExhausted(String),
    #[error("Invalid task status: {0}")]
    InvalidStatus(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Lifecycle state of a task instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Stopped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(TaskStatus::Pending),
            "RUNNING" => Ok(TaskStatus::Running),
            "STOPPED" => Ok(TaskStatus::Stopped),
            other => Err(CoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// Immutable container template shared by every service that runs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadDefinition {
    pub workload_id: String,
    pub image: String,
    pub cpu_units: u32,
    pub memory_mib: u32,
    pub port: u16,
}

impl WorkloadDefinition {
    pub fn new(
        workload_id: impl Into<String>,
        image: impl Into<String>,
        cpu_units: u32,
        memory_mib: u32,
        port: u16,
    ) -> Result<Arc<Self>> {
        let definition = Self {
            workload_id: workload_id.into(),
            image: image.into(),
            cpu_units,
            memory_mib,
            port,
        };
        definition.validate()?;
        Ok(Arc::new(definition))
    }

    pub fn validate(&self) -> Result<()> {
        if self.workload_id.trim().is_empty() {
            return Err(CoreError::InvalidWorkload(
                "workload id cannot be empty".to_string(),
            ));
        }
        if self.image.trim().is_empty() {
            return Err(CoreError::InvalidWorkload(
                "container image cannot be empty".to_string(),
            ));
        }
        if self.cpu_units == 0 || self.memory_mib == 0 {
            return Err(CoreError::InvalidWorkload(format!(
                "{}: cpu and memory must be greater than zero",
                self.workload_id
            )));
        }
        Ok(())
    }
}

/// Desired state of one service: how many replicas of which workload on which pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub service_name: String,
    pub desired_count: u32,
    pub workload: Arc<WorkloadDefinition>,
    pub pool_kind: PoolKind,
}

impl ServiceRecord {
    pub fn new(
        service_name: impl Into<String>,
        desired_count: u32,
        workload: Arc<WorkloadDefinition>,
        pool_kind: PoolKind,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            desired_count,
            workload,
            pool_kind,
        }
    }

    /// Task group string stamped on every task this service launches.
    pub fn task_group(&self) -> String {
        format!("service:{}", self.service_name)
    }
}

/// One replica of a workload, placed on a pool slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInstance {
    pub task_id: String,
    pub service_name: String,
    pub status: TaskStatus,
    pub placement: Placement,
    pub launch_seq: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl TaskInstance {
    pub fn new(service_name: impl Into<String>, placement: Placement, launch_seq: u64) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            service_name: service_name.into(),
            status: TaskStatus::Pending,
            placement,
            launch_seq,
            created_at: Utc::now(),
            started_at: None,
            stopped_at: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_stopped(&mut self) {
        self.status = TaskStatus::Stopped;
        self.stopped_at = Some(Utc::now());
    }

    pub fn is_running(&self) -> bool {
        self.status == TaskStatus::Running
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_code: String,
    pub message: String,
    pub details: Option<HashMap<String, String>>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: HashMap<String, String>) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<CoreError> for ErrorResponse {
    fn from(err: CoreError) -> Self {
        let code = match &err {
            CoreError::InvalidTaskId(_) => "INVALID_REQUEST",
            CoreError::InvalidWorkload(_) => "VALIDATION_ERROR",
            CoreError::UnknownPool(_) => "UNKNOWN_POOL",
            CoreError::CapacityExhausted(_) => "CAPACITY_EXHAUSTED",
            CoreError::InvalidStatus(_) => "VALIDATION_ERROR",
            CoreError::SerializationError(_) => "INVALID_REQUEST",
        };
        ErrorResponse::new(code, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nginx() -> Arc<WorkloadDefinition> {
        WorkloadDefinition::new("generic-task", "public.ecr.aws/nginx/nginx:latest", 256, 512, 80)
            .unwrap()
    }

    #[test]
    fn test_task_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Running).unwrap(),
            "\"RUNNING\""
        );
        let parsed: TaskStatus = serde_json::from_str("\"STOPPED\"").unwrap();
        assert_eq!(parsed, TaskStatus::Stopped);
    }

    #[test]
    fn test_task_status_from_str_is_case_insensitive() {
        assert_eq!("running".parse::<TaskStatus>().unwrap(), TaskStatus::Running);
        assert_eq!("PENDING".parse::<TaskStatus>().unwrap(), TaskStatus::Pending);
        assert!(matches!(
            "DEPROVISIONING".parse::<TaskStatus>(),
            Err(CoreError::InvalidStatus(_))
        ));
    }

    #[test]
    fn test_workload_definition_validation() {
        assert!(WorkloadDefinition::new("w", "", 256, 512, 80).is_err());
        assert!(WorkloadDefinition::new("", "nginx", 256, 512, 80).is_err());
        assert!(WorkloadDefinition::new("w", "nginx", 0, 512, 80).is_err());
        assert!(WorkloadDefinition::new("w", "nginx", 256, 0, 80).is_err());

        let workload = nginx();
        assert_eq!(workload.cpu_units, 256);
        assert_eq!(workload.memory_mib, 512);
        assert_eq!(workload.port, 80);
    }

    #[test]
    fn test_workload_is_shared_across_services() {
        let workload = nginx();
        let fixed = ServiceRecord::new("fixed-service", 4, workload.clone(), PoolKind::Fixed);
        let elastic = ServiceRecord::new("elastic-service", 2, workload.clone(), PoolKind::Elastic);

        assert!(Arc::ptr_eq(&fixed.workload, &elastic.workload));
        assert_eq!(Arc::strong_count(&workload), 3);
        assert_eq!(fixed.task_group(), "service:fixed-service");
    }

    #[test]
    fn test_task_instance_lifecycle() {
        let placement = Placement::new(PoolKind::Fixed, 0);
        let mut task = TaskInstance::new("fixed-service", placement, 1);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.started_at.is_none());
        assert!(!task.task_id.is_empty());

        task.mark_running();
        assert!(task.is_running());
        assert!(task.started_at.is_some());

        task.mark_stopped();
        assert_eq!(task.status, TaskStatus::Stopped);
        assert!(task.stopped_at.is_some());
    }

    #[test]
    fn test_task_ids_are_unique() {
        let a = TaskInstance::new("svc", Placement::new(PoolKind::Elastic, 0), 1);
        let b = TaskInstance::new("svc", Placement::new(PoolKind::Elastic, 1), 2);
        assert_ne!(a.task_id, b.task_id);
    }

    #[test]
    fn test_error_response_from_core_error() {
        let response: ErrorResponse = CoreError::UnknownPool("fixed".to_string()).into();
        assert_eq!(response.error_code, "UNKNOWN_POOL");
        assert!(response.message.contains("fixed"));

        let response: ErrorResponse = CoreError::CapacityExhausted("fixed".to_string()).into();
        assert_eq!(response.error_code, "CAPACITY_EXHAUSTED");
    }

    #[test]
    fn test_error_response_with_details() {
        let mut details = HashMap::new();
        details.insert("pool".to_string(), "fixed".to_string());
        let error = ErrorResponse::new("CAPACITY_EXHAUSTED", "no free slots").with_details(details);
        assert_eq!(
            error.details.unwrap().get("pool"),
            Some(&"fixed".to_string())
        );
    }
}
