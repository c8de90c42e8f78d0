//! Lifecycle events and the patterns rules use to select them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CoreError, PoolKind, Result, ServiceRecord, TaskInstance, TaskStatus};

pub const LIFECYCLE_SOURCE: &str = "workload.lifecycle";
pub const TASK_STATE_CHANGE: &str = "TaskStateChange";

/// `{source, detailType, detail}` envelope for a task state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub source: String,
    pub detail_type: String,
    pub detail: TaskStateDetail,
}

impl LifecycleEvent {
    pub fn task_state_change(detail: TaskStateDetail) -> Self {
        Self {
            source: LIFECYCLE_SOURCE.to_string(),
            detail_type: TASK_STATE_CHANGE.to_string(),
            detail,
        }
    }

    /// Event describing the current state of a task launched by `service`.
    pub fn for_task(task: &TaskInstance, service: &ServiceRecord) -> Self {
        let detail = TaskStateDetail {
            task_id: task.task_id.clone(),
            last_status: task.status,
            timestamp: Utc::now(),
            desired_status: None,
            launch_type: Some(task.placement.pool_kind),
            group: Some(service.task_group()),
            cpu: Some(service.workload.cpu_units),
            memory: Some(service.workload.memory_mib),
            started_at: task.started_at,
            stopped_at: task.stopped_at,
        };
        Self::task_state_change(detail)
    }

    pub fn task_id(&self) -> &str {
        &self.detail.task_id
    }

    /// Parse an event from its JSON envelope. A blank task id is rejected.
    pub fn from_json(raw: &str) -> Result<Self> {
        let event: Self =
            serde_json::from_str(raw).map_err(|e| CoreError::SerializationError(e.to_string()))?;
        if event.task_id().trim().is_empty() {
            return Err(CoreError::InvalidTaskId(
                "detail.taskId cannot be empty".to_string(),
            ));
        }
        Ok(event)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStateDetail {
    pub task_id: String,
    pub last_status: TaskStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_type: Option<PoolKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
}

impl TaskStateDetail {
    pub fn new(task_id: impl Into<String>, last_status: TaskStatus, timestamp: DateTime<Utc>) -> Self {
        Self {
            task_id: task_id.into(),
            last_status,
            timestamp,
            desired_status: None,
            launch_type: None,
            group: None,
            cpu: None,
            memory: None,
            started_at: None,
            stopped_at: None,
        }
    }

    /// A transition is settled when no desired status is reported or the
    /// task has reached it.
    pub fn is_settled(&self) -> bool {
        self.desired_status
            .map_or(true, |desired| desired == self.last_status)
    }
}

/// Selects events by source, detail type and last status. An empty list
/// matches any value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPattern {
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub detail_types: Vec<String>,
    #[serde(default)]
    pub last_status: Vec<TaskStatus>,
}

impl EventPattern {
    pub fn any() -> Self {
        Self::default()
    }

    /// Task state changes from the lifecycle source with one of `statuses`.
    pub fn task_state_change(statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        Self::any()
            .source(LIFECYCLE_SOURCE)
            .detail_type(TASK_STATE_CHANGE)
            .last_status(statuses)
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }

    pub fn detail_type(mut self, detail_type: impl Into<String>) -> Self {
        self.detail_types.push(detail_type.into());
        self
    }

    pub fn last_status(mut self, statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        self.last_status.extend(statuses);
        self
    }

    pub fn matches(&self, event: &LifecycleEvent) -> bool {
        (self.sources.is_empty() || self.sources.iter().any(|s| *s == event.source))
            && (self.detail_types.is_empty()
                || self.detail_types.iter().any(|d| *d == event.detail_type))
            && (self.last_status.is_empty()
                || self.last_status.contains(&event.detail.last_status))
    }
}
