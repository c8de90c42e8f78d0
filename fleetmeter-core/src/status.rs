use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{PoolKind, TaskStateDetail, TaskStatus};

const DEFAULT_GROUP: &str = "taskgroup";

/// `group` split into kind and name: `service:web` becomes (`service`, `web`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskGroup {
    pub group: String,
    pub group_name: String,
}

impl TaskGroup {
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((group, name)) => Self {
                group: group.to_string(),
                group_name: name.to_string(),
            },
            None => Self {
                group: DEFAULT_GROUP.to_string(),
                group_name: raw.to_string(),
            },
        }
    }
}

/// Whole seconds between start and stop, rounded to nearest. Clock skew
/// that puts stop before start yields zero.
pub fn run_time_secs(started_at: DateTime<Utc>, stopped_at: DateTime<Utc>) -> i64 {
    let millis = (stopped_at - started_at).num_milliseconds().max(0);
    (millis as f64 / 1000.0).round() as i64
}

/// Metering row for one task, keyed by task id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    pub task_id: String,
    pub last_status: TaskStatus,
    pub timestamp: DateTime<Utc>,
    pub launch_type: Option<PoolKind>,
    pub group: String,
    pub group_name: String,
    pub cpu: Option<u32>,
    pub memory: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub run_time_secs: i64,
}

impl StatusEntry {
    pub fn new(task_id: impl Into<String>, last_status: TaskStatus, timestamp: DateTime<Utc>) -> Self {
        Self {
            task_id: task_id.into(),
            last_status,
            timestamp,
            launch_type: None,
            group: DEFAULT_GROUP.to_string(),
            group_name: String::new(),
            cpu: None,
            memory: None,
            started_at: None,
            stopped_at: None,
            run_time_secs: 0,
        }
    }

    /// Row for a task seen for the first time.
    pub fn from_detail(detail: &TaskStateDetail) -> Self {
        let group = TaskGroup::parse(detail.group.as_deref().unwrap_or_default());
        let mut entry = Self {
            launch_type: detail.launch_type,
            group: group.group,
            group_name: group.group_name,
            cpu: detail.cpu,
            memory: detail.memory,
            ..Self::new(detail.task_id.clone(), detail.last_status, detail.timestamp)
        };
        entry.apply(detail);
        entry
    }

    /// Overwrites the status with `detail` and fills in start/stop times.
    pub fn apply(&mut self, detail: &TaskStateDetail) {
        self.last_status = detail.last_status;
        self.timestamp = detail.timestamp;

        if self.started_at.is_none() {
            self.started_at = detail.started_at.or_else(|| {
                (detail.last_status == TaskStatus::Running).then_some(detail.timestamp)
            });
        }

        if detail.last_status == TaskStatus::Stopped {
            let stopped_at = detail.stopped_at.unwrap_or(detail.timestamp);
            self.stopped_at = Some(stopped_at);
            if let Some(started_at) = self.started_at {
                self.run_time_secs = run_time_secs(started_at, stopped_at);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.last_status == TaskStatus::Running
    }
}
