use crate::features::state_recorder::repo::StatusRepository;
use crate::shared::error::{ControlPlaneError, ControlPlaneResult};
use crate::shared::types::{
    BackfillReport, LifecycleEvent, RecordOutcome, ServiceRecord, StatusEntry, TaskInstance,
    TaskStatus,
};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Metering store keyed by task id.
///
/// `put` and `record_event` overwrite whatever row is there; arrival order
/// wins, not event timestamps.
pub struct StateRecorder {
    repo: Arc<dyn StatusRepository>,
}

impl StateRecorder {
    pub fn new(repo: Arc<dyn StatusRepository>) -> Self {
        Self { repo }
    }

    /// Set the last-known state of a task, keeping its metering fields.
    pub async fn put(
        &self,
        task_id: &str,
        state: TaskStatus,
        timestamp: DateTime<Utc>,
    ) -> ControlPlaneResult<StatusEntry> {
        if task_id.is_empty() {
            return Err(ControlPlaneError::InvalidRequest(
                "task id cannot be empty".to_string(),
            ));
        }

        let stored = self
            .repo
            .upsert(task_id, &|current| {
                let mut entry = current
                    .cloned()
                    .unwrap_or_else(|| StatusEntry::new(task_id, state, timestamp));
                entry.last_status = state;
                entry.timestamp = timestamp;
                Some(entry)
            })
            .await?;

        debug!(task_id, status = %state, "Status stored");
        stored.ok_or_else(|| ControlPlaneError::StorageError(format!("row for {task_id} not written")))
    }

    pub async fn get(&self, task_id: &str) -> ControlPlaneResult<StatusEntry> {
        self.repo
            .get(task_id)
            .await?
            .ok_or_else(|| ControlPlaneError::TaskNotFound(task_id.to_string()))
    }

    pub async fn list(&self) -> ControlPlaneResult<Vec<StatusEntry>> {
        self.repo.list().await
    }

    /// Fold one lifecycle event into the task's row.
    pub async fn record_event(&self, event: &LifecycleEvent) -> ControlPlaneResult<RecordOutcome> {
        let detail = &event.detail;
        if !detail.is_settled() {
            debug!(
                task_id = %detail.task_id,
                last_status = %detail.last_status,
                "Transitional event skipped"
            );
            return Ok(RecordOutcome::Skipped);
        }

        let existed = AtomicBool::new(false);
        self.repo
            .upsert(&detail.task_id, &|current| {
                existed.store(current.is_some(), Ordering::Relaxed);
                Some(match current {
                    Some(entry) => {
                        let mut entry = entry.clone();
                        entry.apply(detail);
                        entry
                    }
                    None => StatusEntry::from_detail(detail),
                })
            })
            .await?;

        let outcome = if existed.load(Ordering::Relaxed) {
            RecordOutcome::Updated
        } else {
            RecordOutcome::Created
        };
        info!(
            task_id = %detail.task_id,
            status = %detail.last_status,
            outcome = ?outcome,
            "Task status recorded"
        );
        Ok(outcome)
    }

    /// Seed rows for tasks that were already running before the recorder
    /// was attached. Existing rows are left alone.
    pub async fn backfill(
        &self,
        tasks: &[(TaskInstance, ServiceRecord)],
    ) -> ControlPlaneResult<BackfillReport> {
        let mut report = BackfillReport::default();
        for (task, service) in tasks.iter().filter(|(task, _)| task.is_running()) {
            let event = LifecycleEvent::for_task(task, service);
            let inserted = self
                .repo
                .upsert(&task.task_id, &|current| match current {
                    Some(_) => None,
                    None => Some(StatusEntry::from_detail(&event.detail)),
                })
                .await?;
            if inserted.is_some() {
                report.inserted += 1;
            } else {
                report.skipped += 1;
            }
        }
        info!(
            inserted = report.inserted,
            skipped = report.skipped,
            "Status backfill finished"
        );
        Ok(report)
    }
}
