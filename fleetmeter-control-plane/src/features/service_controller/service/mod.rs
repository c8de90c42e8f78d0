use crate::features::cluster_registry::service::ClusterRegistry;
use crate::features::event_router::controller::EventPublisher;
use crate::features::observability::controller::ObservabilityController;
use crate::features::service_controller::repo::TaskRepository;
use crate::shared::error::ControlPlaneResult;
use crate::shared::types::{
    LifecycleEvent, Placement, ReconcileOutcome, ServiceRecord, TaskInstance, TaskStatus,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

struct ControllerState {
    record: ServiceRecord,
    next_launch_seq: u64,
}

/// Keeps the running replica count of one service at its desired count.
///
/// Scale-up places tasks in the bound pool lowest slot first and stops at
/// the first capacity error; the shortfall is retried on the next pass.
/// Scale-down stops the most recently launched tasks first.
pub struct ServiceController {
    state: Mutex<ControllerState>,
    registry: Arc<ClusterRegistry>,
    tasks: Arc<dyn TaskRepository>,
    publisher: Option<EventPublisher>,
    metrics: Option<Arc<ObservabilityController>>,
}

impl ServiceController {
    pub fn new(
        record: ServiceRecord,
        registry: Arc<ClusterRegistry>,
        tasks: Arc<dyn TaskRepository>,
    ) -> Self {
        Self {
            state: Mutex::new(ControllerState {
                record,
                next_launch_seq: 1,
            }),
            registry,
            tasks,
            publisher: None,
            metrics: None,
        }
    }

    pub fn with_publisher(mut self, publisher: EventPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ObservabilityController>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn record(&self) -> ServiceRecord {
        self.state.lock().await.record.clone()
    }

    pub async fn set_desired(&self, count: u32) {
        let mut state = self.state.lock().await;
        if state.record.desired_count != count {
            info!(
                service = %state.record.service_name,
                from = state.record.desired_count,
                to = count,
                "Desired count changed"
            );
        }
        state.record.desired_count = count;
    }

    pub async fn running_tasks(&self) -> ControlPlaneResult<Vec<TaskInstance>> {
        let state = self.state.lock().await;
        self.tasks.list_by_service(&state.record.service_name).await
    }

    /// One reconciliation pass. Capacity shortfalls are not errors.
    pub async fn reconcile(&self) -> ControlPlaneResult<ReconcileOutcome> {
        let started_at = Instant::now();
        let mut state = self.state.lock().await;
        let record = state.record.clone();
        let mut running = self.tasks.list_by_service(&record.service_name).await?;
        let desired = record.desired_count as usize;
        let mut outcome = ReconcileOutcome::default();

        while running.len() < desired {
            let placement = match self.registry.allocate(record.pool_kind).await {
                Ok(placement) => placement,
                Err(error) if error.is_capacity_error() => {
                    debug!(
                        service = %record.service_name,
                        pool = %record.pool_kind,
                        running = running.len(),
                        desired,
                        error = %error,
                        "Capacity shortfall, retrying next pass"
                    );
                    break;
                }
                Err(error) => return Err(error),
            };

            let seq = state.next_launch_seq;
            state.next_launch_seq += 1;

            let task = self.launch(&record, placement, seq).await?;

            info!(
                service = %record.service_name,
                task_id = %task.task_id,
                pool = %placement.pool_kind,
                slot = placement.slot,
                "Task started"
            );
            running.push(task.clone());
            outcome.started.push(task);
        }

        while running.len() > desired {
            let Some(mut task) = running.pop() else {
                break;
            };
            self.registry.release(task.placement).await?;
            self.tasks.delete(&task.task_id).await?;
            task.mark_stopped();
            self.publish(&task, &record);

            info!(
                service = %record.service_name,
                task_id = %task.task_id,
                launch_seq = task.launch_seq,
                "Task stopped"
            );
            outcome.stopped.push(task);
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_reconcile(
                &record.service_name,
                record.pool_kind,
                &outcome,
                record.desired_count,
                running.len(),
                started_at.elapsed().as_secs_f64(),
            );
        }

        Ok(outcome)
    }

    /// Store a task on a fresh placement and mark it running. On failure the
    /// placement is released and the partial task removed.
    async fn launch(
        &self,
        record: &ServiceRecord,
        placement: Placement,
        seq: u64,
    ) -> ControlPlaneResult<TaskInstance> {
        let pending = TaskInstance::new(record.service_name.clone(), placement, seq);
        let stored = match self.tasks.create(pending.clone()).await {
            Ok(()) => {
                self.tasks
                    .update_status(&pending.task_id, TaskStatus::Running)
                    .await
            }
            Err(error) => Err(error),
        };

        if let Err(error) = stored {
            warn!(
                service = %record.service_name,
                task_id = %pending.task_id,
                pool = %placement.pool_kind,
                slot = placement.slot,
                error = %error,
                "Task launch failed, releasing placement"
            );
            if let Err(cleanup) = self.tasks.delete(&pending.task_id).await {
                warn!(task_id = %pending.task_id, error = %cleanup, "Failed task not removed");
            }
            if let Err(cleanup) = self.registry.release(placement).await {
                warn!(pool = %placement.pool_kind, slot = placement.slot, error = %cleanup, "Placement not released");
            }
            return Err(error);
        }

        let mut task = pending.clone();
        task.mark_running();
        self.publish(&pending, record);
        self.publish(&task, record);
        Ok(task)
    }

    fn publish(&self, task: &TaskInstance, record: &ServiceRecord) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        if let Err(error) = publisher.publish(LifecycleEvent::for_task(task, record)) {
            warn!(task_id = %task.task_id, error = %error, "Lifecycle event not published");
        }
    }
}
