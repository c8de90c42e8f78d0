pub mod config;
pub mod features;
pub mod server;
pub mod shared;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ControlPlaneConfig;
use crate::features::cluster_registry::repo::InMemoryPoolRepository;
use crate::features::cluster_registry::service::ClusterRegistry;
use crate::features::event_router::controller::{
    event_bus, DeliveryController, EventPublisher, EventReceiver,
};
use crate::features::event_router::service::EventRouter;
use crate::features::observability::controller::ObservabilityController;
use crate::features::service_controller::controller::ReconcileLoop;
use crate::features::service_controller::repo::{InMemoryTaskRepository, TaskRepository};
use crate::features::service_controller::service::ServiceController;
use crate::features::state_recorder::controller::StatusEventHandler;
use crate::features::state_recorder::repo::InMemoryStatusRepository;
use crate::features::state_recorder::service::StateRecorder;
use crate::shared::error::{lock_poisoned, ControlPlaneError, ControlPlaneResult};
use crate::shared::types::{
    BackfillReport, Capacity, CapacityPool, EventPattern, LifecycleEvent, PoolKind,
    ReconcileOutcome, ServiceRecord, ServiceResponse, StatusEntry, TaskInstance, TaskStatus,
    WorkloadDefinition,
};

pub const FIXED_SERVICE: &str = "fixed-service";
pub const ELASTIC_SERVICE: &str = "elastic-service";
pub const WORKLOAD_ID: &str = "generic-task";

const WORKLOAD_CPU_UNITS: u32 = 256;
const WORKLOAD_MEMORY_MIB: u32 = 512;
const WORKLOAD_PORT: u16 = 80;

/// The whole control plane: two pools, one shared workload, one service per
/// pool and a rule that meters RUNNING/STOPPED transitions.
pub struct ClusterStack {
    config: ControlPlaneConfig,
    registry: Arc<ClusterRegistry>,
    tasks: Arc<dyn TaskRepository>,
    services: BTreeMap<String, Arc<ServiceController>>,
    router: Arc<EventRouter>,
    recorder: Arc<StateRecorder>,
    publisher: EventPublisher,
    receiver: AsyncMutex<Option<EventReceiver>>,
    metrics: Arc<ObservabilityController>,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ClusterStack {
    /// Wire every component. Nothing runs until [`ClusterStack::start`].
    pub async fn bootstrap(config: ControlPlaneConfig) -> ControlPlaneResult<Self> {
        let metrics = Arc::new(ObservabilityController::new()?);

        let registry = Arc::new(
            ClusterRegistry::new(Arc::new(InMemoryPoolRepository::new()))
                .with_metrics(metrics.clone()),
        );
        registry
            .register_pool(PoolKind::Fixed, config.fixed_pool_capacity)
            .await?;
        registry
            .register_pool(PoolKind::Elastic, config.elastic_pool_capacity)
            .await?;

        let workload = WorkloadDefinition::new(
            WORKLOAD_ID,
            config.workload_image.clone(),
            WORKLOAD_CPU_UNITS,
            WORKLOAD_MEMORY_MIB,
            WORKLOAD_PORT,
        )?;

        let tasks: Arc<dyn TaskRepository> = Arc::new(InMemoryTaskRepository::new());
        let (publisher, receiver) = event_bus();

        let mut services = BTreeMap::new();
        for (name, desired, pool) in [
            (FIXED_SERVICE, config.fixed_service_desired, PoolKind::Fixed),
            (ELASTIC_SERVICE, config.elastic_service_desired, PoolKind::Elastic),
        ] {
            let record = ServiceRecord::new(name, desired, workload.clone(), pool);
            let controller = ServiceController::new(record, registry.clone(), tasks.clone())
                .with_publisher(publisher.clone())
                .with_metrics(metrics.clone());
            services.insert(name.to_string(), Arc::new(controller));
        }

        let recorder = Arc::new(StateRecorder::new(Arc::new(InMemoryStatusRepository::new())));
        let router = Arc::new(EventRouter::new().with_metrics(metrics.clone()));
        router.on_event(
            EventPattern::task_state_change([TaskStatus::Running, TaskStatus::Stopped]),
            Arc::new(StatusEventHandler::new(recorder.clone())),
        )?;

        let (shutdown, _) = watch::channel(false);

        info!(
            fixed = %config.fixed_pool_capacity,
            elastic = %config.elastic_pool_capacity,
            services = services.len(),
            "Cluster stack bootstrapped"
        );

        Ok(Self {
            config,
            registry,
            tasks,
            services,
            router,
            recorder,
            publisher,
            receiver: AsyncMutex::new(Some(receiver)),
            metrics,
            shutdown,
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the event delivery loop and one reconcile loop per service.
    pub async fn start(&self) -> ControlPlaneResult<()> {
        let receiver = self.receiver.lock().await.take().ok_or_else(|| {
            ControlPlaneError::InvalidRequest("cluster stack already started".to_string())
        })?;

        let mut spawned = vec![DeliveryController::new(self.router.clone())
            .spawn_delivery(receiver, self.shutdown.subscribe())];
        for service in self.services.values() {
            spawned.push(
                ReconcileLoop::new(service.clone(), self.config.reconcile_interval)
                    .spawn_periodic_reconcile(self.shutdown.subscribe()),
            );
        }

        self.handles
            .lock()
            .map_err(|_| lock_poisoned())?
            .extend(spawned);
        info!(
            interval_secs = self.config.reconcile_interval.as_secs(),
            "Cluster stack started"
        );
        Ok(())
    }

    /// Stop every loop. Placed tasks and recorded status stay as they are.
    pub async fn shutdown(&self) -> ControlPlaneResult<()> {
        self.shutdown.send_replace(true);
        let handles = std::mem::take(&mut *self.handles.lock().map_err(|_| lock_poisoned())?);
        for handle in handles {
            if let Err(error) = handle.await {
                warn!(error = %error, "Background loop ended abnormally");
            }
        }
        info!("Cluster stack stopped");
        Ok(())
    }

    pub fn config(&self) -> &ControlPlaneConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ClusterRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn recorder(&self) -> &Arc<StateRecorder> {
        &self.recorder
    }

    pub fn metrics(&self) -> &Arc<ObservabilityController> {
        &self.metrics
    }

    pub fn service(&self, name: &str) -> ControlPlaneResult<Arc<ServiceController>> {
        self.services
            .get(name)
            .cloned()
            .ok_or_else(|| ControlPlaneError::ServiceNotFound(name.to_string()))
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    pub async fn register_pool(
        &self,
        kind: PoolKind,
        capacity: Capacity,
    ) -> ControlPlaneResult<CapacityPool> {
        self.registry.register_pool(kind, capacity).await
    }

    pub async fn set_desired(&self, service: &str, count: u32) -> ControlPlaneResult<ServiceRecord> {
        let controller = self.service(service)?;
        controller.set_desired(count).await;
        Ok(controller.record().await)
    }

    pub async fn get_status(&self, task_id: &str) -> ControlPlaneResult<StatusEntry> {
        self.recorder.get(task_id).await
    }

    pub async fn reconcile_service(&self, service: &str) -> ControlPlaneResult<ReconcileOutcome> {
        self.service(service)?.reconcile().await
    }

    /// One pass over every service, in name order.
    pub async fn reconcile_all(&self) -> ControlPlaneResult<BTreeMap<String, ReconcileOutcome>> {
        let mut outcomes = BTreeMap::new();
        for (name, service) in &self.services {
            outcomes.insert(name.clone(), service.reconcile().await?);
        }
        Ok(outcomes)
    }

    pub async fn describe_services(&self) -> ControlPlaneResult<Vec<ServiceResponse>> {
        let mut described = Vec::with_capacity(self.services.len());
        for service in self.services.values() {
            let record = service.record().await;
            let running_count = service.running_tasks().await?.len();
            described.push(ServiceResponse {
                service_name: record.service_name,
                desired_count: record.desired_count,
                running_count,
                pool_kind: record.pool_kind,
                workload_id: record.workload.workload_id.clone(),
            });
        }
        Ok(described)
    }

    /// Seed the metering store with every task currently running.
    pub async fn backfill_status(&self) -> ControlPlaneResult<BackfillReport> {
        let mut tasks: Vec<(TaskInstance, ServiceRecord)> = Vec::new();
        for service in self.services.values() {
            let record = service.record().await;
            for task in self.tasks.list_by_service(&record.service_name).await? {
                tasks.push((task, record.clone()));
            }
        }
        self.recorder.backfill(&tasks).await
    }

    /// Queue an externally produced lifecycle event for delivery.
    pub fn ingest(&self, event: LifecycleEvent) -> ControlPlaneResult<()> {
        self.publisher.publish(event)
    }

    /// Deliver queued events inline. Only does work before `start`; once the
    /// delivery loop owns the queue this returns 0.
    pub async fn drain_events(&self) -> usize {
        let mut receiver = self.receiver.lock().await;
        match receiver.as_mut() {
            Some(receiver) => {
                DeliveryController::new(self.router.clone())
                    .drain(receiver)
                    .await
            }
            None => 0,
        }
    }
}
