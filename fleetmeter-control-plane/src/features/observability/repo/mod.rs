use prometheus::{
    opts, CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Registry, TextEncoder,
};

use crate::shared::error::{ControlPlaneError, ControlPlaneResult};

fn metrics_error(err: prometheus::Error) -> ControlPlaneError {
    ControlPlaneError::StorageError(format!("metrics: {err}"))
}

/// Prometheus registry owned by one control plane.
pub struct ObservabilityRepository {
    registry: Registry,
    running_tasks: GaugeVec,
    capacity_shortfall: GaugeVec,
    tasks_started_total: CounterVec,
    tasks_stopped_total: CounterVec,
    reconcile_latency_seconds: HistogramVec,
    events_delivered_total: CounterVec,
    pool_available_units: GaugeVec,
}

impl ObservabilityRepository {
    pub fn new() -> ControlPlaneResult<Self> {
        let registry = Registry::new();

        let running_tasks = GaugeVec::new(
            opts!("fleetmeter_running_tasks", "Running tasks per service"),
            &["service"],
        )
        .map_err(metrics_error)?;
        let capacity_shortfall = GaugeVec::new(
            opts!(
                "fleetmeter_capacity_shortfall",
                "Desired minus running tasks after the last reconciliation"
            ),
            &["service"],
        )
        .map_err(metrics_error)?;
        let tasks_started_total = CounterVec::new(
            opts!("fleetmeter_tasks_started_total", "Tasks started by reconciliation"),
            &["service", "pool"],
        )
        .map_err(metrics_error)?;
        let tasks_stopped_total = CounterVec::new(
            opts!("fleetmeter_tasks_stopped_total", "Tasks stopped by reconciliation"),
            &["service", "pool"],
        )
        .map_err(metrics_error)?;
        let reconcile_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "fleetmeter_reconcile_latency_seconds",
                "Reconciliation pass latency (seconds)",
            ),
            &["service"],
        )
        .map_err(metrics_error)?;
        let events_delivered_total = CounterVec::new(
            opts!(
                "fleetmeter_events_delivered_total",
                "Lifecycle event deliveries by handler and outcome"
            ),
            &["handler", "outcome"],
        )
        .map_err(metrics_error)?;
        let pool_available_units = GaugeVec::new(
            opts!(
                "fleetmeter_pool_available_units",
                "Free units per bounded capacity pool"
            ),
            &["pool"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(running_tasks.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(capacity_shortfall.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(tasks_started_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(tasks_stopped_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(reconcile_latency_seconds.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(events_delivered_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(pool_available_units.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            running_tasks,
            capacity_shortfall,
            tasks_started_total,
            tasks_stopped_total,
            reconcile_latency_seconds,
            events_delivered_total,
            pool_available_units,
        })
    }

    pub fn set_running_tasks(&self, service: &str, count: f64) {
        self.running_tasks.with_label_values(&[service]).set(count);
    }

    pub fn set_capacity_shortfall(&self, service: &str, shortfall: f64) {
        self.capacity_shortfall
            .with_label_values(&[service])
            .set(shortfall);
    }

    pub fn inc_tasks_started(&self, service: &str, pool: &str, count: u64) {
        self.tasks_started_total
            .with_label_values(&[service, pool])
            .inc_by(count as f64);
    }

    pub fn inc_tasks_stopped(&self, service: &str, pool: &str, count: u64) {
        self.tasks_stopped_total
            .with_label_values(&[service, pool])
            .inc_by(count as f64);
    }

    pub fn observe_reconcile_latency(&self, service: &str, seconds: f64) {
        self.reconcile_latency_seconds
            .with_label_values(&[service])
            .observe(seconds);
    }

    pub fn inc_event_delivery(&self, handler: &str, outcome: &str) {
        self.events_delivered_total
            .with_label_values(&[handler, outcome])
            .inc();
    }

    pub fn set_pool_available_units(&self, pool: &str, units: f64) {
        self.pool_available_units
            .with_label_values(&[pool])
            .set(units);
    }

    pub fn event_delivery_count(&self, handler: &str, outcome: &str) -> f64 {
        self.events_delivered_total
            .with_label_values(&[handler, outcome])
            .get()
    }

    pub fn render_metrics(&self) -> ControlPlaneResult<String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder.encode(&families, &mut buffer).map_err(metrics_error)?;
        String::from_utf8(buffer)
            .map_err(|e| ControlPlaneError::StorageError(format!("metrics: {e}")))
    }
}
