use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::features::event_router::service::EventRouter;
use crate::shared::error::{ControlPlaneError, ControlPlaneResult};
use crate::shared::types::LifecycleEvent;

/// Cloneable sending half of the event bus.
#[derive(Clone)]
pub struct EventPublisher {
    sender: mpsc::UnboundedSender<LifecycleEvent>,
}

impl EventPublisher {
    pub fn publish(&self, event: LifecycleEvent) -> ControlPlaneResult<()> {
        self.sender.send(event).map_err(|error| {
            ControlPlaneError::RouterClosed(format!(
                "event for task {} not queued",
                error.0.task_id()
            ))
        })
    }
}

pub type EventReceiver = mpsc::UnboundedReceiver<LifecycleEvent>;

pub fn event_bus() -> (EventPublisher, EventReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (EventPublisher { sender }, receiver)
}

/// Pumps the event bus into the router. A single consumer keeps per-task
/// ordering intact. On shutdown, events already queued are delivered before
/// the loop exits.
#[derive(Clone)]
pub struct DeliveryController {
    router: Arc<EventRouter>,
}

impl DeliveryController {
    pub fn new(router: Arc<EventRouter>) -> Self {
        Self { router }
    }

    pub fn spawn_delivery(
        self,
        mut receiver: EventReceiver,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe_event = receiver.recv() => match maybe_event {
                        Some(event) => {
                            let report = self.router.dispatch(&event).await;
                            debug!(
                                task_id = %event.task_id(),
                                status = %event.detail.last_status,
                                matched = report.matched,
                                failed = report.failed,
                                "Lifecycle event delivered"
                            );
                        }
                        None => {
                            info!("Event bus closed, delivery loop exiting");
                            break;
                        }
                    },
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            let flushed = self.drain(&mut receiver).await;
                            info!(flushed, "Delivery loop stopped");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Deliver everything already queued, then return how many events went through.
    pub async fn drain(&self, receiver: &mut EventReceiver) -> usize {
        let mut delivered = 0;
        while let Ok(event) = receiver.try_recv() {
            self.router.dispatch(&event).await;
            delivered += 1;
        }
        delivered
    }
}
