use crate::features::event_router::service::EventHandler;
use crate::features::state_recorder::service::StateRecorder;
use crate::shared::error::ControlPlaneResult;
use crate::shared::types::LifecycleEvent;
use async_trait::async_trait;
use std::sync::Arc;

pub const STATUS_HANDLER_NAME: &str = "status-recorder";

/// Event handler that writes task state changes into the metering store.
pub struct StatusEventHandler {
    recorder: Arc<StateRecorder>,
}

impl StatusEventHandler {
    pub fn new(recorder: Arc<StateRecorder>) -> Self {
        Self { recorder }
    }
}

#[async_trait]
impl EventHandler for StatusEventHandler {
    fn name(&self) -> &str {
        STATUS_HANDLER_NAME
    }

    async fn handle(&self, event: &LifecycleEvent) -> ControlPlaneResult<()> {
        self.recorder.record_event(event).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::event_router::service::tests::event;
    use crate::features::event_router::service::EventRouter;
    use crate::features::state_recorder::repo::InMemoryStatusRepository;
    use crate::shared::types::{EventPattern, TaskStatus};

    #[tokio::test]
    async fn test_routed_events_reach_the_store() {
        let recorder = Arc::new(StateRecorder::new(Arc::new(
            InMemoryStatusRepository::new(),
        )));
        let router = EventRouter::new();
        router
            .on_event(
                EventPattern::task_state_change([TaskStatus::Running, TaskStatus::Stopped]),
                Arc::new(StatusEventHandler::new(recorder.clone())),
            )
            .unwrap();

        router.dispatch(&event("abc", TaskStatus::Running)).await;
        router.dispatch(&event("abc", TaskStatus::Stopped)).await;

        let entry = recorder.get("abc").await.unwrap();
        assert_eq!(entry.last_status, TaskStatus::Stopped);
    }

    #[tokio::test]
    async fn test_pending_events_are_not_routed() {
        let recorder = Arc::new(StateRecorder::new(Arc::new(
            InMemoryStatusRepository::new(),
        )));
        let router = EventRouter::new();
        router
            .on_event(
                EventPattern::task_state_change([TaskStatus::Running, TaskStatus::Stopped]),
                Arc::new(StatusEventHandler::new(recorder.clone())),
            )
            .unwrap();

        let report = router.dispatch(&event("abc", TaskStatus::Pending)).await;
        assert_eq!(report.matched, 0);
        assert!(recorder.list().await.unwrap().is_empty());
    }
}
