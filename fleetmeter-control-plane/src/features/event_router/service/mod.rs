use crate::features::observability::controller::ObservabilityController;
use crate::shared::error::{lock_poisoned, ControlPlaneError, ControlPlaneResult};
use crate::shared::types::{DispatchReport, EventPattern, LifecycleEvent};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Target invoked for every event a rule matches.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, event: &LifecycleEvent) -> ControlPlaneResult<()>;
}

struct Rule {
    rule_id: u64,
    pattern: EventPattern,
    handler: Arc<dyn EventHandler>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleSummary {
    pub rule_id: u64,
    pub pattern: EventPattern,
    pub handler: String,
}

/// Routes lifecycle events to the handlers of matching rules.
///
/// Every event that reaches the router is handed to each matching rule's
/// handler. A failing or panicking handler is logged and counted and the
/// event is not retried for that rule; the other rules still receive it.
pub struct EventRouter {
    rules: RwLock<Vec<Arc<Rule>>>,
    next_rule_id: AtomicU64,
    metrics: Option<Arc<ObservabilityController>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            next_rule_id: AtomicU64::new(1),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ObservabilityController>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Subscribe `handler` to events matching `pattern`. Returns the rule id.
    pub fn on_event(
        &self,
        pattern: EventPattern,
        handler: Arc<dyn EventHandler>,
    ) -> ControlPlaneResult<u64> {
        let rule_id = self.next_rule_id.fetch_add(1, Ordering::Relaxed);
        let mut rules = self.rules.write().map_err(|_| lock_poisoned())?;
        debug!(rule_id, handler = handler.name(), "Event rule added");
        rules.push(Arc::new(Rule {
            rule_id,
            pattern,
            handler,
        }));
        Ok(rule_id)
    }

    pub fn remove_rule(&self, rule_id: u64) -> ControlPlaneResult<bool> {
        let mut rules = self.rules.write().map_err(|_| lock_poisoned())?;
        let before = rules.len();
        rules.retain(|rule| rule.rule_id != rule_id);
        Ok(rules.len() != before)
    }

    pub fn rules(&self) -> ControlPlaneResult<Vec<RuleSummary>> {
        let rules = self.rules.read().map_err(|_| lock_poisoned())?;
        Ok(rules
            .iter()
            .map(|rule| RuleSummary {
                rule_id: rule.rule_id,
                pattern: rule.pattern.clone(),
                handler: rule.handler.name().to_string(),
            })
            .collect())
    }

    /// Deliver one event to every matching rule, in rule order.
    pub async fn dispatch(&self, event: &LifecycleEvent) -> DispatchReport {
        let matching = match self.matching_rules(event) {
            Ok(rules) => rules,
            Err(error) => {
                warn!(task_id = %event.task_id(), error = %error, "Dropping event");
                return DispatchReport::default();
            }
        };

        let mut report = DispatchReport {
            matched: matching.len(),
            ..DispatchReport::default()
        };

        for rule in matching {
            let handler_name = rule.handler.name().to_string();
            match invoke(rule.handler.clone(), event.clone()).await {
                Ok(()) => {
                    report.delivered += 1;
                    self.record(&handler_name, true);
                }
                Err(error) => {
                    report.failed += 1;
                    self.record(&handler_name, false);
                    warn!(
                        rule_id = rule.rule_id,
                        handler = %handler_name,
                        task_id = %event.task_id(),
                        status = %event.detail.last_status,
                        error = %error,
                        "Event handler failed, event dropped"
                    );
                }
            }
        }

        report
    }

    fn matching_rules(&self, event: &LifecycleEvent) -> ControlPlaneResult<Vec<Arc<Rule>>> {
        let rules = self.rules.read().map_err(|_| lock_poisoned())?;
        Ok(rules
            .iter()
            .filter(|rule| rule.pattern.matches(event))
            .cloned()
            .collect())
    }

    fn record(&self, handler: &str, success: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_delivery(handler, success);
        }
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the handler on its own task so a panic surfaces as an error.
async fn invoke(handler: Arc<dyn EventHandler>, event: LifecycleEvent) -> ControlPlaneResult<()> {
    match tokio::spawn(async move { handler.handle(&event).await }).await {
        Ok(result) => result,
        Err(join_error) => Err(ControlPlaneError::HandlerFailed(format!(
            "handler aborted: {join_error}"
        ))),
    }
}
