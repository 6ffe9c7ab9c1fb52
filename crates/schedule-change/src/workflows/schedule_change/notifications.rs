use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::domain::{Actor, RequestId, RequestStatus, ResourceId, ReviewAction, StudentId};
use super::repository::{AlertPublisher, ReviewAlert};

/// Published once per committed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChangeEvent {
    pub request_id: RequestId,
    pub student_id: StudentId,
    pub requested_resource: ResourceId,
    pub previous: RequestStatus,
    pub current: RequestStatus,
    pub action: ReviewAction,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Receiver of status changes (dashboards, alerting).
pub trait StatusListener: Send + Sync {
    fn name(&self) -> &str {
        "listener"
    }

    fn on_status_change(&self, event: &StatusChangeEvent) -> Result<(), ListenerError>;
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ListenerError(pub String);

/// Handle returned by [`NotificationHub::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Outcome of one fan-out. Failures are counted, never raised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(SubscriptionId, Arc<dyn StatusListener>)>,
}

/// Listener registry with synchronous, isolated dispatch.
#[derive(Default)]
pub struct NotificationHub {
    registry: RwLock<Registry>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn StatusListener>) -> SubscriptionId {
        let mut registry = self
            .registry
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        debug!(listener = listener.name(), "status listener subscribed");
        registry.listeners.push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self
            .registry
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = registry.listeners.len();
        registry.listeners.retain(|(existing, _)| *existing != id);
        registry.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.registry
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .listeners
            .len()
    }

    /// Deliver to every listener exactly once. Errors and panics are logged and swallowed.
    pub fn publish(&self, event: &StatusChangeEvent) -> DeliveryReport {
        // Listeners run outside the registry lock.
        let listeners: Vec<Arc<dyn StatusListener>> = self
            .registry
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .listeners
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        let mut report = DeliveryReport::default();
        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener.on_status_change(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(err)) => {
                    report.failed += 1;
                    warn!(
                        listener = listener.name(),
                        request = %event.request_id,
                        error = %err,
                        "status listener failed"
                    );
                }
                Err(_) => {
                    report.failed += 1;
                    warn!(
                        listener = listener.name(),
                        request = %event.request_id,
                        "status listener panicked"
                    );
                }
            }
        }
        report
    }
}

/// Forwards resolutions and information requests to an [`AlertPublisher`].
pub struct AlertListener<A> {
    alerts: Arc<A>,
}

impl<A> AlertListener<A>
where
    A: AlertPublisher,
{
    pub fn new(alerts: Arc<A>) -> Self {
        Self { alerts }
    }

    fn template(event: &StatusChangeEvent) -> Option<&'static str> {
        match event.action {
            ReviewAction::Approved | ReviewAction::SpecialCaseApproved => {
                Some("schedule_change_approved")
            }
            ReviewAction::Rejected => Some("schedule_change_rejected"),
            ReviewAction::AdditionalInformationRequested => Some("schedule_change_information"),
            ReviewAction::Cancelled => None,
        }
    }
}

impl<A> StatusListener for AlertListener<A>
where
    A: AlertPublisher,
{
    fn name(&self) -> &str {
        "alerts"
    }

    fn on_status_change(&self, event: &StatusChangeEvent) -> Result<(), ListenerError> {
        let Some(template) = Self::template(event) else {
            return Ok(());
        };

        let mut details = BTreeMap::new();
        details.insert("status".to_string(), event.current.label().to_string());
        details.insert("action".to_string(), event.action.tag().to_string());
        details.insert(
            "requested_resource".to_string(),
            event.requested_resource.0.clone(),
        );

        self.alerts
            .publish(ReviewAlert {
                template: template.to_string(),
                request_id: event.request_id.clone(),
                recipient: event.student_id.clone(),
                details,
            })
            .map_err(|err| ListenerError(err.to_string()))
    }
}
