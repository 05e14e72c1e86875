//! Audit event emission
//!
//! The core does not persist audit records. It builds an event for every
//! mutation and hands it to whoever subscribes to the [`EventBus`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::authz::{DelegationEvent, DelegationPolicy};

pub mod loggable;
pub use loggable::{Loggable, Severity};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent<T> {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub severity: Severity,
    pub payload: T,
}

impl<T> DomainEvent<T> {
    pub fn new(name: impl Into<String>, actor_id: Option<Uuid>, subject_id: Option<Uuid>, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            occurred_at: Utc::now(),
            actor_id,
            subject_id,
            severity: Severity::default(),
            payload,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }
}

impl<T: Serialize> DomainEvent<T> {
    /// SHA256 over name, timestamp, actor, subject and payload; excludes the random id.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        hasher.update(self.occurred_at.to_rfc3339().as_bytes());
        if let Some(actor) = self.actor_id {
            hasher.update(actor.as_bytes());
        }
        if let Some(subject) = self.subject_id {
            hasher.update(subject.as_bytes());
        }
        hasher.update(serde_json::to_vec(&self.payload).unwrap_or_default());
        hex::encode(hasher.finalize())
    }

    pub fn into_value(self) -> DomainEvent<Value> {
        DomainEvent {
            id: self.id,
            name: self.name,
            occurred_at: self.occurred_at,
            actor_id: self.actor_id,
            subject_id: self.subject_id,
            severity: self.severity,
            payload: serde_json::to_value(&self.payload).unwrap_or_default(),
        }
    }
}

pub type EventBus = broadcast::Sender<DomainEvent<Value>>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<DomainEvent<Value>>) {
    broadcast::channel(1024)
}

/// Fire and forget. Having no subscriber is not an error.
pub fn publish<T: Serialize>(event_bus: &EventBus, event: DomainEvent<T>) {
    let event = event.into_value();
    tracing::info!(
        event = %event.name,
        actor_id = ?event.actor_id,
        subject_id = ?event.subject_id,
        severity = event.severity.as_str(),
        "audit event"
    );
    if event_bus.send(event).is_err() {
        tracing::debug!("no audit subscriber attached");
    }
}

/// Wrap a delegation payload in an envelope, marking reserved permissions critical.
pub fn delegation_event(event: &DelegationEvent, policy: &DelegationPolicy) -> DomainEvent<DelegationEvent> {
    let severity = if policy.is_reserved(event.permission) {
        Severity::Critical
    } else {
        Severity::Important
    };

    DomainEvent::new(event.event_name(), Some(event.actor), Some(event.target), event.clone())
        .at(event.occurred_at)
        .with_severity(severity)
}

/// Report a lifecycle change of any [`Loggable`] entity, named `"<entity>.<action>"`.
pub fn log_activity<T: Loggable>(event_bus: &EventBus, action: &str, actor_id: Option<Uuid>, entity: &T) {
    let name = format!("{}.{}", T::entity_type(), action);
    let event = DomainEvent::new(name, actor_id, Some(entity.subject_id()), entity)
        .with_severity(entity.severity_for_action(action));
    publish(event_bus, event);
}
