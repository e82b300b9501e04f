use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::handle::Handle;
use crate::status::DerivedSnapshot;

/// Name of the generic change event.
pub const PROPERTY_CHANGED: &str = "property-changed";
/// Name of the snapshot event.
pub const HASH_CHANGED: &str = "hash-changed";

/// Fields of the call state that emit their own event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallField {
    Session,
    SessionConnected,
    ConnectionCreated,
    Publisher,
    LocalStream,
    Subscribers,
    Streams,
    Connections,
}

impl CallField {
    pub fn as_str(self) -> &'static str {
        match self {
            CallField::Session => "session",
            CallField::SessionConnected => "sessionConnected",
            CallField::ConnectionCreated => "connectionCreated",
            CallField::Publisher => "publisher",
            CallField::LocalStream => "localStream",
            CallField::Subscribers => "subscribers",
            CallField::Streams => "streams",
            CallField::Connections => "connections",
        }
    }
}

/// New value of a changed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Handle(Option<Handle>),
    Handles(Vec<Handle>),
}

impl FieldValue {
    /// Whether this value triggers the field-specific events.
    ///
    /// `false` and an absent handle do not. Collections always do, even
    /// when empty.
    pub fn is_present(&self) -> bool {
        match self {
            FieldValue::Flag(flag) => *flag,
            FieldValue::Handle(handle) => handle.is_some(),
            FieldValue::Handles(_) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: CallField,
    pub value: FieldValue,
}

impl FieldChange {
    pub fn new(field: CallField, value: FieldValue) -> Self {
        Self { field, value }
    }
}

/// Events emitted by the core to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    /// A specific field changed. Named after the field.
    Field(FieldChange),
    /// Generic `property-changed`, follows every [`CallEvent::Field`].
    PropertyChanged(FieldChange),
    /// Full `hash-changed` snapshot, closes every notification cycle.
    HashChanged(DerivedSnapshot),
}

impl CallEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CallEvent::Field(change) => change.field.as_str(),
            CallEvent::PropertyChanged(_) => PROPERTY_CHANGED,
            CallEvent::HashChanged(_) => HASH_CHANGED,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CallEvent::Field(change) => json!({
                "event": self.name(),
                "value": change.value,
            }),
            CallEvent::PropertyChanged(change) => json!({
                "event": self.name(),
                "key": change.field.as_str(),
                "value": change.value,
            }),
            CallEvent::HashChanged(snapshot) => json!({
                "event": self.name(),
                "snapshot": snapshot,
            }),
        }
    }
}

/// Trait for receiving events from the core.
/// Implementations must be Send + Sync (SDK callbacks may run on any thread).
pub trait CallEventListener: Send + Sync {
    fn on_event(&self, event: CallEvent);
}

/// Forwards events into an unbounded channel.
struct ChannelListener {
    tx: mpsc::UnboundedSender<CallEvent>,
}

impl CallEventListener for ChannelListener {
    fn on_event(&self, event: CallEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }
}

/// Internal event emitter that dispatches to registered listeners.
#[derive(Clone, Default)]
pub struct EventEmitter {
    listeners: Arc<RwLock<Vec<Arc<dyn CallEventListener>>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn CallEventListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Stream of every event emitted after this call.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<CallEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.add_listener(Arc::new(ChannelListener { tx }));
        rx
    }

    pub fn emit(&self, event: CallEvent) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners.iter() {
            listener.on_event(event.clone());
        }
    }

    /// Run one notification cycle.
    ///
    /// With both `key` and a present `value`, emits the field event and then
    /// `property-changed`. Always finishes with `hash-changed` carrying
    /// `snapshot`.
    pub fn emit_event(
        &self,
        key: Option<CallField>,
        value: Option<FieldValue>,
        snapshot: DerivedSnapshot,
    ) {
        if let (Some(field), Some(value)) = (key, value) {
            if value.is_present() {
                let change = FieldChange::new(field, value);
                self.emit(CallEvent::Field(change.clone()));
                self.emit(CallEvent::PropertyChanged(change));
            }
        }
        self.emit(CallEvent::HashChanged(snapshot));
    }
}
