use std::sync::Arc;

use crate::errors::CallError;
use crate::events::{CallField, FieldChange, FieldValue};
use crate::handle::Handle;
use crate::sdk::Session;

pub type SessionRef = Arc<dyn Session>;

/// Collection fields of [`CallState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Subscribers,
    Streams,
    Connections,
}

impl Collection {
    pub fn field(self) -> CallField {
        match self {
            Collection::Subscribers => CallField::Subscribers,
            Collection::Streams => CallField::Streams,
            Collection::Connections => CallField::Connections,
        }
    }
}

/// A single change to the call state.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Store the active session. Rejected while another session is present;
    /// use [`Mutation::Reset`] first.
    SetSession(SessionRef),
    SetSessionConnected(bool),
    SetConnectionCreated(bool),
    SetPublisher(Option<Handle>),
    SetLocalStream(Option<Handle>),
    /// Append a handle. A handle already present is not added twice, but the
    /// mutation still runs a full notification cycle.
    Add(Collection, Handle),
    /// Remove a handle by identity. Removing an absent handle is a no-op
    /// that still notifies.
    Remove(Collection, Handle),
    Reset,
}

/// Everything known about the current call.
///
/// Mutated only through [`CallState::apply`], which keeps the session
/// invariants: connection flags and the publisher require a session.
#[derive(Debug, Clone, Default)]
pub struct CallState {
    session: Option<SessionRef>,
    session_connected: bool,
    connection_created: bool,
    publisher: Option<Handle>,
    local_stream: Option<Handle>,
    subscribers: Vec<Handle>,
    streams: Vec<Handle>,
    connections: Vec<Handle>,
}

impl CallState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> Option<&SessionRef> {
        self.session.as_ref()
    }

    pub fn session_handle(&self) -> Option<&Handle> {
        self.session.as_ref().map(|s| s.handle())
    }

    pub fn session_connected(&self) -> bool {
        self.session_connected
    }

    pub fn connection_created(&self) -> bool {
        self.connection_created
    }

    pub fn publisher(&self) -> Option<&Handle> {
        self.publisher.as_ref()
    }

    pub fn local_stream(&self) -> Option<&Handle> {
        self.local_stream.as_ref()
    }

    pub fn subscribers(&self) -> &[Handle] {
        &self.subscribers
    }

    pub fn streams(&self) -> &[Handle] {
        &self.streams
    }

    pub fn connections(&self) -> &[Handle] {
        &self.connections
    }

    pub fn collection(&self, collection: Collection) -> &[Handle] {
        match collection {
            Collection::Subscribers => &self.subscribers,
            Collection::Streams => &self.streams,
            Collection::Connections => &self.connections,
        }
    }

    fn collection_mut(&mut self, collection: Collection) -> &mut Vec<Handle> {
        match collection {
            Collection::Subscribers => &mut self.subscribers,
            Collection::Streams => &mut self.streams,
            Collection::Connections => &mut self.connections,
        }
    }

    /// Apply a mutation in full.
    ///
    /// Returns the changed field and its new value, or `None` for a reset.
    /// On error the state is left untouched.
    pub fn apply(&mut self, mutation: Mutation) -> Result<Option<FieldChange>, CallError> {
        let change = match mutation {
            Mutation::SetSession(session) => {
                if self.session.is_some() {
                    return Err(CallError::AlreadyConnected);
                }
                let handle = session.handle().clone();
                self.session = Some(session);
                FieldChange::new(CallField::Session, FieldValue::Handle(Some(handle)))
            }
            Mutation::SetSessionConnected(connected) => {
                self.require_session(connected, CallField::SessionConnected)?;
                self.session_connected = connected;
                FieldChange::new(CallField::SessionConnected, FieldValue::Flag(connected))
            }
            Mutation::SetConnectionCreated(created) => {
                self.require_session(created, CallField::ConnectionCreated)?;
                self.connection_created = created;
                FieldChange::new(CallField::ConnectionCreated, FieldValue::Flag(created))
            }
            Mutation::SetPublisher(publisher) => {
                self.require_session(publisher.is_some(), CallField::Publisher)?;
                self.publisher = publisher.clone();
                FieldChange::new(CallField::Publisher, FieldValue::Handle(publisher))
            }
            Mutation::SetLocalStream(stream) => {
                self.local_stream = stream.clone();
                FieldChange::new(CallField::LocalStream, FieldValue::Handle(stream))
            }
            Mutation::Add(collection, handle) => {
                let items = self.collection_mut(collection);
                if !items.contains(&handle) {
                    items.push(handle);
                }
                FieldChange::new(collection.field(), FieldValue::Handles(items.clone()))
            }
            Mutation::Remove(collection, handle) => {
                let items = self.collection_mut(collection);
                items.retain(|h| *h != handle);
                FieldChange::new(collection.field(), FieldValue::Handles(items.clone()))
            }
            Mutation::Reset => {
                *self = Self::default();
                return Ok(None);
            }
        };
        Ok(Some(change))
    }

    fn require_session(&self, setting: bool, field: CallField) -> Result<(), CallError> {
        if setting && self.session.is_none() {
            return Err(CallError::NotConnected(format!(
                "cannot set {} without a session",
                field.as_str()
            )));
        }
        Ok(())
    }
}
