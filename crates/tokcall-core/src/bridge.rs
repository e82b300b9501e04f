use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::container::{CallContainer, WeakCallContainer};
use crate::handle::Handle;
use crate::sdk::{SessionEvent, SessionEventHandler};
use crate::state::{Collection, Mutation};

/// Applies one session's SDK events to the call state.
///
/// Scoped to the session it was created for: once that session is no longer
/// the active one, its late events are dropped. Holds the container weakly,
/// so events arriving after the client is gone are dropped as well.
pub struct SessionBridge {
    session: Handle,
    container: WeakCallContainer,
    /// Remote stream -> subscriber attached to it.
    subscriptions: Mutex<HashMap<Handle, Handle>>,
}

impl SessionBridge {
    pub fn new(session: Handle, container: &CallContainer) -> Self {
        Self {
            session,
            container: container.downgrade(),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    fn apply(&self, mutation: Mutation) -> bool {
        let Some(container) = self.container.upgrade() else {
            tracing::debug!("session {} event after client dropped", self.session);
            return false;
        };
        match container.change_for_session(&self.session, mutation) {
            Ok(applied) => applied,
            Err(e) => {
                tracing::warn!("session {} event rejected: {e}", self.session);
                false
            }
        }
    }

    fn subscribe_to(&self, stream: Handle) {
        let Some(session) = self.container.upgrade().and_then(|c| c.session()) else {
            return;
        };
        if session.handle() != &self.session {
            return;
        }
        match session.subscribe(&stream) {
            Ok(subscriber) => {
                self.subscriptions
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(stream, subscriber.clone());
                self.apply(Mutation::Add(Collection::Subscribers, subscriber));
            }
            Err(e) => tracing::error!("failed to subscribe to stream {stream}: {e}"),
        }
    }
}

impl SessionEventHandler for SessionBridge {
    fn on_session_event(&self, event: SessionEvent) {
        tracing::debug!("session {} event: {event:?}", self.session);
        match event {
            SessionEvent::SessionConnected => {
                self.apply(Mutation::SetSessionConnected(true));
            }

            SessionEvent::SessionDisconnected => {
                if self.apply(Mutation::Reset) {
                    tracing::info!("session {} disconnected by the SDK", self.session);
                }
                self.subscriptions
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clear();
            }

            SessionEvent::ConnectionCreated(connection) => {
                self.apply(Mutation::SetConnectionCreated(true));
                self.apply(Mutation::Add(Collection::Connections, connection));
            }

            SessionEvent::ConnectionDestroyed(connection) => {
                self.apply(Mutation::Remove(Collection::Connections, connection));
            }

            SessionEvent::StreamCreated(stream) => {
                if self.apply(Mutation::Add(Collection::Streams, stream.clone())) {
                    self.subscribe_to(stream);
                }
            }

            SessionEvent::StreamDestroyed(stream) => {
                let subscriber = self
                    .subscriptions
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&stream);
                self.apply(Mutation::Remove(Collection::Streams, stream));
                if let Some(subscriber) = subscriber {
                    self.apply(Mutation::Remove(Collection::Subscribers, subscriber));
                }
            }

            SessionEvent::LocalStreamCreated(stream) => {
                self.apply(Mutation::SetLocalStream(Some(stream)));
            }

            SessionEvent::LocalStreamDestroyed => {
                self.apply(Mutation::SetLocalStream(None));
            }
        }
    }
}
