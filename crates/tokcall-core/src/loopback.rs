//! In-memory SDK used by tests and the demo binary.
//!
//! Sessions never touch the network. Connecting succeeds immediately
//! (unless configured otherwise) and remote peers are simulated with
//! [`LoopbackSession::peer_joins`] / [`LoopbackSession::peer_leaves`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::errors::CallError;
use crate::handle::Handle;
use crate::sdk::{
    ConnectCallback, Publisher, Session, SessionEvent, SessionEventHandler, SessionFactory,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Failure injection and timing knobs.
#[derive(Debug, Clone, Default)]
struct LoopbackOptions {
    create_error: Option<String>,
    connect_error: Option<String>,
    deferred_connect: bool,
    disconnect_error: Option<String>,
    subscribe_error: Option<String>,
    publish_error: Option<String>,
}

/// Session factory and publisher backed by memory.
#[derive(Debug, Default)]
pub struct LoopbackSdk {
    options: LoopbackOptions,
    sessions: Mutex<Vec<Arc<LoopbackSession>>>,
}

impl LoopbackSdk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `create_session` call.
    pub fn with_create_error(mut self, msg: &str) -> Self {
        self.options.create_error = Some(msg.to_string());
        self
    }

    /// Report `msg` through every connect callback.
    pub fn with_connect_error(mut self, msg: &str) -> Self {
        self.options.connect_error = Some(msg.to_string());
        self
    }

    /// Hold connect callbacks until [`LoopbackSession::complete_connect`].
    pub fn with_deferred_connect(mut self) -> Self {
        self.options.deferred_connect = true;
        self
    }

    pub fn with_disconnect_error(mut self, msg: &str) -> Self {
        self.options.disconnect_error = Some(msg.to_string());
        self
    }

    pub fn with_subscribe_error(mut self, msg: &str) -> Self {
        self.options.subscribe_error = Some(msg.to_string());
        self
    }

    pub fn with_publish_error(mut self, msg: &str) -> Self {
        self.options.publish_error = Some(msg.to_string());
        self
    }

    /// Every session created so far, oldest first.
    pub fn sessions(&self) -> Vec<Arc<LoopbackSession>> {
        lock(&self.sessions).clone()
    }

    pub fn last_session(&self) -> Option<Arc<LoopbackSession>> {
        lock(&self.sessions).last().cloned()
    }

    fn find(&self, handle: &Handle) -> Option<Arc<LoopbackSession>> {
        lock(&self.sessions)
            .iter()
            .find(|s| &s.handle == handle)
            .cloned()
    }
}

impl SessionFactory for LoopbackSdk {
    fn create_session(&self, session_id: &str) -> Result<Arc<dyn Session>, CallError> {
        if let Some(msg) = &self.options.create_error {
            return Err(CallError::Session(msg.clone()));
        }
        let session = Arc::new(LoopbackSession {
            handle: Handle::new(),
            session_id: session_id.to_string(),
            own_connection: Handle::new(),
            options: self.options.clone(),
            handler: Mutex::new(None),
            pending: Mutex::new(None),
            token: Mutex::new(None),
            disconnected: AtomicBool::new(false),
        });
        tracing::debug!("loopback session {} created for {session_id}", session.handle);
        lock(&self.sessions).push(session.clone());
        Ok(session)
    }
}

impl Publisher for LoopbackSdk {
    fn publish(&self, session: &dyn Session) -> Result<Handle, CallError> {
        if let Some(msg) = &self.options.publish_error {
            return Err(CallError::Publisher(msg.clone()));
        }
        let publisher = Handle::new();
        if let Some(session) = self.find(session.handle()) {
            session.emit(SessionEvent::LocalStreamCreated(Handle::new()));
        }
        Ok(publisher)
    }

    fn unpublish(&self, session: &dyn Session, _publisher: &Handle) -> Result<(), CallError> {
        if let Some(session) = self.find(session.handle()) {
            session.emit(SessionEvent::LocalStreamDestroyed);
        }
        Ok(())
    }
}

/// A simulated session.
pub struct LoopbackSession {
    handle: Handle,
    session_id: String,
    own_connection: Handle,
    options: LoopbackOptions,
    handler: Mutex<Option<Arc<dyn SessionEventHandler>>>,
    pending: Mutex<Option<ConnectCallback>>,
    token: Mutex<Option<String>>,
    disconnected: AtomicBool,
}

impl LoopbackSession {
    /// Deliver `event` to the registered handler, if any.
    pub fn emit(&self, event: SessionEvent) {
        let handler = lock(&self.handler).clone();
        match handler {
            Some(handler) => handler.on_session_event(event),
            None => tracing::debug!("no handler for loopback event {event:?}"),
        }
    }

    /// Simulate a remote peer joining and publishing. Returns its
    /// `(connection, stream)` handles.
    pub fn peer_joins(&self) -> (Handle, Handle) {
        let connection = Handle::new();
        let stream = Handle::new();
        self.emit(SessionEvent::ConnectionCreated(connection.clone()));
        self.emit(SessionEvent::StreamCreated(stream.clone()));
        (connection, stream)
    }

    pub fn peer_leaves(&self, connection: &Handle, stream: &Handle) {
        self.emit(SessionEvent::StreamDestroyed(stream.clone()));
        self.emit(SessionEvent::ConnectionDestroyed(connection.clone()));
    }

    /// Simulate the SDK dropping the session on its own.
    pub fn drop_connection(&self) {
        self.emit(SessionEvent::SessionDisconnected);
    }

    /// Finish a deferred connect. Returns `false` if none was pending.
    pub fn complete_connect(&self) -> bool {
        let pending = lock(&self.pending).take();
        match pending {
            Some(on_complete) => {
                self.finish_connect(on_complete);
                true
            }
            None => false,
        }
    }

    pub fn token(&self) -> Option<String> {
        lock(&self.token).clone()
    }

    pub fn has_handler(&self) -> bool {
        lock(&self.handler).is_some()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    fn finish_connect(&self, on_complete: ConnectCallback) {
        self.emit(SessionEvent::SessionConnected);
        self.emit(SessionEvent::ConnectionCreated(self.own_connection.clone()));
        on_complete(Ok(()));
    }
}

impl fmt::Debug for LoopbackSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackSession")
            .field("handle", &self.handle)
            .field("session_id", &self.session_id)
            .field("disconnected", &self.is_disconnected())
            .finish()
    }
}

impl Session for LoopbackSession {
    fn handle(&self) -> &Handle {
        &self.handle
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn set_event_handler(&self, handler: Arc<dyn SessionEventHandler>) {
        *lock(&self.handler) = Some(handler);
    }

    fn connect(&self, token: &str, on_complete: ConnectCallback) {
        *lock(&self.token) = Some(token.to_string());
        if let Some(msg) = &self.options.connect_error {
            on_complete(Err(CallError::Session(msg.clone())));
        } else if self.options.deferred_connect {
            *lock(&self.pending) = Some(on_complete);
        } else {
            self.finish_connect(on_complete);
        }
    }

    fn disconnect(&self) -> Result<(), CallError> {
        self.disconnected.store(true, Ordering::SeqCst);
        match &self.options.disconnect_error {
            Some(msg) => Err(CallError::Session(msg.clone())),
            None => Ok(()),
        }
    }

    fn subscribe(&self, stream: &Handle) -> Result<Handle, CallError> {
        if let Some(msg) = &self.options.subscribe_error {
            return Err(CallError::Session(msg.clone()));
        }
        Ok(Handle::from(format!("subscriber-{stream}")))
    }
}
