//! Collaborator interface to the underlying video-calling SDK.
//!
//! The core never talks to the network itself. A concrete SDK binding
//! implements these traits and reports state changes back through a
//! [`SessionEventHandler`].

use std::fmt;
use std::sync::Arc;

use crate::errors::CallError;
use crate::handle::Handle;

/// Completion callback for [`Session::connect`].
pub type ConnectCallback = Box<dyn FnOnce(Result<(), CallError>) + Send>;

/// Raw state events raised by an SDK session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SessionConnected,
    SessionDisconnected,
    ConnectionCreated(Handle),
    ConnectionDestroyed(Handle),
    StreamCreated(Handle),
    StreamDestroyed(Handle),
    LocalStreamCreated(Handle),
    LocalStreamDestroyed,
}

/// Receives events from a session.
/// Implementations must be Send + Sync (SDK callbacks may run on any thread).
pub trait SessionEventHandler: Send + Sync {
    fn on_session_event(&self, event: SessionEvent);
}

/// Creates sessions for a session id.
pub trait SessionFactory: Send + Sync {
    fn create_session(&self, session_id: &str) -> Result<Arc<dyn Session>, CallError>;
}

/// A real-time session owned by the SDK.
pub trait Session: Send + Sync + fmt::Debug {
    /// Identity of this session object. Distinct for every created session,
    /// even when two share a session id.
    fn handle(&self) -> &Handle;

    fn session_id(&self) -> &str;

    /// Register the handler that receives this session's events.
    fn set_event_handler(&self, handler: Arc<dyn SessionEventHandler>);

    /// Start connecting. Completion is reported through `on_complete`,
    /// possibly after this call returns.
    fn connect(&self, token: &str, on_complete: ConnectCallback);

    fn disconnect(&self) -> Result<(), CallError>;

    /// Attach a subscriber to a remote stream, returning the subscriber handle.
    fn subscribe(&self, stream: &Handle) -> Result<Handle, CallError>;
}

/// Publishes the local camera/microphone into a session.
pub trait Publisher: Send + Sync {
    fn publish(&self, session: &dyn Session) -> Result<Handle, CallError>;

    fn unpublish(&self, session: &dyn Session, publisher: &Handle) -> Result<(), CallError>;
}
