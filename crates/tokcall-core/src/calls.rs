use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::bridge::SessionBridge;
use crate::config::CallConfig;
use crate::container::CallContainer;
use crate::errors::CallError;
use crate::events::{CallEvent, CallEventListener};
use crate::sdk::{Publisher, SessionFactory};
use crate::state::{CallState, Mutation};
use crate::status::{self, CallPhase, DerivedSnapshot};

/// Public entry point: drives the SDK and exposes the call status.
///
/// Listeners registered with [`CallClient::add_listener`] or
/// [`CallClient::subscribe`] see, for every state change, the field event,
/// `property-changed`, then `hash-changed`.
pub struct CallClient {
    config: Mutex<CallConfig>,
    container: CallContainer,
    sessions: Arc<dyn SessionFactory>,
    publisher: Arc<dyn Publisher>,
}

impl CallClient {
    pub fn new(
        config: CallConfig,
        sessions: Arc<dyn SessionFactory>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            config: Mutex::new(config),
            container: CallContainer::new(),
            sessions,
            publisher,
        }
    }

    /// Register a listener for call events.
    pub fn add_listener(&self, listener: Arc<dyn CallEventListener>) {
        self.container.add_listener(listener);
    }

    /// Channel of every call event emitted from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<CallEvent> {
        self.container.subscribe()
    }

    pub fn config(&self) -> CallConfig {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Connect to a session.
    ///
    /// Returns once the session is created and the SDK connect has started.
    /// The SDK reports the outcome later through session events; a failed
    /// connect is logged and leaves the session stored but not connected.
    pub fn connect(&self, session_id: &str, token: &str) -> Result<(), CallError> {
        if session_id.is_empty() || token.is_empty() {
            tracing::error!("session id or token empty");
            return Err(CallError::MissingCredentials);
        }
        if self.has_session() {
            tracing::error!("connection to session already created");
            return Err(CallError::AlreadyConnected);
        }

        let session = self.sessions.create_session(session_id).inspect_err(|e| {
            tracing::error!("failed to create session {session_id}: {e}");
        })?;
        let handle = session.handle().clone();

        if let Err(e) = self.container.change(Mutation::SetSession(session.clone())) {
            tracing::error!("failed to store session {session_id}: {e}");
            if let Err(e) = session.disconnect() {
                tracing::warn!("error disconnecting unused session {session_id}: {e}");
            }
            return Err(e);
        }
        {
            let mut config = self.config.lock().unwrap_or_else(PoisonError::into_inner);
            config.session_id = session_id.to_string();
            config.token = token.to_string();
        }

        session.set_event_handler(Arc::new(SessionBridge::new(handle, &self.container)));

        tracing::info!("connecting to session {session_id}");
        let id = session_id.to_string();
        session.connect(
            token,
            Box::new(move |result| match result {
                Ok(()) => tracing::debug!("connected to session {id}"),
                Err(e) => tracing::error!("error connecting to session {id}: {e}"),
            }),
        );
        Ok(())
    }

    /// Disconnect from the current session and reset all call state.
    ///
    /// Without a session this is a no-op. SDK disconnect errors are logged;
    /// the state is reset regardless.
    pub fn disconnect(&self) -> Result<(), CallError> {
        let Some(session) = self.container.session() else {
            tracing::debug!("nothing to disconnect");
            return Ok(());
        };

        if let Err(e) = session.disconnect() {
            tracing::warn!("error disconnecting session {}: {e}", session.session_id());
        }
        self.container.reset_content();
        tracing::info!("disconnected from session {}", session.session_id());
        Ok(())
    }

    /// Publish local media. Requires [`CallClient::can_be_published`].
    pub fn publish(&self) -> Result<(), CallError> {
        let session = match self.container.session() {
            Some(session) if self.can_be_published() => session,
            _ => {
                tracing::error!("cannot publish in phase {:?}", self.phase());
                return Err(CallError::CannotPublish);
            }
        };

        let publisher = self.publisher.publish(session.as_ref()).inspect_err(|e| {
            tracing::error!("publish failed: {e}");
        })?;
        self.container.change(Mutation::SetPublisher(Some(publisher)))?;
        tracing::info!("publishing to session {}", session.session_id());
        Ok(())
    }

    /// Stop publishing. Call before [`CallClient::disconnect`] for a clean
    /// teardown.
    pub fn unpublish(&self) -> Result<(), CallError> {
        let (Some(session), Some(publisher)) =
            (self.container.session(), self.container.publisher())
        else {
            tracing::error!("no publisher to unpublish");
            return Err(CallError::NoPublisher);
        };

        self.publisher
            .unpublish(session.as_ref(), &publisher)
            .inspect_err(|e| tracing::error!("unpublish failed: {e}"))?;
        if self.has_local_stream() {
            self.container.change(Mutation::SetLocalStream(None))?;
        }
        self.container.change(Mutation::SetPublisher(None))?;
        tracing::info!("unpublished from session {}", session.session_id());
        Ok(())
    }

    // ── Read-only status ─────────────────────────────────────────────

    pub fn is_session_connected(&self) -> bool {
        self.container.with_state(status::is_session_connected)
    }

    pub fn is_connection_created(&self) -> bool {
        self.container.with_state(status::is_connection_created)
    }

    pub fn is_calling(&self) -> bool {
        self.container.with_state(status::is_calling)
    }

    pub fn is_call_goes(&self) -> bool {
        self.container.with_state(status::is_call_goes)
    }

    pub fn can_be_published(&self) -> bool {
        self.container.with_state(status::can_be_published)
    }

    pub fn has_publisher(&self) -> bool {
        self.container.with_state(status::has_publisher)
    }

    pub fn has_session(&self) -> bool {
        self.container.with_state(status::has_session)
    }

    pub fn has_local_stream(&self) -> bool {
        self.container.with_state(status::has_local_stream)
    }

    pub fn is_any_stream(&self) -> bool {
        self.container.with_state(status::is_any_stream)
    }

    pub fn is_any_connection(&self) -> bool {
        self.container.with_state(status::is_any_connection)
    }

    pub fn is_any_subscribers(&self) -> bool {
        self.container.with_state(status::is_any_subscribers)
    }

    pub fn stream_count(&self) -> usize {
        self.container.with_state(|s| s.streams().len())
    }

    pub fn connection_count(&self) -> usize {
        self.container.with_state(|s| s.connections().len())
    }

    pub fn subscriber_count(&self) -> usize {
        self.container.with_state(|s| s.subscribers().len())
    }

    pub fn snapshot(&self) -> DerivedSnapshot {
        self.container.snapshot()
    }

    pub fn phase(&self) -> CallPhase {
        self.container.phase()
    }

    pub fn state(&self) -> CallState {
        self.container.state()
    }

    /// Re-send the current `hash-changed` snapshot to all listeners.
    pub fn broadcast(&self) {
        self.container.broadcast();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{HASH_CHANGED, PROPERTY_CHANGED};
    use crate::loopback::LoopbackSdk;
    use crate::sdk::Session;
    use crate::state::SessionRef;
    use std::sync::OnceLock;
    use tokio::sync::mpsc::error::TryRecvError;

    struct EventCapture {
        events: Arc<Mutex<Vec<CallEvent>>>,
    }

    impl CallEventListener for EventCapture {
        fn on_event(&self, event: CallEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn client_with(sdk: LoopbackSdk) -> (CallClient, Arc<LoopbackSdk>, Arc<Mutex<Vec<CallEvent>>>) {
        let sdk = Arc::new(sdk);
        let client = CallClient::new(CallConfig::default(), sdk.clone(), sdk.clone());
        let events = Arc::new(Mutex::new(Vec::new()));
        client.add_listener(Arc::new(EventCapture { events: events.clone() }));
        (client, sdk, events)
    }

    fn loopback_client() -> (CallClient, Arc<LoopbackSdk>, Arc<Mutex<Vec<CallEvent>>>) {
        client_with(LoopbackSdk::new())
    }

    fn hash_count(events: &Arc<Mutex<Vec<CallEvent>>>) -> usize {
        events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.name() == HASH_CHANGED)
            .count()
    }

    #[test]
    fn connect_with_empty_credentials_does_nothing() {
        let (client, sdk, events) = loopback_client();

        assert_eq!(client.connect("", "tok"), Err(CallError::MissingCredentials));
        assert_eq!(client.connect("sess", ""), Err(CallError::MissingCredentials));

        assert!(events.lock().unwrap().is_empty());
        assert!(sdk.sessions().is_empty());
        assert!(!client.has_session());
        assert!(client.config().session_id.is_empty());
    }

    #[test]
    fn connect_establishes_session() {
        let (client, sdk, events) = loopback_client();

        client.connect("sess", "tok").unwrap();

        assert!(client.has_session());
        assert!(client.is_session_connected());
        assert!(client.is_connection_created());
        assert!(client.is_any_connection());
        assert!(client.is_calling());
        assert!(client.can_be_published());
        assert_eq!(client.phase(), CallPhase::Connected);

        let config = client.config();
        assert_eq!(config.session_id, "sess");
        assert_eq!(config.token, "tok");

        let session = sdk.last_session().unwrap();
        assert!(session.has_handler());
        assert_eq!(session.token().as_deref(), Some("tok"));

        let captured = events.lock().unwrap();
        assert_eq!(captured[0].name(), "session");
        assert_eq!(captured[1].name(), PROPERTY_CHANGED);
        assert_eq!(captured[2].name(), HASH_CHANGED);
    }

    #[test]
    fn second_connect_keeps_existing_session() {
        let (client, sdk, _events) = loopback_client();
        client.connect("first", "tok-1").unwrap();
        let first = client.state().session_handle().cloned();

        assert_eq!(client.connect("second", "tok-2"), Err(CallError::AlreadyConnected));

        assert_eq!(client.state().session_handle().cloned(), first);
        assert_eq!(sdk.sessions().len(), 1);
        assert_eq!(client.config().session_id, "first");
    }

    #[test]
    fn session_factory_failure_mutates_nothing() {
        let (client, _sdk, events) = client_with(LoopbackSdk::new().with_create_error("bad id"));

        assert!(matches!(client.connect("sess", "tok"), Err(CallError::Session(_))));
        assert!(events.lock().unwrap().is_empty());
        assert!(!client.has_session());
    }

    #[test]
    fn connect_error_keeps_session_unconnected() {
        let (client, _sdk, _events) = client_with(LoopbackSdk::new().with_connect_error("denied"));

        client.connect("sess", "tok").unwrap();

        assert!(client.has_session());
        assert!(!client.is_session_connected());
        assert!(!client.can_be_published());
        assert_eq!(client.phase(), CallPhase::Connecting);

        client.disconnect().unwrap();
        assert!(!client.has_session());
    }

    #[test]
    fn full_call_lifecycle() {
        let (client, sdk, _events) = loopback_client();
        client.connect("sess", "tok").unwrap();
        client.publish().unwrap();

        assert!(client.has_publisher());
        assert!(client.has_local_stream());
        assert_eq!(client.phase(), CallPhase::Publishing);
        assert!(client.is_calling());
        assert!(!client.is_call_goes());

        let session = sdk.last_session().unwrap();
        let (connection, stream) = session.peer_joins();

        assert!(client.is_call_goes());
        assert!(!client.is_calling());
        assert_eq!(client.stream_count(), 1);
        assert_eq!(client.subscriber_count(), 1);
        assert_eq!(client.connection_count(), 2);

        session.peer_leaves(&connection, &stream);
        assert!(!client.is_call_goes());
        assert!(client.is_calling());
        assert!(!client.is_any_stream());
        assert!(!client.is_any_subscribers());

        client.unpublish().unwrap();
        assert!(!client.has_publisher());
        assert!(!client.has_local_stream());
        assert!(client.can_be_published());

        client.disconnect().unwrap();
        assert!(session.is_disconnected());
        assert!(client.snapshot().is_empty());
        assert_eq!(client.phase(), CallPhase::Idle);
    }

    #[test]
    fn disconnect_resets_everything() {
        let (client, sdk, events) = loopback_client();
        client.connect("sess", "tok").unwrap();
        client.publish().unwrap();
        sdk.last_session().unwrap().peer_joins();
        events.lock().unwrap().clear();

        client.disconnect().unwrap();

        let state = client.state();
        assert!(state.subscribers().is_empty());
        assert!(state.streams().is_empty());
        assert!(state.connections().is_empty());
        assert!(client.snapshot().is_empty());

        let captured = events.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].name(), HASH_CHANGED);
    }

    #[test]
    fn disconnect_resets_even_when_sdk_fails() {
        let (client, _sdk, _events) = client_with(LoopbackSdk::new().with_disconnect_error("gone"));
        client.connect("sess", "tok").unwrap();

        client.disconnect().unwrap();

        assert!(!client.has_session());
        assert!(client.snapshot().is_empty());
    }

    #[test]
    fn disconnect_without_session_is_noop() {
        let (client, _sdk, events) = loopback_client();

        assert!(client.disconnect().is_ok());
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn publish_requires_connected_session() {
        let (client, _sdk, events) = client_with(LoopbackSdk::new().with_deferred_connect());
        assert_eq!(client.publish(), Err(CallError::CannotPublish));
        assert!(events.lock().unwrap().is_empty());

        client.connect("sess", "tok").unwrap();
        let before = hash_count(&events);
        assert_eq!(client.publish(), Err(CallError::CannotPublish));
        assert!(!client.has_publisher());
        assert_eq!(hash_count(&events), before);
    }

    #[test]
    fn publish_twice_is_rejected() {
        let (client, _sdk, events) = loopback_client();
        client.connect("sess", "tok").unwrap();
        client.publish().unwrap();
        let before = hash_count(&events);

        assert_eq!(client.publish(), Err(CallError::CannotPublish));
        assert_eq!(hash_count(&events), before);
    }

    #[test]
    fn publisher_failure_mutates_nothing() {
        let sdk = LoopbackSdk::new().with_publish_error("no camera");
        let (client, _sdk, events) = client_with(sdk);
        client.connect("sess", "tok").unwrap();
        let before = hash_count(&events);

        assert!(matches!(client.publish(), Err(CallError::Publisher(_))));
        assert_eq!(hash_count(&events), before);
        assert!(!client.has_publisher());
    }

    #[test]
    fn unpublish_without_publisher_fails() {
        let (client, _sdk, _events) = loopback_client();
        assert_eq!(client.unpublish(), Err(CallError::NoPublisher));
        client.connect("sess", "tok").unwrap();
        assert_eq!(client.unpublish(), Err(CallError::NoPublisher));
    }

    #[test]
    fn late_connect_after_disconnect_is_ignored() {
        let (client, sdk, events) = client_with(LoopbackSdk::new().with_deferred_connect());
        client.connect("sess", "tok").unwrap();
        client.disconnect().unwrap();
        events.lock().unwrap().clear();

        assert!(sdk.last_session().unwrap().complete_connect());

        assert!(events.lock().unwrap().is_empty());
        assert!(client.snapshot().is_empty());
    }

    #[test]
    fn reconnect_after_disconnect_uses_new_session() {
        let (client, sdk, _events) = loopback_client();
        client.connect("sess", "tok").unwrap();
        client.disconnect().unwrap();

        client.connect("sess", "tok-2").unwrap();

        assert_eq!(sdk.sessions().len(), 2);
        assert!(client.is_session_connected());
        // Events from the old session no longer reach the state.
        sdk.sessions()[0].peer_joins();
        assert!(!client.is_any_stream());
    }

    #[test]
    fn every_mutation_emits_one_snapshot() {
        let (client, sdk, events) = loopback_client();
        client.connect("sess", "tok").unwrap();
        // SetSession, SessionConnected, ConnectionCreated + Add connection
        assert_eq!(hash_count(&events), 4);

        sdk.last_session().unwrap().peer_joins();
        // Connection flag + add, stream add, subscriber add
        assert_eq!(hash_count(&events), 8);
    }

    #[test]
    fn sdk_dropping_session_resets_state() {
        let (client, sdk, _events) = loopback_client();
        client.connect("sess", "tok").unwrap();

        sdk.last_session().unwrap().drop_connection();

        assert!(!client.has_session());
        assert!(client.snapshot().is_empty());
        // The façade can connect again.
        client.connect("sess", "tok").unwrap();
        assert!(client.is_session_connected());
    }

    #[test]
    fn subscribe_failure_keeps_stream() {
        let (client, sdk, _events) =
            client_with(LoopbackSdk::new().with_subscribe_error("no media"));
        client.connect("sess", "tok").unwrap();

        sdk.last_session().unwrap().peer_joins();

        assert!(client.is_any_stream());
        assert!(!client.is_any_subscribers());
    }

    #[tokio::test]
    async fn subscribers_receive_the_same_events() {
        let (client, sdk, events) = loopback_client();
        let mut rx = client.subscribe();

        client.connect("sess", "tok").unwrap();
        sdk.last_session().unwrap().peer_joins();

        let mut received = Vec::new();
        while let Ok(event) = rx.try_recv() {
            received.push(event);
        }
        assert_eq!(received.len(), 24);
        assert_eq!(received, *events.lock().unwrap());
    }

    #[test]
    fn dropping_client_releases_listeners() {
        let (client, sdk, _events) = loopback_client();
        let mut rx = client.subscribe();
        client.connect("sess", "tok").unwrap();

        drop(client);

        while rx.try_recv().is_ok() {}
        assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));

        // The SDK still holds the session; its events go nowhere.
        sdk.last_session().unwrap().peer_joins();
        assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));
    }

    /// Factory that lets a competing session land in the state while the
    /// client is still creating its own.
    struct RacingFactory {
        sdk: Arc<LoopbackSdk>,
        container: OnceLock<CallContainer>,
    }

    impl SessionFactory for RacingFactory {
        fn create_session(&self, session_id: &str) -> Result<SessionRef, CallError> {
            if let Some(container) = self.container.get() {
                let winner = self.sdk.create_session("winner")?;
                container.change(Mutation::SetSession(winner))?;
            }
            self.sdk.create_session(session_id)
        }
    }

    #[test]
    fn session_lost_to_concurrent_connect_is_disconnected() {
        let sdk = Arc::new(LoopbackSdk::new());
        let factory = Arc::new(RacingFactory {
            sdk: sdk.clone(),
            container: OnceLock::new(),
        });
        let client = CallClient::new(CallConfig::default(), factory.clone(), sdk.clone());
        assert!(factory.container.set(client.container.clone()).is_ok());

        assert_eq!(client.connect("sess", "tok"), Err(CallError::AlreadyConnected));

        let sessions = sdk.sessions();
        assert_eq!(sessions.len(), 2);
        assert!(!sessions[0].is_disconnected());
        assert!(sessions[1].is_disconnected());
        assert_eq!(client.state().session_handle(), Some(sessions[0].handle()));
        assert!(client.config().session_id.is_empty());
    }

    #[test]
    fn broadcast_sends_current_snapshot() {
        let (client, _sdk, events) = loopback_client();
        client.broadcast();

        let captured = events.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0], CallEvent::HashChanged(DerivedSnapshot::default()));
    }
}
