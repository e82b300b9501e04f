use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::errors::CallError;
use crate::events::{CallEvent, CallEventListener, EventEmitter};
use crate::handle::Handle;
use crate::state::{CallState, Mutation, SessionRef};
use crate::status::{CallPhase, DerivedSnapshot};

/// Owns the call state and notifies listeners after each accepted mutation.
///
/// Cloning shares the same state and listeners. The state lock is released
/// before any listener runs, so listeners may read back through the
/// container.
#[derive(Clone, Default)]
pub struct CallContainer {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<CallState>,
    emitter: EventEmitter,
}

/// Non-owning reference to a [`CallContainer`].
///
/// Held by SDK-side handlers so a session does not keep the state and its
/// listeners alive once every owner is gone.
#[derive(Clone)]
pub struct WeakCallContainer {
    inner: Weak<Inner>,
}

impl WeakCallContainer {
    pub fn upgrade(&self) -> Option<CallContainer> {
        self.inner.upgrade().map(|inner| CallContainer { inner })
    }
}

impl CallContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn downgrade(&self) -> WeakCallContainer {
        WeakCallContainer {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn CallEventListener>) {
        self.inner.emitter.add_listener(listener);
    }

    pub fn subscribe(&self) -> tokio::sync::mpsc::UnboundedReceiver<CallEvent> {
        self.inner.emitter.subscribe()
    }

    /// Apply `mutation` and run exactly one notification cycle.
    ///
    /// A rejected mutation leaves the state untouched and emits nothing.
    pub fn change(&self, mutation: Mutation) -> Result<(), CallError> {
        self.change_if(mutation, |_| true).map(|_| ())
    }

    /// Like [`CallContainer::change`], but only while `session` is still the
    /// active session. Returns `Ok(false)` when the mutation was dropped.
    pub fn change_for_session(
        &self,
        session: &Handle,
        mutation: Mutation,
    ) -> Result<bool, CallError> {
        self.change_if(mutation, |state| state.session_handle() == Some(session))
    }

    /// Reset the whole state and broadcast the empty snapshot.
    pub fn reset_content(&self) {
        // Reset is never rejected.
        if let Err(e) = self.change(Mutation::Reset) {
            tracing::error!("reset failed: {e}");
        }
    }

    fn change_if(
        &self,
        mutation: Mutation,
        guard: impl FnOnce(&CallState) -> bool,
    ) -> Result<bool, CallError> {
        let (change, snapshot) = {
            let mut state = self.lock();
            if !guard(&state) {
                tracing::debug!("dropping mutation for inactive session: {mutation:?}");
                return Ok(false);
            }
            tracing::trace!("applying {mutation:?}");
            let change = state.apply(mutation)?;
            (change, DerivedSnapshot::from_state(&state))
        };

        match change {
            Some(change) => {
                tracing::debug!("{} changed", change.field.as_str());
                self.inner.emitter
                    .emit_event(Some(change.field), Some(change.value), snapshot);
            }
            None => {
                tracing::debug!("call state reset");
                self.inner.emitter.emit_event(None, None, snapshot);
            }
        }
        Ok(true)
    }

    /// Broadcast the current snapshot without changing anything.
    pub fn broadcast(&self) {
        let snapshot = self.snapshot();
        self.inner.emitter.emit_event(None, None, snapshot);
    }

    pub fn snapshot(&self) -> DerivedSnapshot {
        DerivedSnapshot::from_state(&self.lock())
    }

    pub fn phase(&self) -> CallPhase {
        CallPhase::of(&self.lock())
    }

    /// Read the state under the lock.
    pub fn with_state<R>(&self, f: impl FnOnce(&CallState) -> R) -> R {
        f(&self.lock())
    }

    /// Copy of the current state.
    pub fn state(&self) -> CallState {
        self.lock().clone()
    }

    pub fn session(&self) -> Option<SessionRef> {
        self.lock().session().cloned()
    }

    pub fn publisher(&self) -> Option<Handle> {
        self.lock().publisher().cloned()
    }

    fn lock(&self) -> MutexGuard<'_, CallState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
