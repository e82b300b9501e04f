//! Composite call-status flags derived from a [`CallState`].
//!
//! Every function here is pure. The flags are recomputed from scratch for
//! each notification; nothing is cached.

use serde::Serialize;

use crate::state::CallState;

pub fn is_session_connected(state: &CallState) -> bool {
    state.session_connected()
}

pub fn is_connection_created(state: &CallState) -> bool {
    state.connection_created()
}

/// Session is up but at least one of the publish/subscribe legs is missing.
pub fn is_calling(state: &CallState) -> bool {
    (has_session(state) && state.session_connected() && state.connection_created())
        && (!has_publisher(state)
            || state.subscribers().is_empty()
            || state.streams().is_empty()
            || !has_local_stream(state))
}

/// Fully bidirectional call. Does not look at `connection_created`.
pub fn is_call_goes(state: &CallState) -> bool {
    has_session(state)
        && state.session_connected()
        && has_publisher(state)
        && !state.subscribers().is_empty()
        && !state.streams().is_empty()
        && has_local_stream(state)
}

pub fn can_be_published(state: &CallState) -> bool {
    has_session(state) && state.session_connected() && !has_publisher(state)
}

pub fn has_publisher(state: &CallState) -> bool {
    state.publisher().is_some()
}

pub fn has_session(state: &CallState) -> bool {
    state.session().is_some()
}

pub fn has_local_stream(state: &CallState) -> bool {
    state.local_stream().is_some()
}

pub fn is_any_stream(state: &CallState) -> bool {
    !state.streams().is_empty()
}

pub fn is_any_connection(state: &CallState) -> bool {
    !state.connections().is_empty()
}

pub fn is_any_subscribers(state: &CallState) -> bool {
    !state.subscribers().is_empty()
}

/// All derived flags at one point in time, as carried by `hash-changed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedSnapshot {
    pub is_connection_created: bool,
    pub is_session_connected: bool,
    pub is_calling: bool,
    pub is_call_goes: bool,
    pub can_be_published: bool,
    pub has_publisher: bool,
    pub has_session: bool,
    pub has_local_stream: bool,
    pub is_any_stream: bool,
    pub is_any_connection: bool,
    pub is_any_subscribers: bool,
}

impl DerivedSnapshot {
    pub fn from_state(state: &CallState) -> Self {
        Self {
            is_connection_created: is_connection_created(state),
            is_session_connected: is_session_connected(state),
            is_calling: is_calling(state),
            is_call_goes: is_call_goes(state),
            can_be_published: can_be_published(state),
            has_publisher: has_publisher(state),
            has_session: has_session(state),
            has_local_stream: has_local_stream(state),
            is_any_stream: is_any_stream(state),
            is_any_connection: is_any_connection(state),
            is_any_subscribers: is_any_subscribers(state),
        }
    }

    /// True when no flag is set, as after a disconnect.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Coarse lifecycle position of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallPhase {
    Idle,
    Connecting,
    Connected,
    Publishing,
}

impl CallPhase {
    pub fn of(state: &CallState) -> Self {
        if !has_session(state) {
            CallPhase::Idle
        } else if !state.session_connected() {
            CallPhase::Connecting
        } else if has_publisher(state) {
            CallPhase::Publishing
        } else {
            CallPhase::Connected
        }
    }
}
