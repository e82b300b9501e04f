//! Call-state façade over a real-time video-calling SDK.
//!
//! Tracks session, publisher and remote media state, derives the composite
//! call-status flags and notifies listeners on every change.
//! The SDK itself is plugged in through the traits in [`sdk`].

pub mod bridge;
pub mod calls;
pub mod config;
pub mod container;
pub mod errors;
pub mod events;
pub mod handle;
pub mod loopback;
pub mod sdk;
pub mod state;
pub mod status;

pub use calls::CallClient;
pub use config::CallConfig;
pub use container::CallContainer;
pub use errors::CallError;
pub use events::{CallEvent, CallEventListener, CallField, EventEmitter, FieldChange, FieldValue};
pub use handle::Handle;
pub use sdk::{Publisher, Session, SessionEvent, SessionEventHandler, SessionFactory};
pub use state::{CallState, Collection, Mutation};
pub use status::{CallPhase, DerivedSnapshot};
