pub mod controller;
pub mod request;
/// Session-scoped state: visibility, busy flag, phase and thread id.
pub mod state;

pub use controller::{RejectReason, SessionController, TurnOutcome};
pub use request::{OutgoingRequest, RESERVED_FIELDS, UserMetadata};
pub use state::{SessionState, ThreadId, ThreadSlot, TurnPhase, Visibility};
