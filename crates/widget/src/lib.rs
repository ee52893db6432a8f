//! Embeddable chat widget core.
//!
//! A host embeds the widget through [`WidgetHandle`], supplies a [`WidgetSurface`] that
//! draws the panel, and a transport that reaches the configured backend endpoint.
#![deny(unsafe_code)]

pub mod chat;
pub mod error;
/// Conversation session controller and submit state machine.
pub mod session;
/// Widget configuration and its loader.
pub mod settings;
/// Lifecycle shell and the host-facing rendering boundary.
pub mod shell;

pub use chatwidget_transport as transport;
pub use error::{ErrorKind, WidgetError, WidgetResult};
pub use session::{SessionController, TurnOutcome};
pub use settings::{ConfigLoader, WidgetConfig};
pub use shell::{Anchor, ConfigHandle, OPEN_ON_LOAD_DELAY, WidgetHandle, WidgetSurface};

#[cfg(test)]
mod test_support;
