use std::time::Duration;

use chatwidget_transport::TransportError;
use snafu::Snafu;

use crate::chat::{DecodeError, ProtocolError};

/// Coarse classes of turn failures, as shown to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Transport,
    Protocol,
}

/// Every way a turn can fail. All of them are caught at the submit boundary.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum WidgetError {
    #[snafu(display("no URL provided"))]
    MissingUrl { stage: &'static str },
    #[snafu(display("transport failed on `{stage}`: {source}"))]
    Transport {
        stage: &'static str,
        source: TransportError,
    },
    #[snafu(display("server responded with status {status} {reason}"))]
    HttpStatus {
        stage: &'static str,
        status: u16,
        reason: String,
    },
    #[snafu(display("unexpected reply shape on `{stage}`: {source}"))]
    Protocol {
        stage: &'static str,
        source: ProtocolError,
    },
    #[snafu(display("failed to decode stream on `{stage}`: {source}"))]
    Decode {
        stage: &'static str,
        source: DecodeError,
    },
    #[snafu(display("timed out after {}s waiting for {waiting_for}", timeout.as_secs()))]
    Timeout {
        stage: &'static str,
        waiting_for: &'static str,
        timeout: Duration,
    },
}

pub type WidgetResult<T> = Result<T, WidgetError>;

impl WidgetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingUrl { .. } => ErrorKind::Configuration,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Transport { .. }
            | Self::HttpStatus { .. }
            | Self::Decode { .. }
            | Self::Timeout { .. } => ErrorKind::Transport,
        }
    }

    /// Text for the user-facing notification.
    pub fn alert_text(&self) -> String {
        match self {
            Self::MissingUrl { .. } => "Could not send chat message: No URL provided".to_string(),
            Self::HttpStatus { status, reason, .. } if reason.is_empty() => {
                format!("Could not send message: HTTP {status}")
            }
            Self::HttpStatus { reason, .. } => format!("Could not send message: {reason}"),
            Self::Transport { source, .. } => format!("Could not send message: {source}"),
            Self::Decode { source, .. } => format!("Could not send message: {source}"),
            Self::Timeout { .. } => "Could not send message: the request timed out".to_string(),
            Self::Protocol { source, .. } => format!(
                "Could not read the chat reply: {source}. The chat backend integration looks misconfigured."
            ),
        }
    }
}
