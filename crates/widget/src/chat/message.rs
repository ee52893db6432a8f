use std::fmt;

use chrono::{Local, TimeZone, Utc};

/// Author of one timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sender {
    User,
    System,
}

impl Sender {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
        }
    }
}

/// Milliseconds since the Unix epoch, assigned once when an entry is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Local wall-clock `HH:MM` label shown under each entry.
    pub fn time_label(&self) -> String {
        match Local.timestamp_millis_opt(self.0).single() {
            Some(local) => local.format("%H:%M").to_string(),
            None => "--:--".to_string(),
        }
    }
}

/// Source of entry and request timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Stable identity of one timeline entry.
///
/// `sequence` is allocated by the store, so two entries created within the same
/// millisecond by the same sender still get distinct keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub sender: Sender,
    pub timestamp: Timestamp,
    pub sequence: u64,
}

impl fmt::Display for MessageKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{}@{}#{}",
            self.sender.as_str(),
            self.timestamp.as_millis(),
            self.sequence
        )
    }
}

/// One entry of the timeline. `text` holds markdown source, never rendered markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEntry {
    pub key: MessageKey,
    pub text: String,
}

impl MessageEntry {
    pub fn new(key: MessageKey, text: impl Into<String>) -> Self {
        Self {
            key,
            text: text.into(),
        }
    }

    pub fn sender(&self) -> Sender {
        self.key.sender
    }

    pub fn timestamp(&self) -> Timestamp {
        self.key.timestamp
    }
}
