use std::fmt;

/// Opaque conversation thread identifier issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadId(String);

impl ThreadId {
    /// Keeps the value verbatim. Only the empty string is not an id.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            None
        } else {
            Some(Self(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// First-write-wins holder for the session's thread id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadSlot(Option<ThreadId>);

impl ThreadSlot {
    pub fn seeded(seed: Option<&str>) -> Self {
        Self(seed.and_then(ThreadId::parse))
    }

    pub fn get(&self) -> Option<&ThreadId> {
        self.0.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    /// Stores `candidate` only when nothing is held yet. Returns whether it was stored.
    pub fn adopt(&mut self, candidate: Option<ThreadId>) -> bool {
        match (&self.0, candidate) {
            (None, Some(candidate)) => {
                self.0 = Some(candidate);
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Closed,
    Open,
}

/// Submit state machine. `Idle` is both the initial and the terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    Submitting,
    Streaming,
    Completing,
}

/// Per-widget session state, owned by one controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub(crate) visibility: Visibility,
    pub(crate) busy: bool,
    pub(crate) phase: TurnPhase,
    pub(crate) thread: ThreadSlot,
    pub(crate) backdrop_shown: bool,
}

impl SessionState {
    pub fn new(thread: ThreadSlot) -> Self {
        Self {
            thread,
            ..Self::default()
        }
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_open(&self) -> bool {
        self.visibility == Visibility::Open
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn thread_id(&self) -> Option<&ThreadId> {
        self.thread.get()
    }

    pub fn backdrop_shown(&self) -> bool {
        self.backdrop_shown
    }
}
