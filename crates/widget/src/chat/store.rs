use std::collections::VecDeque;
use std::sync::Arc;

use snafu::{Snafu, ensure};

use super::markdown::{CommonMarkRenderer, MarkdownRenderer};
use super::message::{MessageEntry, MessageKey, Sender, Timestamp};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    #[snafu(display("timeline already holds an entry with key {key}"))]
    DuplicateKey {
        stage: &'static str,
        key: MessageKey,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Tagged timeline mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreMutation {
    /// Insert a new entry; fails when the key is already present.
    Append(MessageEntry),
    /// Replace the text of the entry with `key`, inserting it first when absent.
    Upsert { key: MessageKey, text: String },
}

/// Where a re-rendered entry goes in the visible timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// New entry at the head of the timeline.
    Prepended,
    /// Existing entry whose content was swapped in place.
    Replaced,
}

/// Render instruction for exactly one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryChange {
    pub key: MessageKey,
    pub placement: Placement,
    pub text: String,
    pub markup: String,
    pub time_label: String,
}

impl EntryChange {
    pub fn sender(&self) -> Sender {
        self.key.sender
    }
}

/// Ordered timeline, most recent entry first.
pub struct MessageStore {
    entries: VecDeque<MessageEntry>,
    next_sequence: u64,
    renderer: Arc<dyn MarkdownRenderer>,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new(Arc::new(CommonMarkRenderer))
    }
}

impl MessageStore {
    pub fn new(renderer: Arc<dyn MarkdownRenderer>) -> Self {
        Self {
            entries: VecDeque::new(),
            next_sequence: 0,
            renderer,
        }
    }

    /// Hands out a key that no other entry of this store has used or will use.
    pub fn allocate_key(&mut self, sender: Sender, timestamp: Timestamp) -> MessageKey {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.saturating_add(1);
        MessageKey {
            sender,
            timestamp,
            sequence,
        }
    }

    pub fn apply(&mut self, mutation: StoreMutation) -> StoreResult<EntryChange> {
        match mutation {
            StoreMutation::Append(entry) => self.append(entry),
            StoreMutation::Upsert { key, text } => Ok(self.upsert(key, text)),
        }
    }

    pub fn append(&mut self, entry: MessageEntry) -> StoreResult<EntryChange> {
        ensure!(
            self.position(&entry.key).is_none(),
            DuplicateKeySnafu {
                stage: "store-append",
                key: entry.key,
            }
        );

        Ok(self.insert_front(entry))
    }

    pub fn upsert(&mut self, key: MessageKey, text: impl Into<String>) -> EntryChange {
        let text = text.into();
        match self.position(&key) {
            Some(index) => {
                let entry = &mut self.entries[index];
                entry.text = text;
                let entry = entry.clone();
                self.render(&entry, Placement::Replaced)
            }
            None => self.insert_front(MessageEntry::new(key, text)),
        }
    }

    pub fn get(&self, key: &MessageKey) -> Option<&MessageEntry> {
        self.position(key).map(|index| &self.entries[index])
    }

    /// Entries in display order, most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &MessageEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry. Keys are never reused after a clear.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Render instructions for the whole timeline, most recent first.
    pub fn render_all(&self) -> Vec<EntryChange> {
        self.entries
            .iter()
            .map(|entry| self.render(entry, Placement::Prepended))
            .collect()
    }

    fn insert_front(&mut self, entry: MessageEntry) -> EntryChange {
        if entry.key.sequence >= self.next_sequence {
            self.next_sequence = entry.key.sequence.saturating_add(1);
        }
        let change = self.render(&entry, Placement::Prepended);
        self.entries.push_front(entry);
        change
    }

    fn position(&self, key: &MessageKey) -> Option<usize> {
        // Streaming updates target the newest entry, so scanning from the head is short.
        self.entries.iter().position(|entry| entry.key == *key)
    }

    fn render(&self, entry: &MessageEntry, placement: Placement) -> EntryChange {
        EntryChange {
            key: entry.key,
            placement,
            text: entry.text.clone(),
            markup: self.renderer.render(&entry.text),
            time_label: entry.timestamp().time_label(),
        }
    }
}
