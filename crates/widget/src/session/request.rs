use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::chat::Timestamp;

use super::state::ThreadId;

/// Request fields owned by the widget. Host metadata never overrides them.
pub const RESERVED_FIELDS: [&str; 3] = ["message", "threadId", "timestamp"];

/// Open key–value metadata the host attaches to every request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserMetadata(Map<String, Value>);

impl UserMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<Map<String, Value>> for UserMetadata {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

/// Body of one submission: `{ ...user, message, threadId?, timestamp }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRequest {
    pub message: String,
    pub thread_id: Option<ThreadId>,
    pub timestamp: Timestamp,
}

impl OutgoingRequest {
    pub fn new(message: impl Into<String>, thread_id: Option<ThreadId>, timestamp: Timestamp) -> Self {
        Self {
            message: message.into(),
            thread_id,
            timestamp,
        }
    }

    /// Host metadata first, reserved fields last. An unset thread is omitted.
    pub fn to_json(&self, metadata: &UserMetadata) -> Map<String, Value> {
        let mut body = Map::with_capacity(metadata.len() + RESERVED_FIELDS.len());

        for (key, value) in metadata.iter() {
            if RESERVED_FIELDS.contains(&key.as_str()) {
                tracing::debug!(field = %key, "dropping host metadata that shadows a reserved field");
                continue;
            }
            body.insert(key.clone(), value.clone());
        }

        body.insert("message".to_string(), Value::String(self.message.clone()));
        if let Some(thread_id) = &self.thread_id {
            body.insert(
                "threadId".to_string(),
                Value::String(thread_id.as_str().to_string()),
            );
        }
        body.insert(
            "timestamp".to_string(),
            Value::from(self.timestamp.as_millis()),
        );

        body
    }

    pub fn to_body(&self, metadata: &UserMetadata) -> Vec<u8> {
        Value::Object(self.to_json(metadata)).to_string().into_bytes()
    }
}
