/// Markdown collaborator used for every entry (re)render.
pub mod markdown;
/// Timeline entries, identities and timestamps.
pub mod message;
pub mod reconciler;
pub mod response;
pub mod store;

pub use markdown::{CommonMarkRenderer, MarkdownRenderer};
pub use message::{Clock, MessageEntry, MessageKey, Sender, SystemClock, Timestamp};
pub use reconciler::{DecodeError, DecodeResult, StreamReconciler, StreamSummary};
pub use response::{BufferedReply, ProtocolError, ResponseHandler, StatusFailure};
pub use store::{EntryChange, MessageStore, Placement, StoreError, StoreMutation, StoreResult};
