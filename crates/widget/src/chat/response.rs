use chatwidget_transport::{ByteStream, ResponseBody, TransportResponse};
use serde_json::Value;
use snafu::Snafu;

/// Backend replied successfully but not in the agreed shape.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProtocolError {
    #[snafu(display("response body is not a JSON object: {details}"))]
    MalformedBody {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("response payload has no string `message` field"))]
    MissingMessage { stage: &'static str },
    #[snafu(display("streaming response has no readable body"))]
    MissingStreamBody { stage: &'static str },
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Non-2xx response head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFailure {
    pub status: u16,
    pub reason: String,
}

/// Validated single-payload reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedReply {
    pub message: String,
    pub thread_id: Option<String>,
}

/// Validates completed responses for the buffered and streaming paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseHandler;

impl ResponseHandler {
    pub fn check_status(response: &TransportResponse) -> Result<(), StatusFailure> {
        if response.is_success() {
            return Ok(());
        }

        Err(StatusFailure {
            status: response.status,
            reason: response.reason.clone(),
        })
    }

    /// Parses `{ message: string, threadId?: string }`.
    ///
    /// An empty `message` is valid content; a missing, `null` or non-string one is not.
    /// A `threadId` that is not a string is ignored.
    pub fn parse_buffered(body: &[u8]) -> ProtocolResult<BufferedReply> {
        let payload: Value =
            serde_json::from_slice(body).map_err(|error| ProtocolError::MalformedBody {
                stage: "parse-buffered-json",
                details: error.to_string(),
            })?;

        let Value::Object(mut fields) = payload else {
            return MalformedBodySnafu {
                stage: "parse-buffered-object",
                details: "top-level value is not an object".to_string(),
            }
            .fail();
        };

        let Some(Value::String(message)) = fields.remove("message") else {
            return MissingMessageSnafu {
                stage: "parse-buffered-message",
            }
            .fail();
        };

        let thread_id = match fields.remove("threadId") {
            Some(Value::String(thread_id)) => Some(thread_id),
            Some(Value::Null) | None => None,
            Some(other) => {
                tracing::debug!(thread_id = %other, "ignoring non-string threadId in response");
                None
            }
        };

        Ok(BufferedReply { message, thread_id })
    }

    pub fn require_stream(body: ResponseBody) -> ProtocolResult<ByteStream> {
        match body {
            ResponseBody::Stream(stream) => Ok(stream),
            ResponseBody::Absent => MissingStreamBodySnafu {
                stage: "require-stream-body",
            }
            .fail(),
        }
    }
}
