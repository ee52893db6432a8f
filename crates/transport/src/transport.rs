use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use snafu::Snafu;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type ByteStream = Pin<Box<dyn Stream<Item = TransportResult<Bytes>> + Send + 'static>>;
pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TransportError {
    #[snafu(display("failed to build http client on `{stage}`: {source}"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("endpoint url '{url}' is invalid: {details}"))]
    InvalidUrl {
        stage: &'static str,
        url: String,
        details: String,
    },
    #[snafu(display("failed to build request for '{url}' on `{stage}`: {source}"))]
    BuildRequest {
        stage: &'static str,
        url: String,
        source: reqwest::Error,
    },
    #[snafu(display("request to '{url}' failed on `{stage}`: {source}"))]
    Send {
        stage: &'static str,
        url: String,
        source: reqwest::Error,
    },
    #[snafu(display("failed to read response body on `{stage}`: {source}"))]
    ReadChunk {
        stage: &'static str,
        source: reqwest::Error,
    },
}

/// Body of a response whose head has already arrived.
pub enum ResponseBody {
    /// The server declared that no body follows.
    Absent,
    Stream(ByteStream),
}

impl ResponseBody {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Builds a streamed body from already materialized chunks.
    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = TransportResult<Bytes>>,
        I::IntoIter: Send + 'static,
    {
        Self::Stream(Box::pin(futures::stream::iter(chunks)))
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => formatter.write_str("Absent"),
            Self::Stream(_) => formatter.write_str("Stream(..)"),
        }
    }
}

#[derive(Debug)]
pub struct TransportResponse {
    pub status: u16,
    pub reason: String,
    /// Lower-cased `charset` parameter of the `Content-Type` header.
    pub charset: Option<String>,
    pub body: ResponseBody,
}

impl TransportResponse {
    pub fn new(status: u16, reason: impl Into<String>, body: ResponseBody) -> Self {
        Self {
            status,
            reason: reason.into(),
            charset: None,
            body,
        }
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into().trim().to_ascii_lowercase());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drains the whole body. An absent body reads as empty.
    pub async fn read_to_end(self) -> TransportResult<Bytes> {
        match self.body {
            ResponseBody::Absent => Ok(Bytes::new()),
            ResponseBody::Stream(mut stream) => {
                let mut buffer = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buffer.extend_from_slice(&chunk?);
                }
                Ok(buffer.freeze())
            }
        }
    }
}

/// One POST with a JSON body to the configured endpoint.
pub trait ChatTransport: Send + Sync {
    fn name(&self) -> &str;
    fn post_json<'a>(
        &'a self,
        url: &'a str,
        body: Vec<u8>,
    ) -> BoxFuture<'a, TransportResult<TransportResponse>>;
}

/// Extracts the lower-cased `charset` parameter from a `Content-Type` value.
pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|parameter| {
        let (name, value) = parameter.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let value = value.trim().trim_matches('"').to_ascii_lowercase();
        if value.is_empty() { None } else { Some(value) }
    })
}
