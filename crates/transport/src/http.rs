use std::time::Duration;

use futures::TryStreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use snafu::ResultExt;

use super::transport::{
    BoxFuture, BuildClientSnafu, BuildRequestSnafu, ChatTransport, ResponseBody, SendSnafu,
    TransportError, TransportResponse, TransportResult, charset_from_content_type,
};

pub const HTTP_TRANSPORT_NAME: &str = "http";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            user_agent: concat!("chatwidget/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// `ChatTransport` backed by a shared `reqwest::Client`.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> TransportResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .context(BuildClientSnafu {
                stage: "http-transport-new",
            })?;

        Ok(Self { client })
    }

    fn response_body(response: reqwest::Response) -> ResponseBody {
        let status = response.status();
        let declared_empty = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.trim() == "0");

        if declared_empty
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED
        {
            return ResponseBody::Absent;
        }

        let stream = response
            .bytes_stream()
            .map_err(|source| TransportError::ReadChunk {
                stage: "read-response-chunk",
                source,
            });
        ResponseBody::Stream(Box::pin(stream))
    }

    async fn send(&self, url: &str, body: Vec<u8>) -> TransportResult<TransportResponse> {
        let parsed = reqwest::Url::parse(url).map_err(|error| TransportError::InvalidUrl {
            stage: "parse-endpoint-url",
            url: url.to_string(),
            details: error.to_string(),
        })?;

        let request = self
            .client
            .request(Method::POST, parsed)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .build()
            .context(BuildRequestSnafu {
                stage: "build-request",
                url: url.to_string(),
            })?;

        let response = self.client.execute(request).await.context(SendSnafu {
            stage: "send-request",
            url: url.to_string(),
        })?;

        let status = response.status();
        let reason = status.canonical_reason().unwrap_or_default().to_string();
        let charset = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(charset_from_content_type);

        tracing::debug!(
            url = %url,
            status = status.as_u16(),
            charset = ?charset,
            "received response head"
        );

        Ok(TransportResponse {
            status: status.as_u16(),
            reason,
            charset,
            body: Self::response_body(response),
        })
    }
}

impl ChatTransport for HttpTransport {
    fn name(&self) -> &str {
        HTTP_TRANSPORT_NAME
    }

    fn post_json<'a>(
        &'a self,
        url: &'a str,
        body: Vec<u8>,
    ) -> BoxFuture<'a, TransportResult<TransportResponse>> {
        Box::pin(self.send(url, body))
    }
}
