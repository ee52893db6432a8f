use std::sync::Arc;

mod http;
mod transport;

pub use http::{HTTP_TRANSPORT_NAME, HttpTransport, TransportConfig};
pub use transport::{
    BoxFuture, ByteStream, ChatTransport, ResponseBody, TransportError, TransportResponse,
    TransportResult, charset_from_content_type,
};

pub fn create_transport(config: &TransportConfig) -> TransportResult<Arc<dyn ChatTransport>> {
    Ok(Arc::new(HttpTransport::new(config)?))
}
