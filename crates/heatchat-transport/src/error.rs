use heatchat_protocol::ProtocolError;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request never produced a response (DNS, connect, TLS, reset).
    #[error("request failed: {0}")]
    Request(#[source] std::io::Error),

    /// The server answered with a non-2xx status.
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Encoding the request or decoding the response body failed.
    #[error(transparent)]
    Codec(#[from] ProtocolError),

    /// The endpoint path couldn't be joined onto the base URL.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}
