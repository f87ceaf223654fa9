//! HTTP transport implementation using `reqwest`.

use std::io;

use crate::{HttpRequest, HttpResponse, HttpTransport, Method, TransportError};

/// A `reqwest`-backed [`HttpTransport`].
///
/// Cloning is cheap: `reqwest::Client` is an `Arc` around its connection pool.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with a default `reqwest::Client`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a caller-configured client (proxies, custom TLS roots, pool reuse).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };

        let mut builder = self.client.request(method, request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(request_error)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(request_error)?;

        tracing::debug!(id = %request.id, status, bytes = body.len(), "received response");

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Wraps a reqwest failure in an `io::Error` whose kind says what went wrong.
fn request_error(e: reqwest::Error) -> TransportError {
    let kind = if e.is_timeout() {
        io::ErrorKind::TimedOut
    } else if e.is_connect() {
        io::ErrorKind::ConnectionRefused
    } else {
        io::ErrorKind::Other
    };
    TransportError::Request(io::Error::new(kind, e))
}
