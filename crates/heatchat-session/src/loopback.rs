//! Browser-based authorization with a localhost redirect listener.
//!
//! The flow:
//!   1. Bind a TCP listener on localhost (the redirect target)
//!   2. Open the authorization URL in the system browser
//!   3. Accept HTTP requests until one hits the callback path with the
//!      expected `state`
//!   4. Answer the browser with a small HTML page, return the redirect

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use heatchat_protocol::{AuthorizationRequest, AuthorizationResult, RedirectParams};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use url::Url;

use crate::{AuthorizationBroker, SessionError};

/// Path the provider redirects to unless overridden.
pub const DEFAULT_CALLBACK_PATH: &str = "/callback";

/// Requests larger than this are cut off; a redirect head is far smaller.
const MAX_REQUEST_HEAD: usize = 8 * 1024;

/// How long an accepted connection may take to send its request head.
const HEAD_READ_TIMEOUT: Duration = Duration::from_secs(10);

type Opener = Arc<dyn Fn(&Url) -> io::Result<()> + Send + Sync>;

/// An [`AuthorizationBroker`] that opens the system browser and catches
/// the redirect on a localhost socket.
///
/// The listener is bound up front so the redirect URI (which includes
/// the port) is known before the authorization URL is built.
pub struct LoopbackBroker {
    listener: TcpListener,
    callback_path: String,
    opener: Opener,
}

impl LoopbackBroker {
    /// Binds the redirect listener. Use port `0` to let the OS pick one.
    pub async fn bind(addr: &str) -> Result<Self, SessionError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SessionError::Broker(format!("bind {addr} failed: {e}")))?;
        tracing::debug!(addr, "loopback broker listening");
        Ok(Self {
            listener,
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            opener: Arc::new(|url: &Url| open::that(url.as_str())),
        })
    }

    /// Changes the path the redirect must hit (default `/callback`).
    #[must_use]
    pub fn with_callback_path(mut self, path: impl Into<String>) -> Self {
        self.callback_path = path.into();
        self
    }

    /// Replaces the function that shows the authorization URL to the user.
    ///
    /// The default launches the system browser. Headless setups can print
    /// the URL instead; tests can drive the redirect themselves.
    #[must_use]
    pub fn with_opener(
        mut self,
        opener: impl Fn(&Url) -> io::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.opener = Arc::new(opener);
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The URI the provider must redirect to: `http://<addr><callback_path>`.
    pub fn redirect_uri(&self) -> Result<Url, SessionError> {
        let addr = self
            .local_addr()
            .map_err(|e| SessionError::Broker(format!("no local address: {e}")))?;
        format!("http://{addr}{}", self.callback_path)
            .parse()
            .map_err(|e| SessionError::Broker(format!("invalid redirect uri: {e}")))
    }

    /// Accepts connections until one carries the redirect.
    ///
    /// Connections are read concurrently, so a browser's idle preconnect
    /// can't hold up the real redirect behind it.
    async fn wait_for_redirect(
        &self,
        expected_state: Option<&str>,
    ) -> Result<AuthorizationResult, SessionError> {
        let mut pending = JoinSet::new();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (mut stream, peer) = accepted
                        .map_err(|e| SessionError::Broker(format!("accept failed: {e}")))?;
                    pending.spawn(async move {
                        let read = read_request_target(&mut stream);
                        let target = tokio::time::timeout(HEAD_READ_TIMEOUT, read).await;
                        (stream, peer, target)
                    });
                }
                Some(joined) = pending.join_next() => {
                    let Ok((mut stream, peer, target)) = joined else {
                        continue;
                    };
                    let target = match target {
                        Ok(Ok(Some(target))) => target,
                        Ok(Ok(None)) => {
                            respond(&mut stream, "400 Bad Request", "Bad request").await;
                            continue;
                        }
                        Ok(Err(e)) => {
                            tracing::debug!(%peer, error = %e, "failed to read redirect request");
                            continue;
                        }
                        Err(_) => {
                            tracing::debug!(%peer, "connection sent no request, dropping it");
                            continue;
                        }
                    };
                    if let Some(result) =
                        self.answer(&mut stream, peer, &target, expected_state).await
                    {
                        return Ok(result);
                    }
                }
            }
        }
    }

    /// Answers one browser request. Returns the result once the request
    /// is the redirect this flow is waiting for.
    async fn answer(
        &self,
        stream: &mut TcpStream,
        peer: SocketAddr,
        target: &str,
        expected_state: Option<&str>,
    ) -> Option<AuthorizationResult> {
        let Some(url) = parse_target(target) else {
            respond(stream, "400 Bad Request", "Bad request").await;
            return None;
        };
        if url.path() != self.callback_path {
            tracing::debug!(%peer, path = url.path(), "ignoring non-callback request");
            respond(stream, "404 Not Found", "Not found").await;
            return None;
        }

        let params = RedirectParams::from_url(&url);
        if let Some(expected) = expected_state {
            // A stale tab or a forged link; the real redirect may still come.
            if params.state.as_deref() != Some(expected) {
                tracing::warn!(%peer, "ignoring redirect whose state does not match");
                respond(
                    stream,
                    "400 Bad Request",
                    "This sign-in link has expired. Return to the app to try again.",
                )
                .await;
                return None;
            }
        }

        let result = AuthorizationResult::from_redirect(params);
        if result.authorized_code().is_some() {
            respond(
                stream,
                "200 OK",
                "Sign-in complete. You can close this window.",
            )
            .await;
        } else {
            respond(
                stream,
                "400 Bad Request",
                "Sign-in failed. Return to the app to try again.",
            )
            .await;
        }
        Some(result)
    }
}

impl AuthorizationBroker for LoopbackBroker {
    async fn authorize(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<AuthorizationResult, SessionError> {
        let url = request.url();
        tracing::info!(client_id = request.client_id(), "opening authorization page");

        if let Err(e) = (self.opener)(&url) {
            // Nothing was shown, so nobody can ever complete the flow.
            tracing::warn!(error = %e, "could not open authorization page");
            return Ok(AuthorizationResult::Dismissed);
        }

        self.wait_for_redirect(request.state()).await
    }
}

/// Reads the request head and returns the request-target of the
/// request line (`GET <target> HTTP/1.1`). `Ok(None)` if malformed.
async fn read_request_target(stream: &mut TcpStream) -> io::Result<Option<String>> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    // Drain the whole head so closing the socket doesn't reset the
    // connection before the browser reads our response.
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") && buf.len() < MAX_REQUEST_HEAD {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let head = String::from_utf8_lossy(&buf);
    let mut parts = head.lines().next().unwrap_or_default().split_whitespace();
    let (Some(_method), Some(target)) = (parts.next(), parts.next()) else {
        return Ok(None);
    };
    Ok(Some(target.to_string()))
}

fn parse_target(target: &str) -> Option<Url> {
    if !target.starts_with('/') {
        return None;
    }
    Url::parse(&format!("http://localhost{target}")).ok()
}

async fn respond(stream: &mut TcpStream, status: &str, message: &str) {
    let body = format!("<html><body><h3>{message}</h3></body></html>");
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        tracing::debug!(error = %e, "failed to answer browser");
        return;
    }
    let _ = stream.shutdown().await;
}
