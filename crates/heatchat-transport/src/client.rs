//! The backend API client.
//!
//! An [`ApiClient`] pairs a transport with a base URL and a set of
//! default headers that ride along on every request. The header set is
//! immutable: attaching or dropping the bearer token returns a *new*
//! client, so no request ever observes a half-updated header map.

use std::collections::BTreeMap;
use std::sync::Arc;

use heatchat_protocol::{AccessToken, AuthResponse, AuthenticateRequest, Codec, JsonCodec};
use serde::{Serialize, de::DeserializeOwned};
use url::Url;

use crate::{HttpRequest, HttpTransport, Method, RequestId, TransportError};

/// Name of the header carrying the bearer token.
pub const AUTHORIZATION: &str = "authorization";

/// Upper bound on how much of an error body ends up in a `TransportError`.
const MAX_ERROR_BODY: usize = 512;

// ---------------------------------------------------------------------------
// DefaultHeaders
// ---------------------------------------------------------------------------

/// Headers attached to every request an [`ApiClient`] sends.
///
/// Names are stored lowercased; lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultHeaders(BTreeMap<String, String>);

impl DefaultHeaders {
    /// Returns the value for `name`, if set.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Returns a copy with `name` set to `value`.
    #[must_use]
    pub fn with(&self, name: &str, value: impl Into<String>) -> Self {
        let mut headers = self.0.clone();
        headers.insert(name.to_ascii_lowercase(), value.into());
        Self(headers)
    }

    /// Returns a copy without `name`.
    #[must_use]
    pub fn without(&self, name: &str) -> Self {
        let mut headers = self.0.clone();
        headers.remove(&name.to_ascii_lowercase());
        Self(headers)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

// ---------------------------------------------------------------------------
// ApiClient
// ---------------------------------------------------------------------------

/// JSON client for the heatchat backend.
///
/// Cloning shares the underlying transport (and its connection pool).
pub struct ApiClient<T> {
    transport: Arc<T>,
    base_url: Url,
    headers: DefaultHeaders,
    codec: JsonCodec,
}

// Manual impl: deriving would demand `T: Clone`, but only the `Arc` is cloned.
impl<T> Clone for ApiClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            base_url: self.base_url.clone(),
            headers: self.headers.clone(),
            codec: self.codec,
        }
    }
}

impl<T: HttpTransport> ApiClient<T> {
    /// Creates a client rooted at `base_url` with no default headers.
    ///
    /// A trailing `/` is added to the base path if missing, so
    /// `https://api.example.com/v1` + `authenticate` resolves to
    /// `https://api.example.com/v1/authenticate`.
    pub fn new(transport: T, mut base_url: Url) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            transport: Arc::new(transport),
            base_url,
            headers: DefaultHeaders::default(),
            codec: JsonCodec,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn default_headers(&self) -> &DefaultHeaders {
        &self.headers
    }

    /// The current `Authorization` header value, e.g. `Bearer tok`.
    pub fn authorization(&self) -> Option<&str> {
        self.headers.get(AUTHORIZATION)
    }

    /// Returns a client that sends `name: value` on every request.
    #[must_use]
    pub fn with_default_header(&self, name: &str, value: impl Into<String>) -> Self {
        Self {
            headers: self.headers.with(name, value),
            ..self.clone()
        }
    }

    /// Returns a client that authenticates as `token`.
    #[must_use]
    pub fn with_bearer_token(&self, token: &AccessToken) -> Self {
        self.with_default_header(AUTHORIZATION, token.bearer())
    }

    /// Returns a client that sends no `Authorization` header.
    #[must_use]
    pub fn without_bearer_token(&self) -> Self {
        Self {
            headers: self.headers.without(AUTHORIZATION),
            ..self.clone()
        }
    }

    /// Resolves `path` against the base URL. Leading slashes are ignored
    /// so a base path prefix is never dropped.
    pub fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Fetches `path` and decodes a JSON response.
    ///
    /// # Errors
    /// Same as [`post`](Self::post).
    pub async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, TransportError> {
        let url = self.endpoint(path)?;
        self.send_json(Method::Get, url, None).await
    }

    /// Sends `body` as JSON to `path` and decodes a JSON response.
    ///
    /// # Errors
    /// - [`TransportError::Request`] if no response arrived
    /// - [`TransportError::Status`] for non-2xx responses
    /// - [`TransportError::Codec`] if either body can't be (de)serialized
    pub async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, TransportError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let body = self.codec.encode(body)?;
        self.send_json(Method::Post, url, Some(body)).await
    }

    async fn send_json<R: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> Result<R, TransportError> {
        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if body.is_some() {
            headers.push(("content-type".into(), "application/json".into()));
        }
        headers.push(("accept".into(), "application/json".into()));

        let request = HttpRequest {
            id: RequestId::next(),
            method,
            url,
            headers,
            body,
        };
        let id = request.id;

        tracing::debug!(%id, method = method.as_str(), url = %request.url, "sending request");
        let response = self.transport.send(request).await?;

        if !response.is_success() {
            let mut body = String::from_utf8_lossy(&response.body).into_owned();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            tracing::warn!(%id, status = response.status, "request rejected");
            return Err(TransportError::Status {
                status: response.status,
                body,
            });
        }

        Ok(self.codec.decode(&response.body)?)
    }

    /// Exchanges an OAuth authorization code for a session:
    /// `POST /authenticate` with `{ "code": ... }`.
    pub async fn authenticate(&self, code: &str) -> Result<AuthResponse, TransportError> {
        let request = AuthenticateRequest {
            code: code.to_string(),
        };
        self.post("authenticate", &request).await
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for `ApiClient` against a recording transport.

    use std::sync::Mutex;

    use super::*;
    use crate::HttpResponse;

    /// Replies with a canned response and remembers every request.
    struct RecordingTransport {
        response: HttpResponse,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl RecordingTransport {
        fn replying(status: u16, body: &str) -> Self {
            Self {
                response: HttpResponse {
                    status,
                    body: body.as_bytes().to_vec(),
                },
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl HttpTransport for RecordingTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.requests.lock().unwrap().push(request);
            Ok(self.response.clone())
        }
    }

    const AUTH_BODY: &str = r#"{
        "token": "tok",
        "user": { "id": "1", "avatar_url": "https://github.com/octocat.png",
                  "name": "The Octocat", "login": "octocat" }
    }"#;

    fn client(transport: RecordingTransport) -> ApiClient<RecordingTransport> {
        ApiClient::new(transport, "http://api.test".parse().unwrap())
    }

    fn sent(client: &ApiClient<RecordingTransport>) -> Vec<HttpRequest> {
        client.transport.requests.lock().unwrap().clone()
    }

    // =====================================================================
    // Headers
    // =====================================================================

    #[test]
    fn test_new_client_has_no_authorization() {
        let api = client(RecordingTransport::replying(200, "{}"));
        assert!(api.authorization().is_none());
        assert!(api.default_headers().is_empty());
    }

    #[test]
    fn test_with_bearer_token_returns_new_client() {
        let api = client(RecordingTransport::replying(200, "{}"));
        let authed = api.with_bearer_token(&AccessToken::new("tok"));

        assert_eq!(authed.authorization(), Some("Bearer tok"));
        // The source client keeps its headers.
        assert!(api.authorization().is_none());
    }

    #[test]
    fn test_without_bearer_token_keeps_other_headers() {
        let api = client(RecordingTransport::replying(200, "{}"))
            .with_default_header("X-Client", "heatchat")
            .with_bearer_token(&AccessToken::new("tok"))
            .without_bearer_token();

        assert!(api.authorization().is_none());
        assert_eq!(api.default_headers().get("x-client"), Some("heatchat"));
    }

    #[test]
    fn test_endpoint_preserves_base_path() {
        let api = ApiClient::new(
            RecordingTransport::replying(200, "{}"),
            "https://api.example.com/v1".parse().unwrap(),
        );
        assert_eq!(
            api.endpoint("/authenticate").unwrap().as_str(),
            "https://api.example.com/v1/authenticate"
        );
    }

    // =====================================================================
    // get()
    // =====================================================================

    #[tokio::test]
    async fn test_get_sends_bearer_without_body() {
        let api = client(RecordingTransport::replying(200, r#"{"login":"octocat"}"#))
            .with_bearer_token(&AccessToken::new("tok"));

        let profile: serde_json::Value = api.get("/profile").await.unwrap();

        assert_eq!(profile["login"], "octocat");
        let requests = sent(&api);
        assert_eq!(requests[0].method, Method::Get);
        assert_eq!(requests[0].url.as_str(), "http://api.test/profile");
        assert_eq!(requests[0].header("authorization"), Some("Bearer tok"));
        assert_eq!(requests[0].header("content-type"), None);
        assert!(requests[0].body.is_none());
    }

    #[tokio::test]
    async fn test_get_non_2xx_returns_status_error() {
        let api = client(RecordingTransport::replying(404, "not found"));

        let err = api.get::<serde_json::Value>("messages/last3").await.unwrap_err();

        assert!(matches!(err, TransportError::Status { status: 404, .. }));
    }

    // =====================================================================
    // authenticate()
    // =====================================================================

    #[tokio::test]
    async fn test_authenticate_posts_code_and_decodes_session() {
        let api = client(RecordingTransport::replying(200, AUTH_BODY));

        let response = api.authenticate("abc123").await.expect("should succeed");

        assert_eq!(response.token.as_str(), "tok");
        assert_eq!(response.user.login, "octocat");

        let requests = sent(&api);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].url.as_str(), "http://api.test/authenticate");
        assert_eq!(requests[0].header("content-type"), Some("application/json"));

        let body: serde_json::Value =
            serde_json::from_slice(requests[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body, serde_json::json!({ "code": "abc123" }));
    }

    #[tokio::test]
    async fn test_authenticate_sends_default_headers() {
        let api = client(RecordingTransport::replying(200, AUTH_BODY))
            .with_bearer_token(&AccessToken::new("old"));

        api.authenticate("abc123").await.unwrap();

        assert_eq!(sent(&api)[0].header("Authorization"), Some("Bearer old"));
    }

    #[tokio::test]
    async fn test_authenticate_non_2xx_returns_status_error() {
        let api = client(RecordingTransport::replying(401, "bad_verification_code"));

        let err = api.authenticate("expired").await.unwrap_err();

        match err {
            TransportError::Status { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad_verification_code");
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_authenticate_truncates_long_error_body() {
        let long = "x".repeat(4 * MAX_ERROR_BODY);
        let api = client(RecordingTransport::replying(500, &long));

        let err = api.authenticate("abc").await.unwrap_err();

        assert!(
            matches!(err, TransportError::Status { ref body, .. } if body.len() == MAX_ERROR_BODY)
        );
    }

    #[tokio::test]
    async fn test_authenticate_malformed_body_returns_codec_error() {
        let api = client(RecordingTransport::replying(200, r#"{"token": 5}"#));

        let err = api.authenticate("abc").await.unwrap_err();

        assert!(matches!(err, TransportError::Codec(_)));
    }
}
