//! OAuth authorization request and redirect result.
//!
//! Signing in with GitHub is a two-legged dance:
//!
//! ```text
//! client ──(open AuthorizationRequest::url)──→ github.com
//!        ←──(redirect ?code=... or ?error=...)──┘
//! ```
//!
//! [`AuthorizationRequest`] is the first leg, [`AuthorizationResult`] is
//! what the broker hands back after the second.

use serde::{Deserialize, Serialize};
use url::Url;

/// GitHub's OAuth authorization endpoint.
pub const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";

/// The `error` value GitHub sends when the user clicks "Cancel".
pub const ACCESS_DENIED: &str = "access_denied";

// ---------------------------------------------------------------------------
// AuthorizationRequest
// ---------------------------------------------------------------------------

/// Everything needed to build the authorization URL the user is sent to.
///
/// Required fields are constructor parameters; optional ones are added
/// with the `with_*` methods.
///
/// ```rust
/// use heatchat_protocol::AuthorizationRequest;
///
/// let endpoint = "https://github.com/login/oauth/authorize".parse().unwrap();
/// let req = AuthorizationRequest::new(endpoint, "my-client", "read:user");
///
/// assert_eq!(
///     req.url().as_str(),
///     "https://github.com/login/oauth/authorize?client_id=my-client&scope=read%3Auser",
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    authorize_endpoint: Url,
    client_id: String,
    scope: String,
    redirect_uri: Option<Url>,
    state: Option<String>,
}

impl AuthorizationRequest {
    /// Creates a request for `client_id` asking for `scope`.
    pub fn new(
        authorize_endpoint: Url,
        client_id: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            authorize_endpoint,
            client_id: client_id.into(),
            scope: scope.into(),
            redirect_uri: None,
            state: None,
        }
    }

    /// Asks the provider to redirect to `uri` instead of the app's
    /// registered callback.
    pub fn with_redirect_uri(mut self, uri: Url) -> Self {
        self.redirect_uri = Some(uri);
        self
    }

    /// Attaches an opaque `state` value the provider echoes back.
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn redirect_uri(&self) -> Option<&Url> {
        self.redirect_uri.as_ref()
    }

    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    /// Renders the full authorization URL.
    ///
    /// Query pairs are appended to whatever the endpoint already carries,
    /// percent-encoded by `url`.
    pub fn url(&self) -> Url {
        let mut url = self.authorize_endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("client_id", &self.client_id)
                .append_pair("scope", &self.scope);
            if let Some(redirect_uri) = &self.redirect_uri {
                pairs.append_pair("redirect_uri", redirect_uri.as_str());
            }
            if let Some(state) = &self.state {
                pairs.append_pair("state", state);
            }
        }
        url
    }
}

// ---------------------------------------------------------------------------
// RedirectParams
// ---------------------------------------------------------------------------

/// Query parameters carried by the OAuth redirect.
///
/// Every field is optional because the provider sends different subsets:
/// `?code=...&state=...` on approval, `?error=access_denied&...` on denial.
/// `#[serde(default)]` lets any of them be missing in JSON too.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl RedirectParams {
    /// Extracts the known parameters from a redirect URL's query string.
    /// Unknown parameters are ignored.
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let slot = match &*key {
                "code" => &mut params.code,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                "state" => &mut params.state,
                _ => continue,
            };
            *slot = Some(value.into_owned());
        }
        params
    }
}

// ---------------------------------------------------------------------------
// AuthorizationResult
// ---------------------------------------------------------------------------

/// How the authorization leg ended.
///
/// `#[serde(tag = "type", content = "params")]` produces "adjacently
/// tagged" JSON, the same shape browser-session libraries report:
///
/// ```json
/// { "type": "success", "params": { "code": "abc123" } }
/// { "type": "error",   "params": { "error": "access_denied" } }
/// { "type": "dismiss" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "lowercase")]
pub enum AuthorizationResult {
    /// The provider redirected back. Usually carries a `code`, but
    /// providers may also report `error=access_denied` this way.
    Success(RedirectParams),

    /// The provider redirected back with an error.
    Error(RedirectParams),

    /// The user closed the browser flow before any redirect arrived.
    #[serde(rename = "dismiss")]
    Dismissed,
}

impl AuthorizationResult {
    /// Classifies a redirect: anything carrying `error` is an
    /// [`Error`](Self::Error), everything else a [`Success`](Self::Success).
    pub fn from_redirect(params: RedirectParams) -> Self {
        if params.error.is_some() {
            Self::Error(params)
        } else {
            Self::Success(params)
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the error code, if the redirect carried one.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success(params) | Self::Error(params) => params.error.as_deref(),
            Self::Dismissed => None,
        }
    }

    /// Returns the authorization code only when the flow may proceed to
    /// the code exchange: a `success` whose error isn't `access_denied`.
    pub fn authorized_code(&self) -> Option<&str> {
        match self {
            Self::Success(params) if params.error.as_deref() != Some(ACCESS_DENIED) => {
                params.code.as_deref()
            }
            _ => None,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn github() -> Url {
        GITHUB_AUTHORIZE_URL.parse().unwrap()
    }

    // =====================================================================
    // AuthorizationRequest
    // =====================================================================

    #[test]
    fn test_url_contains_client_id_and_scope() {
        let req = AuthorizationRequest::new(github(), "bd913073d9142854c79c", "read:user");
        let url = req.url();

        assert_eq!(url.host_str(), Some("github.com"));
        assert_eq!(url.path(), "/login/oauth/authorize");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("client_id".into(), "bd913073d9142854c79c".into()),
                ("scope".into(), "read:user".into()),
            ]
        );
    }

    #[test]
    fn test_url_includes_redirect_and_state_when_set() {
        let req = AuthorizationRequest::new(github(), "id", "read:user")
            .with_redirect_uri("http://127.0.0.1:8085/callback".parse().unwrap())
            .with_state("s1");
        let url = req.url();

        let redirect = url.query_pairs().find(|(k, _)| k == "redirect_uri");
        let state = url.query_pairs().find(|(k, _)| k == "state");
        assert_eq!(
            redirect.map(|(_, v)| v.into_owned()),
            Some("http://127.0.0.1:8085/callback".to_string())
        );
        assert_eq!(state.map(|(_, v)| v.into_owned()), Some("s1".to_string()));
    }

    #[test]
    fn test_url_keeps_existing_endpoint_query() {
        let endpoint: Url = "https://example.com/authorize?prompt=consent".parse().unwrap();
        let url = AuthorizationRequest::new(endpoint, "id", "repo").url();

        assert_eq!(url.query(), Some("prompt=consent&client_id=id&scope=repo"));
    }

    // =====================================================================
    // RedirectParams
    // =====================================================================

    #[test]
    fn test_redirect_params_from_url_with_code() {
        let url: Url = "http://127.0.0.1/callback?code=abc123&state=s1&extra=1"
            .parse()
            .unwrap();
        let params = RedirectParams::from_url(&url);

        assert_eq!(params.code.as_deref(), Some("abc123"));
        assert_eq!(params.state.as_deref(), Some("s1"));
        assert!(params.error.is_none());
    }

    #[test]
    fn test_redirect_params_from_url_decodes_error_description() {
        let url: Url = "http://127.0.0.1/callback?error=access_denied&error_description=The+user+has+denied"
            .parse()
            .unwrap();
        let params = RedirectParams::from_url(&url);

        assert_eq!(params.error.as_deref(), Some(ACCESS_DENIED));
        assert_eq!(params.error_description.as_deref(), Some("The user has denied"));
    }

    // =====================================================================
    // AuthorizationResult
    // =====================================================================

    #[test]
    fn test_result_success_json_format() {
        let result: AuthorizationResult =
            serde_json::from_str(r#"{ "type": "success", "params": { "code": "abc123" } }"#)
                .unwrap();

        assert!(result.is_success());
        assert_eq!(result.authorized_code(), Some("abc123"));
    }

    #[test]
    fn test_result_dismiss_json_format() {
        let result: AuthorizationResult = serde_json::from_str(r#"{ "type": "dismiss" }"#).unwrap();
        assert_eq!(result, AuthorizationResult::Dismissed);

        let json = serde_json::to_value(&AuthorizationResult::Dismissed).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "dismiss" }));
    }

    #[test]
    fn test_result_success_with_access_denied_has_no_code() {
        let result = AuthorizationResult::Success(RedirectParams {
            code: Some("abc123".into()),
            error: Some(ACCESS_DENIED.into()),
            ..RedirectParams::default()
        });

        assert_eq!(result.authorized_code(), None);
        assert_eq!(result.error(), Some(ACCESS_DENIED));
    }

    #[test]
    fn test_result_error_never_yields_code() {
        let result = AuthorizationResult::Error(RedirectParams {
            code: Some("abc123".into()),
            error: Some("server_error".into()),
            ..RedirectParams::default()
        });
        assert_eq!(result.authorized_code(), None);
    }

    #[test]
    fn test_from_redirect_classifies_by_error() {
        let ok = AuthorizationResult::from_redirect(RedirectParams {
            code: Some("c".into()),
            ..RedirectParams::default()
        });
        let denied = AuthorizationResult::from_redirect(RedirectParams {
            error: Some(ACCESS_DENIED.into()),
            ..RedirectParams::default()
        });

        assert!(ok.is_success());
        assert!(matches!(denied, AuthorizationResult::Error(_)));
    }

    #[test]
    fn test_result_unknown_type_returns_error() {
        let result: Result<AuthorizationResult, _> =
            serde_json::from_str(r#"{ "type": "locked" }"#);
        assert!(result.is_err());
    }
}
