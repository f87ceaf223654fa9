//! Session types: configuration, the persisted pair, and observable state.

use std::time::Duration;

use heatchat_protocol::{AccessToken, GITHUB_AUTHORIZE_URL, User};
use url::Url;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Public OAuth client ID of the heatchat GitHub app (not a secret).
pub(crate) const DEFAULT_CLIENT_ID: &str = "bd913073d9142854c79c";

/// Configuration for signing in and persisting the session.
///
/// Create one with `SessionConfig::default()` and override just the
/// fields you care about:
///
/// ```rust
/// use heatchat_session::SessionConfig;
///
/// let config = SessionConfig {
///     client_id: "my-github-app".into(),
///     ..SessionConfig::default()
/// };
/// assert_eq!(config.user_key(), "@heatchat:user");
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Where the user is sent to approve access.
    /// Default: GitHub's `/login/oauth/authorize`.
    pub authorize_endpoint: Url,

    /// OAuth client ID of the GitHub app.
    pub client_id: String,

    /// Requested OAuth scope. Default: `read:user`.
    pub scope: String,

    /// Redirect URI sent with the authorization request. `None` means the
    /// provider uses the app's registered callback.
    pub redirect_uri: Option<Url>,

    /// Prefix of the two storage keys (`<namespace>:user`,
    /// `<namespace>:token`). Default: `@heatchat`.
    pub storage_namespace: String,

    /// How long to wait for the authorization redirect before giving up.
    /// Default: 120 seconds.
    pub authorize_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            authorize_endpoint: GITHUB_AUTHORIZE_URL
                .parse()
                .expect("valid default URL"),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            scope: "read:user".to_string(),
            redirect_uri: None,
            storage_namespace: "@heatchat".to_string(),
            authorize_timeout: Duration::from_secs(120),
        }
    }
}

impl SessionConfig {
    /// Storage key of the serialized [`User`].
    pub fn user_key(&self) -> String {
        format!("{}:user", self.storage_namespace)
    }

    /// Storage key of the serialized [`AccessToken`].
    pub fn token_key(&self) -> String {
        format!("{}:token", self.storage_namespace)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A signed-in user together with their access token.
///
/// The two are only ever stored, loaded, and cleared together: there is
/// no such thing as a user without a token or a token without a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: User,
    pub token: AccessToken,
}

// ---------------------------------------------------------------------------
// SessionState / AuthSnapshot
// ---------------------------------------------------------------------------

/// Where the manager is in the sign-in lifecycle.
///
/// ```text
///   Unauthenticated ──(sign_in)──→ Authenticating ──(ok)──→ Authenticated
///          ↑                             │                       │
///          └──────(denied / dismissed / failed)                  │
///          └──────────────────────(sign_out)─────────────────────┘
/// ```
///
/// Startup rehydration also passes through `Authenticating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "Unauthenticated"),
            Self::Authenticating => write!(f, "Authenticating"),
            Self::Authenticated => write!(f, "Authenticated"),
        }
    }
}

/// What a UI needs to render the sign-in state.
///
/// Published through a `tokio::sync::watch` channel on every transition;
/// see [`AuthSessionManager::subscribe`](crate::AuthSessionManager::subscribe).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSnapshot {
    /// The signed-in user, if any.
    pub user: Option<User>,

    /// `true` while a sign-in or startup rehydration is running. A UI
    /// should disable its sign-in button while this is set.
    pub is_authenticating: bool,
}

impl AuthSnapshot {
    pub fn state(&self) -> SessionState {
        if self.is_authenticating {
            SessionState::Authenticating
        } else if self.user.is_some() {
            SessionState::Authenticated
        } else {
            SessionState::Unauthenticated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: "1".into(),
            login: "octocat".into(),
            name: "The Octocat".into(),
            avatar_url: "https://github.com/octocat.png".into(),
        }
    }

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.authorize_endpoint.as_str(), GITHUB_AUTHORIZE_URL);
        assert_eq!(config.scope, "read:user");
        assert_eq!(config.authorize_timeout, Duration::from_secs(120));
        assert!(config.redirect_uri.is_none());
    }

    #[test]
    fn test_session_config_keys_use_namespace() {
        let config = SessionConfig {
            storage_namespace: "@reactnative_heat".into(),
            ..SessionConfig::default()
        };
        assert_eq!(config.user_key(), "@reactnative_heat:user");
        assert_eq!(config.token_key(), "@reactnative_heat:token");
    }

    #[test]
    fn test_snapshot_state_authenticating_wins() {
        let snapshot = AuthSnapshot {
            user: Some(user()),
            is_authenticating: true,
        };
        assert_eq!(snapshot.state(), SessionState::Authenticating);
    }

    #[test]
    fn test_snapshot_state_from_user() {
        let signed_in = AuthSnapshot {
            user: Some(user()),
            is_authenticating: false,
        };
        assert_eq!(signed_in.state(), SessionState::Authenticated);
        assert_eq!(AuthSnapshot::default().state(), SessionState::Unauthenticated);
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::Authenticating.to_string(), "Authenticating");
    }
}
