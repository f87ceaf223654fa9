//! `Heatchat` builder and client handle.
//!
//! This ties the layers together for a desktop app: a [`LoopbackBroker`]
//! for the browser leg, a [`FileStore`] under the user's home directory,
//! and a `reqwest`-backed [`ApiClient`] for the backend.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use heatchat_protocol::User;
use heatchat_session::{
    AuthSessionManager, AuthSnapshot, FileStore, LoopbackBroker, SessionConfig, SessionError,
    SessionState,
};
use heatchat_transport::{ApiClient, ReqwestTransport};
use tokio::sync::{Mutex, watch};
use url::Url;

use crate::HeatchatError;

/// Where the session is stored when no `store_path` is given,
/// relative to the home directory.
const DEFAULT_STORE_PATH: &str = ".heatchat/session.json";

type Manager = AuthSessionManager<LoopbackBroker, FileStore, ReqwestTransport>;
type Opener = Box<dyn Fn(&Url) -> io::Result<()> + Send + Sync>;

/// Builder for configuring and starting a [`Heatchat`] client.
///
/// # Example
///
/// ```rust,no_run
/// use heatchat::prelude::*;
///
/// # async fn run() -> Result<(), HeatchatError> {
/// let client = Heatchat::builder()
///     .api_base_url("https://heatchat.example.com/api")
///     .build()
///     .await?;
///
/// if client.user().is_none() {
///     let user = client.sign_in().await?;
///     println!("signed in as {}", user.login);
/// }
/// # Ok(())
/// # }
/// ```
pub struct HeatchatBuilder {
    api_base_url: Option<String>,
    session_config: SessionConfig,
    store_path: Option<PathBuf>,
    callback_addr: String,
    callback_path: Option<String>,
    opener: Option<Opener>,
}

impl HeatchatBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            api_base_url: None,
            session_config: SessionConfig::default(),
            store_path: None,
            callback_addr: "127.0.0.1:0".to_string(),
            callback_path: None,
            opener: None,
        }
    }

    /// Sets the backend base URL. Required.
    pub fn api_base_url(mut self, url: &str) -> Self {
        self.api_base_url = Some(url.to_string());
        self
    }

    /// Sets the GitHub OAuth client ID.
    pub fn client_id(mut self, client_id: &str) -> Self {
        self.session_config.client_id = client_id.to_string();
        self
    }

    /// Sets the requested OAuth scope.
    pub fn scope(mut self, scope: &str) -> Self {
        self.session_config.scope = scope.to_string();
        self
    }

    /// Sets the prefix of the stored keys.
    pub fn storage_namespace(mut self, namespace: &str) -> Self {
        self.session_config.storage_namespace = namespace.to_string();
        self
    }

    /// Sets the session file. Default: `~/.heatchat/session.json`.
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    /// Sets the address of the redirect listener. Default: `127.0.0.1:0`
    /// (any free port). GitHub apps with a fixed callback URL need the
    /// matching port here.
    pub fn callback_addr(mut self, addr: &str) -> Self {
        self.callback_addr = addr.to_string();
        self
    }

    /// Sets the path of the redirect listener. Default: `/callback`.
    pub fn callback_path(mut self, path: &str) -> Self {
        self.callback_path = Some(path.to_string());
        self
    }

    /// Sets how long sign-in waits for the redirect.
    pub fn authorize_timeout(mut self, timeout: Duration) -> Self {
        self.session_config.authorize_timeout = timeout;
        self
    }

    /// Replaces the system browser launcher.
    pub fn opener(
        mut self,
        opener: impl Fn(&Url) -> io::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.opener = Some(Box::new(opener));
        self
    }

    /// Replaces the whole session configuration. Settings made earlier
    /// through the other builder methods are overwritten.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Binds the redirect listener, restores any stored session, and
    /// returns the client.
    ///
    /// An unreadable session file is logged and the client starts
    /// signed out.
    ///
    /// # Errors
    /// - [`HeatchatError::Config`] if `api_base_url` is missing or invalid,
    ///   or no home directory is known and no `store_path` was given
    /// - [`HeatchatError::Session`] if the redirect listener can't bind
    pub async fn build(self) -> Result<Heatchat, HeatchatError> {
        let base = self
            .api_base_url
            .ok_or_else(|| HeatchatError::Config("api_base_url is required".into()))?;
        let base_url: Url = base
            .parse()
            .map_err(|e| HeatchatError::Config(format!("invalid api_base_url {base:?}: {e}")))?;

        let store_path = match self.store_path {
            Some(path) => path,
            None => default_store_path()?,
        };

        let mut broker = LoopbackBroker::bind(&self.callback_addr).await?;
        if let Some(path) = self.callback_path {
            broker = broker.with_callback_path(path);
        }
        if let Some(opener) = self.opener {
            broker = broker.with_opener(opener);
        }

        let mut config = self.session_config;
        if config.redirect_uri.is_none() {
            config.redirect_uri = Some(broker.redirect_uri()?);
        }

        tracing::debug!(
            api = %base_url,
            store = %store_path.display(),
            "starting heatchat client"
        );
        let api = ApiClient::new(ReqwestTransport::new(), base_url);
        let manager =
            AuthSessionManager::start(config, broker, FileStore::new(store_path), api).await;

        Ok(Heatchat::from_manager(manager))
    }
}

impl Default for HeatchatBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_store_path() -> Result<PathBuf, HeatchatError> {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .ok_or_else(|| {
            HeatchatError::Config("no home directory found, set store_path explicitly".into())
        })?;
    Ok(PathBuf::from(home).join(DEFAULT_STORE_PATH))
}

/// A running heatchat client.
///
/// Cloning is cheap and every clone drives the same session. Only one
/// sign-in or sign-out runs at a time; a second concurrent call fails
/// with [`SessionError::AlreadyAuthenticating`].
#[derive(Clone)]
pub struct Heatchat {
    manager: Arc<Mutex<Manager>>,
    state: watch::Receiver<AuthSnapshot>,
    api: watch::Receiver<ApiClient<ReqwestTransport>>,
}

impl Heatchat {
    /// Creates a new builder.
    pub fn builder() -> HeatchatBuilder {
        HeatchatBuilder::new()
    }

    fn from_manager(manager: Manager) -> Self {
        let state = manager.subscribe();
        let api = manager.subscribe_api();
        Self {
            manager: Arc::new(Mutex::new(manager)),
            state,
            api,
        }
    }

    /// Runs the browser sign-in flow and returns the signed-in user.
    pub async fn sign_in(&self) -> Result<User, HeatchatError> {
        let mut manager = self
            .manager
            .try_lock()
            .map_err(|_| SessionError::AlreadyAuthenticating)?;
        Ok(manager.sign_in().await?)
    }

    /// Forgets the stored session.
    pub async fn sign_out(&self) -> Result<(), HeatchatError> {
        let mut manager = self
            .manager
            .try_lock()
            .map_err(|_| SessionError::AlreadyAuthenticating)?;
        Ok(manager.sign_out().await?)
    }

    /// The signed-in user, if any.
    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    pub fn is_authenticating(&self) -> bool {
        self.state.borrow().is_authenticating
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().state()
    }

    /// Returns a receiver that sees every sign-in state change.
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.state.clone()
    }

    /// A backend client carrying the current bearer token.
    ///
    /// The returned client is a snapshot: after sign-in or sign-out, ask
    /// again for one with the new header. This never waits for a running
    /// sign-in; until it finishes you get the previous client.
    pub fn api(&self) -> ApiClient<ReqwestTransport> {
        self.api.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_without_base_url_returns_config_error() {
        let result = Heatchat::builder().build().await;
        assert!(matches!(result, Err(HeatchatError::Config(_))));
    }

    #[tokio::test]
    async fn test_build_invalid_base_url_returns_config_error() {
        let result = Heatchat::builder().api_base_url("not a url").build().await;
        assert!(matches!(result, Err(HeatchatError::Config(msg)) if msg.contains("not a url")));
    }

    #[tokio::test]
    async fn test_build_bad_callback_addr_returns_session_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Heatchat::builder()
            .api_base_url("http://127.0.0.1:1")
            .store_path(dir.path().join("session.json"))
            .callback_addr("not-an-address")
            .build()
            .await;

        assert!(matches!(
            result,
            Err(HeatchatError::Session(SessionError::Broker(_)))
        ));
    }

    #[tokio::test]
    async fn test_build_empty_store_starts_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let client = Heatchat::builder()
            .api_base_url("http://127.0.0.1:1")
            .store_path(dir.path().join("session.json"))
            .build()
            .await
            .unwrap();

        assert_eq!(client.user(), None);
        assert_eq!(client.state(), SessionState::Unauthenticated);
        assert_eq!(client.api().authorization(), None);
    }

    #[tokio::test]
    async fn test_build_fills_redirect_uri_from_listener() {
        let dir = tempfile::tempdir().unwrap();
        let client = Heatchat::builder()
            .api_base_url("http://127.0.0.1:1")
            .store_path(dir.path().join("session.json"))
            .callback_path("/oauth")
            .build()
            .await
            .unwrap();

        let manager = client.manager.lock().await;
        let redirect = manager.config().redirect_uri.clone().unwrap();
        assert_eq!(redirect.host_str(), Some("127.0.0.1"));
        assert_eq!(redirect.path(), "/oauth");
    }

    #[test]
    fn test_default_store_path_under_home() {
        if std::env::var_os("HOME").is_some() {
            let path = default_store_path().unwrap();
            assert!(path.ends_with(".heatchat/session.json"));
        }
    }
}
