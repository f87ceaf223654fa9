//! The auth session manager: owns the signed-in user and their token.
//!
//! It's responsible for:
//! - Restoring a stored session at startup (rehydration)
//! - Running the sign-in flow: broker → code exchange → persist
//! - Clearing everything on sign-out
//! - Publishing an [`AuthSnapshot`] on every transition
//!
//! # Ownership
//!
//! Mutating methods take `&mut self`, so a single owner drives the
//! manager and overlapping sign-ins on one manager don't compile.
//! Observers (a UI, a status line) hold a `watch::Receiver` from
//! [`subscribe`](AuthSessionManager::subscribe) instead of a reference.

use std::sync::Arc;

use heatchat_protocol::{
    ACCESS_DENIED, AccessToken, AuthorizationRequest, AuthorizationResult, Codec, JsonCodec, User,
};
use heatchat_transport::{ApiClient, HttpTransport};
use rand::Rng;
use tokio::sync::watch;

use crate::{
    AuthSnapshot, AuthorizationBroker, STATE_MISMATCH, Session, SessionConfig, SessionError,
    SessionState, SessionStore, StoreError,
};

/// Reported when the provider's error redirect carries no `error` code.
const UNKNOWN_ERROR: &str = "unknown_error";

/// Manages the signed-in session of one user.
///
/// ## Lifecycle
///
/// ```text
/// start() ──→ rehydrate() ──→ [Unauthenticated] ──sign_in()──→ [Authenticated]
///                  │                   ↑                             │
///                  └─(stored session)──┼──────→ [Authenticated]      │
///                                      └──────────sign_out()─────────┘
/// ```
///
/// The manager also holds the [`ApiClient`] used for backend calls. On
/// every sign-in, sign-out, and rehydration it is replaced by a client
/// with (or without) the `Authorization: Bearer <token>` default header,
/// and the replacement is published to [`subscribe_api`](Self::subscribe_api)
/// receivers before the new [`AuthSnapshot`].
pub struct AuthSessionManager<B, S, T> {
    config: SessionConfig,
    broker: B,
    store: S,
    api: watch::Sender<ApiClient<T>>,
    codec: JsonCodec,
    state: Arc<watch::Sender<AuthSnapshot>>,
}

impl<B, S, T> AuthSessionManager<B, S, T>
where
    B: AuthorizationBroker,
    S: SessionStore,
    T: HttpTransport,
{
    /// Creates a manager that has not looked at the store yet.
    ///
    /// It starts out `Authenticating` (nothing is known about a stored
    /// session) and rejects [`sign_in`](Self::sign_in) until
    /// [`rehydrate`](Self::rehydrate) has run. [`start`](Self::start)
    /// does both in one call.
    pub fn new(config: SessionConfig, broker: B, store: S, api: ApiClient<T>) -> Self {
        let state = watch::Sender::new(AuthSnapshot {
            user: None,
            is_authenticating: true,
        });
        Self {
            config,
            broker,
            store,
            api: watch::Sender::new(api),
            codec: JsonCodec,
            state: Arc::new(state),
        }
    }

    /// Creates a manager and restores any stored session.
    ///
    /// A store that can't be read is logged and the manager starts signed
    /// out; call [`rehydrate`](Self::rehydrate) directly to get the error.
    pub async fn start(config: SessionConfig, broker: B, store: S, api: ApiClient<T>) -> Self {
        let mut manager = Self::new(config, broker, store, api);
        if let Err(e) = manager.rehydrate().await {
            tracing::warn!(error = %e, "could not restore stored session, starting signed out");
        }
        manager
    }

    /// Loads the stored session into memory.
    ///
    /// Both entries must be present and decodable; otherwise the manager
    /// ends up signed out without an error. Running it twice against the
    /// same store contents yields the same state.
    ///
    /// # Errors
    /// [`SessionError::StorageFailed`] if the store can't be read. The
    /// manager is left signed out.
    pub async fn rehydrate(&mut self) -> Result<Option<User>, SessionError> {
        let guard = Authenticating::enter(&self.state);

        match self.load_session().await {
            Ok(Some(Session { user, token })) => {
                self.replace_api(|api| api.with_bearer_token(&token));
                tracing::info!(login = %user.login, "session restored");
                guard.finish(Some(user.clone()));
                Ok(Some(user))
            }
            Ok(None) => {
                self.replace_api(ApiClient::without_bearer_token);
                guard.finish(None);
                Ok(None)
            }
            Err(e) => {
                self.replace_api(ApiClient::without_bearer_token);
                guard.finish(None);
                Err(e)
            }
        }
    }

    /// Signs the user in through the broker and the backend.
    ///
    /// On success the user and token are stored together, the API client
    /// carries the new bearer token, and the user is returned. On any
    /// failure the previous user, header, and stored entries are left
    /// exactly as they were.
    ///
    /// # Errors
    /// - [`SessionError::AlreadyAuthenticating`] before rehydration finished
    /// - [`SessionError::Dismissed`] / [`SessionError::Denied`] if the
    ///   user didn't approve
    /// - [`SessionError::TimedOut`] if no redirect arrived in time
    /// - [`SessionError::MissingCode`] if the redirect carried no code
    /// - [`SessionError::ExchangeFailed`] if the backend call failed
    /// - [`SessionError::StorageFailed`] if the session couldn't be stored
    pub async fn sign_in(&mut self) -> Result<User, SessionError> {
        let guard = Authenticating::try_enter(&self.state)?;

        match self.authorize_and_exchange().await {
            Ok(Session { user, token }) => {
                self.replace_api(|api| api.with_bearer_token(&token));
                tracing::info!(login = %user.login, "signed in");
                guard.finish(Some(user.clone()));
                Ok(user)
            }
            Err(e) => {
                match &e {
                    SessionError::Dismissed | SessionError::Denied(_) => {
                        tracing::info!(reason = %e, "sign-in abandoned");
                    }
                    _ => tracing::warn!(error = %e, "sign-in failed"),
                }
                Err(e)
            }
        }
    }

    /// Signs the user out: removes both stored entries, drops the bearer
    /// header, and clears the user. Succeeds when already signed out.
    ///
    /// # Errors
    /// - [`SessionError::AlreadyAuthenticating`] before rehydration finished
    /// - [`SessionError::StorageFailed`] if the entries couldn't be removed;
    ///   the session is then kept as it was
    pub async fn sign_out(&mut self) -> Result<(), SessionError> {
        if self.is_authenticating() {
            return Err(SessionError::AlreadyAuthenticating);
        }

        let user_key = self.config.user_key();
        let token_key = self.config.token_key();
        if let Err(e) = self
            .store
            .remove_entries(&[user_key.as_str(), token_key.as_str()])
            .await
        {
            tracing::warn!(error = %e, "sign-out failed to clear stored session");
            return Err(e.into());
        }

        self.replace_api(ApiClient::without_bearer_token);
        self.state.send_replace(AuthSnapshot::default());
        tracing::info!("signed out");
        Ok(())
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

    pub fn snapshot(&self) -> AuthSnapshot {
        self.state.borrow().clone()
    }

    /// Returns a receiver that sees every published [`AuthSnapshot`].
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.state.subscribe()
    }

    /// The API client for backend calls, authenticated when signed in.
    ///
    /// This is a snapshot; it keeps its header after later transitions.
    pub fn api(&self) -> ApiClient<T> {
        self.api.borrow().clone()
    }

    /// Returns a receiver that always holds the current API client.
    ///
    /// Reading it never waits on a running sign-in.
    pub fn subscribe_api(&self) -> watch::Receiver<ApiClient<T>> {
        self.api.subscribe()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // -- internals --------------------------------------------------------

    fn replace_api(&self, update: impl FnOnce(&ApiClient<T>) -> ApiClient<T>) {
        let current = self.api();
        self.api.send_replace(update(&current));
    }

    async fn authorize_and_exchange(&self) -> Result<Session, SessionError> {
        let request = self.authorization_request();
        let timeout = self.config.authorize_timeout;

        let result = tokio::time::timeout(timeout, self.broker.authorize(&request))
            .await
            .map_err(|_| SessionError::TimedOut(timeout))??;
        let code = accept_redirect(&request, result)?;

        tracing::debug!("authorization approved, exchanging code");
        let response = self.api().authenticate(&code).await?;
        let session = Session {
            user: response.user,
            token: response.token,
        };

        self.persist(&session).await?;
        Ok(session)
    }

    fn authorization_request(&self) -> AuthorizationRequest {
        let request = AuthorizationRequest::new(
            self.config.authorize_endpoint.clone(),
            &self.config.client_id,
            &self.config.scope,
        )
        .with_state(generate_state());

        match &self.config.redirect_uri {
            Some(uri) => request.with_redirect_uri(uri.clone()),
            None => request,
        }
    }

    /// Writes user and token in one atomic store call.
    async fn persist(&self, session: &Session) -> Result<(), SessionError> {
        let user = self
            .codec
            .encode_to_string(&session.user)
            .map_err(StoreError::from)?;
        let token = self
            .codec
            .encode_to_string(&session.token)
            .map_err(StoreError::from)?;

        let user_key = self.config.user_key();
        let token_key = self.config.token_key();
        self.store
            .set_entries(&[(user_key.as_str(), user), (token_key.as_str(), token)])
            .await?;
        Ok(())
    }

    async fn load_session(&self) -> Result<Option<Session>, SessionError> {
        let user_key = self.config.user_key();
        let token_key = self.config.token_key();

        let user = self.store.get(&user_key).await?;
        let token = self.store.get(&token_key).await?;
        let (Some(user), Some(token)) = (user, token) else {
            tracing::debug!("no stored session");
            return Ok(None);
        };

        let user: User = match self.codec.decode(user.as_bytes()) {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(key = %user_key, error = %e, "ignoring unreadable stored user");
                return Ok(None);
            }
        };
        let token: AccessToken = match self.codec.decode(token.as_bytes()) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(key = %token_key, error = %e, "ignoring unreadable stored token");
                return Ok(None);
            }
        };

        Ok(Some(Session { user, token }))
    }
}

/// Turns the broker's answer into a code to exchange, or the reason
/// there isn't one.
fn accept_redirect(
    request: &AuthorizationRequest,
    result: AuthorizationResult,
) -> Result<String, SessionError> {
    match result {
        AuthorizationResult::Dismissed => Err(SessionError::Dismissed),
        AuthorizationResult::Error(params) => Err(SessionError::Denied(
            params.error.unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
        )),
        AuthorizationResult::Success(params) => {
            if params.error.as_deref() == Some(ACCESS_DENIED) {
                return Err(SessionError::Denied(ACCESS_DENIED.to_string()));
            }
            // Brokers that can't see the redirect's state report none.
            if let (Some(expected), Some(actual)) = (request.state(), params.state.as_deref()) {
                if expected != actual {
                    return Err(SessionError::Denied(STATE_MISMATCH.to_string()));
                }
            }
            params.code.ok_or(SessionError::MissingCode)
        }
    }
}

/// Generates the OAuth `state` value: 128 random bits as hex.
fn generate_state() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Marks the manager as authenticating for as long as it lives.
///
/// Dropping it without [`finish`](Self::finish) (a failed or cancelled
/// sign-in) only clears `is_authenticating`, keeping the previous user.
struct Authenticating {
    state: Arc<watch::Sender<AuthSnapshot>>,
}

impl Authenticating {
    fn enter(state: &Arc<watch::Sender<AuthSnapshot>>) -> Self {
        state.send_if_modified(|s| !std::mem::replace(&mut s.is_authenticating, true));
        Self {
            state: Arc::clone(state),
        }
    }

    fn try_enter(state: &Arc<watch::Sender<AuthSnapshot>>) -> Result<Self, SessionError> {
        if state.borrow().is_authenticating {
            return Err(SessionError::AlreadyAuthenticating);
        }
        Ok(Self::enter(state))
    }

    fn finish(self, user: Option<User>) {
        self.state.send_replace(AuthSnapshot {
            user,
            is_authenticating: false,
        });
    }
}

impl Drop for Authenticating {
    fn drop(&mut self) {
        self.state
            .send_if_modified(|s| std::mem::take(&mut s.is_authenticating));
    }
}

// =========================================================================
// Tests
// =========================================================================
