//! Authorization hook: getting the user through the provider's consent page.
//!
//! The session manager doesn't know HOW the user reaches GitHub. A desktop
//! app opens the system browser and listens on localhost; an embedded
//! web view intercepts the redirect; a test returns a canned answer.
//! Each of those is an [`AuthorizationBroker`].

use std::future::Future;

use heatchat_protocol::{AuthorizationRequest, AuthorizationResult};

use crate::SessionError;

/// Error code reported when a redirect's `state` doesn't match the request.
pub const STATE_MISMATCH: &str = "state_mismatch";

/// Performs the external OAuth authorization handshake.
///
/// # Trait bounds
///
/// - `Send + Sync` → the broker can be shared across async tasks.
/// - `'static` → it lives as long as the session manager that owns it.
///
/// # Example
///
/// ```rust
/// use heatchat_protocol::{AuthorizationRequest, AuthorizationResult, RedirectParams};
/// use heatchat_session::{AuthorizationBroker, SessionError};
///
/// /// Approves every request with a fixed code. Only for tests!
/// struct AlwaysApprove;
///
/// impl AuthorizationBroker for AlwaysApprove {
///     async fn authorize(
///         &self,
///         _request: &AuthorizationRequest,
///     ) -> Result<AuthorizationResult, SessionError> {
///         Ok(AuthorizationResult::Success(RedirectParams {
///             code: Some("abc123".into()),
///             ..RedirectParams::default()
///         }))
///     }
/// }
/// ```
pub trait AuthorizationBroker: Send + Sync + 'static {
    /// Opens `request.url()` for the user and resolves once the redirect
    /// arrives or the user abandons the flow.
    ///
    /// # Returns
    /// - `Ok(Success | Error)`: the provider redirected back
    /// - `Ok(Dismissed)`: the user closed the flow
    /// - `Err(SessionError::Broker)`: the broker itself failed
    fn authorize(
        &self,
        request: &AuthorizationRequest,
    ) -> impl Future<Output = Result<AuthorizationResult, SessionError>> + Send;
}
