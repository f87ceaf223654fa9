//! Error types for the session layer.

use std::time::Duration;

use heatchat_protocol::ProtocolError;
use heatchat_transport::TransportError;

/// Errors that can occur while signing in, signing out, or rehydrating.
///
/// Every failure of the sign-in flow has its own variant, so a UI can
/// react differently to "the user said no" and "the network is down".
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The provider refused authorization. The string is the provider's
    /// error code, usually `access_denied` (the user clicked "Cancel").
    #[error("authorization denied: {0}")]
    Denied(String),

    /// The user closed the authorization flow before it finished.
    #[error("authorization dismissed")]
    Dismissed,

    /// No redirect arrived within the configured authorize timeout.
    #[error("authorization timed out after {0:?}")]
    TimedOut(Duration),

    /// The redirect reported success but carried no authorization code.
    #[error("authorization redirect carried no code")]
    MissingCode,

    /// Exchanging the code with the backend failed (network, non-2xx,
    /// or a malformed `{ user, token }` response).
    #[error("code exchange failed: {0}")]
    ExchangeFailed(#[from] TransportError),

    /// Reading or writing the stored session failed.
    #[error("session storage failed: {0}")]
    StorageFailed(#[from] StoreError),

    /// A sign-in (or startup rehydration) is already in flight.
    #[error("an authentication is already in progress")]
    AlreadyAuthenticating,

    /// The broker itself broke (couldn't bind or accept on its socket).
    #[error("authorization broker failed: {0}")]
    Broker(String),
}

/// Errors raised by a [`SessionStore`](crate::SessionStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying storage couldn't be read or written.
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// A value couldn't be encoded for storage.
    #[error(transparent)]
    Codec(#[from] ProtocolError),

    /// The storage holds data we can't interpret at all.
    #[error("storage is corrupt: {0}")]
    Corrupt(String),
}
