//! Unified error type for the heatchat client.

use heatchat_session::SessionError;
use heatchat_transport::TransportError;

/// Top-level error that wraps every sub-crate error.
///
/// With the `heatchat` crate you match on this one type instead of
/// importing errors from each layer. `#[from]` lets `?` convert them.
#[derive(Debug, thiserror::Error)]
pub enum HeatchatError {
    /// An HTTP-level error (network, non-2xx status, bad URL).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A sign-in, sign-out, or rehydration error.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The client was configured with invalid or missing settings.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl HeatchatError {
    /// `true` if the user declined or closed the sign-in flow. Such
    /// failures usually deserve no error dialog.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Session(SessionError::Dismissed | SessionError::Denied(_))
        )
    }
}
