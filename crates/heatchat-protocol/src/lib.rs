//! Wire protocol for heatchat.
//!
//! This crate defines the "language" that the client, the backend API,
//! and the OAuth provider speak:
//!
//! - **Types** ([`User`], [`AccessToken`], [`AuthResponse`], etc.):
//!   the structures that travel over HTTP and get persisted locally.
//! - **OAuth** ([`AuthorizationRequest`], [`AuthorizationResult`]):
//!   the authorization URL we open and the redirect we get back.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those values
//!   are converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits below both the API client and the session
//! manager. It doesn't know about sockets or storage;
//! it only knows the shapes of the data.
//!
//! ```text
//! Transport (HTTP) → Protocol (User, AuthResponse) → Session (sign-in state)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod oauth;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

// Users write `use heatchat_protocol::User` instead of
// `use heatchat_protocol::types::User`.

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use oauth::{
    ACCESS_DENIED, AuthorizationRequest, AuthorizationResult,
    GITHUB_AUTHORIZE_URL, RedirectParams,
};
pub use types::{AccessToken, AuthResponse, AuthenticateRequest, User};
