//! # Heatchat
//!
//! GitHub sign-in and session lifecycle for the heatchat client.
//!
//! Heatchat signs a user in through GitHub's OAuth consent page, trades
//! the authorization code for a session token with the heatchat backend,
//! remembers the session across restarts, and hands out an API client
//! that carries the bearer token.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use heatchat::prelude::*;
//!
//! # async fn run() -> Result<(), HeatchatError> {
//! heatchat::init_tracing("heatchat=info");
//!
//! let client = Heatchat::builder()
//!     .api_base_url("https://heatchat.example.com/api")
//!     .build()
//!     .await?;
//!
//! let user = match client.user() {
//!     Some(user) => user,
//!     None => client.sign_in().await?,
//! };
//! println!("hello, {}", user.login);
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! | Crate                | Role                                          |
//! |----------------------|-----------------------------------------------|
//! | `heatchat-protocol`  | wire types, OAuth request/result, codec       |
//! | `heatchat-transport` | HTTP transport and the backend `ApiClient`    |
//! | `heatchat-session`   | broker, store, and the `AuthSessionManager`   |
//!
//! Embedders that bring their own broker or store use
//! [`AuthSessionManager`](heatchat_session::AuthSessionManager) directly.

mod client;
mod error;
mod logging;

pub use client::{Heatchat, HeatchatBuilder};
pub use error::HeatchatError;
pub use logging::init_tracing;

pub use heatchat_protocol as protocol;
pub use heatchat_session as session;
pub use heatchat_transport as transport;

/// Everything an application needs for the common case.
pub mod prelude {
    pub use crate::{Heatchat, HeatchatBuilder, HeatchatError, init_tracing};
    pub use heatchat_protocol::{AccessToken, User};
    pub use heatchat_session::{
        AuthSessionManager, AuthSnapshot, AuthorizationBroker, FileStore, LoopbackBroker,
        MemoryStore, SessionConfig, SessionError, SessionState, SessionStore,
    };
    pub use heatchat_transport::{ApiClient, ReqwestTransport};
}
