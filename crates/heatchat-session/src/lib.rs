//! Sign-in session management for heatchat.
//!
//! This crate handles the lifecycle of the signed-in user:
//!
//! 1. **Authorization**: sending the user to GitHub and catching the
//!    redirect ([`AuthorizationBroker`] trait, [`LoopbackBroker`])
//! 2. **Code exchange**: trading the code for a session token through
//!    the backend ([`ApiClient`](heatchat_transport::ApiClient))
//! 3. **Persistence**: remembering the session across restarts
//!    ([`SessionStore`] trait, [`FileStore`], [`MemoryStore`])
//! 4. **Rehydration**: restoring it at startup ([`AuthSessionManager`])
//!
//! # How it fits in the stack
//!
//! ```text
//! App / UI (above)   ← subscribes to AuthSnapshot, calls sign_in/sign_out
//!     ↕
//! Session Layer (this crate)  ← owns the user, the token, and the store
//!     ↕
//! Transport + Protocol (below)  ← HTTP client, wire types, codec
//! ```
//!
//! # Feature Flags
//!
//! - `loopback` (default): [`LoopbackBroker`], which opens the system
//!   browser via the `open` crate

mod broker;
mod error;
#[cfg(feature = "loopback")]
mod loopback;
mod manager;
mod session;
mod store;

pub use broker::{AuthorizationBroker, STATE_MISMATCH};
pub use error::{SessionError, StoreError};
#[cfg(feature = "loopback")]
pub use loopback::{DEFAULT_CALLBACK_PATH, LoopbackBroker};
pub use manager::AuthSessionManager;
pub use session::{AuthSnapshot, Session, SessionConfig, SessionState};
pub use store::{FileStore, MemoryStore, SessionStore};
