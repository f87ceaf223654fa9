//! Core data types shared by the API client and the session layer.
//!
//! These are the structures that get serialized to JSON, sent to (or
//! received from) the backend, and written to local storage.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// The signed-in GitHub identity, as returned by the backend.
///
/// A `User` is an immutable snapshot: sign-in replaces it wholesale and
/// sign-out clears it. Nothing ever edits a single field in place.
///
/// The field names match the backend's JSON exactly, so no serde
/// renaming is needed:
///
/// ```json
/// { "id": "1", "login": "octocat", "name": "The Octocat",
///   "avatar_url": "https://github.com/octocat.png" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Backend identifier for the user.
    pub id: String,

    /// GitHub handle (e.g. `octocat`).
    pub login: String,

    /// Display name.
    pub name: String,

    /// URL of the avatar image rendered next to the user's messages.
    pub avatar_url: String,
}

// ---------------------------------------------------------------------------
// AccessToken
// ---------------------------------------------------------------------------

/// The session token issued by the backend after a successful code exchange.
///
/// This is a newtype wrapper around `String`. Two reasons:
///
/// 1. **Type safety**: a function that takes `&AccessToken` can't be
///    handed an authorization *code* or a login by mistake.
/// 2. **No leaks**: `Debug` is implemented by hand and prints `***`,
///    so `tracing::debug!(?response)` never writes a token to the logs.
///
/// `#[serde(transparent)]` serializes it as the bare string: `"tok"`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Renders the value of an `Authorization` header: `Bearer <token>`.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

// ---------------------------------------------------------------------------
// POST /authenticate
// ---------------------------------------------------------------------------

/// Request body for `POST /authenticate`: `{ "code": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticateRequest {
    /// The authorization code from the OAuth redirect.
    pub code: String,
}

/// Response body for `POST /authenticate`: `{ "token": "...", "user": {...} }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Session token to send as `Authorization: Bearer <token>`.
    pub token: AccessToken,

    /// The user the token belongs to.
    pub user: User,
}

// =========================================================================
// Tests
// =========================================================================
