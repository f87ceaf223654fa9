//! Error types for the protocol layer.
//!
//! Each crate in heatchat defines its own error enum. When you see a
//! `ProtocolError`, you know the problem is in serialization or in the
//! shape of a value, not in networking or storage.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields
    /// (a `user` without `login`), or a truncated response body.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The value is well-formed but violates a protocol rule,
    /// e.g. an authorization endpoint that can't carry a query string.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
