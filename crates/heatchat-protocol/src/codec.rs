//! Codec trait and implementations for serializing/deserializing values.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! Both the API client (request/response bodies) and the session store
//! (persisted entries) go through a [`Codec`], so a user profile and an
//! access token are always encoded the same way.
//!
//! Currently we provide [`JsonCodec`], which is what the backend speaks.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// ## Trait bounds explained
///
/// - `Send + Sync` → safe to share between threads (Tokio may poll our
///   futures on any worker thread).
/// - `'static` → the codec owns everything it needs, so it can live
///   inside long-lived clients and stores.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;

    /// Serializes a value into a UTF-8 string.
    ///
    /// The session store persists strings, not bytes. Text codecs can
    /// rely on this default; a binary codec would override it.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails, or
    /// `ProtocolError::InvalidMessage` if the encoding isn't UTF-8.
    fn encode_to_string<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        let bytes = self.encode(value)?;
        String::from_utf8(bytes)
            .map_err(|e| ProtocolError::InvalidMessage(format!("encoded value is not UTF-8: {e}")))
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// This is behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use heatchat_protocol::{AccessToken, Codec, JsonCodec};
///
/// let codec = JsonCodec;
///
/// // A token is stored as a JSON string literal.
/// let text = codec.encode_to_string(&AccessToken::new("tok")).unwrap();
/// assert_eq!(text, "\"tok\"");
///
/// let decoded: AccessToken = codec.decode(text.as_bytes()).unwrap();
/// assert_eq!(decoded.as_str(), "tok");
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }

    // serde_json only ever emits UTF-8, so skip the extra validation pass.
    fn encode_to_string<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }
}
