//! Wire encoding for messages.
//!
//! Only a JSON codec is provided. [`LocalMessenger::with_codec`] runs every
//! delivery through one; messengers that cross process boundaries plug
//! their own [`MessageCodec`] in.
//!
//! [`LocalMessenger::with_codec`]: crate::messenger::LocalMessenger::with_codec

use cadence_types::Message;

/// Errors raised while encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The message could not be serialized.
    #[error("failed to encode message: {source}")]
    Encode {
        /// The underlying serialization error.
        source: serde_json::Error,
    },

    /// The bytes are not a valid message.
    #[error("failed to decode message: {source}")]
    Decode {
        /// The underlying deserialization error.
        source: serde_json::Error,
    },
}

/// Converts messages to and from bytes.
pub trait MessageCodec: Send + Sync {
    /// Serialize a message.
    fn encode(&self, message: &Message) -> Result<Vec<u8>, CodecError>;

    /// Deserialize a message.
    fn decode(&self, bytes: &[u8]) -> Result<Message, CodecError>;
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(message).map_err(|source| CodecError::Encode { source })
    }

    fn decode(&self, bytes: &[u8]) -> Result<Message, CodecError> {
        serde_json::from_slice(bytes).map_err(|source| CodecError::Decode { source })
    }
}
