use bytes::{Bytes, BytesMut};

use crate::AppResult;

/// Encode/decode capability for one application message type.
///
/// A session is parameterized over one implementation of this trait; the
/// type tag travels in the frame header and selects the concrete message on
/// decode. Implementations own their payload format (binary, delimited
/// strings, serde output) — the framing layer only sees bytes.
pub trait WireMessage: Send + Sized + 'static {
    /// Frame-header discriminator for this message.
    fn type_tag(&self) -> i32;

    /// Writes the payload bytes for this message into `out`.
    fn encode_payload(&self, out: &mut BytesMut) -> AppResult<()>;

    /// Rebuilds a message from a decoded frame. The payload is owned by the
    /// callee for the duration of the call.
    fn decode(type_tag: i32, payload: Bytes) -> AppResult<Self>;
}

/// The untyped variant: a tag plus raw payload bytes, passed through as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub type_tag: i32,
    pub payload: Bytes,
}

impl RawMessage {
    pub fn new(type_tag: i32, payload: impl Into<Bytes>) -> RawMessage {
        RawMessage {
            type_tag,
            payload: payload.into(),
        }
    }
}

impl WireMessage for RawMessage {
    fn type_tag(&self) -> i32 {
        self.type_tag
    }

    fn encode_payload(&self, out: &mut BytesMut) -> AppResult<()> {
        out.extend_from_slice(&self.payload);
        Ok(())
    }

    fn decode(type_tag: i32, payload: Bytes) -> AppResult<RawMessage> {
        Ok(RawMessage { type_tag, payload })
    }
}
