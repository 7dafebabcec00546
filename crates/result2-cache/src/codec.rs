//! Payload encoding for the backing store.
//!
//! Every payload is prefixed with a one-byte format tag:
//!
//! | Tag | Format | Used for |
//! |-----|--------|----------|
//! | `0x01` | MessagePack (named fields) | any `Serialize` value, first choice |
//! | `0x02` | JSON | values MessagePack cannot represent |
//! | `0x00` | raw bytes | byte strings stored as-is |
//!
//! Decoding dispatches on the tag and never fails: anything that cannot be
//! decoded into the requested type comes back as [`Decoded::Raw`].

use serde::{Serialize, de::DeserializeOwned};

use crate::error::CodecError;

/// Payload format, identified by the leading tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Format {
    Raw = 0x00,
    MessagePack = 0x01,
    Json = 0x02,
}

impl Format {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x00 => Some(Self::Raw),
            0x01 => Some(Self::MessagePack),
            0x02 => Some(Self::Json),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// Result of decoding a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    /// The payload decoded into the requested type.
    Value(T),
    /// The payload was raw, untagged, or not a `T`.
    Raw(Vec<u8>),
}

impl<T> Decoded<T> {
    pub fn into_value(self) -> Option<T> {
        match self {
            Decoded::Value(v) => Some(v),
            Decoded::Raw(_) => None,
        }
    }

    pub fn into_raw(self) -> Option<Vec<u8>> {
        match self {
            Decoded::Raw(bytes) => Some(bytes),
            Decoded::Value(_) => None,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Decoded::Raw(_))
    }
}

/// Encode `value`, preferring MessagePack and falling back to JSON.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    let binary_err = match rmp_serde::to_vec_named(value) {
        Ok(body) => return Ok(tagged(Format::MessagePack, body)),
        Err(e) => e,
    };
    tracing::debug!(error = %binary_err, "MessagePack encoding failed, trying JSON");

    match serde_json::to_vec(value) {
        Ok(body) => Ok(tagged(Format::Json, body)),
        Err(text_err) => Err(CodecError::Unserializable {
            binary: binary_err.to_string(),
            text: text_err.to_string(),
        }),
    }
}

/// Encode a byte string without any serialization.
pub fn encode_raw(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 1);
    out.push(Format::Raw.tag());
    out.extend_from_slice(bytes);
    out
}

/// Decode a payload written by [`encode`] or [`encode_raw`].
///
/// Payloads without a recognised tag (for example counters written by
/// `INCRBY`) are returned whole as [`Decoded::Raw`].
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Decoded<T> {
    let Some((&tag, body)) = payload.split_first() else {
        return Decoded::Raw(Vec::new());
    };

    match Format::from_tag(tag) {
        Some(Format::MessagePack) => match rmp_serde::from_slice(body) {
            Ok(v) => Decoded::Value(v),
            Err(e) => {
                tracing::debug!(error = %e, "MessagePack payload did not decode");
                Decoded::Raw(body.to_vec())
            }
        },
        Some(Format::Json) => match serde_json::from_slice(body) {
            Ok(v) => Decoded::Value(v),
            Err(e) => {
                tracing::debug!(error = %e, "JSON payload did not decode");
                Decoded::Raw(body.to_vec())
            }
        },
        Some(Format::Raw) => Decoded::Raw(body.to_vec()),
        None => Decoded::Raw(payload.to_vec()),
    }
}

fn tagged(format: Format, body: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(format.tag());
    out.extend(body);
    out
}
