use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::protocol::error::Result;
use crate::protocol::Frame;

/// Codec for encoding/decoding frames and payloads.
///
/// Both ends of a channel must agree on the codec. Postcard is the default;
/// JSON is available for debugging and interop.
///
/// # Example
///
/// ```
/// use quadrpc_common::transport::Codec;
///
/// let codec = Codec::new();
///
/// let encoded = codec.encode(&42i64).unwrap();
/// let decoded: i64 = codec.decode(&encoded).unwrap();
/// assert_eq!(decoded, 42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    /// Compact binary encoding
    #[default]
    Postcard,
    /// JSON encoding
    Json,
}

impl Codec {
    pub fn new() -> Self {
        Codec::Postcard
    }

    /// Parse a codec name as accepted on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "postcard" | "binary" => Some(Codec::Postcard),
            "json" => Some(Codec::Json),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Codec::Postcard => "postcard",
            Codec::Json => "json",
        }
    }

    /// Encode any serializable value.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Codec::Postcard => PostcardCodec::encode(value),
            Codec::Json => JsonCodec::encode(value),
        }
    }

    /// Decode a value previously produced by [`Codec::encode`].
    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            Codec::Postcard => PostcardCodec::decode(data),
            Codec::Json => JsonCodec::decode(data),
        }
    }

    pub fn encode_frame(&self, frame: &Frame) -> Result<Vec<u8>> {
        self.encode(frame)
    }

    pub fn decode_frame(&self, data: &[u8]) -> Result<Frame> {
        self.decode(data)
    }
}

/// Postcard codec.
pub struct PostcardCodec;

impl PostcardCodec {
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(postcard::to_allocvec(value)?)
    }

    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        Ok(postcard::from_bytes(data)?)
    }
}

/// JSON codec.
pub struct JsonCodec;

impl JsonCodec {
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}
