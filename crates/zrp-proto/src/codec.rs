//! Datagram framing and serialization

use crate::{Datagram, ProtocolError, Result};
use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Length of the type tag that opens every datagram
pub const TAG_LENGTH: usize = 4;

/// Tag plus body length
pub const HEADER_LENGTH: usize = TAG_LENGTH + 4;

/// Maximum datagram body size (64 KiB)
pub const MAX_BODY_SIZE: usize = 64 * 1024;

/// Datagram type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatagramTag {
    /// Route advertisement
    Advertisement,

    /// Route discovery query
    RouteDiscovery,

    /// Route discovery acknowledgement
    RouteDiscoveryAck,

    /// Delivery failure notification
    DeliveryFailure,

    /// Transport envelope
    Message,
}

impl DatagramTag {
    /// All known tags
    pub const ALL: [DatagramTag; 5] = [
        DatagramTag::Advertisement,
        DatagramTag::RouteDiscovery,
        DatagramTag::RouteDiscoveryAck,
        DatagramTag::DeliveryFailure,
        DatagramTag::Message,
    ];

    /// Get the tag bytes
    pub const fn as_bytes(self) -> [u8; TAG_LENGTH] {
        match self {
            DatagramTag::Advertisement => *b"ZADV",
            DatagramTag::RouteDiscovery => *b"ZRDQ",
            DatagramTag::RouteDiscoveryAck => *b"ZRDA",
            DatagramTag::DeliveryFailure => *b"ZDLF",
            DatagramTag::Message => *b"ZMSG",
        }
    }

    /// Convert from leading bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let prefix = bytes.get(..TAG_LENGTH)?;
        Self::ALL
            .into_iter()
            .find(|tag| tag.as_bytes() == prefix)
    }
}

/// A datagram kind with a wire representation
pub trait WireDatagram: Serialize + DeserializeOwned {
    /// Tag written in front of the body
    const TAG: DatagramTag;

    /// Structural checks applied after deserialization
    fn verify(&self) -> Result<()>;

    /// Wrap into the closed datagram enumeration
    fn into_datagram(self) -> Datagram;
}

/// Codec for encoding/decoding datagrams
pub struct WireCodec;

impl WireCodec {
    /// Inspect the type tag without decoding the body
    ///
    /// Returns `None` for bytes that are not a datagram, i.e. application
    /// payloads.
    pub fn peek_tag(buf: &[u8]) -> Option<DatagramTag> {
        DatagramTag::from_bytes(buf)
    }

    /// Encode a datagram into bytes
    ///
    /// Frame format:
    /// ```text
    /// [ 4 bytes: type tag ]
    /// [ 4 bytes: body length (u32, big-endian) ]
    /// [ N bytes: body (bincode-encoded) ]
    /// ```
    pub fn encode_as<T: WireDatagram>(value: &T) -> Result<Vec<u8>> {
        let body = bincode::serialize(value)?;

        if body.len() > MAX_BODY_SIZE {
            return Err(ProtocolError::DatagramTooLarge {
                size: body.len(),
                max: MAX_BODY_SIZE,
            });
        }

        let mut frame = BytesMut::with_capacity(HEADER_LENGTH + body.len());
        frame.put_slice(&T::TAG.as_bytes());
        frame.put_u32(body.len() as u32);
        frame.put_slice(&body);

        Ok(frame.to_vec())
    }

    /// Decode and verify a datagram of a known kind
    pub fn decode_as<T: WireDatagram>(buf: &[u8]) -> Result<T> {
        if buf.len() < HEADER_LENGTH {
            return Err(ProtocolError::InvalidBuffer("Datagram too short".to_string()));
        }

        match Self::peek_tag(buf) {
            Some(tag) if tag == T::TAG => {}
            Some(tag) => {
                return Err(ProtocolError::InvalidBuffer(format!(
                    "Expected {:?} datagram, found {:?}",
                    T::TAG,
                    tag
                )))
            }
            None => {
                let mut raw = [0u8; TAG_LENGTH];
                raw.copy_from_slice(&buf[..TAG_LENGTH]);
                return Err(ProtocolError::UnknownTag(raw));
            }
        }

        let mut header = &buf[TAG_LENGTH..HEADER_LENGTH];
        let length = header.get_u32() as usize;

        if length > MAX_BODY_SIZE {
            return Err(ProtocolError::DatagramTooLarge {
                size: length,
                max: MAX_BODY_SIZE,
            });
        }

        let body = &buf[HEADER_LENGTH..];
        if body.len() != length {
            return Err(ProtocolError::InvalidBuffer(format!(
                "Body length mismatch: header says {}, found {}",
                length,
                body.len()
            )));
        }

        let value: T = bincode::deserialize(body)
            .map_err(|e| ProtocolError::InvalidBuffer(e.to_string()))?;

        // Every body byte must belong to the value
        if bincode::serialized_size(&value)? as usize != length {
            return Err(ProtocolError::InvalidBuffer("Trailing bytes in body".to_string()));
        }

        value.verify()?;

        Ok(value)
    }

    /// Encode any datagram
    pub fn encode(datagram: &Datagram) -> Result<Vec<u8>> {
        match datagram {
            Datagram::Advertisement(d) => Self::encode_as(d),
            Datagram::RouteDiscovery(d) => Self::encode_as(d),
            Datagram::RouteDiscoveryAck(d) => Self::encode_as(d),
            Datagram::DeliveryFailure(d) => Self::encode_as(d),
            Datagram::Message(d) => Self::encode_as(d),
        }
    }

    /// Decode any datagram, dispatching on its tag
    pub fn decode(buf: &[u8]) -> Result<Datagram> {
        let tag = Self::peek_tag(buf).ok_or_else(|| {
            let mut raw = [0u8; TAG_LENGTH];
            let n = buf.len().min(TAG_LENGTH);
            raw[..n].copy_from_slice(&buf[..n]);
            ProtocolError::UnknownTag(raw)
        })?;

        let datagram = match tag {
            DatagramTag::Advertisement => Self::decode_as::<crate::Advertisement>(buf)?.into_datagram(),
            DatagramTag::RouteDiscovery => Self::decode_as::<crate::RouteDiscovery>(buf)?.into_datagram(),
            DatagramTag::RouteDiscoveryAck => {
                Self::decode_as::<crate::RouteDiscoveryAck>(buf)?.into_datagram()
            }
            DatagramTag::DeliveryFailure => {
                Self::decode_as::<crate::DeliveryFailure>(buf)?.into_datagram()
            }
            DatagramTag::Message => Self::decode_as::<crate::Message>(buf)?.into_datagram(),
        };

        Ok(datagram)
    }
}
