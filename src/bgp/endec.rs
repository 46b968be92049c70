//! BGP packet encoding and decoding
//!
//! The decoder is incremental: it returns `None` until a whole marker-framed
//! message is buffered, then validates the header before touching the body.

// SPDX-License-Identifier: AGPL-3.0-or-later

use super::error::HeaderError;
use super::{Error, Message, Notification, Open, RouteRefresh, Update};
use super::{HEADER_LEN, MARKER, MAX_MESSAGE_LEN};
use bytes::{Buf, BufMut};
use enum_primitive_derive::Primitive;
use num_traits::FromPrimitive;
use std::net::Ipv4Addr;
use tokio_util::codec::{Decoder, Encoder};

/// BGP packet encoder and decoder
#[derive(Copy, Clone, Debug, Default)]
pub struct BgpCodec;

impl Decoder for BgpCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut bytes::BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        if src[..MARKER.len()] != MARKER {
            return Err(HeaderError::ConnectionNotSynchronized.into());
        }
        let length = u16::from_be_bytes([src[16], src[17]]);
        let total = length as usize;
        if !(HEADER_LEN..=MAX_MESSAGE_LEN).contains(&total) {
            return Err(HeaderError::BadMessageLength(length).into());
        }
        let type_byte = src[18];
        let msg_type =
            MessageType::from_u8(type_byte).ok_or(HeaderError::BadMessageType(type_byte))?;
        if !msg_type.length_valid(total) {
            return Err(HeaderError::BadMessageLength(length).into());
        }
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        log::trace!("Valid BGP header, type {msg_type:?}, length {length}");
        // Consume the frame before parsing the body so a body error leaves
        // the buffer aligned on the next message boundary.
        src.advance(HEADER_LEN);
        let mut body = src.split_to(total - HEADER_LEN).freeze();
        // Some networks append garbage to the segment past the declared
        // length; drop whatever cannot begin another message.
        let keep = src.len().min(MARKER.len());
        if keep > 0 && src[..keep] != MARKER[..keep] {
            log::debug!("Discarding {} stray trailing bytes", src.len());
            src.clear();
        }
        let packet = match msg_type {
            MessageType::Open => Message::Open(Open::from_bytes(&mut body)?),
            MessageType::Update => Message::Update(Update::from_bytes(&mut body)?),
            MessageType::Notification => {
                Message::Notification(Notification::from_bytes(&mut body)?)
            }
            MessageType::Keepalive => Message::Keepalive,
            MessageType::RouteRefresh => {
                Message::RouteRefresh(RouteRefresh::from_bytes(&mut body)?)
            }
        };
        if body.has_remaining() {
            log::debug!("Remaining bytes after decoding: {body:?}");
            return Err(HeaderError::BadMessageLength(length).into());
        }
        Ok(Some(packet))
    }
}

impl Encoder<Message> for BgpCodec {
    // tokio requires the Error type to be `From<io::Error>`, but ours cannot
    // actually fail: every in-memory message flattens.
    type Error = std::io::Error;

    fn encode(&mut self, item: Message, dst: &mut bytes::BytesMut) -> Result<(), Self::Error> {
        dst.put_slice(&MARKER);
        let len_pos = dst.len();
        dst.put_u16(0); // Placeholder for length
        let len = match item {
            Message::Open(msg) => {
                dst.put_u8(MessageType::Open as u8);
                msg.to_bytes(dst)
            }
            Message::Update(msg) => {
                dst.put_u8(MessageType::Update as u8);
                msg.to_bytes(dst)
            }
            Message::Notification(msg) => {
                dst.put_u8(MessageType::Notification as u8);
                msg.to_bytes(dst)
            }
            Message::Keepalive => {
                dst.put_u8(MessageType::Keepalive as u8);
                0
            }
            Message::RouteRefresh(msg) => {
                dst.put_u8(MessageType::RouteRefresh as u8);
                msg.to_bytes(dst)
            }
        };
        let len = len + HEADER_LEN;
        let len = u16::try_from(len).expect("Message length overflow");
        dst[len_pos..len_pos + 2].copy_from_slice(&len.to_be_bytes());
        Ok(())
    }
}

/// BGP message type tags
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum MessageType {
    Open = 1,
    Update = 2,
    Notification = 3,
    Keepalive = 4,
    RouteRefresh = 5,
}

impl MessageType {
    /// Per-type bounds on the total message length (RFC 4271 Section 6.1)
    #[must_use]
    pub fn length_valid(self, total: usize) -> bool {
        match self {
            Self::Open => total >= HEADER_LEN + 10,
            Self::Update => total >= HEADER_LEN + 4,
            Self::Notification => total >= HEADER_LEN + 2,
            Self::Keepalive => total == HEADER_LEN,
            Self::RouteRefresh => total == HEADER_LEN + 4,
        }
    }
}

/// BGP packet component with a fixed length or containing a length field
pub trait Component {
    /// Decode the component from a buffer.
    fn from_bytes(src: &mut bytes::Bytes) -> Result<Self, Error>
    where
        Self: Sized;

    /// Encode the component into a buffer.
    ///
    /// Returns the number of bytes written.
    fn to_bytes(self, dst: &mut bytes::BytesMut) -> usize;

    /// Find out the length of the component, preferably without encoding it.
    fn encoded_len(&self) -> usize;
}

impl Component for Ipv4Addr {
    fn from_bytes(src: &mut bytes::Bytes) -> Result<Self, Error> {
        if src.remaining() < 4 {
            return Err(Error::Value("IPv4 address length", src.remaining() as u16));
        }
        let octets = src.get_u32();
        Ok(Self::from(octets))
    }

    fn to_bytes(self, dst: &mut bytes::BytesMut) -> usize {
        dst.put_u32(self.into());
        4
    }

    fn encoded_len(&self) -> usize {
        4
    }
}

macro_rules! impl_component_for_intn {
    ($typ:ty, $getter:ident, $putter:ident, $n:expr) => {
        impl Component for $typ {
            fn from_bytes(src: &mut bytes::Bytes) -> Result<Self, Error> {
                if src.remaining() < $n {
                    return Err(Error::Value(
                        concat!(stringify!($typ), " length"),
                        src.remaining() as u16,
                    ));
                }
                Ok(src.$getter())
            }

            fn to_bytes(self, dst: &mut bytes::BytesMut) -> usize {
                dst.$putter(self);
                $n
            }

            fn encoded_len(&self) -> usize {
                $n
            }
        }
    };
}

impl_component_for_intn!(u8, get_u8, put_u8, 1);
impl_component_for_intn!(u16, get_u16, put_u16, 2);
impl_component_for_intn!(u32, get_u32, put_u32, 4);
