//! minibgp -- a single-peer BGP-4 speaker
//!
//! Structs here represent the data instead of the on-wire format; the wire
//! framing lives in [`endec`] and the session engine in [`fsm`].

// SPDX-License-Identifier: AGPL-3.0-or-later

pub mod capability;
mod endec;
pub mod error;
pub mod fsm;
pub mod path;
pub mod route;
pub mod timer;
#[cfg(test)]
mod tests;

pub use endec::{BgpCodec as Codec, Component, MessageType};
pub use error::NotificationErrorCode;

use bytes::{Buf, BufMut};
use capability::{Capabilities, OptionalParameters};
use error::{CeaseSubcode, FsmErrorSubcode, OpenError, UpdateError};
use num_traits::FromPrimitive;
use std::fmt;
use std::net::Ipv4Addr;

/// Supported BGP version
pub const BGP_VERSION: u8 = 4;

/// ASN for AS4
pub const AS_TRANS: u16 = 23456;

/// Reserved 2-byte ASN (RFC 7300)
pub const RESERVED_ASN: u16 = 65535;

/// BGP marker
pub const MARKER: [u8; 16] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
];

/// Bytes in the fixed message header (marker, length, type)
pub const HEADER_LEN: usize = 19;

/// Largest message accepted on the wire (RFC 4271 Section 4.1)
pub const MAX_MESSAGE_LEN: usize = 4096;

/// BGP packet errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("message header error: {0}")]
    Header(#[from] error::HeaderError),
    #[error("OPEN message error: {0}")]
    Open(#[from] error::OpenError),
    #[error("UPDATE message error: {0}")]
    Update(#[from] error::UpdateError),
    #[error("ROUTE-REFRESH message error: {0}")]
    RouteRefresh(#[from] error::RouteRefreshError),
    #[error("invalid {0} value {1}")]
    Value(&'static str, u16),
}

/// BGP message
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Open(Open),
    Update(Update),
    Notification(Notification),
    Keepalive,
    RouteRefresh(RouteRefresh),
}

/// BGP open message
#[derive(Clone, Debug, PartialEq)]
pub struct Open {
    pub version: u8,
    pub asn: u16,
    pub hold_time: u16,
    pub bgp_id: Ipv4Addr,
    pub opt_params: OptionalParameters,
}

impl Component for Open {
    fn from_bytes(src: &mut bytes::Bytes) -> Result<Self, Error> {
        if src.remaining() < 10 {
            return Err(OpenError::Malformed.into());
        }
        let version = src.get_u8();
        if version != BGP_VERSION {
            return Err(OpenError::UnsupportedVersionNumber(version).into());
        }
        let asn = src.get_u16();
        if asn == 0 || asn == RESERVED_ASN {
            return Err(OpenError::BadPeerAs(asn).into());
        }
        let hold_time = src.get_u16();
        // Zero disables keepalives; one and two are forbidden
        if hold_time == 1 || hold_time == 2 {
            return Err(OpenError::UnacceptableHoldTime(hold_time).into());
        }
        let bgp_id_raw = src.get_u32();
        if bgp_id_raw == 0 {
            return Err(OpenError::BadBgpIdentifier(bgp_id_raw).into());
        }
        let opt_params = OptionalParameters::from_bytes(src)?;
        Ok(Self {
            version,
            asn,
            hold_time,
            bgp_id: Ipv4Addr::from(bgp_id_raw),
            opt_params,
        })
    }

    fn to_bytes(self, dst: &mut bytes::BytesMut) -> usize {
        let mut len = 0;
        len += self.version.to_bytes(dst);
        len += self.asn.to_bytes(dst);
        len += self.hold_time.to_bytes(dst);
        len += self.bgp_id.to_bytes(dst);
        len += self.opt_params.to_bytes(dst);
        len
    }

    fn encoded_len(&self) -> usize {
        1 + 2 + 2 + 4 + self.opt_params.encoded_len()
    }
}

impl Open {
    /// Create an OPEN announcing the given capability set
    #[must_use]
    pub fn new(asn: u16, hold_time: u16, bgp_id: Ipv4Addr, capabilities: Capabilities) -> Self {
        let opt_params = if capabilities.is_empty() {
            OptionalParameters::default()
        } else {
            vec![capability::OptionalParameterValue::Capabilities(
                capabilities,
            )]
            .into()
        };
        Self {
            version: BGP_VERSION,
            asn,
            hold_time,
            bgp_id,
            opt_params,
        }
    }

    /// All capabilities announced across the optional parameters
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        let mut caps = Vec::new();
        for param in self.opt_params.iter() {
            let capability::OptionalParameterValue::Capabilities(inner) = param;
            caps.extend(inner.iter().cloned());
        }
        caps.into()
    }
}

/// BGP update message
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Update {
    pub withdrawn_routes: route::Routes,
    pub path_attributes: path::PathAttributes,
    pub nlri: route::Routes,
}

impl Component for Update {
    fn from_bytes(src: &mut bytes::Bytes) -> Result<Self, Error> {
        if src.remaining() < 2 {
            return Err(UpdateError::MalformedAttributeList.into());
        }
        let withdrawn_len = src.get_u16() as usize;
        if withdrawn_len > src.remaining() {
            return Err(UpdateError::MalformedAttributeList.into());
        }
        let mut wdr_buf = src.split_to(withdrawn_len);
        let withdrawn_routes = route::Routes::from_bytes(&mut wdr_buf)?;
        if src.remaining() < 2 {
            return Err(UpdateError::MalformedAttributeList.into());
        }
        let tpa_len = src.get_u16() as usize;
        if tpa_len > src.remaining() {
            return Err(UpdateError::MalformedAttributeList.into());
        }
        let mut tpa_buf = src.split_to(tpa_len);
        let path_attributes = path::PathAttributes::from_bytes(&mut tpa_buf)?;
        // Everything after the attribute section is NLRI
        let nlri = route::Routes::from_bytes(src)?;
        path_attributes.validate(!nlri.is_empty())?;
        Ok(Self {
            withdrawn_routes,
            path_attributes,
            nlri,
        })
    }

    fn to_bytes(self, dst: &mut bytes::BytesMut) -> usize {
        let mut len = 0;
        let wdr_len_pos = dst.len();
        len += 0u16.to_bytes(dst); // Placeholder for withdrawn routes length
        let wdr_len = self.withdrawn_routes.to_bytes(dst);
        len += wdr_len;
        dst[wdr_len_pos..wdr_len_pos + 2].copy_from_slice(
            &(u16::try_from(wdr_len)
                .expect("Withdrawn routes length overflow")
                .to_be_bytes()),
        );
        let tpa_len_pos = dst.len();
        len += 0u16.to_bytes(dst); // Placeholder for total path attributes length
        let tpa_len = self.path_attributes.to_bytes(dst);
        len += tpa_len;
        dst[tpa_len_pos..tpa_len_pos + 2].copy_from_slice(
            &(u16::try_from(tpa_len)
                .expect("Total path attributes length overflow")
                .to_be_bytes()),
        );
        len += self.nlri.to_bytes(dst);
        len
    }

    fn encoded_len(&self) -> usize {
        2 + self.withdrawn_routes.encoded_len()
            + 2
            + self.path_attributes.encoded_len()
            + self.nlri.encoded_len()
    }
}

/// BGP notification message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub error_code: NotificationErrorCode,
    pub error_subcode: u8,
    pub data: bytes::Bytes,
}

impl Component for Notification {
    fn from_bytes(src: &mut bytes::Bytes) -> Result<Self, Error> {
        if src.remaining() < 2 {
            return Err(Error::Value("notification length", src.remaining() as u16));
        }
        let error_code = src.get_u8();
        let error_subcode = src.get_u8();
        let data = src.copy_to_bytes(src.remaining());
        Ok(Self {
            error_code: NotificationErrorCode::from_u8(error_code).ok_or(Error::Value(
                "notification error code",
                u16::from(error_code),
            ))?,
            error_subcode,
            data,
        })
    }

    fn to_bytes(self, dst: &mut bytes::BytesMut) -> usize {
        (self.error_code as u8).to_bytes(dst);
        self.error_subcode.to_bytes(dst);
        dst.put_slice(&self.data);
        self.encoded_len()
    }

    fn encoded_len(&self) -> usize {
        2 + self.data.len()
    }
}

impl Notification {
    /// Create a new BGP notification message
    #[must_use]
    pub const fn new(
        error_code: NotificationErrorCode,
        error_subcode: u8,
        data: bytes::Bytes,
    ) -> Self {
        Self {
            error_code,
            error_subcode,
            data,
        }
    }

    #[must_use]
    pub const fn cease(subcode: CeaseSubcode) -> Self {
        Self::new(
            NotificationErrorCode::Cease,
            subcode as u8,
            bytes::Bytes::new(),
        )
    }

    #[must_use]
    pub const fn hold_timer_expired() -> Self {
        Self::new(
            NotificationErrorCode::HoldTimerExpired,
            0,
            bytes::Bytes::new(),
        )
    }

    #[must_use]
    pub const fn fsm_error(subcode: FsmErrorSubcode) -> Self {
        Self::new(
            NotificationErrorCode::FiniteStateMachineError,
            subcode as u8,
            bytes::Bytes::new(),
        )
    }

    /// Whether the peer rejected our OPEN over the protocol version.
    /// The state machine branches differently on these.
    #[must_use]
    pub fn is_version_error(&self) -> bool {
        self.error_code == NotificationErrorCode::OpenMessageError
            && self.error_subcode == error::OpenMessageErrorSubcode::UnsupportedVersionNumber as u8
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.error_code,
            error::subcode_name(self.error_code, self.error_subcode)
        )?;
        if !self.data.is_empty() {
            write!(f, " data {:02x?}", &self.data[..])?;
        }
        Ok(())
    }
}

/// BGP route refresh message (RFC 2918)
///
/// Carried for wire compatibility only; the speaker does not readvertise.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RouteRefresh {
    pub afi: u16,
    pub safi: u8,
}

impl Component for RouteRefresh {
    fn from_bytes(src: &mut bytes::Bytes) -> Result<Self, Error> {
        if src.remaining() != 4 {
            return Err(error::RouteRefreshError::InvalidMessageLength(
                (HEADER_LEN + src.remaining()) as u16,
            )
            .into());
        }
        let afi = src.get_u16();
        let _ = src.get_u8(); // Reserved
        let safi = src.get_u8();
        Ok(Self { afi, safi })
    }

    fn to_bytes(self, dst: &mut bytes::BytesMut) -> usize {
        dst.put_u16(self.afi);
        dst.put_u8(0); // Reserved
        dst.put_u8(self.safi);
        self.encoded_len()
    }

    fn encoded_len(&self) -> usize {
        4
    }
}
