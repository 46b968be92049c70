//! BGP path attributes (RFC 4271 Section 4.3)
//!
//! Attributes are decoded in declared order. Recognized types get a typed
//! representation and syntactic checks per RFC 4271 Section 6.3; everything
//! else is carried opaquely and re-encoded bit for bit.

// SPDX-License-Identifier: AGPL-3.0-or-later

use super::endec::Component;
use crate::error::UpdateError;
use bytes::{Buf, BufMut, Bytes};
use enum_primitive_derive::Primitive;
use num_traits::FromPrimitive;
use std::net::Ipv4Addr;
use std::ops::Deref;

/// BGP path attributes
#[derive(Clone, Debug, Default, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub struct PathAttributes(pub Vec<Value>);

impl Component for PathAttributes {
    fn from_bytes(src: &mut Bytes) -> Result<Self, crate::Error> {
        let mut attributes = Vec::new();
        while src.has_remaining() {
            attributes.push(Value::from_bytes(src)?);
        }
        Ok(Self(attributes))
    }

    fn to_bytes(self, dst: &mut bytes::BytesMut) -> usize {
        let mut len = 0;
        for attribute in self.0 {
            len += attribute.to_bytes(dst);
        }
        len
    }

    fn encoded_len(&self) -> usize {
        self.0.iter().map(Value::encoded_len).sum()
    }
}

impl Deref for PathAttributes {
    type Target = Vec<Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PathAttributes {
    /// Section-level checks: each attribute appears at most once, and an
    /// advertisement (non-empty NLRI) carries ORIGIN, AS_PATH and NEXT_HOP.
    pub fn validate(&self, nlri_present: bool) -> Result<(), UpdateError> {
        let mut seen = [false; 256];
        for attribute in &self.0 {
            let code = u8::from(&attribute.data);
            if seen[code as usize] {
                return Err(UpdateError::MalformedAttributeList);
            }
            seen[code as usize] = true;
        }
        if nlri_present {
            for required in [Type::Origin, Type::AsPath, Type::NextHop] {
                if !seen[required as usize] {
                    return Err(UpdateError::MissingWellKnownAttribute(required as u8));
                }
            }
        }
        Ok(())
    }
}

/// BGP path attribute
#[derive(Clone, Debug, PartialEq)]
pub struct Value {
    pub flags: Flags,
    pub data: Data,
}

impl Component for Value {
    fn from_bytes(src: &mut Bytes) -> Result<Self, crate::Error> {
        if src.remaining() < 2 {
            return Err(UpdateError::MalformedAttributeList.into());
        }
        let flags = Flags(src.get_u8());
        let type_ = src.get_u8();
        let len_field = if flags.is_extended_length() { 2 } else { 1 };
        if src.remaining() < len_field {
            return Err(UpdateError::MalformedAttributeList.into());
        }
        let len = if flags.is_extended_length() {
            src.get_u16() as usize
        } else {
            src.get_u8() as usize
        };
        if src.remaining() < len {
            return Err(UpdateError::AttributeLengthError {
                type_code: type_,
                len: len as u16,
            }
            .into());
        }
        let mut src = src.split_to(len);
        let known = Type::from_u8(type_);
        if let Some(known) = known {
            known.check_flags(flags)?;
            known.check_len(len)?;
        } else if !flags.is_optional() {
            // Unknown types must be optional; a well-known type we do not
            // recognize is a hard error
            return Err(UpdateError::UnrecognizedWellKnownAttribute(type_).into());
        }
        let data = match known {
            Some(Type::Origin) => Data::Origin(Origin::from_bytes(&mut src)?),
            Some(Type::AsPath) => Data::AsPath(AsPath::from_bytes(&mut src)?),
            Some(Type::NextHop) => {
                let next_hop = Ipv4Addr::from(src.get_u32());
                if next_hop.is_unspecified() || next_hop.is_broadcast() {
                    return Err(UpdateError::InvalidNextHopAttribute.into());
                }
                Data::NextHop(next_hop)
            }
            Some(Type::MultiExitDisc) => Data::MultiExitDisc(src.get_u32()),
            Some(Type::LocalPref) => Data::LocalPref(src.get_u32()),
            Some(Type::AtomicAggregate) => Data::AtomicAggregate,
            Some(Type::Aggregator) => Data::Aggregator(Aggregator::from_bytes(&mut src)?),
            Some(Type::As4Path) => Data::As4Path(AsPath::from_bytes(&mut src)?),
            None => Data::Unsupported(type_, src),
        };
        Ok(Self { flags, data })
    }

    fn to_bytes(self, dst: &mut bytes::BytesMut) -> usize {
        let mut len = 0;
        dst.put_u8(self.flags.0); // Flags
        len += 1;
        dst.put_u8(u8::from(&self.data)); // Type
        len += 1;
        let len_pos = dst.len();
        let two_byte_len = if self.flags.is_extended_length() {
            dst.put_u16(0); // Placeholder for the length
            len += 2;
            true
        } else {
            dst.put_u8(0); // Placeholder for the length
            len += 1;
            false
        };
        let data_len = match self.data {
            Data::Origin(origin) => origin.to_bytes(dst),
            Data::AsPath(as_path) | Data::As4Path(as_path) => as_path.to_bytes(dst),
            Data::NextHop(next_hop) => next_hop.to_bytes(dst),
            Data::MultiExitDisc(med) => med.to_bytes(dst),
            Data::LocalPref(local_pref) => local_pref.to_bytes(dst),
            Data::AtomicAggregate => 0,
            Data::Aggregator(agg) => agg.to_bytes(dst),
            Data::Unsupported(_, data) => {
                let len = data.len();
                dst.put_slice(&data);
                len
            }
        };
        if two_byte_len {
            dst[len_pos..len_pos + 2].copy_from_slice(
                &(u16::try_from(data_len)
                    .expect("Path attribute length overflow")
                    .to_be_bytes()),
            );
        } else {
            dst[len_pos] = u8::try_from(data_len).expect("Path attribute length overflow");
        }
        len + data_len
    }

    fn encoded_len(&self) -> usize {
        1 + 1
            + if self.flags.is_extended_length() {
                2
            } else {
                1
            }
            + match &self.data {
                Data::Origin(origin) => origin.encoded_len(),
                Data::AsPath(as_path) | Data::As4Path(as_path) => as_path.encoded_len(),
                Data::NextHop(next_hop) => next_hop.encoded_len(),
                Data::MultiExitDisc(_) | Data::LocalPref(_) => 4,
                Data::AtomicAggregate => 0,
                Data::Aggregator(agg) => agg.encoded_len(),
                Data::Unsupported(_, data) => data.len(),
            }
    }
}

/// BGP path attribute flags
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Flags(pub u8);

impl Flags {
    /// Well-known, transitive
    pub const WELL_KNOWN: Flags = Flags(0b0100_0000);
    /// Optional, transitive
    pub const OPTIONAL_TRANSITIVE: Flags = Flags(0b1100_0000);
    /// Optional, non-transitive
    pub const OPTIONAL: Flags = Flags(0b1000_0000);

    /// Check if the attribute is optional
    #[must_use]
    pub const fn is_optional(self) -> bool {
        self.0 & 0x80 != 0
    }

    /// Check if the attribute is transitive
    #[must_use]
    pub const fn is_transitive(self) -> bool {
        self.0 & 0x40 != 0
    }

    /// Check if the attribute is partial
    #[must_use]
    pub const fn is_partial(self) -> bool {
        self.0 & 0x20 != 0
    }

    /// Check if the attribute carries a 2-byte value length
    #[must_use]
    pub const fn is_extended_length(self) -> bool {
        self.0 & 0x10 != 0
    }
}

/// BGP path attribute data
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Data {
    Origin(Origin),
    AsPath(AsPath),
    /// BGP next hop (RFC 4271 Section 5.1.3)
    NextHop(Ipv4Addr),
    MultiExitDisc(u32),
    LocalPref(u32),
    AtomicAggregate,
    Aggregator(Aggregator),
    As4Path(AsPath), // RFC 4893/6793
    Unsupported(u8, Bytes),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[non_exhaustive]
#[repr(u8)]
pub enum Type {
    Origin = 1,
    AsPath = 2,
    NextHop = 3,
    MultiExitDisc = 4,
    LocalPref = 5,
    AtomicAggregate = 6,
    Aggregator = 7,
    As4Path = 17,
}

impl Type {
    /// Flag-bit classes per RFC 4271 Section 5: a mismatch between the
    /// optional/transitive bits and the attribute class is a flags error.
    fn check_flags(self, flags: Flags) -> Result<(), UpdateError> {
        let flags_err = UpdateError::AttributeFlagsError {
            type_code: self as u8,
            flags: flags.0,
        };
        match self {
            Self::Origin | Self::AsPath | Self::NextHop | Self::LocalPref | Self::AtomicAggregate => {
                // Well-known: mandatory transitive, never partial
                if flags.is_optional() || !flags.is_transitive() || flags.is_partial() {
                    return Err(flags_err);
                }
            }
            Self::MultiExitDisc => {
                if !flags.is_optional() || flags.is_transitive() {
                    return Err(flags_err);
                }
            }
            Self::Aggregator | Self::As4Path => {
                if !flags.is_optional() || !flags.is_transitive() {
                    return Err(flags_err);
                }
            }
        }
        Ok(())
    }

    /// Fixed-length checks for recognized attributes
    fn check_len(self, len: usize) -> Result<(), UpdateError> {
        let ok = match self {
            Self::Origin => len == 1,
            Self::NextHop | Self::MultiExitDisc | Self::LocalPref => len == 4,
            Self::AtomicAggregate => len == 0,
            Self::Aggregator => len == 6,
            Self::AsPath | Self::As4Path => true,
        };
        if ok {
            Ok(())
        } else {
            Err(UpdateError::AttributeLengthError {
                type_code: self as u8,
                len: len as u16,
            })
        }
    }
}

impl From<&Data> for u8 {
    fn from(data: &Data) -> u8 {
        match data {
            Data::Origin(_) => Type::Origin as u8,
            Data::AsPath(_) => Type::AsPath as u8,
            Data::NextHop(_) => Type::NextHop as u8,
            Data::MultiExitDisc(_) => Type::MultiExitDisc as u8,
            Data::LocalPref(_) => Type::LocalPref as u8,
            Data::AtomicAggregate => Type::AtomicAggregate as u8,
            Data::Aggregator(_) => Type::Aggregator as u8,
            Data::As4Path(_) => Type::As4Path as u8,
            Data::Unsupported(type_, _) => *type_,
        }
    }
}

/// BGP origin
#[derive(Copy, Clone, Debug, PartialEq, Primitive)]
#[repr(u8)]
pub enum Origin {
    Igp = 0,
    Egp = 1,
    Incomplete = 2,
}

impl Component for Origin {
    fn from_bytes(src: &mut Bytes) -> Result<Self, crate::Error> {
        let value = src.get_u8();
        Self::from_u8(value).ok_or(UpdateError::InvalidOriginAttribute(value).into())
    }

    fn to_bytes(self, dst: &mut bytes::BytesMut) -> usize {
        dst.put_u8(self as u8);
        self.encoded_len()
    }

    fn encoded_len(&self) -> usize {
        1
    }
}

/// BGP AS path
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AsPath(pub Vec<AsSegment>);

impl Component for AsPath {
    fn from_bytes(src: &mut Bytes) -> Result<Self, crate::Error> {
        let mut segments = Vec::new();
        while src.has_remaining() {
            segments.push(AsSegment::from_bytes(src)?);
        }
        Ok(Self(segments))
    }

    fn to_bytes(self, dst: &mut bytes::BytesMut) -> usize {
        let mut len = 0;
        for segment in self.0 {
            len += segment.to_bytes(dst);
        }
        len
    }

    fn encoded_len(&self) -> usize {
        self.0.iter().map(AsSegment::encoded_len).sum()
    }
}

impl Deref for AsPath {
    type Target = Vec<AsSegment>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsPath {
    /// All ASNs on the path in declared order, segments flattened
    #[must_use]
    pub fn asns(&self) -> Vec<u32> {
        self.0.iter().flat_map(|s| s.asns.iter().copied()).collect()
    }
}

/// BGP AS path segment (RFC 4271 Section 5.1.2, RFC 6793 Section 4)
#[derive(Clone, Debug, PartialEq)]
pub struct AsSegment {
    pub type_: AsSegmentType,
    pub asns: Vec<u32>,
    /// Set when the segment came from (or should be encoded as) a 4-byte
    /// AS path
    pub as4: bool,
}

/// BGP AS path segment type
#[derive(Copy, Clone, Debug, PartialEq, Primitive)]
#[repr(u8)]
pub enum AsSegmentType {
    AsSet = 1,
    AsSequence = 2,
    ConfedSequence = 3,
    ConfedSet = 4,
}

impl Component for AsSegment {
    fn from_bytes(src: &mut Bytes) -> Result<Self, crate::Error> {
        if src.remaining() < 2 {
            return Err(UpdateError::MalformedAsPath.into());
        }
        let type_ = src.get_u8();
        let type_ = AsSegmentType::from_u8(type_).ok_or(UpdateError::MalformedAsPath)?;
        let count = src.get_u8() as usize;
        if count == 0 {
            return Err(UpdateError::MalformedAsPath.into());
        }
        // RFC 6793 Section 4 widens path segment ASNs to 4 bytes when both
        // peers support them; the segment itself does not say which, so the
        // remaining length decides
        let remaining_len = src.remaining();
        let per_asn_len = remaining_len / count;
        let mut asns = Vec::with_capacity(count);
        let as4 = if per_asn_len == 2 {
            for _ in 0..count {
                asns.push(u32::from(src.get_u16()));
            }
            false
        } else if per_asn_len == 4 {
            for _ in 0..count {
                asns.push(src.get_u32());
            }
            true
        } else {
            return Err(UpdateError::MalformedAsPath.into());
        };
        Ok(Self { type_, asns, as4 })
    }

    fn to_bytes(self, dst: &mut bytes::BytesMut) -> usize {
        let encoded_len = self.encoded_len();
        dst.put_u8(self.type_ as u8);
        let asns_len = self.asns.len();
        dst.put_u8(u8::try_from(asns_len).expect("AS segment length overflow"));
        for asn in self.asns {
            if self.as4 {
                dst.put_u32(asn);
            } else {
                dst.put_u16(u16::try_from(asn).expect("4-byte ASN in 2-byte AS path"));
            }
        }
        encoded_len
    }

    fn encoded_len(&self) -> usize {
        2 + self.asns.len() * if self.as4 { 4 } else { 2 }
    }
}

/// BGP aggregator (RFC 4271 Section 5.1.7)
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Aggregator {
    pub asn: u16,
    pub ip: Ipv4Addr,
}

impl Component for Aggregator {
    fn from_bytes(src: &mut Bytes) -> Result<Self, crate::Error> {
        let asn = src.get_u16();
        let ip = Ipv4Addr::from_bytes(src)?;
        Ok(Self { asn, ip })
    }

    fn to_bytes(self, dst: &mut bytes::BytesMut) -> usize {
        dst.put_u16(self.asn);
        self.ip.to_bytes(dst) + 2 // 2 bytes for ASN
    }

    fn encoded_len(&self) -> usize {
        4 + 2
    }
}
