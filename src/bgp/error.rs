//! Notification error taxonomy
//!
//! Every protocol violation detected by the codec or the state machine maps
//! to exactly one NOTIFICATION (code, subcode) pair. The registries follow
//! RFC 4271 Section 6, extended with the FSM subcodes of RFC 6608, the Cease
//! subcodes of RFC 4486/8538 and the ROUTE-REFRESH subcode of RFC 7313.

// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::{Notification, BGP_VERSION};
use bytes::Bytes;
use enum_primitive_derive::Primitive;
use std::fmt;

/// Notification error codes
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum NotificationErrorCode {
    MessageHeaderError = 1,
    OpenMessageError = 2,
    UpdateMessageError = 3,
    HoldTimerExpired = 4,
    FiniteStateMachineError = 5,
    Cease = 6,
    RouteRefreshMessageError = 7,
}

impl fmt::Display for NotificationErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MessageHeaderError => "Message Header Error",
            Self::OpenMessageError => "OPEN Message Error",
            Self::UpdateMessageError => "UPDATE Message Error",
            Self::HoldTimerExpired => "Hold Timer Expired",
            Self::FiniteStateMachineError => "Finite State Machine Error",
            Self::Cease => "Cease",
            Self::RouteRefreshMessageError => "ROUTE-REFRESH Message Error",
        };
        f.write_str(name)
    }
}

/// Notification error subcodes for `MessageHeaderError`
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum MessageHeaderErrorSubcode {
    Unspecific = 0,
    ConnectionNotSynchronized = 1,
    BadMessageLength = 2,
    BadMessageType = 3,
}

/// Notification error subcodes for `OpenMessageError`
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum OpenMessageErrorSubcode {
    Unspecific = 0,
    UnsupportedVersionNumber = 1,
    BadPeerAs = 2,
    BadBgpIdentifier = 3,
    UnsupportedOptionalParameter = 4,
    UnacceptableHoldTime = 6,
    UnsupportedCapability = 7,
}

/// Notification error subcodes for `UpdateMessageError`
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum UpdateMessageErrorSubcode {
    Unspecific = 0,
    MalformedAttributeList = 1,
    UnrecognizedWellKnownAttribute = 2,
    MissingWellKnownAttribute = 3,
    AttributeFlagsError = 4,
    AttributeLengthError = 5,
    InvalidOriginAttribute = 6,
    AsRoutingLoop = 7,
    InvalidNextHopAttribute = 8,
    OptionalAttributeError = 9,
    InvalidNetworkField = 10,
    MalformedAsPath = 11,
}

/// Notification error subcodes for `FiniteStateMachineError` (RFC 6608)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum FsmErrorSubcode {
    UnspecifiedError = 0,
    ReceivedUnexpectedMessageInOpenSentState = 1,
    ReceivedUnexpectedMessageInOpenConfirmState = 2,
    ReceivedUnexpectedMessageInEstablishedState = 3,
}

/// Notification error subcodes for Cease (RFC 4486, RFC 8538)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum CeaseSubcode {
    MaximumNumberOfPrefixesReached = 1,
    AdministrativeShutdown = 2,
    PeerDeconfigured = 3,
    AdministrativeReset = 4,
    ConnectionRejected = 5,
    OtherConfigurationChange = 6,
    ConnectionCollisionResolution = 7,
    OutOfResources = 8,
    HardReset = 9,
}

/// Notification error subcodes for `RouteRefreshMessageError` (RFC 7313)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum RouteRefreshErrorSubcode {
    Reserved = 0,
    InvalidMessageLength = 1,
}

/// Registry name for a (code, subcode) pair, for diagnostics
#[must_use]
pub fn subcode_name(code: NotificationErrorCode, subcode: u8) -> &'static str {
    use NotificationErrorCode as Code;
    match (code, subcode) {
        (Code::MessageHeaderError, 0) => "Unspecific",
        (Code::MessageHeaderError, 1) => "Connection Not Synchronized",
        (Code::MessageHeaderError, 2) => "Bad Message Length",
        (Code::MessageHeaderError, 3) => "Bad Message Type",
        (Code::OpenMessageError, 0) => "Unspecific",
        (Code::OpenMessageError, 1) => "Unsupported Version Number",
        (Code::OpenMessageError, 2) => "Bad Peer AS",
        (Code::OpenMessageError, 3) => "Bad BGP Identifier",
        (Code::OpenMessageError, 4) => "Unsupported Optional Parameter",
        (Code::OpenMessageError, 6) => "Unacceptable Hold Time",
        (Code::OpenMessageError, 7) => "Unsupported Capability",
        (Code::UpdateMessageError, 0) => "Unspecific",
        (Code::UpdateMessageError, 1) => "Malformed Attribute List",
        (Code::UpdateMessageError, 2) => "Unrecognized Well-known Attribute",
        (Code::UpdateMessageError, 3) => "Missing Well-known Attribute",
        (Code::UpdateMessageError, 4) => "Attribute Flags Error",
        (Code::UpdateMessageError, 5) => "Attribute Length Error",
        (Code::UpdateMessageError, 6) => "Invalid ORIGIN Attribute",
        (Code::UpdateMessageError, 7) => "AS Routing Loop",
        (Code::UpdateMessageError, 8) => "Invalid NEXT_HOP Attribute",
        (Code::UpdateMessageError, 9) => "Optional Attribute Error",
        (Code::UpdateMessageError, 10) => "Invalid Network Field",
        (Code::UpdateMessageError, 11) => "Malformed AS_PATH",
        (Code::HoldTimerExpired, _) => "Hold Timer Expired",
        (Code::FiniteStateMachineError, 0) => "Unspecified Error",
        (Code::FiniteStateMachineError, 1) => "Unexpected Message in OpenSent",
        (Code::FiniteStateMachineError, 2) => "Unexpected Message in OpenConfirm",
        (Code::FiniteStateMachineError, 3) => "Unexpected Message in Established",
        (Code::Cease, 1) => "Maximum Number of Prefixes Reached",
        (Code::Cease, 2) => "Administrative Shutdown",
        (Code::Cease, 3) => "Peer De-configured",
        (Code::Cease, 4) => "Administrative Reset",
        (Code::Cease, 5) => "Connection Rejected",
        (Code::Cease, 6) => "Other Configuration Change",
        (Code::Cease, 7) => "Connection Collision Resolution",
        (Code::Cease, 8) => "Out of Resources",
        (Code::Cease, 9) => "Hard Reset",
        (Code::RouteRefreshMessageError, 1) => "Invalid Message Length",
        _ => "Unknown Subcode",
    }
}

/// Message header errors detected while framing an inbound message
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    #[error("marker is not all ones")]
    ConnectionNotSynchronized,
    #[error("message length {0} out of range")]
    BadMessageLength(u16),
    #[error("unknown message type {0}")]
    BadMessageType(u8),
}

impl HeaderError {
    #[must_use]
    pub const fn subcode(&self) -> MessageHeaderErrorSubcode {
        match self {
            Self::ConnectionNotSynchronized => MessageHeaderErrorSubcode::ConnectionNotSynchronized,
            Self::BadMessageLength(_) => MessageHeaderErrorSubcode::BadMessageLength,
            Self::BadMessageType(_) => MessageHeaderErrorSubcode::BadMessageType,
        }
    }

    /// Diagnostic data carried in the notification, per RFC 4271 Section 6.1
    #[must_use]
    pub fn data(&self) -> Bytes {
        match self {
            Self::ConnectionNotSynchronized => Bytes::new(),
            Self::BadMessageLength(len) => Bytes::copy_from_slice(&len.to_be_bytes()),
            Self::BadMessageType(type_) => Bytes::copy_from_slice(&[*type_]),
        }
    }

    #[must_use]
    pub fn to_notification(&self) -> Notification {
        Notification::new(
            NotificationErrorCode::MessageHeaderError,
            self.subcode() as u8,
            self.data(),
        )
    }
}

/// OPEN message errors detected while decoding or negotiating a session
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OpenError {
    #[error("unsupported version {0}")]
    UnsupportedVersionNumber(u8),
    #[error("bad peer AS {0}")]
    BadPeerAs(u16),
    #[error("bad BGP identifier {0}")]
    BadBgpIdentifier(u32),
    #[error("unsupported optional parameter type {0}")]
    UnsupportedOptionalParameter(u8),
    #[error("unacceptable hold time {0}")]
    UnacceptableHoldTime(u16),
    #[error("required capability {0} not supported by peer")]
    UnsupportedCapability(u8),
    #[error("malformed OPEN message")]
    Malformed,
}

impl OpenError {
    #[must_use]
    pub const fn subcode(&self) -> OpenMessageErrorSubcode {
        match self {
            Self::UnsupportedVersionNumber(_) => OpenMessageErrorSubcode::UnsupportedVersionNumber,
            Self::BadPeerAs(_) => OpenMessageErrorSubcode::BadPeerAs,
            Self::BadBgpIdentifier(_) => OpenMessageErrorSubcode::BadBgpIdentifier,
            Self::UnsupportedOptionalParameter(_) => {
                OpenMessageErrorSubcode::UnsupportedOptionalParameter
            }
            Self::UnacceptableHoldTime(_) => OpenMessageErrorSubcode::UnacceptableHoldTime,
            Self::UnsupportedCapability(_) => OpenMessageErrorSubcode::UnsupportedCapability,
            Self::Malformed => OpenMessageErrorSubcode::Unspecific,
        }
    }

    /// On a version mismatch the data field reports the highest version we
    /// accept, as a 2-octet unsigned integer (RFC 4271 Section 6.2).
    #[must_use]
    pub fn data(&self) -> Bytes {
        match self {
            Self::UnsupportedVersionNumber(_) => {
                Bytes::copy_from_slice(&u16::from(BGP_VERSION).to_be_bytes())
            }
            Self::UnsupportedCapability(code) => Bytes::copy_from_slice(&[*code]),
            _ => Bytes::new(),
        }
    }

    #[must_use]
    pub fn to_notification(&self) -> Notification {
        Notification::new(
            NotificationErrorCode::OpenMessageError,
            self.subcode() as u8,
            self.data(),
        )
    }
}

/// UPDATE message errors detected while decoding, per RFC 4271 Section 6.3
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpdateError {
    #[error("malformed attribute list")]
    MalformedAttributeList,
    #[error("unrecognized well-known attribute type {0}")]
    UnrecognizedWellKnownAttribute(u8),
    #[error("missing well-known attribute type {0}")]
    MissingWellKnownAttribute(u8),
    #[error("bad flags {flags:#04x} on attribute type {type_code}")]
    AttributeFlagsError { type_code: u8, flags: u8 },
    #[error("bad length {len} on attribute type {type_code}")]
    AttributeLengthError { type_code: u8, len: u16 },
    #[error("invalid ORIGIN value {0}")]
    InvalidOriginAttribute(u8),
    #[error("invalid NEXT_HOP attribute")]
    InvalidNextHopAttribute,
    #[error("optional attribute error")]
    OptionalAttributeError,
    #[error("invalid network field")]
    InvalidNetworkField,
    #[error("malformed AS_PATH")]
    MalformedAsPath,
}

impl UpdateError {
    #[must_use]
    pub const fn subcode(&self) -> UpdateMessageErrorSubcode {
        match self {
            Self::MalformedAttributeList => UpdateMessageErrorSubcode::MalformedAttributeList,
            Self::UnrecognizedWellKnownAttribute(_) => {
                UpdateMessageErrorSubcode::UnrecognizedWellKnownAttribute
            }
            Self::MissingWellKnownAttribute(_) => {
                UpdateMessageErrorSubcode::MissingWellKnownAttribute
            }
            Self::AttributeFlagsError { .. } => UpdateMessageErrorSubcode::AttributeFlagsError,
            Self::AttributeLengthError { .. } => UpdateMessageErrorSubcode::AttributeLengthError,
            Self::InvalidOriginAttribute(_) => UpdateMessageErrorSubcode::InvalidOriginAttribute,
            Self::InvalidNextHopAttribute => UpdateMessageErrorSubcode::InvalidNextHopAttribute,
            Self::OptionalAttributeError => UpdateMessageErrorSubcode::OptionalAttributeError,
            Self::InvalidNetworkField => UpdateMessageErrorSubcode::InvalidNetworkField,
            Self::MalformedAsPath => UpdateMessageErrorSubcode::MalformedAsPath,
        }
    }

    #[must_use]
    pub fn data(&self) -> Bytes {
        match self {
            Self::UnrecognizedWellKnownAttribute(type_code)
            | Self::MissingWellKnownAttribute(type_code) => Bytes::copy_from_slice(&[*type_code]),
            Self::AttributeFlagsError { type_code, flags } => {
                Bytes::copy_from_slice(&[*flags, *type_code])
            }
            Self::AttributeLengthError { type_code, .. } => Bytes::copy_from_slice(&[*type_code]),
            Self::InvalidOriginAttribute(origin) => Bytes::copy_from_slice(&[*origin]),
            _ => Bytes::new(),
        }
    }

    #[must_use]
    pub fn to_notification(&self) -> Notification {
        Notification::new(
            NotificationErrorCode::UpdateMessageError,
            self.subcode() as u8,
            self.data(),
        )
    }
}

/// ROUTE-REFRESH message errors (RFC 7313)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteRefreshError {
    #[error("invalid ROUTE-REFRESH message length {0}")]
    InvalidMessageLength(u16),
}

impl RouteRefreshError {
    #[must_use]
    pub fn to_notification(&self) -> Notification {
        let Self::InvalidMessageLength(len) = self;
        Notification::new(
            NotificationErrorCode::RouteRefreshMessageError,
            RouteRefreshErrorSubcode::InvalidMessageLength as u8,
            Bytes::copy_from_slice(&len.to_be_bytes()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_error_mapping() {
        let err = HeaderError::BadMessageType(9);
        let notification = err.to_notification();
        assert_eq!(
            notification.error_code,
            NotificationErrorCode::MessageHeaderError
        );
        assert_eq!(notification.error_subcode, 3);
        assert_eq!(notification.data, Bytes::from_static(&[9]));
    }

    #[test]
    fn test_bad_length_data_carries_offending_length() {
        let err = HeaderError::BadMessageLength(5000);
        assert_eq!(err.data(), Bytes::copy_from_slice(&5000u16.to_be_bytes()));
        assert_eq!(err.subcode(), MessageHeaderErrorSubcode::BadMessageLength);
    }

    #[test]
    fn test_version_error_reports_supported_version() {
        let err = OpenError::UnsupportedVersionNumber(3);
        let notification = err.to_notification();
        assert_eq!(notification.error_subcode, 1);
        assert_eq!(notification.data, Bytes::from_static(&[0x00, 0x04]));
    }

    #[test]
    fn test_subcode_names() {
        assert_eq!(
            subcode_name(NotificationErrorCode::Cease, 2),
            "Administrative Shutdown"
        );
        assert_eq!(
            subcode_name(NotificationErrorCode::FiniteStateMachineError, 2),
            "Unexpected Message in OpenConfirm"
        );
        assert_eq!(
            subcode_name(NotificationErrorCode::Cease, 42),
            "Unknown Subcode"
        );
    }
}
