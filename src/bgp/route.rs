//! BGP IPv4 prefix lists
//!
//! The same compact encoding backs both the withdrawn-routes field and the
//! NLRI field of an UPDATE: a prefix length in bits followed by the minimum
//! number of whole octets carrying the prefix.

// SPDX-License-Identifier: AGPL-3.0-or-later

use super::endec::Component;
use crate::error::UpdateError;
use bytes::{Buf, BufMut, Bytes};
use std::fmt;
use std::net::Ipv4Addr;
use std::ops::Deref;

/// Compute the number of prefix octets from the prefix length
const fn n_prefix_octets(prefix_len: u8) -> usize {
    ((prefix_len as usize) + 7) / 8
}

/// One encoded route: a prefix length in bits and the prefix octets
#[derive(Clone, Debug, PartialEq)]
pub struct Value {
    pub prefix_len: u8,
    pub prefix: Bytes,
}

impl Value {
    /// Expand the truncated prefix octets back into an address
    #[must_use]
    pub fn to_cidr(&self) -> Cidr4 {
        let mut octets = [0u8; 4];
        octets[..self.prefix.len()].copy_from_slice(&self.prefix);
        Cidr4 {
            addr: Ipv4Addr::from(octets),
            prefix_len: self.prefix_len,
        }
    }
}

/// A list of routes without a leading length field; the caller delimits
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Routes(pub Vec<Value>);

impl Component for Routes {
    fn from_bytes(src: &mut bytes::Bytes) -> Result<Self, crate::Error> {
        let mut routes = Vec::new();
        while src.has_remaining() {
            let prefix_len = src.get_u8();
            if prefix_len > 32 {
                return Err(UpdateError::InvalidNetworkField.into());
            }
            let n_prefix_octets = n_prefix_octets(prefix_len);
            if src.remaining() < n_prefix_octets {
                return Err(UpdateError::InvalidNetworkField.into());
            }
            let prefix = src.split_to(n_prefix_octets);
            routes.push(Value { prefix_len, prefix });
        }
        Ok(Self(routes))
    }

    fn to_bytes(self, dst: &mut bytes::BytesMut) -> usize {
        let mut len = 0;
        for route in self.0 {
            dst.put_u8(route.prefix_len);
            dst.put_slice(&route.prefix);
            len += 1 + route.prefix.len();
        }
        len
    }

    fn encoded_len(&self) -> usize {
        self.0.iter().map(|r| 1 + r.prefix.len()).sum()
    }
}

impl Deref for Routes {
    type Target = Vec<Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<I, T> From<I> for Routes
where
    I: IntoIterator<Item = T>,
    T: Into<Value>,
{
    fn from(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// An IPv4 CIDR block
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Cidr4 {
    pub addr: Ipv4Addr,
    pub prefix_len: u8,
}

impl fmt::Display for Cidr4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl From<Cidr4> for Value {
    fn from(cidr: Cidr4) -> Self {
        let prefix_len = cidr.prefix_len;
        let n_prefix_octets = n_prefix_octets(prefix_len);
        let prefix = Bytes::copy_from_slice(&cidr.addr.octets()[..n_prefix_octets]);
        Self { prefix_len, prefix }
    }
}

impl From<&Cidr4> for Value {
    fn from(cidr: &Cidr4) -> Self {
        Self::from(*cidr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::hex_to_bytes;
    use bytes::BytesMut;

    #[test]
    fn test_convert_cidr_to_route_on_boundary() {
        let cidr = Cidr4 {
            addr: "127.0.0.0".parse().unwrap(),
            prefix_len: 8,
        };
        let route = Value::from(cidr);
        assert_eq!(route.prefix, hex_to_bytes("7f"));
        assert_eq!(route.prefix_len, 8);
        assert_eq!(route.to_cidr(), cidr);
    }

    #[test]
    fn test_convert_cidr_to_route_off_boundary() {
        let cidr = Cidr4 {
            addr: "172.24.0.0".parse().unwrap(),
            prefix_len: 12,
        };
        let route = Value::from(cidr);
        assert_eq!(route.prefix, hex_to_bytes("ac18"));
        assert_eq!(route.prefix_len, 12);
        assert_eq!(route.to_cidr(), cidr);
    }

    #[test]
    fn test_routes_round_trip() {
        let routes_bytes = hex_to_bytes(
            "
        18 cb1441
        0f 31d0
        16 2d7a5c
        11 2abb80
        16 ca4d5c
        14 65cbb0
        ",
        );
        let routes = Routes::from_bytes(&mut routes_bytes.clone()).unwrap();
        assert_eq!(routes.0.len(), 6);
        assert_eq!(
            routes.0[0],
            Value::from(Cidr4 {
                addr: "203.20.65.0".parse().unwrap(),
                prefix_len: 24
            })
        );
        assert_eq!(
            routes.0[1],
            Value::from(Cidr4 {
                addr: "49.208.0.0".parse().unwrap(),
                prefix_len: 15
            })
        );
        assert_eq!(
            routes.0[5],
            Value::from(Cidr4 {
                addr: "101.203.176.0".parse().unwrap(),
                prefix_len: 20
            })
        );
        let mut bytes = BytesMut::new();
        let len = routes.clone().to_bytes(&mut bytes);
        assert_eq!(len, routes.encoded_len());
        assert_eq!(bytes.freeze(), routes_bytes);
    }

    #[test]
    fn test_overlong_prefix_rejected() {
        let mut src = hex_to_bytes("21 0a000001 00");
        assert!(matches!(
            Routes::from_bytes(&mut src),
            Err(crate::Error::Update(UpdateError::InvalidNetworkField))
        ));
    }

    #[test]
    fn test_truncated_prefix_rejected() {
        let mut src = hex_to_bytes("18 0a01");
        assert!(matches!(
            Routes::from_bytes(&mut src),
            Err(crate::Error::Update(UpdateError::InvalidNetworkField))
        ));
    }
}
