//! The directional flow key and its hashing (§4.A).

use crate::conntrack::ct::RouteHandle;
use crate::protocols::packet::tcp::TCP_PROTOCOL;
use crate::protocols::packet::udp::UDP_PROTOCOL;

use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::sync::Arc;

/// Layer-3 protocol of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum L3Proto {
    Ipv4,
    Ipv6,
}

/// Layer-4 protocol of a flow. Protocols other than TCP and UDP are rejected at construction
/// (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum L4Proto {
    Tcp,
    Udp,
}

impl L4Proto {
    /// Maps an IANA protocol number to an [`L4Proto`], or `None` if it is not TCP/UDP.
    pub fn from_proto_number(proto: usize) -> Option<Self> {
        match proto {
            TCP_PROTOCOL => Some(L4Proto::Tcp),
            UDP_PROTOCOL => Some(L4Proto::Udp),
            _ => None,
        }
    }

    /// Returns the IANA protocol number for this protocol.
    pub fn proto_number(self) -> usize {
        match self {
            L4Proto::Tcp => TCP_PROTOCOL,
            L4Proto::Udp => UDP_PROTOCOL,
        }
    }
}

/// Which side of a bidirectional flow a [`Tuple`] describes.
///
/// Not part of the hash key (§3): both tuples of a [`crate::FlowEntry`] differ in their address
/// and port fields by construction, so `dir` is only needed to disambiguate during a table
/// [`crate::FlowTable::walk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Original,
    Reply,
}

/// The directional flow key, plus per-direction payload that is not part of the key.
///
/// `Hash` and `Eq` are implemented by hand over the prefix of fields ending before `dir`
/// (`l3proto`, `l4proto`, `src_addr`, `dst_addr`, `src_port`, `dst_port`, `iifidx`) so that two
/// `Tuple`s differing only in `oifidx`, `mtu`, `route`, or `dir` compare equal and hash
/// identically — required for `Tuple` to be usable directly as a concurrent hash-map key.
#[derive(Clone)]
pub struct Tuple {
    pub l3proto: L3Proto,
    pub l4proto: L4Proto,
    pub src_addr: IpAddr,
    pub dst_addr: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    /// Ingress interface index. Part of the hash key.
    pub iifidx: u32,
    /// Egress interface index. NOT part of the hash key.
    pub oifidx: u32,
    /// Path MTU observed at insertion. NOT part of the hash key.
    pub mtu: u32,
    /// Reference-counted handle to the per-direction route cache. NOT part of the hash key.
    pub route: Arc<dyn RouteHandle>,
    /// Which direction of the flow this tuple represents. NOT part of the hash key.
    pub dir: Direction,
}

impl Tuple {
    /// Returns `true` if `self` and `other` share the same key prefix, ignoring `oifidx`, `mtu`,
    /// `route`, and `dir`.
    fn key_eq(&self, other: &Tuple) -> bool {
        self.l3proto == other.l3proto
            && self.l4proto == other.l4proto
            && self.src_addr == other.src_addr
            && self.dst_addr == other.dst_addr
            && self.src_port == other.src_port
            && self.dst_port == other.dst_port
            && self.iifidx == other.iifidx
    }

    /// Computes the Jenkins-class one-at-a-time hash of the key prefix (§4.A), seeded with
    /// `seed`. Stable and non-cryptographic, matching the conntrack hash family this spec is
    /// drawn from.
    pub fn jhash(&self, seed: u32) -> u32 {
        let mut bytes = Vec::with_capacity(40);
        bytes.push(self.l3proto as u8);
        bytes.push(self.l4proto as u8);
        match self.src_addr {
            IpAddr::V4(a) => bytes.extend_from_slice(&a.octets()),
            IpAddr::V6(a) => bytes.extend_from_slice(&a.octets()),
        }
        match self.dst_addr {
            IpAddr::V4(a) => bytes.extend_from_slice(&a.octets()),
            IpAddr::V6(a) => bytes.extend_from_slice(&a.octets()),
        }
        bytes.extend_from_slice(&self.src_port.to_be_bytes());
        bytes.extend_from_slice(&self.dst_port.to_be_bytes());
        bytes.extend_from_slice(&self.iifidx.to_be_bytes());
        jhash_bytes(&bytes, seed)
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.key_eq(other)
    }
}

impl Eq for Tuple {}

impl Hash for Tuple {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.l3proto.hash(state);
        self.l4proto.hash(state);
        self.src_addr.hash(state);
        self.dst_addr.hash(state);
        self.src_port.hash(state);
        self.dst_port.hash(state);
        self.iifidx.hash(state);
    }
}

impl std::fmt::Debug for Tuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tuple")
            .field("l3proto", &self.l3proto)
            .field("l4proto", &self.l4proto)
            .field("src_addr", &self.src_addr)
            .field("dst_addr", &self.dst_addr)
            .field("src_port", &self.src_port)
            .field("dst_port", &self.dst_port)
            .field("iifidx", &self.iifidx)
            .field("oifidx", &self.oifidx)
            .field("mtu", &self.mtu)
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

/// Jenkins one-at-a-time hash over a byte slice.
fn jhash_bytes(data: &[u8], seed: u32) -> u32 {
    let mut hash = seed;
    for &byte in data {
        hash = hash.wrapping_add(byte as u32);
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
    }
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 11;
    hash = hash.wrapping_add(hash << 15);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeRoute;
    use std::net::Ipv4Addr;

    fn tuple(src_port: u16, dir: Direction, iifidx: u32) -> Tuple {
        Tuple {
            l3proto: L3Proto::Ipv4,
            l4proto: L4Proto::Tcp,
            src_addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst_addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            src_port,
            dst_port: 80,
            iifidx,
            oifidx: 99,
            mtu: 1500,
            route: Arc::new(FakeRoute::new(99, 1500)),
            dir,
        }
    }

    #[test]
    fn equality_ignores_non_key_fields() {
        let a = tuple(1000, Direction::Original, 2);
        let mut b = tuple(1000, Direction::Reply, 2);
        b.oifidx = 1;
        b.mtu = 9000;
        assert_eq!(a, b);
        assert_eq!(a.jhash(0), b.jhash(0));
    }

    #[test]
    fn key_fields_change_hash() {
        let a = tuple(1000, Direction::Original, 2);
        let b = tuple(1001, Direction::Original, 2);
        assert_ne!(a, b);
    }

    #[test]
    fn iifidx_is_part_of_the_key() {
        let a = tuple(1000, Direction::Original, 2);
        let b = tuple(1000, Direction::Original, 3);
        assert_ne!(a, b);
    }

    #[test]
    fn l4proto_round_trips_proto_number() {
        assert_eq!(L4Proto::from_proto_number(TCP_PROTOCOL), Some(L4Proto::Tcp));
        assert_eq!(L4Proto::from_proto_number(UDP_PROTOCOL), Some(L4Proto::Udp));
        assert_eq!(L4Proto::from_proto_number(1), None);
        assert_eq!(L4Proto::Tcp.proto_number(), TCP_PROTOCOL);
    }
}
