//! NAT port rewrite with RFC-1624 incremental checksum fix-up (§4.E).

use crate::conntrack::entry::FlowEntry;
use crate::conntrack::tuple::{Direction, L4Proto};
use crate::protocols::packet::tcp::{TCP_CHECKSUM_OFFSET, TCP_HEADER_LEN};
use crate::protocols::packet::udp::{UDP_CHECKSUM_OFFSET, UDP_HEADER_LEN};

/// The sentinel outcome of a data-plane NAT rewrite attempt (§4.J, §7).
///
/// Deliberately not a `Result`: a dropped packet on this path is an expected, high-frequency
/// outcome (a malformed or truncated header), not an exceptional error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NatResult {
    Ok,
    Drop,
}

/// Which port field (and hence which header half) a rewrite targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PortField {
    Source,
    Destination,
}

/// A writable, randomly-addressable view onto packet bytes, standing in for an mbuf/skb (§1).
///
/// Implementations are responsible for reporting their own bounds; `read_u16_at`/`write_u16_at`
/// return `None`/`false` (rather than panicking) when `offset + 2` exceeds the buffer, which is
/// this crate's substitute for the kernel's "pull/make-writable" contiguity check (§4.E step 1).
pub trait PacketBuffer {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads a big-endian 16-bit value at `offset`. `None` if out of bounds.
    fn read_u16_at(&self, offset: usize) -> Option<u16>;

    /// Writes a big-endian 16-bit value at `offset`. `false` if out of bounds.
    fn write_u16_at(&self, offset: usize, value: u16) -> bool;

    /// Returns `true` if the packet is flagged for partial (hardware-offloaded) checksum
    /// computation. A UDP checksum fix-up must still run the incremental replace in this case even
    /// though the on-wire checksum field reads zero, since the final checksum is computed later by
    /// hardware from whatever partial state is left here (§4.E).
    fn is_checksum_partial(&self) -> bool {
        false
    }
}

const TCP_SRC_PORT_OFFSET: usize = 0;
const TCP_DST_PORT_OFFSET: usize = 2;
const UDP_SRC_PORT_OFFSET: usize = 0;
const UDP_DST_PORT_OFFSET: usize = 2;

/// Rewrites the *source* port to the mirror direction's destination port (§4.E snat).
pub fn snat_port(
    flow: &FlowEntry,
    pkt: &dyn PacketBuffer,
    thoff: usize,
    proto: L4Proto,
    dir: Direction,
) -> NatResult {
    let mirror = match dir {
        Direction::Original => flow.tuple(Direction::Reply).dst_port,
        Direction::Reply => flow.tuple(Direction::Original).src_port,
    };
    rewrite_port(pkt, thoff, proto, PortField::Source, mirror)
}

/// Rewrites the *destination* port to the mirror direction's source port (§4.E dnat).
pub fn dnat_port(
    flow: &FlowEntry,
    pkt: &dyn PacketBuffer,
    thoff: usize,
    proto: L4Proto,
    dir: Direction,
) -> NatResult {
    let mirror = match dir {
        Direction::Original => flow.tuple(Direction::Reply).src_port,
        Direction::Reply => flow.tuple(Direction::Original).dst_port,
    };
    rewrite_port(pkt, thoff, proto, PortField::Destination, mirror)
}

/// Accounts one forwarded packet on the data-plane path: increments `flow`'s underlying
/// connection's per-direction packet counter by one and byte counter by `pkt.len()` (§5, §6).
pub fn acct(flow: &FlowEntry, pkt: &dyn PacketBuffer, dir: Direction) {
    flow.ct().record_packet(dir, pkt.len());
}

fn rewrite_port(
    pkt: &dyn PacketBuffer,
    thoff: usize,
    proto: L4Proto,
    field: PortField,
    new_port: u16,
) -> NatResult {
    let header_len = match proto {
        L4Proto::Tcp => TCP_HEADER_LEN,
        L4Proto::Udp => UDP_HEADER_LEN,
    };
    if pkt.len() < thoff + header_len {
        log::warn!("NAT rewrite dropped: packet too short for {:?} header at thoff={}", proto, thoff);
        return NatResult::Drop;
    }

    let port_offset = thoff
        + match (proto, field) {
            (L4Proto::Tcp, PortField::Source) => TCP_SRC_PORT_OFFSET,
            (L4Proto::Tcp, PortField::Destination) => TCP_DST_PORT_OFFSET,
            (L4Proto::Udp, PortField::Source) => UDP_SRC_PORT_OFFSET,
            (L4Proto::Udp, PortField::Destination) => UDP_DST_PORT_OFFSET,
        };

    let old_port = match pkt.read_u16_at(port_offset) {
        Some(p) => p,
        None => return NatResult::Drop,
    };
    if !pkt.write_u16_at(port_offset, new_port) {
        return NatResult::Drop;
    }

    match proto {
        L4Proto::Tcp => fixup_tcp_checksum(pkt, thoff, old_port, new_port),
        L4Proto::Udp => fixup_udp_checksum(pkt, thoff, old_port, new_port),
    }
}

fn fixup_tcp_checksum(pkt: &dyn PacketBuffer, thoff: usize, old_port: u16, new_port: u16) -> NatResult {
    let checksum_offset = thoff + TCP_CHECKSUM_OFFSET;
    let old_checksum = match pkt.read_u16_at(checksum_offset) {
        Some(c) => c,
        None => return NatResult::Drop,
    };
    let new_checksum = incremental_checksum_replace(old_checksum, old_port, new_port);
    if !pkt.write_u16_at(checksum_offset, new_checksum) {
        return NatResult::Drop;
    }
    NatResult::Ok
}

fn fixup_udp_checksum(pkt: &dyn PacketBuffer, thoff: usize, old_port: u16, new_port: u16) -> NatResult {
    let checksum_offset = thoff + UDP_CHECKSUM_OFFSET;
    let old_checksum = match pkt.read_u16_at(checksum_offset) {
        Some(c) => c,
        None => return NatResult::Drop,
    };
    // UDP/IPv4 may legitimately carry a zero checksum meaning "not computed"; leave it alone,
    // unless the packet is flagged for partial (hardware-offloaded) checksum computation, in
    // which case the incremental replace must still run on whatever partial state is present.
    if old_checksum == 0 && !pkt.is_checksum_partial() {
        return NatResult::Ok;
    }
    let mut new_checksum = incremental_checksum_replace(old_checksum, old_port, new_port);
    if new_checksum == 0 {
        // UDP cannot carry an all-zero checksum over IPv4 (it would mean "absent"); substitute
        // the canonical mangled value per RFC 768.
        new_checksum = 0xFFFF;
    }
    if !pkt.write_u16_at(checksum_offset, new_checksum) {
        return NatResult::Drop;
    }
    NatResult::Ok
}

/// RFC-1624 incremental 16-bit one's-complement checksum update for a single 16-bit field
/// change: `new_checksum = ~(~old_checksum + ~old_word + new_word)`, folded to 16 bits.
fn incremental_checksum_replace(old_checksum: u16, old_word: u16, new_word: u16) -> u16 {
    let mut sum = u32::from(!old_checksum) + u32::from(!old_word) + u32::from(new_word);
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}
