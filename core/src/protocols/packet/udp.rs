//! UDP header layout.

use crate::protocols::packet::PacketHeader;
use crate::utils::types::u16be;

/// UDP assigned protocol number.
pub const UDP_PROTOCOL: usize = 17;

/// Fixed UDP header length in bytes.
pub const UDP_HEADER_LEN: usize = 8;

/// Byte offset of the checksum field within the UDP header.
pub const UDP_CHECKSUM_OFFSET: usize = 6;

/// The UDP header, as laid out on the wire.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct UdpHeader {
    pub src_port: u16be,
    pub dst_port: u16be,
    pub length: u16be,
    pub checksum: u16be,
}

impl PacketHeader for UdpHeader {}
