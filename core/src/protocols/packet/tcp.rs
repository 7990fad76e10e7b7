//! TCP header layout.

use crate::protocols::packet::PacketHeader;
use crate::utils::types::u16be;

/// TCP assigned protocol number.
pub const TCP_PROTOCOL: usize = 6;

/// Fixed TCP header length in bytes (options are not represented here).
pub const TCP_HEADER_LEN: usize = 20;

/// Byte offset of the checksum field within the fixed TCP header.
pub const TCP_CHECKSUM_OFFSET: usize = 16;

/// The fixed portion of a TCP header, as laid out on the wire.
///
/// TCP options are not represented; the NAT rewrite path only ever touches the first 20 bytes.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct TcpHeader {
    pub src_port: u16be,
    pub dst_port: u16be,
    pub seq_no: u32,
    pub ack_no: u32,
    pub data_offset_to_ns: u8,
    pub flags: u8,
    pub window: u16be,
    pub checksum: u16be,
    pub urgent_ptr: u16be,
}

impl PacketHeader for TcpHeader {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_size_matches_wire_length() {
        assert_eq!(TcpHeader::size_of(), TCP_HEADER_LEN);
    }
}
