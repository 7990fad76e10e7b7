//! Fixed-header layouts for the transport protocols the NAT rewrite path understands.
//!
//! The structure of this module is adapted from
//! [capsule::packets](https://docs.rs/capsule/0.1.5/capsule/packets/index.html) and
//! [pnet::packet](https://docs.rs/pnet/latest/pnet/packet/index.html), but unlike a full packet
//! parser this module only describes the byte layout of the fields [`crate::nat`] needs to read
//! and rewrite in place: source/destination port and checksum. Parsing a full protocol stack out
//! of a live packet buffer is the job of the external packet-buffer subsystem (§1, out of
//! scope); this crate is handed an offset into an already-classified buffer.

pub mod tcp;
pub mod udp;

/// Represents a fixed-size packet header.
pub trait PacketHeader {
    /// Size of the header in bytes.
    fn size_of() -> usize
    where
        Self: Sized,
    {
        std::mem::size_of::<Self>()
    }
}
