//! Packet-level protocol definitions used by the NAT rewrite path.

pub mod packet;
