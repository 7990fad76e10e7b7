#![allow(clippy::needless_doctest_main)]

//! A connection-tracking flow offload table for high speed packet forwarding.
//!
//! This crate caches established L3/L4 connections so that subsequent packets belonging to
//! those connections can bypass the full stateful firewall path and be forwarded — optionally
//! with NAT port rewrites — via a short fast path. It indexes both directions of a flow in a
//! concurrent hash table keyed by the 5-tuple plus ingress interface, garbage-collects entries
//! that expire, are torn down, or whose interface disappears, and can optionally mirror entries
//! to an external hardware-offload backend.
//!
//! The connection tracker, routing subsystem, and packet-buffer implementation are external
//! collaborators: this crate only depends on their contracts, expressed as the
//! [`ct::TrackedConn`], [`ct::RouteHandle`], and [`nat::PacketBuffer`] traits.
//!
//! A minimal control-plane flow looks like:
//!
//! ```rust
//! use flowoffload_core::config::FlowTableConfig;
//! use flowoffload_core::registry;
//!
//! let table = registry::init_table(FlowTableConfig::default()).unwrap();
//! // ... construct a FlowEntry via FlowEntry::alloc(ct, route) and table.add(entry) ...
//! registry::free_table(&table);
//! ```

pub mod config;
pub mod conntrack;
pub mod error;
pub mod gc;
pub mod hw;
pub mod nat;
pub mod protocols;
pub mod registry;
pub mod utils;

#[cfg(test)]
pub(crate) mod testutil;

pub use self::conntrack::ct;
pub use self::conntrack::devdown;
pub use self::conntrack::entry::{FlowEntry, FlowFlags};
pub use self::conntrack::table::FlowTable;
pub use self::conntrack::tuple::{Direction, L3Proto, L4Proto, Tuple};
pub use self::error::FlowError;

#[macro_use]
extern crate lazy_static;
