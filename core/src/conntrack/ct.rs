//! Contracts for the external connection tracker and routing subsystem (§1, §4.B).
//!
//! This crate does not implement connection tracking or routing; it only depends on these two
//! traits. A real embedding supplies implementations backed by its own conntrack table and FIB,
//! each internally atomic with respect to the refcounting and timeout fields below.

use crate::conntrack::tuple::{Direction, L3Proto, L4Proto};

use std::net::IpAddr;
use std::time::Duration;

/// Which kind of NAT, if any, a tracked connection has applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NatStatus {
    None,
    Snat,
    Dnat,
    Both,
}

impl NatStatus {
    /// Returns `true` if source NAT is in effect.
    pub fn has_snat(self) -> bool {
        matches!(self, NatStatus::Snat | NatStatus::Both)
    }

    /// Returns `true` if destination NAT is in effect.
    pub fn has_dnat(self) -> bool {
        matches!(self, NatStatus::Dnat | NatStatus::Both)
    }
}

/// The per-direction L3/L4 fields of a tracked connection, used to fill a [`crate::Tuple`] at
/// [`crate::FlowEntry::alloc`] time (§4.B step 3).
#[derive(Debug, Clone, Copy)]
pub struct CtEndpoint {
    pub l3proto: L3Proto,
    pub l4proto: L4Proto,
    pub src_addr: IpAddr,
    pub dst_addr: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
}

/// A reference-counted handle to a tracked connection (`ct`).
///
/// Implementations are responsible for their own internal atomicity: [`try_acquire`] and
/// [`release`] must together behave like a saturating-from-zero refcount that additionally
/// refuses to increment once [`is_dying`] would return `true` (§4.B precondition).
///
/// [`try_acquire`]: TrackedConn::try_acquire
/// [`release`]: TrackedConn::release
/// [`is_dying`]: TrackedConn::is_dying
pub trait TrackedConn: Send + Sync {
    /// Returns `true` if the connection is already being torn down by the connection tracker.
    fn is_dying(&self) -> bool;

    /// Attempts to take the one refcount a [`crate::FlowEntry`] holds on this connection for its
    /// lifetime in the table. Returns `false` (without side effects) if the connection is dying.
    fn try_acquire(&self) -> bool;

    /// Releases the refcount taken by [`try_acquire`](TrackedConn::try_acquire). Called exactly
    /// once, when the owning [`crate::FlowEntry`] is removed from its table.
    fn release(&self);

    /// Returns the per-direction L3/L4 fields used to populate a [`crate::Tuple`].
    fn endpoint(&self, dir: Direction) -> CtEndpoint;

    /// Returns the NAT status recorded on this connection at offload time.
    fn nat_status(&self) -> NatStatus;

    /// Sets or clears the "is offloaded to the fast path" bit (§4.C-remove step (c)).
    fn set_offloaded(&self, offloaded: bool);

    /// Returns the time remaining before this connection's current timeout expires.
    fn remaining_timeout(&self) -> Duration;

    /// Sets `ct.timeout = now + timeout` (§4.C L4 fix-up, §4.D refresh).
    fn set_timeout(&self, timeout: Duration);

    /// TCP fix-up: sets the connection's TCP state to ESTABLISHED (§4.C L4 fix-up). A no-op for
    /// UDP connections.
    fn set_tcp_established(&self);

    /// TCP fix-up: clears `td_maxwin` for both endpoints, so the slow path resynchronises window
    /// tracking instead of trusting stale fast-path state (§4.C L4 fix-up). A no-op for UDP.
    fn clear_tcp_max_win(&self);

    /// Asks the connection tracker to delete this connection outright (§3 DYING semantics).
    fn delete(&self);

    /// The connection tracker's configured ESTABLISHED timeout, used to restore a TCP
    /// connection's timeout on removal when TEARDOWN is not set (§4.C L4 fix-up).
    fn established_timeout(&self) -> Duration;

    /// The connection tracker's configured REPLIED timeout, used to restore a UDP connection's
    /// timeout on removal when TEARDOWN is not set (§4.C L4 fix-up).
    fn replied_timeout(&self) -> Duration;

    /// Accounts one forwarded packet of `bytes` length in direction `dir`: increments that
    /// direction's packet counter by one and its byte counter by `bytes` (§5, §6 `acct`).
    fn record_packet(&self, dir: Direction, bytes: usize);
}

/// A reference-counted handle to a per-direction destination cache entry.
pub trait RouteHandle: Send + Sync {
    /// Interface index for this direction's route (used as this direction's ingress index and
    /// the opposite direction's egress index — see [`crate::FlowEntry::alloc`]).
    fn ifindex(&self) -> u32;

    /// Path MTU for this direction (IPv4: forward-path MTU accounting for DF; IPv6: forwarding
    /// MTU — computed by the routing subsystem, not by this crate).
    fn mtu(&self) -> u32;

    /// Attempts to take a reference on this route handle (§4.B step 2). Returns `false` if the
    /// destination cache entry can no longer be held, e.g. because it is being torn down
    /// concurrently. Most implementations can always succeed.
    fn try_acquire(&self) -> bool {
        true
    }

    /// Releases the reference taken by [`try_acquire`](RouteHandle::try_acquire).
    fn release(&self) {}
}
