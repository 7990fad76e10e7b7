//! A bidirectional cached connection (§3, §4.B).

use crate::conntrack::ct::{NatStatus, RouteHandle, TrackedConn};
use crate::conntrack::tuple::{Direction, L4Proto, Tuple};
use crate::error::FlowError;

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

lazy_static! {
    /// Process-wide monotonic anchor so `timeout_deadline` can live in an `AtomicU64` of
    /// milliseconds rather than requiring an atomic `Instant` (which the standard library does
    /// not provide).
    static ref CLOCK_START: Instant = Instant::now();
}

fn now_millis() -> u64 {
    CLOCK_START.elapsed().as_millis() as u64
}

/// One directional hash-table link node: a [`Tuple`] paired with the direction it represents.
///
/// In a C conntrack implementation this would be an intrusive list node embedded in the entry
/// (§9); here it is simply the `Tuple`, which already carries its own `dir` field and is cloned
/// directly into the concurrent index.
pub struct TupleHash {
    pub tuple: Tuple,
}

/// Bitset over the flags described in §3.
///
/// Backed by an `AtomicU8` per §5 ("per-flow flags are set via atomic bit operations").
#[derive(Debug)]
pub struct FlowFlags(AtomicU8);

impl FlowFlags {
    pub const SNAT: u8 = 0b0000_0001;
    pub const DNAT: u8 = 0b0000_0010;
    pub const DYING: u8 = 0b0000_0100;
    pub const TEARDOWN: u8 = 0b0000_1000;
    pub const KEEP: u8 = 0b0001_0000;
    pub const HW: u8 = 0b0010_0000;

    fn new(bits: u8) -> Self {
        FlowFlags(AtomicU8::new(bits))
    }

    /// Returns `true` if every bit in `mask` is set.
    pub fn contains(&self, mask: u8) -> bool {
        self.0.load(Ordering::Acquire) & mask == mask
    }

    /// Returns `true` if any bit in `mask` is set.
    pub fn intersects(&self, mask: u8) -> bool {
        self.0.load(Ordering::Acquire) & mask != 0
    }

    pub fn set(&self, mask: u8) {
        self.0.fetch_or(mask, Ordering::AcqRel);
    }

    pub fn clear(&self, mask: u8) {
        self.0.fetch_and(!mask, Ordering::AcqRel);
    }

    pub fn bits(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }
}

/// A single bidirectional cached connection, owning one conntrack reference and two route
/// handles (§3).
pub struct FlowEntry {
    tuplehash: [TupleHash; 2],
    flags: FlowFlags,
    timeout_deadline_ms: AtomicU64,
    ct: Arc<dyn TrackedConn>,
}

impl FlowEntry {
    /// Constructs a new `FlowEntry` from a tracked connection and a two-direction route
    /// descriptor (§4.B).
    ///
    /// Acquires one refcount on `ct` and one on each route handle; on any failure, unwinds in
    /// reverse order, releasing whatever was already acquired, and returns the corresponding
    /// [`FlowError`].
    pub fn alloc(
        ct: Arc<dyn TrackedConn>,
        route: [Arc<dyn RouteHandle>; 2],
    ) -> Result<Arc<FlowEntry>, FlowError> {
        if !ct.try_acquire() {
            return Err(FlowError::DyingConnection);
        }

        let [route_orig, route_reply] = route;
        if !route_orig.try_acquire() {
            ct.release();
            return Err(FlowError::ResourceExhaustion);
        }
        if !route_reply.try_acquire() {
            route_orig.release();
            ct.release();
            return Err(FlowError::ResourceExhaustion);
        }

        let orig_ep = ct.endpoint(Direction::Original);
        let reply_ep = ct.endpoint(Direction::Reply);

        let orig_tuple = Tuple {
            l3proto: orig_ep.l3proto,
            l4proto: orig_ep.l4proto,
            src_addr: orig_ep.src_addr,
            dst_addr: orig_ep.dst_addr,
            src_port: orig_ep.src_port,
            dst_port: orig_ep.dst_port,
            iifidx: route_orig.ifindex(),
            oifidx: route_reply.ifindex(),
            mtu: route_orig.mtu(),
            route: route_orig.clone(),
            dir: Direction::Original,
        };
        let reply_tuple = Tuple {
            l3proto: reply_ep.l3proto,
            l4proto: reply_ep.l4proto,
            src_addr: reply_ep.src_addr,
            dst_addr: reply_ep.dst_addr,
            src_port: reply_ep.src_port,
            dst_port: reply_ep.dst_port,
            iifidx: route_reply.ifindex(),
            oifidx: route_orig.ifindex(),
            mtu: route_reply.mtu(),
            route: route_reply,
            dir: Direction::Reply,
        };

        let nat = ct.nat_status();
        let mut flags = 0u8;
        if nat.has_snat() {
            flags |= FlowFlags::SNAT;
        }
        if nat.has_dnat() {
            flags |= FlowFlags::DNAT;
        }

        log::debug!(
            "flow entry allocated: orig={:?} reply={:?} flags={:#04x}",
            orig_tuple,
            reply_tuple,
            flags
        );

        Ok(Arc::new(FlowEntry {
            tuplehash: [TupleHash { tuple: orig_tuple }, TupleHash { tuple: reply_tuple }],
            flags: FlowFlags::new(flags),
            timeout_deadline_ms: AtomicU64::new(0),
            ct,
        }))
    }

    /// Returns the tuple for the given direction.
    pub fn tuple(&self, dir: Direction) -> &Tuple {
        &self.tuplehash[dir as usize].tuple
    }

    /// Returns both tuples, original first.
    pub fn tuples(&self) -> [&Tuple; 2] {
        [&self.tuplehash[0].tuple, &self.tuplehash[1].tuple]
    }

    /// Returns the flag bitset.
    pub fn flags(&self) -> &FlowFlags {
        &self.flags
    }

    /// Returns the owned conntrack handle.
    pub fn ct(&self) -> &Arc<dyn TrackedConn> {
        &self.ct
    }

    /// Returns `true` if the entry is logically gone from the table's perspective (§3, §4.C
    /// lookup).
    pub fn is_dying_or_teardown(&self) -> bool {
        self.flags.intersects(FlowFlags::DYING | FlowFlags::TEARDOWN)
    }

    /// Marks the entry DYING: unreachable via lookup immediately, removed and its `ct` deleted on
    /// the next GC pass (§3).
    pub fn mark_dying(&self) {
        self.flags.set(FlowFlags::DYING);
    }

    /// Marks the entry TEARDOWN: unreachable via lookup immediately, removed (without deleting
    /// `ct`) on the next GC pass, restoring `ct`'s L4 state (§3).
    pub fn mark_teardown(&self) {
        self.flags.set(FlowFlags::TEARDOWN);
    }

    /// The control-plane `teardown` operation (§6): marks the entry TEARDOWN and immediately runs
    /// the L4 fix-up on `ct`, rather than waiting for the GC pass that eventually unlinks it.
    ///
    /// `FlowTable::remove` only runs the fix-up when TEARDOWN is *not* set (it is the removal path
    /// for an entry dying of old age, where the fix-up still needs to happen exactly once); an
    /// entry explicitly torn down via this method has already had its fix-up done here, so removal
    /// skips it and only releases resources.
    pub fn teardown(&self) {
        self.mark_teardown();
        self.restore_ct_l4_state();
    }

    /// Sets KEEP: the GC will never evict this entry based on expiry (§3).
    pub fn set_keep(&self) {
        self.flags.set(FlowFlags::KEEP);
    }

    /// Clears KEEP.
    pub fn clear_keep(&self) {
        self.flags.clear(FlowFlags::KEEP);
    }

    /// Returns `true` once this entry has been pushed to the hardware sink.
    pub fn is_hw_offloaded(&self) -> bool {
        self.flags.contains(FlowFlags::HW)
    }

    pub(crate) fn mark_hw_offloaded(&self) {
        self.flags.set(FlowFlags::HW);
    }

    /// Stamps `timeout_deadline = now + default_timeout` (§4.C-add).
    pub fn stamp_deadline(&self, default_timeout: Duration) {
        self.timeout_deadline_ms
            .store(now_millis() + default_timeout.as_millis() as u64, Ordering::Release);
    }

    /// Refreshes `timeout_deadline` to `now + default_timeout`. Called by the data-plane hook on
    /// every forwarded packet (§4.D); out of this crate's own data path, but exposed for an
    /// embedder to call.
    pub fn refresh_deadline(&self, default_timeout: Duration) {
        self.stamp_deadline(default_timeout);
    }

    /// Returns `true` if `now >= timeout_deadline` (§4.D step 4).
    pub fn is_expired(&self) -> bool {
        now_millis() >= self.timeout_deadline_ms.load(Ordering::Acquire)
    }

    /// Restores `ct`'s L4 state on removal when TEARDOWN is not set (§4.C L4 fix-up).
    pub(crate) fn restore_ct_l4_state(&self) {
        let l4proto = self.tuple(Direction::Original).l4proto;
        let timeout = match l4proto {
            L4Proto::Tcp => {
                self.ct.set_tcp_established();
                self.ct.clear_tcp_max_win();
                self.ct.established_timeout()
            }
            L4Proto::Udp => self.ct.replied_timeout(),
        };
        self.ct.set_timeout(timeout);
    }
}

impl std::fmt::Debug for FlowEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowEntry")
            .field("orig", &self.tuplehash[0].tuple)
            .field("reply", &self.tuplehash[1].tuple)
            .field("flags", &format_args!("{:#04x}", self.flags.bits()))
            .finish()
    }
}
