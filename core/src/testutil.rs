//! In-memory fakes for the external collaborator traits, shared by unit tests across the crate.

use crate::conntrack::ct::{CtEndpoint, NatStatus, RouteHandle, TrackedConn};
use crate::conntrack::tuple::{Direction, L3Proto, L4Proto};
use crate::hw::HwOffload;
use crate::nat::PacketBuffer;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Serializes tests across modules that mutate the process-global hardware-offload slot
/// (`crate::hw`), so `cargo test`'s default parallel execution cannot interleave them.
pub(crate) fn hw_test_lock() -> &'static Mutex<()> {
    static LOCK: Mutex<()> = Mutex::new(());
    &LOCK
}

/// A fake tracked connection, addressable by a forward and reply [`SocketAddr`] pair.
pub struct FakeConn {
    orig: SocketAddr,
    reply: SocketAddr,
    l4proto: L4Proto,
    nat: NatStatus,
    dying: AtomicBool,
    refs: AtomicI64,
    offloaded: AtomicBool,
    timeout_ms: AtomicU64,
    tcp_established: AtomicBool,
    tcp_max_win_cleared: AtomicBool,
    deleted: AtomicBool,
    established_timeout: Duration,
    replied_timeout: Duration,
    orig_packets: AtomicU64,
    orig_bytes: AtomicU64,
    reply_packets: AtomicU64,
    reply_bytes: AtomicU64,
}

impl FakeConn {
    pub fn tcp(orig: &str, reply: &str, nat: NatStatus) -> Self {
        FakeConn::new(orig, reply, L4Proto::Tcp, nat)
    }

    pub fn udp(orig: &str, reply: &str, nat: NatStatus) -> Self {
        FakeConn::new(orig, reply, L4Proto::Udp, nat)
    }

    fn new(orig: &str, reply: &str, l4proto: L4Proto, nat: NatStatus) -> Self {
        FakeConn {
            orig: orig.parse().expect("valid socket addr"),
            reply: reply.parse().expect("valid socket addr"),
            l4proto,
            nat,
            dying: AtomicBool::new(false),
            refs: AtomicI64::new(0),
            offloaded: AtomicBool::new(false),
            timeout_ms: AtomicU64::new(30_000),
            tcp_established: AtomicBool::new(false),
            tcp_max_win_cleared: AtomicBool::new(false),
            deleted: AtomicBool::new(false),
            established_timeout: Duration::from_secs(60 * 60 * 12),
            replied_timeout: Duration::from_secs(60 * 60 * 24),
            orig_packets: AtomicU64::new(0),
            orig_bytes: AtomicU64::new(0),
            reply_packets: AtomicU64::new(0),
            reply_bytes: AtomicU64::new(0),
        }
    }

    pub fn kill(&self) {
        self.dying.store(true, Ordering::SeqCst);
    }

    pub fn flow_refs(&self) -> i64 {
        self.refs.load(Ordering::SeqCst)
    }

    pub fn is_offloaded(&self) -> bool {
        self.offloaded.load(Ordering::SeqCst)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    pub fn is_tcp_established(&self) -> bool {
        self.tcp_established.load(Ordering::SeqCst)
    }

    pub fn tcp_max_win_cleared(&self) -> bool {
        self.tcp_max_win_cleared.load(Ordering::SeqCst)
    }

    pub fn current_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::SeqCst))
    }

    pub fn packets(&self, dir: Direction) -> u64 {
        match dir {
            Direction::Original => self.orig_packets.load(Ordering::SeqCst),
            Direction::Reply => self.reply_packets.load(Ordering::SeqCst),
        }
    }

    pub fn bytes(&self, dir: Direction) -> u64 {
        match dir {
            Direction::Original => self.orig_bytes.load(Ordering::SeqCst),
            Direction::Reply => self.reply_bytes.load(Ordering::SeqCst),
        }
    }

    fn endpoint_of(&self, addr: SocketAddr) -> CtEndpoint {
        CtEndpoint {
            l3proto: match addr {
                SocketAddr::V4(_) => L3Proto::Ipv4,
                SocketAddr::V6(_) => L3Proto::Ipv6,
            },
            l4proto: self.l4proto,
            src_addr: addr.ip(),
            dst_addr: addr.ip(),
            src_port: addr.port(),
            dst_port: addr.port(),
        }
    }
}

impl TrackedConn for FakeConn {
    fn is_dying(&self) -> bool {
        self.dying.load(Ordering::SeqCst)
    }

    fn try_acquire(&self) -> bool {
        if self.is_dying() {
            return false;
        }
        self.refs.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn release(&self) {
        self.refs.fetch_sub(1, Ordering::SeqCst);
    }

    fn endpoint(&self, dir: Direction) -> CtEndpoint {
        match dir {
            Direction::Original => {
                let mut ep = self.endpoint_of(self.orig);
                ep.dst_addr = self.reply.ip();
                ep.dst_port = self.reply.port();
                ep
            }
            Direction::Reply => {
                let mut ep = self.endpoint_of(self.reply);
                ep.dst_addr = self.orig.ip();
                ep.dst_port = self.orig.port();
                ep
            }
        }
    }

    fn nat_status(&self) -> NatStatus {
        self.nat
    }

    fn set_offloaded(&self, offloaded: bool) {
        self.offloaded.store(offloaded, Ordering::SeqCst);
    }

    fn remaining_timeout(&self) -> Duration {
        self.current_timeout()
    }

    fn set_timeout(&self, timeout: Duration) {
        self.timeout_ms.store(timeout.as_millis() as u64, Ordering::SeqCst);
    }

    fn set_tcp_established(&self) {
        self.tcp_established.store(true, Ordering::SeqCst);
    }

    fn clear_tcp_max_win(&self) {
        self.tcp_max_win_cleared.store(true, Ordering::SeqCst);
    }

    fn delete(&self) {
        self.deleted.store(true, Ordering::SeqCst);
    }

    fn established_timeout(&self) -> Duration {
        self.established_timeout
    }

    fn replied_timeout(&self) -> Duration {
        self.replied_timeout
    }

    fn record_packet(&self, dir: Direction, bytes: usize) {
        let (packets_ctr, bytes_ctr) = match dir {
            Direction::Original => (&self.orig_packets, &self.orig_bytes),
            Direction::Reply => (&self.reply_packets, &self.reply_bytes),
        };
        packets_ctr.fetch_add(1, Ordering::SeqCst);
        bytes_ctr.fetch_add(bytes as u64, Ordering::SeqCst);
    }
}

/// A fake route/destination-cache handle with a fixed ifindex and MTU.
pub struct FakeRoute {
    ifindex: u32,
    mtu: u32,
    refuse: AtomicBool,
    refs: AtomicI64,
}

impl FakeRoute {
    pub fn new(ifindex: u32, mtu: u32) -> Self {
        FakeRoute {
            ifindex,
            mtu,
            refuse: AtomicBool::new(false),
            refs: AtomicI64::new(0),
        }
    }

    /// Makes the next `try_acquire` call fail.
    pub fn refuse(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn refs(&self) -> i64 {
        self.refs.load(Ordering::SeqCst)
    }
}

impl RouteHandle for FakeRoute {
    fn ifindex(&self) -> u32 {
        self.ifindex
    }

    fn mtu(&self) -> u32 {
        self.mtu
    }

    fn try_acquire(&self) -> bool {
        if self.refuse.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.refs.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn release(&self) {
        self.refs.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An in-memory, growable packet buffer standing in for an mbuf.
pub struct VecPacketBuffer {
    data: Mutex<Vec<u8>>,
    checksum_partial: AtomicBool,
}

impl VecPacketBuffer {
    pub fn new(data: Vec<u8>) -> Self {
        VecPacketBuffer { data: Mutex::new(data), checksum_partial: AtomicBool::new(false) }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data.into_inner().expect("lock not poisoned")
    }

    /// Flags this buffer as carrying a partial (hardware-offloaded) checksum.
    pub fn mark_checksum_partial(&self) {
        self.checksum_partial.store(true, Ordering::SeqCst);
    }
}

impl PacketBuffer for VecPacketBuffer {
    fn len(&self) -> usize {
        self.data.lock().expect("lock not poisoned").len()
    }

    fn read_u16_at(&self, offset: usize) -> Option<u16> {
        let data = self.data.lock().expect("lock not poisoned");
        if offset + 2 > data.len() {
            return None;
        }
        Some(u16::from_be_bytes([data[offset], data[offset + 1]]))
    }

    fn write_u16_at(&self, offset: usize, value: u16) -> bool {
        let mut data = self.data.lock().expect("lock not poisoned");
        if offset + 2 > data.len() {
            return false;
        }
        let bytes = value.to_be_bytes();
        data[offset] = bytes[0];
        data[offset + 1] = bytes[1];
        true
    }

    fn is_checksum_partial(&self) -> bool {
        self.checksum_partial.load(Ordering::SeqCst)
    }
}

/// A fake hardware-offload backend that records every `add`/`del` call.
#[derive(Default)]
pub struct FakeHwOffload {
    adds: AtomicUsize,
    dels: AtomicUsize,
    fail_add: AtomicBool,
}

impl FakeHwOffload {
    pub fn new() -> Self {
        FakeHwOffload::default()
    }

    pub fn fail_next_add(&self) {
        self.fail_add.store(true, Ordering::SeqCst);
    }

    pub fn adds(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }

    pub fn dels(&self) -> usize {
        self.dels.load(Ordering::SeqCst)
    }
}

impl HwOffload for FakeHwOffload {
    fn add(&self, _entry: &crate::FlowEntry) -> bool {
        if self.fail_add.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.adds.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn del(&self, _entry: &crate::FlowEntry) {
        self.dels.fetch_add(1, Ordering::SeqCst);
    }
}
