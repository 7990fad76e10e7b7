//! The concurrent two-direction hash-indexed table (§4.C).

use crate::config::FlowTableConfig;
use crate::conntrack::entry::{FlowEntry, FlowFlags};
use crate::conntrack::tuple::{Direction, Tuple};
use crate::gc::GcWorker;
use crate::hw;

use dashmap::DashMap;
use std::sync::{Arc, Mutex};

/// The hash-indexed set of cached flows for one netfilter ruleset.
///
/// Both tuples of a [`FlowEntry`] are inserted as independent keys mapping to clones of the same
/// `Arc<FlowEntry>` (§9: "the table maps each `Tuple` to a cloned `Arc<FlowEntry>`"). A reader's
/// own clone, taken under [`lookup`](FlowTable::lookup), keeps the entry alive past unlink —
/// this crate's safe-Rust stand-in for an RCU grace period (§5).
pub struct FlowTable {
    index: DashMap<Tuple, Arc<FlowEntry>>,
    config: FlowTableConfig,
    hw: bool,
    gc: Mutex<Option<GcWorker>>,
}

impl FlowTable {
    /// Constructs an empty table with no running GC worker. If `config.hw` is set, a
    /// hardware-offload backend must already be registered via [`crate::hw::register`] (§4.F
    /// "per-table setup").
    ///
    /// Used directly by unit tests that want to drive GC passes manually via [`crate::gc::sweep`];
    /// [`crate::registry::init_table`] is the production entry point and additionally starts the
    /// background worker via [`FlowTable::start_gc`].
    pub(crate) fn new(config: FlowTableConfig) -> Self {
        let hw = config.hw;
        FlowTable { index: DashMap::new(), config, hw, gc: Mutex::new(None) }
    }

    /// Spawns this table's dedicated GC worker thread. Must be called at most once, immediately
    /// after wrapping a freshly constructed table in an `Arc` (§4.H `init_table`).
    pub(crate) fn start_gc(table: &Arc<FlowTable>) {
        let worker = GcWorker::spawn(table.clone(), table.config.gc_tick_interval);
        *table.gc.lock().expect("lock not poisoned") = Some(worker);
    }

    /// Forces an immediate GC pass on this table's worker and blocks until it completes (§4.G,
    /// §4.H). A no-op if the table has no running GC worker.
    pub fn flush_gc(&self) {
        if let Some(worker) = self.gc.lock().expect("lock not poisoned").as_ref() {
            worker.flush();
        }
    }

    /// Stops this table's GC worker, if any (§4.H `free_table`).
    pub(crate) fn stop_gc(&self) {
        *self.gc.lock().expect("lock not poisoned") = None;
    }

    /// Returns the configuration this table was created with.
    pub fn config(&self) -> &FlowTableConfig {
        &self.config
    }

    /// Returns `true` if this table was created with the HW flag.
    pub fn hw_enabled(&self) -> bool {
        self.hw
    }

    /// Returns the number of tuple entries currently indexed (two per live [`FlowEntry`]).
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Inserts `entry`'s two directions into the hash index (§4.C-add).
    ///
    /// Stamps `ct`'s timeout to the configured offload refresh window and `entry`'s own
    /// `timeout_deadline` to `now + default_timeout`, then publishes both tuples.
    pub fn add(&self, entry: Arc<FlowEntry>) {
        entry.ct().set_timeout(self.config.ct_offload_refresh_timeout);
        entry.stamp_deadline(self.config.default_timeout);

        let [orig, reply] = entry.tuples();
        self.index.insert(orig.clone(), entry.clone());
        self.index.insert(reply.clone(), entry.clone());
        log::debug!("flow table add: orig={:?} reply={:?}", orig, reply);
    }

    /// Looks up `key` in either direction. Returns `None` if no entry matches, or if the
    /// matching entry has DYING or TEARDOWN set (§4.C-lookup: "the entry is logically gone").
    pub fn lookup(&self, key: &Tuple) -> Option<Arc<FlowEntry>> {
        let entry = self.index.get(key).map(|e| e.clone())?;
        if entry.is_dying_or_teardown() {
            return None;
        }
        Some(entry)
    }

    /// Removes `entry` from the index and releases its owned resources (§4.C-remove).
    ///
    /// Idempotent with respect to the hash index: a second call finds nothing to unlink and is a
    /// no-op beyond the (harmless) redundant `ct`/route release, which callers must avoid by
    /// only ever calling `remove` once per entry (§8 invariant 5).
    pub fn remove(&self, entry: &Arc<FlowEntry>) {
        if entry.flags().contains(FlowFlags::HW) {
            if let Some(backend) = hw::current() {
                backend.del(entry);
            }
        }

        let [orig, reply] = entry.tuples();
        self.index.remove(orig);
        self.index.remove(reply);

        entry.ct().set_offloaded(false);

        if !entry.flags().contains(FlowFlags::TEARDOWN) {
            entry.restore_ct_l4_state();
        }
        if entry.flags().contains(FlowFlags::DYING) {
            entry.ct().delete();
        }

        for tuple in entry.tuples() {
            tuple.route.release();
        }
        entry.ct().release();

        log::debug!("flow table remove: {:?}", entry);
        // `entry`'s own Arc, and any clone a concurrent reader took from `lookup` before this
        // unlink, keep the allocation alive until their last drop — the grace period (§5).
    }

    /// Pushes `entry` to the registered hardware-offload backend and marks it HW on success
    /// (§4.F). A no-op returning `false` if this table was not created with the HW flag or no
    /// backend is currently registered.
    pub fn hw_offload(&self, entry: &Arc<FlowEntry>) -> bool {
        if !self.hw {
            return false;
        }
        match hw::current() {
            Some(backend) if backend.add(entry) => {
                entry.flags().set(FlowFlags::HW);
                true
            }
            _ => false,
        }
    }

    /// Visits every live entry exactly once, by direction-deduplicating on `ORIGINAL` (§4.C-walk).
    ///
    /// `DashMap`'s sharded-lock iterator already tolerates concurrent insert/remove without a
    /// global lock; no additional retry logic is required on top of it.
    pub fn walk(&self, mut visitor: impl FnMut(&Arc<FlowEntry>)) {
        for item in self.index.iter() {
            let tuple = item.key();
            if tuple.dir != Direction::Original {
                continue;
            }
            visitor(item.value());
        }
    }

    /// Collects every live entry into a `Vec`, deduplicated as in [`walk`](FlowTable::walk).
    /// Convenience wrapper used by the GC and device-down paths, which both need to mutate flags
    /// or remove entries while iterating — something that cannot safely happen while holding a
    /// `DashMap` shard guard.
    pub fn snapshot(&self) -> Vec<Arc<FlowEntry>> {
        let mut entries = Vec::new();
        self.walk(|entry| entries.push(entry.clone()));
        entries
    }
}
