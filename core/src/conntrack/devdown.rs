//! Device-down cleanup (§4.G).

use crate::conntrack::table::FlowTable;
use crate::registry;

/// Handles a `NETDEV_DOWN` notification for `ifindex`, fanning out to every live table in the
/// registry (§4.G, §4.H).
///
/// Marks every entry whose ingress interface on either direction matches `ifindex` as DYING, then
/// flushes each table's GC task so the marked entries are actually removed before this call
/// returns (§4.G: "flush the GC task so all marked entries are actually removed before
/// returning").
pub fn cleanup(ifindex: u32) {
    for table in registry::tables_snapshot() {
        mark_table(&table, ifindex);
        table.flush_gc();
    }
}

/// Handles graceful table teardown (the device argument is absent): marks every entry TEARDOWN
/// instead of DYING (§4.G).
pub(crate) fn teardown_all(table: &FlowTable) {
    for entry in table.snapshot() {
        entry.mark_teardown();
    }
}

fn mark_table(table: &FlowTable, ifindex: u32) {
    let mut marked = 0;
    for entry in table.snapshot() {
        let [orig, reply] = entry.tuples();
        if orig.iifidx == ifindex || reply.iifidx == ifindex {
            entry.mark_dying();
            marked += 1;
        }
    }
    if marked > 0 {
        log::info!("device down: marked {} flow(s) dying for ifindex={}", marked, ifindex);
    }
}
