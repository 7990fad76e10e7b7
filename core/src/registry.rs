//! The process-wide registry of live flow tables (§4.H).

use crate::config::FlowTableConfig;
use crate::conntrack::devdown;
use crate::conntrack::table::FlowTable;
use crate::error::FlowError;
use crate::gc;
use crate::hw;

use std::sync::{Arc, Mutex};

lazy_static! {
    static ref TABLES: Mutex<Vec<Arc<FlowTable>>> = Mutex::new(Vec::new());
}

/// Creates a new table, registers it, and starts its GC worker (§4.H, §6 `init_table`).
///
/// If `config.hw` is set, requires a hardware-offload backend to already be registered; fails
/// with [`FlowError::NotSupported`] otherwise (§4.F "per-table setup").
pub fn init_table(config: FlowTableConfig) -> Result<Arc<FlowTable>, FlowError> {
    if config.hw {
        hw::acquire_for_table()?;
    }

    let table = Arc::new(FlowTable::new(config));
    FlowTable::start_gc(&table);
    TABLES.lock().expect("lock not poisoned").push(table.clone());
    log::info!("flow table created (hw={})", config.hw);
    Ok(table)
}

/// Destroys `table`: removes it from the registry, stops its GC worker, walks it once with a
/// TEARDOWN marker, and runs one final GC pass, asserting it made progress if the table was
/// non-empty (§4.H).
pub fn free_table(table: &Arc<FlowTable>) {
    {
        let mut tables = TABLES.lock().expect("lock not poisoned");
        tables.retain(|t| !Arc::ptr_eq(t, table));
    }

    // Cancel the GC worker before the final manual sweep below — otherwise its ticker could race
    // this thread's own `gc::sweep` over the same entries and double-release their refcounts.
    table.stop_gc();

    let had_entries = !table.is_empty();
    devdown::teardown_all(table);
    let removed = gc::sweep(table);
    if had_entries {
        assert!(removed > 0, "final GC pass on table free made no progress");
    }

    log::info!("flow table destroyed");
}

/// Returns a snapshot of every currently registered table, for a netdevice-notifier callback to
/// iterate (§9).
pub fn tables_snapshot() -> Vec<Arc<FlowTable>> {
    TABLES.lock().expect("lock not poisoned").clone()
}
