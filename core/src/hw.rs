//! The hardware-offload sink: a process-wide single-backend slot (§4.F).

use crate::conntrack::entry::FlowEntry;
use crate::error::FlowError;

use std::sync::{Arc, Mutex};

/// Capability offered by an external hardware-offload backend.
///
/// `add`/`del` are called only from process context (the GC worker thread, or table teardown),
/// never from a data-plane lookup, and must be idempotent (§4.F, §5).
pub trait HwOffload: Send + Sync {
    /// Pushes `entry` to the backend. Returns `false` on failure; the caller does not set the
    /// entry's `HW` flag in that case.
    fn add(&self, entry: &FlowEntry) -> bool;

    /// Asks the backend to drop `entry`. Must be idempotent.
    fn del(&self, entry: &FlowEntry);
}

lazy_static! {
    // `arc_swap` requires a thin (Sized) pointee, which rules out `dyn HwOffload` directly, so
    // the slot is a plain mutex instead of a lock-free `ArcSwapOption`.
    static ref HW_SLOT: Mutex<Option<Arc<dyn HwOffload>>> = Mutex::new(None);
    // Serializes the check-then-publish in `register`.
    static ref HW_REGISTER_LOCK: Mutex<()> = Mutex::new(());
}

/// Publishes `backend` as the single process-wide hardware-offload sink.
///
/// Fails with [`FlowError::Busy`] if a backend is already registered (§4.F).
pub fn register(backend: Arc<dyn HwOffload>) -> Result<(), FlowError> {
    let _guard = HW_REGISTER_LOCK.lock().expect("lock not poisoned");
    let mut slot = HW_SLOT.lock().expect("lock not poisoned");
    if slot.is_some() {
        log::warn!("hardware offload backend registration refused: already registered");
        return Err(FlowError::Busy);
    }
    *slot = Some(backend);
    log::info!("hardware offload backend registered");
    Ok(())
}

/// Unregisters `backend`, which must be the currently-published one.
///
/// Asserts that `backend` is identical (by pointer) to the published slot before clearing it,
/// mirroring the kernel source's `WARN_ON(rcu_access_pointer(...) != offload)` — a caller cannot
/// unregister a backend it does not itself hold a handle to.
///
/// After this call returns, any `Arc` clone a concurrent reader took via [`current`] before the
/// unpublish keeps the backend alive until it drops its own clone — the safe-Rust stand-in for
/// the reader grace period described in §4.F/§5.
pub fn unregister(backend: Arc<dyn HwOffload>) {
    let _guard = HW_REGISTER_LOCK.lock().expect("lock not poisoned");
    let mut slot = HW_SLOT.lock().expect("lock not poisoned");
    assert!(
        slot.as_ref().is_some_and(|c| Arc::ptr_eq(c, &backend)),
        "unregister called with a backend that is not the published one"
    );
    *slot = None;
    log::info!("hardware offload backend unregistered");
}

/// Returns a short-lived `Arc` clone of the currently-registered backend, if any.
///
/// Callers that intend to call `add`/`del` should hold this clone across the call, which is
/// exactly what keeps the backend alive even if `unregister` races concurrently (§4.F, §5).
pub fn current() -> Option<Arc<dyn HwOffload>> {
    HW_SLOT.lock().expect("lock not poisoned").clone()
}

/// Returns `true` if a backend is currently registered.
pub fn is_registered() -> bool {
    HW_SLOT.lock().expect("lock not poisoned").is_some()
}

/// Acquires a module reference on the registered backend for a table created with the HW flag.
///
/// Fails with [`FlowError::NotSupported`] if no backend is registered (§4.F "per-table setup").
/// This crate has no module-loader to retry against, unlike the kernel source this is drawn from,
/// so the single lookup is the entire procedure.
pub fn acquire_for_table() -> Result<(), FlowError> {
    if is_registered() {
        Ok(())
    } else {
        Err(FlowError::NotSupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{hw_test_lock, FakeHwOffload};

    #[test]
    fn register_then_unregister_round_trips() {
        let _guard = hw_test_lock().lock().unwrap();
        assert!(!is_registered());
        let backend: Arc<dyn HwOffload> = Arc::new(FakeHwOffload::new());
        register(backend.clone()).unwrap();
        assert!(is_registered());
        assert!(matches!(register(backend.clone()), Err(FlowError::Busy)));
        unregister(backend);
        assert!(!is_registered());
    }

    #[test]
    fn acquire_for_table_requires_registration() {
        let _guard = hw_test_lock().lock().unwrap();
        assert!(!is_registered());
        assert!(matches!(acquire_for_table(), Err(FlowError::NotSupported)));
        let backend: Arc<dyn HwOffload> = Arc::new(FakeHwOffload::new());
        register(backend.clone()).unwrap();
        assert!(acquire_for_table().is_ok());
        unregister(backend);
    }
}
