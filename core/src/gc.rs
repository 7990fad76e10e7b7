//! The periodic garbage collector (§4.D).
//!
//! Matches this crate's existing timer-wheel style (a `crossbeam::channel::tick` ticker driving
//! periodic expiry work) but runs on its own dedicated worker thread rather than being polled
//! from a packet-processing loop, since this crate has no such loop of its own (§5: "a dedicated
//! OS thread woken by a ticking channel").

use crate::conntrack::entry::FlowFlags;
use crate::conntrack::table::FlowTable;

use crossbeam::channel::{bounded, select, tick, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

enum GcCommand {
    Flush(Sender<()>),
    Stop,
}

/// Owns the dedicated worker thread that periodically sweeps a [`FlowTable`].
pub(crate) struct GcWorker {
    cmd_tx: Sender<GcCommand>,
    thread: Option<JoinHandle<()>>,
}

impl GcWorker {
    /// Spawns the worker thread for `table`, ticking every `tick_interval`.
    pub(crate) fn spawn(table: Arc<FlowTable>, tick_interval: Duration) -> GcWorker {
        let (cmd_tx, cmd_rx) = bounded(8);
        let thread = std::thread::Builder::new()
            .name("flowoffload-gc".to_string())
            .spawn(move || run(&table, tick_interval, &cmd_rx))
            .expect("failed to spawn GC worker thread");
        GcWorker { cmd_tx, thread: Some(thread) }
    }

    /// Forces an immediate GC pass and blocks until it completes (§4.G, §4.H).
    pub(crate) fn flush(&self) {
        let (done_tx, done_rx) = bounded(1);
        if self.cmd_tx.send(GcCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.recv();
        }
    }
}

impl Drop for GcWorker {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(GcCommand::Stop);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run(table: &Arc<FlowTable>, tick_interval: Duration, cmd_rx: &Receiver<GcCommand>) {
    let ticker = tick(tick_interval);
    loop {
        select! {
            recv(ticker) -> _ => {
                sweep(table);
            }
            recv(cmd_rx) -> cmd => match cmd {
                Ok(GcCommand::Flush(done)) => {
                    sweep(table);
                    let _ = done.send(());
                }
                Ok(GcCommand::Stop) | Err(_) => break,
            }
        }
    }
}

/// One GC pass over `table` (§4.D). Returns the number of entries removed.
pub(crate) fn sweep(table: &FlowTable) -> usize {
    let config = *table.config();
    let mut removed = 0;

    for entry in table.snapshot() {
        let teardown = entry.flags().intersects(FlowFlags::DYING | FlowFlags::TEARDOWN);

        if !teardown {
            let remaining = entry.ct().remaining_timeout();
            if remaining < config.ct_offload_min_timeout {
                entry.ct().set_timeout(config.ct_offload_refresh_timeout);
            }
        }

        if entry.flags().contains(FlowFlags::KEEP) && !teardown {
            continue;
        }

        if teardown || entry.is_expired() {
            table.remove(&entry);
            removed += 1;
        }
    }

    if removed > 0 {
        log::debug!("gc pass: removed {} flow(s), {} remaining", removed, table.len() / 2);
    }
    removed
}
