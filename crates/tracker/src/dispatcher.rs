//! Single-threaded event funnel.
//!
//! Two reasons every store-change and discovery callback lands here instead
//! of running in place:
//! - the store's notification callback must not block or re-enter the store;
//! - node-loss handling and metadata updates must not interleave in
//!   unpredictable order relative to each other.
//!
//! The queue is unbounded FIFO; one worker task drains it. Each event is
//! gated independently by the busy-gate on the consuming side.

use std::collections::BTreeSet;
use std::sync::Mutex;

use fmr_common::NodeId;
use fmr_store::ChangeBatch;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Events serialised through the dispatcher worker.
pub(crate) enum TrackerEvent {
    /// A batch of committed metadata changes.
    MetadataUpdated(ChangeBatch),
    /// A node left or failed; `live` is the surviving member set.
    TopologyChanged {
        departed: NodeId,
        live: BTreeSet<NodeId>,
    },
}

pub(crate) struct EventDispatcher {
    tx: Mutex<Option<UnboundedSender<TrackerEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventDispatcher {
    pub(crate) fn new() -> (Self, UnboundedReceiver<TrackerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
                worker: Mutex::new(None),
            },
            rx,
        )
    }

    pub(crate) fn attach_worker(&self, handle: JoinHandle<()>) {
        *self.worker.lock().expect("worker slot lock") = Some(handle);
    }

    /// Enqueue an event; false once the dispatcher shut down.
    pub(crate) fn enqueue(&self, event: TrackerEvent) -> bool {
        match self.tx.lock().expect("sender lock").as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Close the queue and wait for the worker to drain and exit.
    pub(crate) async fn shutdown(&self) {
        drop(self.tx.lock().expect("sender lock").take());
        let worker = self.worker.lock().expect("worker slot lock").take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }
}
