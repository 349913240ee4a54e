//! Snapshot subscriptions and realtime list sync.
//!
//! Live queries deliver the complete current result set on every change.
//! [`Subscription`] turns that push pattern into a latest-value stream with
//! an explicit, idempotent cancellation handle; [`LiveList`] turns repeated
//! snapshots into a deduplicated in-memory list for rendering.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

/// Shared cancellation flag for one subscription. Cancelling is idempotent;
/// calling it once on teardown is the only required discipline.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Create a linked publisher/subscriber pair.
#[must_use]
pub fn channel<T: Clone>() -> (SnapshotSender<T>, Subscription<T>) {
    let (tx, rx) = watch::channel(None);
    let cancel = CancelHandle::new();
    (
        SnapshotSender {
            tx,
            cancel: cancel.clone(),
        },
        Subscription { rx, cancel },
    )
}

/// Publisher half held by a backend. Delivery stops permanently once the
/// subscriber cancels or drops.
pub struct SnapshotSender<T> {
    tx: watch::Sender<Option<T>>,
    cancel: CancelHandle,
}

impl<T> SnapshotSender<T> {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Deliver one snapshot, replacing any undelivered predecessor: every
    /// snapshot is the complete current result set, so a slow subscriber
    /// observes the newest state and skips the intermediate ones. Returns
    /// false when the subscriber is gone and the publisher should forget
    /// this listener.
    pub fn deliver(&self, snapshot: T) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.send(Some(snapshot)).is_ok()
    }
}

/// Subscriber half: a stream of snapshots plus the cancellation handle.
/// Dropping the subscription cancels it as well.
pub struct Subscription<T> {
    rx: watch::Receiver<Option<T>>,
    cancel: CancelHandle,
}

impl<T: Clone> Subscription<T> {
    /// Next undelivered snapshot, or `None` once the subscription is
    /// cancelled or the publisher went away.
    pub async fn recv(&mut self) -> Option<T> {
        if self.cancel.is_cancelled() {
            return None;
        }
        match self.rx.changed().await {
            Ok(()) => self.rx.borrow_and_update().clone(),
            Err(_) => None,
        }
    }

    /// Release the subscription. Safe to call more than once.
    pub fn unsubscribe(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Handle that can be stored separately from the stream.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Anything addressable by a stable identity key within a snapshot.
pub trait Identified {
    fn identity(&self) -> &str;
}

/// Deduplicate one snapshot by identity key.
///
/// The first occurrence keeps its position, the last occurrence's data wins.
#[must_use]
pub fn dedupe_by_identity<T: Identified>(entries: Vec<T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(entries.len());
    let mut slots: HashMap<String, usize> = HashMap::with_capacity(entries.len());
    for entry in entries {
        match slots.entry(entry.identity().to_owned()) {
            Entry::Occupied(slot) => {
                out[*slot.get()] = entry;
            }
            Entry::Vacant(slot) => {
                slot.insert(out.len());
                out.push(entry);
            }
        }
    }
    out
}

/// De-duplicated, stably-identified list fed by snapshot callbacks. The local
/// contents are replaced wholesale on every snapshot; no client-side
/// re-sorting is performed.
#[derive(Debug, Default)]
pub struct LiveList<T> {
    items: Vec<T>,
}

impl<T: Identified> LiveList<T> {
    #[must_use]
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn apply_snapshot(&mut self, snapshot: Vec<T>) {
        self.items = dedupe_by_identity(snapshot);
    }

    #[must_use]
    pub fn items(&self) -> &[T] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
