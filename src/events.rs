//! Status notification bus with per-transaction and wildcard channels.
//!
//! Delivery is synchronous in the publishing caller's stack: listeners on the
//! transaction's own channel run first in registration order, wildcard
//! listeners next in registration order. A panicking listener is caught and
//! logged so the listeners after it still run.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use tracing::error;

use crate::transaction::{Status, TxId};

/// Callback invoked with the transaction id and its new status
pub type StatusListener = Arc<dyn Fn(TxId, &Status) + Send + Sync>;

/// One status transition, as mirrored into channel-backed feeds
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    pub id: TxId,
    pub status: Status,
}

struct Registered {
    filter: Option<Status>,
    callback: StatusListener,
}

#[derive(Default)]
struct BusInner {
    channels: HashMap<TxId, Vec<Registered>>,
    wildcard: Vec<Registered>,
    feeds: Vec<Sender<StatusEvent>>,
}

/// Thread-safe notification bus shared by the manager and its callers
#[derive(Clone)]
pub struct StatusBus {
    inner: Arc<RwLock<BusInner>>,
}

impl StatusBus {
    pub fn new() -> Self {
        StatusBus {
            inner: Arc::new(RwLock::new(BusInner::default())),
        }
    }

    /// Create the per-transaction channel. Listeners can only register on a
    /// channel that exists.
    pub fn open_channel(&self, id: TxId) {
        let mut inner = self.inner.write();
        inner.channels.entry(id).or_default();
    }

    /// Tear down the per-transaction channel and every listener on it.
    /// Teardown itself is not observable by listeners.
    pub fn close_channel(&self, id: TxId) {
        let mut inner = self.inner.write();
        inner.channels.remove(&id);
    }

    pub fn has_channel(&self, id: TxId) -> bool {
        let inner = self.inner.read();
        inner.channels.contains_key(&id)
    }

    /// Register a listener on a transaction's channel, optionally firing only
    /// when the transition lands on `filter`. Returns false when the id has
    /// no channel (never added, or already rejected or wiped).
    pub fn subscribe<F>(&self, id: TxId, filter: Option<Status>, listener: F) -> bool
    where
        F: Fn(TxId, &Status) + Send + Sync + 'static,
    {
        let mut inner = self.inner.write();
        match inner.channels.get_mut(&id) {
            Some(channel) => {
                channel.push(Registered {
                    filter,
                    callback: Arc::new(listener),
                });
                true
            }
            None => false,
        }
    }

    /// Register a wildcard listener fired for every transition of every
    /// transaction
    pub fn subscribe_all<F>(&self, listener: F)
    where
        F: Fn(TxId, &Status) + Send + Sync + 'static,
    {
        let mut inner = self.inner.write();
        inner.wildcard.push(Registered {
            filter: None,
            callback: Arc::new(listener),
        });
    }

    /// Channel-backed mirror of the wildcard stream, for consumers that
    /// prefer a receiver over a callback
    pub fn event_feed(&self) -> Receiver<StatusEvent> {
        let (sender, receiver) = unbounded();
        let mut inner = self.inner.write();
        inner.feeds.push(sender);
        receiver
    }

    /// Deliver a transition to the transaction's channel, then the wildcard
    /// listeners, then the feeds.
    pub fn publish(&self, id: TxId, status: &Status) {
        // Listeners are cloned out before delivery so a callback may call
        // back into the bus without deadlocking.
        let (targeted, wildcard) = {
            let inner = self.inner.read();
            let targeted: Vec<StatusListener> = inner
                .channels
                .get(&id)
                .map(|channel| {
                    channel
                        .iter()
                        .filter(|reg| reg.filter.as_ref().map_or(true, |f| f == status))
                        .map(|reg| reg.callback.clone())
                        .collect()
                })
                .unwrap_or_default();
            let wildcard: Vec<StatusListener> = inner
                .wildcard
                .iter()
                .map(|reg| reg.callback.clone())
                .collect();
            (targeted, wildcard)
        };

        for callback in targeted.iter().chain(wildcard.iter()) {
            deliver(callback, id, status);
        }
        self.push_to_feeds(id, status);
    }

    /// Deliver to the wildcard listeners and feeds only, skipping the
    /// transaction's own channel. Used when a record first enters the store.
    pub fn publish_global(&self, id: TxId, status: &Status) {
        let wildcard: Vec<StatusListener> = {
            let inner = self.inner.read();
            inner
                .wildcard
                .iter()
                .map(|reg| reg.callback.clone())
                .collect()
        };
        for callback in &wildcard {
            deliver(callback, id, status);
        }
        self.push_to_feeds(id, status);
    }

    fn push_to_feeds(&self, id: TxId, status: &Status) {
        let mut inner = self.inner.write();
        // send never blocks on an unbounded channel; a dead receiver just
        // gets its sender pruned
        inner.feeds.retain(|feed| {
            feed.send(StatusEvent {
                id,
                status: status.clone(),
            })
            .is_ok()
        });
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new()
    }
}

fn deliver(callback: &StatusListener, id: TxId, status: &Status) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(id, status)));
    if let Err(payload) = outcome {
        error!(
            "Status listener for tx {} panicked: {}",
            id,
            panic_message(payload.as_ref())
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
