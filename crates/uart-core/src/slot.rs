//! Single-slot "latest value" handoff between the notification path and a consumer.
//!
//! The notification callback publishes every completed record; the consumer
//! waits for the next one. Only the most recent unread record survives:
//! publishing never waits and never queues, so a slow consumer sees fresh
//! data instead of a growing backlog.
//!
//! Built on [`tokio::sync::watch`], whose version counter is the ready
//! signal: a publish bumps it, and awaiting clears it by marking the current
//! value as seen.

use std::sync::Arc;

use tokio::sync::watch;

use uart_types::Record;

/// Create a connected publisher/receiver pair with no pending value.
///
/// # Example
///
/// ```
/// use uart_core::slot::latest_slot;
/// use uart_types::Record;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (publisher, mut receiver) = latest_slot();
/// publisher.publish(Record::new("first"));
/// publisher.publish(Record::new("second"));
/// assert_eq!(receiver.await_latest().await.unwrap().as_str(), "second");
/// # }
/// ```
pub fn latest_slot() -> (SlotPublisher, SlotReceiver) {
    let (tx, rx) = watch::channel(None);
    (SlotPublisher { tx: Arc::new(tx) }, SlotReceiver { rx })
}

/// Producer side of the slot. Never suspends.
///
/// Clones share the same slot; the supervisor hands one clone to each
/// session it runs, so there is still one logical writer at a time.
#[derive(Debug, Clone)]
pub struct SlotPublisher {
    tx: Arc<watch::Sender<Option<Record>>>,
}

impl SlotPublisher {
    /// Store `record`, overwriting any unread value, and raise the ready signal.
    pub fn publish(&self, record: Record) {
        // send_replace succeeds even when the receiver is gone.
        self.tx.send_replace(Some(record));
    }

    /// Whether the consumer side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the slot.
#[derive(Debug)]
pub struct SlotReceiver {
    rx: watch::Receiver<Option<Record>>,
}

impl SlotReceiver {
    /// Wait until a record is published, then take it and clear the signal.
    ///
    /// Several publishes since the last call collapse into the newest one.
    /// Returns `None` once every publisher is gone and nothing is pending.
    pub async fn await_latest(&mut self) -> Option<Record> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(record) = self.rx.borrow_and_update().clone() {
                return Some(record);
            }
        }
    }

    /// Take the pending record without waiting, if one is ready.
    pub fn try_latest(&mut self) -> Option<Record> {
        match self.rx.has_changed() {
            Ok(true) => self.rx.borrow_and_update().clone(),
            _ => None,
        }
    }

    /// Whether a record is waiting to be taken.
    pub fn is_ready(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }
}
