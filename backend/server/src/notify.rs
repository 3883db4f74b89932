//! # Change Notifier
//!
//! Fans ledger changes out to every live viewer over a bounded broadcast channel.
//!
//! A viewer that falls more than `capacity` notifications behind loses the oldest ones and is
//! told how many through [`Delivery::Lagged`]; it is then expected to rebuild from the store.
use tokio::sync::broadcast::{
    self, Receiver, Sender,
    error::{RecvError, TryRecvError},
};
use tracing::debug;
use uuid::Uuid;

use ledger::LedgerChange;

#[derive(Clone)]
pub struct ChangeNotifier {
    sender: Sender<LedgerChange>,
}

impl ChangeNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, change: LedgerChange) {
        if self.sender.send(change).is_err() {
            debug!("No live viewers for change notification");
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let viewer = Uuid::new_v4();
        debug!(%viewer, "Live viewer subscribed");

        Subscription {
            receiver: self.sender.subscribe(),
            viewer,
        }
    }

    pub fn viewers(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Delivery {
    Change(LedgerChange),
    /// Notifications dropped before this viewer could read them.
    Lagged(u64),
}

/// One viewer's handle on the notifier. Dropping it releases the channel.
pub struct Subscription {
    receiver: Receiver<LedgerChange>,
    viewer: Uuid,
}

impl Subscription {
    /// `None` once the notifier is gone.
    pub async fn recv(&mut self) -> Option<Delivery> {
        match self.receiver.recv().await {
            Ok(change) => Some(Delivery::Change(change)),
            Err(RecvError::Lagged(missed)) => Some(Delivery::Lagged(missed)),
            Err(RecvError::Closed) => None,
        }
    }

    /// Discards whatever is already queued and returns how many notifications that was,
    /// dropped ones included.
    pub fn drain(&mut self) -> u64 {
        let mut drained = 0u64;

        loop {
            match self.receiver.try_recv() {
                Ok(_) => drained += 1,
                Err(TryRecvError::Lagged(missed)) => drained += missed,
                Err(TryRecvError::Empty | TryRecvError::Closed) => return drained,
            }
        }
    }

    pub fn viewer(&self) -> Uuid {
        self.viewer
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!(viewer = %self.viewer, "Live viewer released");
    }
}
