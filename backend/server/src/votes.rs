//! Ledger writer.
//!
//! Appends vote events and announces them on the [`ChangeNotifier`]. A notification is only
//! published after the append succeeded, stamped with the ledger position the append returned.
use std::sync::Arc;

use ledger::{ChangeNotification, LedgerChange, Store, StoreResult, VoteEvent};
use tracing::{debug, warn};

use crate::notify::ChangeNotifier;

#[derive(Clone)]
pub struct VoteWriter {
    store: Arc<dyn Store>,
    notifier: ChangeNotifier,
}

impl VoteWriter {
    pub fn new(store: Arc<dyn Store>, notifier: ChangeNotifier) -> Self {
        Self { store, notifier }
    }

    pub async fn cast(&self, event: VoteEvent) -> StoreResult<()> {
        let position = self.store.append_vote(&event).await?;

        debug!(caption = %event.caption_id, value = event.vote_value, position, "Vote appended");
        self.notifier.publish(LedgerChange {
            position,
            change: ChangeNotification::Insert { new: event },
        });

        Ok(())
    }

    /// Fire-and-forget. A failed append is logged and dropped.
    pub fn cast_detached(&self, event: VoteEvent) {
        let writer = self.clone();

        tokio::spawn(async move {
            let caption = event.caption_id.clone();
            if let Err(e) = writer.cast(event).await {
                warn!(%caption, "Dropped detached vote: {e}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use ledger::MemoryStore;

    use super::*;
    use crate::notify::Delivery;

    #[tokio::test]
    async fn test_cast_appends_then_publishes() {
        let store = MemoryStore::new();
        let notifier = ChangeNotifier::new(8);
        let mut subscription = notifier.subscribe();
        let writer = VoteWriter::new(Arc::new(store.clone()), notifier);

        let event = VoteEvent::new("c1", "u1", 1);
        writer.cast(event.clone()).await.unwrap();

        assert_eq!(store.votes().await.unwrap(), vec![event.clone()]);
        assert_eq!(
            subscription.recv().await,
            Some(Delivery::Change(LedgerChange {
                position: 1,
                change: ChangeNotification::Insert { new: event },
            }))
        );
    }

    #[tokio::test]
    async fn test_failed_cast_publishes_nothing() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let notifier = ChangeNotifier::new(8);
        let mut subscription = notifier.subscribe();
        let writer = VoteWriter::new(Arc::new(store), notifier);

        assert!(writer.cast(VoteEvent::new("c1", "u1", 1)).await.is_err());
        assert_eq!(subscription.drain(), 0);
    }

    #[tokio::test]
    async fn test_detached_cast_lands_eventually() {
        let store = MemoryStore::new();
        let notifier = ChangeNotifier::new(8);
        let mut subscription = notifier.subscribe();
        let writer = VoteWriter::new(Arc::new(store.clone()), notifier);

        writer.cast_detached(VoteEvent::new("c1", "u1", -1));

        assert!(matches!(subscription.recv().await, Some(Delivery::Change(_))));
        assert_eq!(store.votes().await.unwrap().len(), 1);
    }
}
