//! Live snapshots of the history store
//!
//! A subscription gets the current top-N rows right away and a fresh list
//! after every committed write. The store's revision is a `watch` value, so a
//! burst of writes made while a snapshot is being delivered collapses into
//! one follow-up delivery of the latest state.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{ClipboardItem, HistoryStore};

/// Publishes ordered snapshots of the store to subscribers
#[derive(Clone)]
pub struct ChangeObserver {
    store: Arc<HistoryStore>,
}

impl ChangeObserver {
    pub fn new(store: Arc<HistoryStore>) -> Self {
        Self { store }
    }

    /// Deliver the `limit` most recently updated rows to `callback` now and
    /// after every change.
    ///
    /// Must be called from within a Tokio runtime. Delivery stops when the
    /// returned [`Subscription`] is cancelled or dropped.
    pub fn subscribe<F>(&self, limit: usize, callback: F) -> Subscription
    where
        F: Fn(Vec<ClipboardItem>) + Send + Sync + 'static,
    {
        let store = Arc::clone(&self.store);
        let mut changes = store.subscribe_changes();

        let handle = tokio::spawn(async move {
            loop {
                // Mark the revision seen before querying so a write racing the
                // query triggers another pass.
                let revision = *changes.borrow_and_update();

                match store.fetch_all(limit).await {
                    Ok(items) => {
                        debug!("Delivering snapshot of {} items (revision {})", items.len(), revision);
                        callback(items);
                    }
                    Err(e) => warn!("Failed to load history snapshot: {}", e),
                }

                if changes.changed().await.is_err() {
                    break;
                }
            }
        });

        Subscription {
            handle: Mutex::new(Some(handle)),
        }
    }
}

/// Handle for an active snapshot subscription
pub struct Subscription {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Subscription {
    /// Stop delivery. Calling it again does nothing.
    pub fn cancel(&self) {
        if let Some(handle) = self.handle().take() {
            handle.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn handle(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::ContentType;
    use crate::history::StoreOptions;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn setup() -> (Arc<HistoryStore>, ChangeObserver) {
        let store = Arc::new(HistoryStore::open_in_memory(StoreOptions::default()).unwrap());
        let observer = ChangeObserver::new(Arc::clone(&store));
        (store, observer)
    }

    async fn next_snapshot(rx: &mut mpsc::UnboundedReceiver<Vec<String>>) -> Vec<String> {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("snapshot not delivered in time")
            .expect("subscription closed")
    }

    #[tokio::test]
    async fn test_initial_and_follow_up_snapshots() {
        let (store, observer) = setup();
        store.pin("first", ContentType::Text).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = observer.subscribe(10, move |items| {
            let _ = tx.send(items.into_iter().map(|i| i.content).collect());
        });

        assert_eq!(next_snapshot(&mut rx).await, vec!["first"]);

        store.save("second", ContentType::Text).await.unwrap();
        assert_eq!(next_snapshot(&mut rx).await, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn test_snapshot_respects_limit() {
        let (store, observer) = setup();
        for text in ["a", "b", "c"] {
            store.pin(text, ContentType::Text).await.unwrap();
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = observer.subscribe(2, move |items| {
            let _ = tx.send(items.into_iter().map(|i| i.content).collect());
        });

        assert_eq!(next_snapshot(&mut rx).await, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_and_stops_delivery() {
        let (store, observer) = setup();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = observer.subscribe(10, move |items| {
            let _ = tx.send(items.into_iter().map(|i| i.content).collect());
        });
        assert!(next_snapshot(&mut rx).await.is_empty());
        assert!(subscription.is_active());

        subscription.cancel();
        subscription.cancel();
        assert!(!subscription.is_active());

        store.pin("after cancel", ContentType::Text).await.unwrap();
        // The aborted task drops its sender, closing the channel.
        let next = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert_eq!(next, None);
    }
}
