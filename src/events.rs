//! Catalog notifications.
//!
//! Subscribers get their own `mpsc::Receiver`; every event is delivered to
//! every live subscriber in emission order. Disconnected receivers are pruned
//! on the next emit.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use url::Url;

use crate::album::GlobalId;
use crate::tasks::OperationKind;

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEvent {
    AlbumAdded(GlobalId),
    AlbumDeleted(GlobalId),
    AlbumRenamed(GlobalId),
    AlbumIconChanged(GlobalId),
    TagMoved { tag: GlobalId, new_parent: GlobalId },
    CurrentAlbumChanged(Option<GlobalId>),
    AlbumsCleared,
    AllAlbumsLoaded,
    RenameSucceeded(Url),
    RenameFailed(Url),
    /// Item count per physical album id.
    PhysicalItemsDirty(HashMap<i64, usize>),
    /// Item count per tag id.
    TagItemsDirty(HashMap<i64, usize>),
    /// Item count per (year, month).
    DateAlbumsDirty(BTreeMap<(i32, u32), usize>),
    DatesMapDirty(BTreeMap<NaiveDate, usize>),
    /// One aggregated report per finished job, messages joined by newlines.
    OperationFailed { kind: OperationKind, message: String },
}

/// Cloneable handle to a shared subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<CatalogEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<CatalogEvent> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    pub fn emit(&self, event: CatalogEvent) {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            tracing::warn!("Event subscriber list poisoned, dropping {:?}", event);
            return;
        };
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_reach_every_subscriber_in_order() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.emit(CatalogEvent::AlbumsCleared);
        bus.emit(CatalogEvent::AllAlbumsLoaded);

        let got_a: Vec<_> = a.try_iter().collect();
        let got_b: Vec<_> = b.try_iter().collect();
        assert_eq!(got_a, vec![CatalogEvent::AlbumsCleared, CatalogEvent::AllAlbumsLoaded]);
        assert_eq!(got_a, got_b);
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(CatalogEvent::AllAlbumsLoaded);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(keep.try_recv().unwrap(), CatalogEvent::AllAlbumsLoaded);
    }

    #[test]
    fn test_clones_share_subscribers() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let clone = bus.clone();
        clone.emit(CatalogEvent::AlbumsCleared);
        assert_eq!(rx.try_recv().unwrap(), CatalogEvent::AlbumsCleared);
    }
}
