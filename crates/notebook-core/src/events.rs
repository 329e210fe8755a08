//! Notifications for hosts.
//!
//! `NotebookEvent` reports structural changes and sync outcomes; `EventBus`
//! fans them out to subscribers. Sync failures are delivered here rather than
//! returned to whoever triggered the save.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NotebookEvent {
    CollectionCreated {
        key: String,
    },
    CollectionRenamed {
        #[serde(rename = "oldKey")]
        old_key: String,
        #[serde(rename = "newKey")]
        new_key: String,
    },
    CollectionDeleted {
        key: String,
        /// Collections removed, including `key`
        removed: usize,
        /// Notes moved to the root
        orphaned: usize,
    },
    /// Siblings or another ordered list changed order; positions must be recomputed.
    Reordered {
        parent: String,
    },
    CollapseToggled {
        key: String,
        collapsed: bool,
    },
    NoteMoved {
        #[serde(rename = "noteId")]
        note_id: String,
        from: String,
        to: String,
    },
    MembershipRebuilt {
        healed: usize,
        migrated: usize,
        realigned: usize,
    },
    /// A remote call succeeded.
    Synced {
        operation: String,
    },
    /// A remote call was skipped because the context is a guest.
    SyncSkipped {
        operation: String,
    },
    /// A remote call gave up. Local state was kept.
    SyncFailed {
        operation: String,
        error: String,
    },
    /// Remote data was empty or failed, so local data was kept.
    LocalPreserved {
        resource: String,
    },
    StateCleared {
        reason: String,
    },
    ClearRejected {
        reason: String,
    },
}

/// Subscription handle that unsubscribes automatically when dropped.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

type Callback = Arc<dyn Fn(NotebookEvent) + Send + Sync>;

/// Wrap in `Arc` to enable subscriptions.
pub struct EventBus {
    callbacks: RwLock<Vec<(usize, Callback)>>,
    next_id: AtomicUsize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events. Returns `Subscription` that unsubscribes on drop.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(NotebookEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: usize) {
        // emit never runs callbacks under the lock, so a Subscription dropped
        // inside a callback cannot deadlock here.
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(i, _)| *i != id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn emit(&self, event: NotebookEvent) {
        // Snapshot so a callback may subscribe without deadlocking.
        let callbacks: Vec<_> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(event.clone());
        }
    }
}
