//! Change notification.
//!
//! A [`WatchRegistration`] is a receiving end for [`ResourceChange`] events on
//! a key and everything below it. Events travel over their own channel, so
//! nothing is delivered while a provider or registry lock is held.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::key::ResourceKey;

/// Kind of change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Resource was created. Providers that publish writes by rename
    /// (local disk) also report replaced resources this way.
    Created,
    /// Resource content or metadata changed.
    Modified,
    /// Resource was removed.
    Removed,
}

/// A change to a watched resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceChange {
    /// The key that changed.
    pub key: ResourceKey,
    /// What happened to it.
    pub kind: ChangeKind,
}

impl ResourceChange {
    pub fn new(key: ResourceKey, kind: ChangeKind) -> Self {
        Self { key, kind }
    }
}

/// Sending half handed to whatever produces events for a registration.
#[derive(Debug, Clone)]
pub struct WatchSender {
    tx: mpsc::UnboundedSender<ResourceChange>,
    active: Arc<AtomicBool>,
}

impl WatchSender {
    /// Deliver a change. Returns false once the registration is gone.
    pub fn send(&self, change: ResourceChange) -> bool {
        self.is_active() && self.tx.send(change).is_ok()
    }

    /// Returns true while the registration is alive and not cancelled.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) && !self.tx.is_closed()
    }
}

/// A live watch on a key.
///
/// Dropping the registration cancels it.
pub struct WatchRegistration {
    id: Uuid,
    key: ResourceKey,
    rx: mpsc::UnboundedReceiver<ResourceChange>,
    active: Arc<AtomicBool>,
    guard: Option<Box<dyn Any + Send>>,
}

impl std::fmt::Debug for WatchRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistration")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("active", &self.is_active())
            .finish()
    }
}

impl WatchRegistration {
    /// Create a registration and the sender that feeds it.
    pub fn channel(key: ResourceKey) -> (Self, WatchSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let active = Arc::new(AtomicBool::new(true));
        let registration = Self {
            id: Uuid::new_v4(),
            key,
            rx,
            active: Arc::clone(&active),
            guard: None,
        };
        (registration, WatchSender { tx, active })
    }

    /// Attach a value that must live as long as the registration (for
    /// example a filesystem watcher). It is dropped on cancel.
    pub fn with_guard(mut self, guard: impl Any + Send) -> Self {
        self.guard = Some(Box::new(guard));
        self
    }

    /// Unique id of this registration.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The watched key.
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Returns true until the registration is cancelled.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Wait for the next change. Returns `None` once cancelled or when the
    /// producer has gone away.
    pub async fn next(&mut self) -> Option<ResourceChange> {
        if !self.is_active() {
            return None;
        }
        self.rx.recv().await
    }

    /// Take a change if one is already queued.
    pub fn try_next(&mut self) -> Option<ResourceChange> {
        if !self.is_active() {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Stop watching. Queued events are discarded.
    pub fn cancel(&mut self) {
        if self.active.swap(false, Ordering::AcqRel) {
            tracing::debug!(key = %self.key, id = %self.id, "watch cancelled");
        }
        self.guard = None;
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

impl Drop for WatchRegistration {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

/// Fan-out of changes to every registration whose key covers them.
///
/// Used by providers that originate their own change events.
#[derive(Debug, Default)]
pub struct WatchHub {
    watchers: Mutex<Vec<(ResourceKey, WatchSender)>>,
}

impl WatchHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a watch on `key` and everything below it.
    pub fn register(&self, key: ResourceKey) -> WatchRegistration {
        let (registration, sender) = WatchRegistration::channel(key.clone());
        self.watchers.lock().push((key, sender));
        registration
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        let mut watchers = self.watchers.lock();
        watchers.retain(|(_, s)| s.is_active());
        watchers.len()
    }

    /// Returns true if no registration is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `change` to every matching registration.
    ///
    /// Senders are collected under the lock and used after it is released.
    pub fn notify(&self, change: ResourceChange) {
        let targets: Vec<WatchSender> = {
            let mut watchers = self.watchers.lock();
            watchers.retain(|(_, s)| s.is_active());
            watchers
                .iter()
                .filter(|(key, _)| {
                    key.scheme() == change.key.scheme() && change.key.path().starts_with(key.path())
                })
                .map(|(_, s)| s.clone())
                .collect()
        };
        for sender in targets {
            sender.send(change.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(text: &str) -> ResourceKey {
        ResourceKey::parse(text).unwrap()
    }

    #[tokio::test]
    async fn test_hub_fan_out() {
        let hub = WatchHub::new();
        let mut a = hub.register(key("mem:/dir"));
        let mut b = hub.register(key("mem:/dir"));
        let mut other = hub.register(key("mem:/elsewhere"));

        hub.notify(ResourceChange::new(key("mem:/dir/file"), ChangeKind::Created));

        assert_eq!(a.next().await.unwrap().key, key("mem:/dir/file"));
        assert_eq!(b.next().await.unwrap().kind, ChangeKind::Created);
        assert!(other.try_next().is_none());
    }

    #[tokio::test]
    async fn test_cancel_stops_delivery() {
        let hub = WatchHub::new();
        let mut reg = hub.register(key("mem:/"));
        assert_eq!(hub.len(), 1);

        reg.cancel();
        assert!(!reg.is_active());
        hub.notify(ResourceChange::new(key("mem:/x"), ChangeKind::Modified));
        assert!(reg.next().await.is_none());
        assert!(hub.is_empty());
    }

    #[test]
    fn test_drop_prunes() {
        let hub = WatchHub::new();
        let reg = hub.register(key("mem:/"));
        drop(reg);
        assert!(hub.is_empty());
    }
}
