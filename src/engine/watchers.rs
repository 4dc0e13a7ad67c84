//! Observers of the pending-buffer count

use crate::{AudioError, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Callback receiving the current pending-buffer count
pub type WatchCallback = Arc<dyn Fn(u32) + Send + Sync>;

/// Ordered, append-only list of watchers
///
/// The list is copy-on-write: notification takes a snapshot and calls every
/// watcher with no lock held, so a watcher may register further watchers or
/// call back into the engine.
#[derive(Default)]
pub struct WatcherRegistry {
    entries: Mutex<Arc<Vec<WatchCallback>>>,
}

impl WatcherRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a watcher; it sees every notification from now on
    pub fn register(&self, callback: WatchCallback) -> Result<()> {
        let mut entries = self.entries.lock();
        let list = Arc::make_mut(&mut *entries);
        list.try_reserve(1)
            .map_err(|e| AudioError::Allocation(format!("watcher list: {e}")))?;
        list.push(callback);
        Ok(())
    }

    /// Number of registered watchers
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no watcher is registered
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Report `pending` to every watcher in registration order
    pub fn notify(&self, pending: u32) {
        let snapshot = Arc::clone(&self.entries.lock());
        for watcher in snapshot.iter() {
            watcher(pending);
        }
    }

    /// Release every watcher
    pub fn clear(&self) {
        *self.entries.lock() = Arc::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_in_registration_order() {
        let registry = WatcherRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            registry
                .register(Arc::new(move |pending: u32| seen.lock().push((tag, pending))))
                .unwrap();
        }

        registry.notify(3);
        assert_eq!(*seen.lock(), vec![("a", 3), ("b", 3), ("c", 3)]);
    }

    #[test]
    fn test_watcher_can_register_during_notify() {
        let registry = Arc::new(WatcherRegistry::new());
        let inner = Arc::clone(&registry);
        registry
            .register(Arc::new(move |_: u32| {
                inner.register(Arc::new(|_: u32| {})).unwrap();
            }))
            .unwrap();

        registry.notify(0);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_clear() {
        let registry = WatcherRegistry::new();
        registry.register(Arc::new(|_: u32| {})).unwrap();
        registry.clear();
        assert!(registry.is_empty());
    }
}
