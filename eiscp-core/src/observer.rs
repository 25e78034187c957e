//! Fan-out of state snapshots to external listeners.
//!
//! `notify` works on a copy of the listener list, so a callback may register
//! or unregister observers (itself included) while it runs. Such changes take
//! effect from the next notification.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::state::DeviceState;

/// A listener for device-state changes.
pub trait StateObserver: Send + Sync {
    fn on_state(&self, state: &DeviceState);
}

impl<F> StateObserver for F
where
    F: Fn(&DeviceState) + Send + Sync,
{
    fn on_state(&self, state: &DeviceState) {
        self(state)
    }
}

/// Handle returned by [`ObserverRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Entry = (ObserverId, Arc<dyn StateObserver>);

#[derive(Default)]
pub struct ObserverRegistry {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, observer: impl StateObserver + 'static) -> ObserverId {
        self.register_arc(Arc::new(observer))
    }

    pub fn register_arc(&self, observer: Arc<dyn StateObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries().push((id, observer));
        id
    }

    /// Returns `true` if the observer was registered.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Call every observer in registration order.
    pub fn notify(&self, state: &DeviceState) {
        let observers: Vec<Arc<dyn StateObserver>> =
            self.entries().iter().map(|(_, o)| Arc::clone(o)).collect();
        for observer in observers {
            observer.on_state(state);
        }
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::OnceLock;

    #[test]
    fn notifies_in_registration_order() {
        let registry = ObserverRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            registry.register(move |_: &DeviceState| log.lock().unwrap().push(name));
        }
        registry.notify(&DeviceState::default());
        assert_eq!(*log.lock().unwrap(), ["first", "second", "third"]);
    }

    #[test]
    fn unregister_stops_delivery() {
        let registry = ObserverRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let id = registry.register(move |_: &DeviceState| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        registry.notify(&DeviceState::default());
        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        registry.notify(&DeviceState::default());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callbacks_may_reenter_the_registry() {
        let registry = Arc::new(ObserverRegistry::new());
        let own_id: Arc<OnceLock<ObserverId>> = Arc::new(OnceLock::new());
        let late_hits = Arc::new(AtomicUsize::new(0));

        let inner = Arc::clone(&registry);
        let id_cell = Arc::clone(&own_id);
        let late = Arc::clone(&late_hits);
        let id = registry.register(move |_: &DeviceState| {
            // replace ourselves with a counting observer
            if let Some(id) = id_cell.get() {
                inner.unregister(*id);
            }
            let late = Arc::clone(&late);
            inner.register(move |_: &DeviceState| {
                late.fetch_add(1, Ordering::SeqCst);
            });
        });
        own_id.set(id).unwrap();

        registry.notify(&DeviceState::default());
        assert_eq!(late_hits.load(Ordering::SeqCst), 0);
        assert_eq!(registry.len(), 1);

        registry.notify(&DeviceState::default());
        assert_eq!(late_hits.load(Ordering::SeqCst), 1);
    }
}
