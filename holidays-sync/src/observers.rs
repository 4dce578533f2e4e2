//! Minimal subscriber list shared by the store and the orchestrator.
//!
//! Callbacks are cloned out of the lock before they run, so a callback may
//! subscribe, unsubscribe or read the publisher without deadlocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Handle returned by `subscribe`; pass it back to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub(crate) struct Observers<T> {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(SubscriptionId, Callback<T>)>>,
}

impl<T> Observers<T> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));
        id
    }

    /// Returns `false` when `id` was not subscribed.
    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    pub(crate) fn notify(&self, event: &T) {
        let snapshot: Vec<Callback<T>> = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in snapshot {
            callback(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn notify_reaches_every_subscriber_until_unsubscribed() {
        let observers: Observers<u32> = Observers::new();
        let total = Arc::new(AtomicUsize::new(0));

        let t1 = Arc::clone(&total);
        let a = observers.subscribe(move |v| {
            t1.fetch_add(*v as usize, Ordering::SeqCst);
        });
        let t2 = Arc::clone(&total);
        observers.subscribe(move |v| {
            t2.fetch_add(*v as usize, Ordering::SeqCst);
        });

        observers.notify(&5);
        assert_eq!(total.load(Ordering::SeqCst), 10);

        assert!(observers.unsubscribe(a));
        assert!(!observers.unsubscribe(a));
        observers.notify(&1);
        assert_eq!(total.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn callback_may_unsubscribe_itself() {
        let observers: Arc<Observers<()>> = Arc::new(Observers::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let id_slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let obs = Arc::clone(&observers);
        let slot = Arc::clone(&id_slot);
        let c = Arc::clone(&calls);
        let id = observers.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *slot.lock().unwrap() {
                obs.unsubscribe(id);
            }
        });
        *id_slot.lock().unwrap() = Some(id);

        observers.notify(&());
        observers.notify(&());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
