//! Leader-change callbacks and their delivery bookkeeping.

use leadwire_core::LeaderView;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

/// Receives leader transitions published by the watcher.
///
/// Implemented for every `Fn(&LeaderView) + Send + Sync`, so closures can be
/// registered directly.
pub trait LeaderChanged: Send + Sync {
    fn on_leader_changed(&self, view: &LeaderView);
}

impl<F> LeaderChanged for F
where
    F: Fn(&LeaderView) + Send + Sync,
{
    fn on_leader_changed(&self, view: &LeaderView) {
        self(view)
    }
}

/// Handle returned by `detect`, used to cancel the callback later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(Uuid);

impl Subscription {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn id(&self) -> Uuid {
        self.0
    }
}

/// Statistics about leader-change delivery
#[derive(Debug, Default, Clone)]
pub struct DeliveryStats {
    pub evaluations: u64,
    pub transitions_published: u64,
    pub callbacks_invoked: u64,
    pub callbacks_panicked: u64,
    pub synthetic_deliveries: u64,
    pub active_subscriptions: usize,
}

/// Registered callbacks, kept in registration order.
#[derive(Default)]
pub(crate) struct SubscriberList {
    entries: Vec<(Subscription, Arc<dyn LeaderChanged>)>,
}

impl SubscriberList {
    pub(crate) fn add(&mut self, callback: Arc<dyn LeaderChanged>) -> Subscription {
        let subscription = Subscription::new();
        self.entries.push((subscription, callback));
        subscription
    }

    pub(crate) fn remove(&mut self, subscription: &Subscription) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(id, _)| id != subscription);
        self.entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Invokes every callback in registration order. Returns how many
    /// callbacks ran and how many of them panicked.
    pub(crate) fn publish(&self, view: &LeaderView) -> (u64, u64) {
        let mut panicked = 0;
        for (subscription, callback) in &self.entries {
            if !deliver(subscription, callback.as_ref(), view) {
                panicked += 1;
            }
        }
        (self.entries.len() as u64, panicked)
    }
}

/// Runs one callback, containing any panic. Returns false if it panicked.
pub(crate) fn deliver(subscription: &Subscription, callback: &dyn LeaderChanged, view: &LeaderView) -> bool {
    match catch_unwind(AssertUnwindSafe(|| callback.on_leader_changed(view))) {
        Ok(()) => true,
        Err(payload) => {
            error!(
                "Leader-change callback {} panicked on {}: {}",
                subscription.id(),
                view,
                panic_message(payload.as_ref())
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_publish_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut list = SubscriberList::default();

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            list.add(Arc::new(move |_: &LeaderView| seen.lock().push(tag)));
        }

        assert_eq!(list.publish(&LeaderView::Absent), (3, 0));
        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let calls = Arc::new(Mutex::new(0));
        let mut list = SubscriberList::default();

        list.add(Arc::new(|_: &LeaderView| panic!("callback failure")));
        let counter = Arc::clone(&calls);
        list.add(Arc::new(move |_: &LeaderView| *counter.lock() += 1));

        assert_eq!(list.publish(&LeaderView::Absent), (2, 1));
        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn test_remove() {
        let mut list = SubscriberList::default();
        let subscription = list.add(Arc::new(|_: &LeaderView| {}));
        assert_eq!(list.len(), 1);
        assert!(list.remove(&subscription));
        assert!(!list.remove(&subscription));
        assert_eq!(list.len(), 0);
    }
}
