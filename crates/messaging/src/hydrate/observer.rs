//! Subscription list for hydration listeners
//!
//! Screens that show cached entities subscribe while they are visible and
//! drop their [`Subscription`] when they go away.

use log::debug;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::models::MessageId;

/// Which entity finished hydrating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HydrationEvent {
    Conversation(i64),
    Message(MessageId),
}

/// Receiver of hydration events
///
/// Called from hydration worker threads; implementations should hand the
/// event off rather than doing heavy work inline.
pub trait HydrationListener: Send + Sync {
    fn on_hydrated(&self, event: HydrationEvent);
}

impl<F> HydrationListener for F
where
    F: Fn(HydrationEvent) + Send + Sync,
{
    fn on_hydrated(&self, event: HydrationEvent) {
        self(event)
    }
}

struct Registry {
    last_id: u64,
    max_subscribers: Option<usize>,
    entries: VecDeque<(u64, Arc<dyn HydrationListener>)>,
}

impl Registry {
    fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }
}

/// Shared list of hydration listeners
///
/// Cloning yields another handle to the same list.
#[derive(Clone)]
pub struct Observers {
    registry: Arc<Mutex<Registry>>,
}

impl Default for Observers {
    fn default() -> Self {
        Self::new()
    }
}

impl Observers {
    /// Create an unbounded list
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    /// Create a list holding at most `max_subscribers` listeners
    ///
    /// Subscribing beyond the limit displaces the oldest listener, so with a
    /// limit of one the most recently active screen wins.
    pub fn bounded(max_subscribers: usize) -> Self {
        Self::with_limit(Some(max_subscribers.max(1)))
    }

    fn with_limit(max_subscribers: Option<usize>) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                last_id: 0,
                max_subscribers,
                entries: VecDeque::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a listener until the returned subscription is dropped
    pub fn subscribe(&self, listener: Arc<dyn HydrationListener>) -> Subscription {
        let mut registry = self.lock();
        registry.last_id += 1;
        let id = registry.last_id;

        if let Some(max) = registry.max_subscribers {
            while registry.entries.len() >= max {
                if let Some((displaced, _)) = registry.entries.pop_front() {
                    debug!("[HYDRATE] listener {} displaced by {}", displaced, id);
                }
            }
        }
        registry.entries.push_back((id, listener));

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event to every listener
    ///
    /// The listener list is copied first so listeners may subscribe or
    /// unsubscribe from inside the callback.
    pub fn notify(&self, event: HydrationEvent) {
        let listeners: Vec<Arc<dyn HydrationListener>> = self
            .lock()
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener.on_hydrated(event);
        }
    }
}

/// Handle tying a listener's registration to its owner's lifetime
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Whether the listener is still registered (it may have been displaced)
    pub fn is_active(&self) -> bool {
        self.registry.upgrade().is_some_and(|registry| {
            registry
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .entries
                .iter()
                .any(|(id, _)| *id == self.id)
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn channel_listener() -> (Arc<dyn HydrationListener>, mpsc::Receiver<HydrationEvent>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let listener = move |event: HydrationEvent| {
            let _ = tx.lock().unwrap().send(event);
        };
        (Arc::new(listener), rx)
    }

    #[test]
    fn test_notify_reaches_subscribers() {
        let observers = Observers::new();
        let (a, rx_a) = channel_listener();
        let (b, rx_b) = channel_listener();
        let _sub_a = observers.subscribe(a);
        let _sub_b = observers.subscribe(b);

        observers.notify(HydrationEvent::Conversation(3));

        assert_eq!(rx_a.try_recv().unwrap(), HydrationEvent::Conversation(3));
        assert_eq!(rx_b.try_recv().unwrap(), HydrationEvent::Conversation(3));
    }

    #[test]
    fn test_drop_unsubscribes() {
        let observers = Observers::new();
        let (listener, rx) = channel_listener();
        let sub = observers.subscribe(listener);
        assert_eq!(observers.len(), 1);

        drop(sub);
        assert!(observers.is_empty());

        observers.notify(HydrationEvent::Conversation(1));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_bounded_displaces_oldest() {
        let observers = Observers::bounded(1);
        let (first, rx_first) = channel_listener();
        let (second, rx_second) = channel_listener();

        let sub_first = observers.subscribe(first);
        let sub_second = observers.subscribe(second);

        assert!(!sub_first.is_active());
        assert!(sub_second.is_active());
        assert_eq!(observers.len(), 1);

        observers.notify(HydrationEvent::Message(MessageId::sms(2)));
        assert!(rx_first.try_recv().is_err());
        assert!(rx_second.try_recv().is_ok());

        // Dropping the displaced subscription must not remove the active one
        drop(sub_first);
        assert_eq!(observers.len(), 1);
    }

    #[test]
    fn test_subscription_outlives_observers() {
        let observers = Observers::new();
        let (listener, _rx) = channel_listener();
        let sub = observers.subscribe(listener);

        drop(observers);
        assert!(!sub.is_active());
        drop(sub);
    }
}
