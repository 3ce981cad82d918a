//! Re-authentication state signal.
//!
//! The UI shell subscribes to this signal to show a blocking
//! "re-authenticating" indicator while a token refresh is in flight.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Listener = Box<dyn Fn(bool) + Send + Sync>;

/// A process-wide observable boolean: "is a token refresh in progress".
///
/// Listeners are invoked synchronously, in registration order, each time the
/// value changes. Listeners registered after a change do not receive a
/// replay of history; read [`AuthStateSignal::get`] for the current value.
///
/// Cloning the signal produces another handle to the same registry.
///
/// # Example
///
/// ```
/// use tokenlink::AuthStateSignal;
///
/// let signal = AuthStateSignal::new();
/// let subscription = signal.subscribe(|refreshing| {
///     if refreshing {
///         println!("re-authenticating…");
///     }
/// });
/// assert!(!signal.get());
/// subscription.unsubscribe();
/// ```
#[derive(Clone, Default)]
pub struct AuthStateSignal {
    inner: Arc<SignalInner>,
}

#[derive(Default)]
struct SignalInner {
    value: AtomicBool,
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener)>>,
}

impl AuthStateSignal {
    /// Create a new signal with the value `false`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current value.
    pub fn get(&self) -> bool {
        self.inner.value.load(Ordering::SeqCst)
    }

    /// Register a listener, returning a handle that removes it again.
    ///
    /// The listener is called with the new value on every change. Do not
    /// subscribe or unsubscribe from inside a listener; the registry lock is
    /// held during notification.
    pub fn subscribe(&self, listener: impl Fn(bool) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock_listeners().push((id, Box::new(listener)));
        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Set the value and notify all current listeners.
    pub(crate) fn set(&self, refreshing: bool) {
        self.inner.value.store(refreshing, Ordering::SeqCst);
        let listeners = self.lock_listeners();
        for (_, listener) in listeners.iter() {
            listener(refreshing);
        }
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Listener)>> {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for AuthStateSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthStateSignal")
            .field("value", &self.get())
            .field("listeners", &self.lock_listeners().len())
            .finish()
    }
}

/// Handle for a registered listener.
///
/// The listener is removed when this handle is dropped or when
/// [`Subscription::unsubscribe`] is called.
#[must_use = "dropping the subscription removes the listener"]
pub struct Subscription {
    inner: Weak<SignalInner>,
    id: u64,
}

impl Subscription {
    /// Remove the listener now.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut listeners = inner.listeners.lock().unwrap_or_else(|e| e.into_inner());
            listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(signal: &AuthStateSignal) -> (Subscription, Arc<Mutex<Vec<bool>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let subscription = signal.subscribe(move |value| sink.lock().unwrap().push(value));
        (subscription, events)
    }

    #[test]
    fn notifies_listeners_on_change() {
        let signal = AuthStateSignal::new();
        let (_sub, events) = recorder(&signal);

        signal.set(true);
        signal.set(false);

        assert_eq!(*events.lock().unwrap(), vec![true, false]);
        assert!(!signal.get());
    }

    #[test]
    fn late_subscriber_gets_no_replay() {
        let signal = AuthStateSignal::new();
        signal.set(true);

        let (_sub, events) = recorder(&signal);
        assert!(events.lock().unwrap().is_empty());
        assert!(signal.get());
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let signal = AuthStateSignal::new();
        let (sub, events) = recorder(&signal);

        signal.set(true);
        sub.unsubscribe();
        signal.set(false);

        assert_eq!(*events.lock().unwrap(), vec![true]);
    }

    #[test]
    fn dropping_subscription_removes_listener() {
        let signal = AuthStateSignal::new();
        let (sub, events) = recorder(&signal);
        drop(sub);

        signal.set(true);
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let signal = AuthStateSignal::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&order);
        let _a = signal.subscribe(move |_| first.lock().unwrap().push("a"));
        let second = Arc::clone(&order);
        let _b = signal.subscribe(move |_| second.lock().unwrap().push("b"));

        signal.set(true);
        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
    }
}
