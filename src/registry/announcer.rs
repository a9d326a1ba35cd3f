//! Fan-out broadcaster over a dynamic set of listeners.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use crate::observability::metrics;

/// Holds a mutable set of listeners and invokes the same call on each.
///
/// Membership is weakly consistent: a listener added while an announcement
/// is in flight may or may not receive it. Each invocation is isolated, a
/// panicking listener is logged and skipped.
pub struct Announcer<L: ?Sized> {
    name: &'static str,
    listeners: RwLock<Vec<Arc<L>>>,
}

impl<L: ?Sized> Announcer<L> {
    /// Create an announcer. `name` labels log lines and metrics.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn add_listener(&self, listener: Arc<L>) {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }

    /// Remove a listener by pointer identity. Returns true if it was registered.
    pub fn remove_listener(&self, listener: &Arc<L>) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn listeners(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Invoke `call` on every listener registered at the time of the call.
    ///
    /// Returns the number of listeners that panicked.
    pub fn announce<F>(&self, call: F) -> usize
    where
        F: Fn(&L),
    {
        // Snapshot membership so listeners may add/remove peers re-entrantly.
        let listeners: Vec<Arc<L>> = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        let mut failures = 0;
        for listener in &listeners {
            if !self.announce_one(listener, &call) {
                failures += 1;
            }
        }
        failures
    }

    /// Invoke `call` on a single listener with the same isolation as
    /// `announce`. Returns false if the listener panicked.
    pub fn announce_one<F>(&self, listener: &L, call: F) -> bool
    where
        F: Fn(&L),
    {
        match panic::catch_unwind(AssertUnwindSafe(|| call(listener))) {
            Ok(()) => true,
            Err(payload) => {
                tracing::error!(
                    announcer = self.name,
                    error = %panic_message(payload.as_ref()),
                    "Listener failed during announcement"
                );
                metrics::record_listener_failure(self.name);
                false
            }
        }
    }
}

impl<L: ?Sized> std::fmt::Debug for Announcer<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Announcer")
            .field("name", &self.name)
            .field("listeners", &self.listeners())
            .finish()
    }
}

fn same_listener<L: ?Sized>(a: &Arc<L>, b: &Arc<L>) -> bool {
    // Compare data pointers only; vtable pointers of the same object may differ.
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    trait Ping: Send + Sync {
        fn ping(&self, n: usize);
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<usize>>,
    }

    impl Ping for Recorder {
        fn ping(&self, n: usize) {
            self.seen.lock().unwrap().push(n);
        }
    }

    struct Exploding;

    impl Ping for Exploding {
        fn ping(&self, _n: usize) {
            panic!("boom");
        }
    }

    #[test]
    fn announces_to_every_listener_in_order() {
        let announcer: Announcer<dyn Ping> = Announcer::new("test");
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        announcer.add_listener(a.clone());
        announcer.add_listener(b.clone());

        announcer.announce(|l| l.ping(1));
        announcer.announce(|l| l.ping(2));

        assert_eq!(*a.seen.lock().unwrap(), vec![1, 2]);
        assert_eq!(*b.seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn removed_listener_is_not_called() {
        let announcer: Announcer<dyn Ping> = Announcer::new("test");
        let a = Arc::new(Recorder::default());
        let a_dyn: Arc<dyn Ping> = a.clone();
        announcer.add_listener(a_dyn.clone());

        assert!(announcer.remove_listener(&a_dyn));
        assert!(!announcer.remove_listener(&a_dyn));
        announcer.announce(|l| l.ping(1));

        assert!(a.seen.lock().unwrap().is_empty());
        assert_eq!(announcer.listeners(), 0);
    }

    #[test]
    fn panicking_listener_does_not_stop_delivery() {
        let announcer: Announcer<dyn Ping> = Announcer::new("test");
        let after = Arc::new(Recorder::default());
        announcer.add_listener(Arc::new(Exploding));
        announcer.add_listener(after.clone());

        let failures = announcer.announce(|l| l.ping(7));

        assert_eq!(failures, 1);
        assert_eq!(*after.seen.lock().unwrap(), vec![7]);
    }

    #[test]
    fn listener_may_register_peers_during_announcement() {
        struct Spawner {
            announcer: Arc<Announcer<dyn Ping>>,
            calls: AtomicUsize,
        }

        impl Ping for Spawner {
            fn ping(&self, _n: usize) {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.announcer.add_listener(Arc::new(Recorder::default()));
            }
        }

        let announcer: Arc<Announcer<dyn Ping>> = Arc::new(Announcer::new("test"));
        let spawner = Arc::new(Spawner {
            announcer: announcer.clone(),
            calls: AtomicUsize::new(0),
        });
        announcer.add_listener(spawner.clone());

        announcer.announce(|l| l.ping(1));

        assert_eq!(spawner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(announcer.listeners(), 2);
    }
}
