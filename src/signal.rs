//! Manual-reset events and composite ("shared") events.
//!
//! Mirrors `threading.Event` from the Python original, plus a composite event
//! that stays in sync with a set of member events. The original drives the
//! composite by monkey-patching each member's `set`/`clear` methods; here each
//! event instead carries a subscriber list that member events call into, per
//! the design note in spec.md §9.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

type Subscriber = Arc<dyn Fn() + Send + Sync>;

struct Inner {
    state: Mutex<bool>,
    condvar: Condvar,
    subscribers: Mutex<Vec<Subscriber>>,
}

/// A manual-reset event: stays set until explicitly cleared.
#[derive(Clone)]
pub struct ManualResetEvent(Arc<Inner>);

impl ManualResetEvent {
    pub fn new() -> Self {
        Self(Arc::new(Inner {
            state: Mutex::new(false),
            condvar: Condvar::new(),
            subscribers: Mutex::new(Vec::new()),
        }))
    }

    pub fn set(&self) {
        *self.0.state.lock() = true;
        self.0.condvar.notify_all();
        self.notify_subscribers();
    }

    pub fn clear(&self) {
        *self.0.state.lock() = false;
        self.notify_subscribers();
    }

    pub fn is_set(&self) -> bool {
        *self.0.state.lock()
    }

    /// Blocks until set or `timeout` elapses. Returns whether it was set.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut guard = self.0.state.lock();
        if *guard {
            return true;
        }
        if timeout.is_zero() {
            return *guard;
        }
        self.0.condvar.wait_for(&mut guard, timeout);
        *guard
    }

    /// Registers a callback invoked (with no lock held) whenever this event's
    /// `set`/`clear` changes its observable state.
    fn subscribe(&self, callback: Subscriber) {
        self.0.subscribers.lock().push(callback);
    }

    fn notify_subscribers(&self) {
        // Snapshot under the lock, then call back without holding it, so a
        // subscriber touching this same event (e.g. a composite recomputing
        // its own subscribers) can't deadlock against us.
        let subscribers = self.0.subscribers.lock().clone();
        for subscriber in subscribers {
            subscriber();
        }
    }
}

impl Default for ManualResetEvent {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds an event that is set iff any of `members` is set, and cleared iff
/// all of them are cleared. The returned event tracks future `set`/`clear`
/// calls on any member.
pub fn shared_event(members: &[ManualResetEvent]) -> ManualResetEvent {
    let shared = ManualResetEvent::new();
    let members: Vec<ManualResetEvent> = members.to_vec();

    let target = shared.clone();
    let watched = members.clone();
    let recompute: Subscriber = Arc::new(move || {
        if watched.iter().any(ManualResetEvent::is_set) {
            target.set();
        } else {
            target.clear();
        }
    });

    for member in &members {
        member.subscribe(recompute.clone());
    }

    // Reflect whatever state the members are already in at composition time.
    recompute();

    shared
}
