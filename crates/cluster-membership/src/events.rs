//! Event subscriber registry.
//!
//! Per §9's design note, subscribers are invoked outside the membership
//! lock: callers snapshot (clone) the subscriber list while holding the
//! lock just long enough to copy it, then invoke each callback after
//! releasing it, so user code can never block the membership engine.

use std::sync::{Arc, Mutex};

use cluster_types::MembershipEvent;

type Callback = Arc<dyn Fn(MembershipEvent) + Send + Sync>;

/// A registry of `(fn_ptr, user_arg)`-style callbacks, expressed in Rust
/// as boxed closures the caller has already bound their user data into.
#[derive(Default)]
pub struct EventSubscribers {
    subscribers: Mutex<Vec<Callback>>,
}

impl EventSubscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber, invoked for every subsequent `Alive`/`Dead`
    /// transition (§6.3).
    pub fn subscribe(&self, callback: impl Fn(MembershipEvent) + Send + Sync + 'static) {
        self.subscribers.lock().unwrap().push(Arc::new(callback));
    }

    /// Snapshots the current subscriber list and invokes each one with
    /// `event`, without holding the registry's lock during invocation.
    pub fn notify(&self, event: MembershipEvent) {
        let snapshot: Vec<Callback> = self.subscribers.lock().unwrap().clone();
        for callback in snapshot {
            callback(event);
        }
    }
}
