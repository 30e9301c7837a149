//! Breakpoint list change notifications

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::state::ProcessState;

/// Receives a notification whenever a session's server breakpoint list changed
pub trait BreakpointListener: Send + Sync {
    fn on_breakpoint_list_changed(&self, state: &Arc<ProcessState>);
}

/// Handle returned by [`ListenerSet::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Registered listeners. Notification runs without holding the lock, so listeners
/// may add or remove listeners while being notified.
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn BreakpointListener>)>>,
    next_id: AtomicU64,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn BreakpointListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    pub fn notify(&self, state: &Arc<ProcessState>) {
        let snapshot: Vec<Arc<dyn BreakpointListener>> =
            self.listeners.read().iter().map(|(_, l)| l.clone()).collect();
        for listener in snapshot {
            listener.on_breakpoint_list_changed(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl BreakpointListener for Counter {
        fn on_breakpoint_list_changed(&self, _state: &Arc<ProcessState>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_add_notify_remove() {
        let set = ListenerSet::new();
        let counter = Arc::new(Counter::default());
        let id = set.add(counter.clone());
        let state = Arc::new(ProcessState::new("dev@example.com", "d-1"));

        set.notify(&state);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        assert!(set.remove(id));
        assert!(!set.remove(id));
        set.notify(&state);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert!(set.is_empty());
    }
}
