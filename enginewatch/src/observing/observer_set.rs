use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Mutex, PoisonError},
};

use crate::observing::Observer;

/// Observers shared by a controller and all of its subscriptions.
pub(crate) struct ObserverSet {
    observers: Mutex<Vec<Box<dyn Observer>>>,
}

impl ObserverSet {
    pub fn new(observers: Vec<Box<dyn Observer>>) -> Self {
        Self {
            observers: Mutex::new(observers),
        }
    }

    pub fn push(&self, observer: Box<dyn Observer>) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn notify(&self, f: impl Fn(&dyn Observer)) {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        let mut index = 0;
        observers.retain(|observer| {
            index += 1;
            let result = catch_unwind(AssertUnwindSafe(|| f(observer.as_ref())));
            if result.is_err() {
                tracing::error!(observer = index - 1, "Observer panicked, removing");
                return false;
            }
            true
        });
    }
}

impl fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverSet")
            .field("observers.len()", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::SubscriptionId;

    struct Counting(Arc<AtomicUsize>);

    impl Observer for Counting {
        fn on_confirmed(&self, _id: &SubscriptionId) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Panicking;

    impl Observer for Panicking {
        fn on_confirmed(&self, _id: &SubscriptionId) {
            panic!("observer failure");
        }
    }

    #[test]
    fn panicking_observer_is_removed_others_keep_running() {
        let count = Arc::new(AtomicUsize::new(0));
        let set = ObserverSet::new(vec![
            Box::new(Panicking),
            Box::new(Counting(count.clone())),
        ]);
        let id = SubscriptionId::new();

        set.notify(|o| o.on_confirmed(&id));
        assert_eq!(set.len(), 1);
        set.notify(|o| o.on_confirmed(&id));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
