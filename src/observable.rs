//! A value holder that publishes `(new, old)` pairs to every subscriber.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// One published transition.
#[derive(Debug, Clone)]
pub struct Change<T> {
    pub new: T,
    pub old: T,
}

/// Current value plus a broadcast of every replacement.
///
/// Subscribers that fall more than the channel capacity behind receive a
/// `Lagged` error and should re-read [`Observable::get`].
#[derive(Debug)]
pub struct Observable<T: Clone> {
    value: Mutex<T>,
    changes: broadcast::Sender<Change<T>>,
}

impl<T: Clone> Observable<T> {
    pub fn new(initial: T) -> Self {
        let (changes, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            value: Mutex::new(initial),
            changes,
        }
    }

    /// Clone of the current value.
    pub fn get(&self) -> T {
        self.lock().clone()
    }

    /// Replace the value and publish the transition. Returns the old value.
    pub fn set(&self, new: T) -> T {
        let mut guard = self.lock();
        let old = std::mem::replace(&mut *guard, new.clone());
        // no receivers is fine
        let _ = self.changes.send(Change {
            new,
            old: old.clone(),
        });
        old
    }

    /// Run `f` under the value lock and publish whatever it returns.
    ///
    /// `None` leaves the value untouched and publishes nothing. Returns the
    /// replaced value when `f` produced a new one. Anything `f` reads or
    /// writes is ordered with every other `set` and `update`.
    pub fn update(&self, f: impl FnOnce(&T) -> Option<T>) -> Option<T> {
        let mut guard = self.lock();
        let new = f(&*guard)?;
        let old = std::mem::replace(&mut *guard, new.clone());
        let _ = self.changes.send(Change {
            new,
            old: old.clone(),
        });
        Some(old)
    }

    /// Every replacement as `(new, old)`.
    pub fn subscribe(&self) -> broadcast::Receiver<Change<T>> {
        self.changes.subscribe()
    }

    /// Subscribe and read the current value atomically with respect to `set`.
    pub fn subscribe_with_current(&self) -> (T, broadcast::Receiver<Change<T>>) {
        let guard = self.lock();
        let receiver = self.changes.subscribe();
        (guard.clone(), receiver)
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone + Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_set_publishes_new_and_old() {
        let observable = Observable::new(1);
        let mut rx = observable.subscribe();

        assert_eq!(observable.set(2), 1);

        let change = rx.try_recv().unwrap();
        assert_eq!(change.new, 2);
        assert_eq!(change.old, 1);
        assert_eq!(observable.get(), 2);
    }

    #[test]
    fn test_multiple_subscribers_see_every_change() {
        let observable = Observable::new(String::new());
        let mut first = observable.subscribe();
        let mut second = observable.subscribe();

        observable.set("a".to_string());
        observable.set("b".to_string());

        for rx in [&mut first, &mut second] {
            assert_eq!(rx.try_recv().unwrap().new, "a");
            assert_eq!(rx.try_recv().unwrap().new, "b");
        }
    }

    #[test]
    fn test_set_without_subscribers() {
        let observable: Observable<Option<u8>> = Observable::default();
        observable.set(Some(3));
        assert_eq!(observable.get(), Some(3));
    }

    #[test]
    fn test_subscribe_with_current() {
        let observable = Observable::new(5);
        let (current, mut rx) = observable.subscribe_with_current();
        assert_eq!(current, 5);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_update_none_publishes_nothing() {
        let observable = Observable::new(1);
        let mut rx = observable.subscribe();

        assert_eq!(observable.update(|_| None), None);
        assert_eq!(observable.update(|current| Some(current + 1)), Some(1));

        assert_eq!(rx.try_recv().unwrap().new, 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_generation_checked_update_never_publishes_stale_value() {
        const THREADS: u64 = 8;
        const ROUNDS: u64 = 500;

        let observable = Arc::new(Observable::new(0u64));
        let generation = Arc::new(AtomicU64::new(0));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let observable = Arc::clone(&observable);
                let generation = Arc::clone(&generation);
                std::thread::spawn(move || {
                    for _ in 0..ROUNDS {
                        let mut mine = 0;
                        observable.update(|_| {
                            mine = generation.fetch_add(1, Ordering::SeqCst) + 1;
                            None
                        });
                        std::thread::yield_now();
                        observable.update(|_| {
                            (generation.load(Ordering::SeqCst) == mine).then_some(mine)
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // the newest attempt always wins; no older one can land after it
        assert_eq!(observable.get(), THREADS * ROUNDS);
    }
}
