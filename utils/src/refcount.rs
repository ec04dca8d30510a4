use std::{
    fmt::Debug,
    sync::atomic::{AtomicI64, Ordering},
};

/// Counter value marking an object whose references all were released
const DESTROYED: i64 = -1;

type OnZero = Box<dyn Fn() + Send + Sync>;

/// An atomic reference counter for objects whose lifecycle is managed explicitly rather than by `Drop`.
///
/// The count starts at zero. Once a reference is taken and the count later returns to zero the counter is
/// destroyed: the `on_zero` hook runs exactly once and the counter refuses any further reservation. Taking a
/// reference on a destroyed counter, or releasing below zero, is a programming error and panics.
pub struct ReferenceCounter {
    count: AtomicI64,
    on_zero: Option<OnZero>,
}

impl ReferenceCounter {
    pub fn new() -> Self {
        Self { count: AtomicI64::new(0), on_zero: None }
    }

    pub fn with_on_zero(on_zero: impl Fn() + Send + Sync + 'static) -> Self {
        Self { count: AtomicI64::new(0), on_zero: Some(Box::new(on_zero)) }
    }

    /// Takes a reference, or returns false if the counter was already destroyed
    pub fn try_reserve(&self) -> bool {
        let mut count = self.count.load(Ordering::Acquire);
        loop {
            if count == DESTROYED {
                return false;
            }
            match self.count.compare_exchange_weak(count, count + 1, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return true,
                Err(c) => count = c,
            }
        }
    }

    /// Takes a reference.
    ///
    /// # Panics
    /// Panics if the counter was already destroyed.
    pub fn reserve(&self) {
        assert!(self.try_reserve(), "reservation taken on a destroyed reference counter");
    }

    /// Releases a reference. Returns true if this was the last one, in which case the counter is now destroyed.
    ///
    /// # Panics
    /// Panics if there is no outstanding reference.
    pub fn release(&self) -> bool {
        let mut count = self.count.load(Ordering::Acquire);
        loop {
            assert!(count > 0, "reference counter released without an outstanding reservation (count {})", count);
            let next = if count == 1 { DESTROYED } else { count - 1 };
            match self.count.compare_exchange_weak(count, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) if next == DESTROYED => {
                    if let Some(on_zero) = &self.on_zero {
                        on_zero();
                    }
                    return true;
                }
                Ok(_) => return false,
                Err(c) => count = c,
            }
        }
    }

    /// The number of outstanding references, or `None` once destroyed
    pub fn count(&self) -> Option<u64> {
        match self.count.load(Ordering::Acquire) {
            DESTROYED => None,
            count => Some(count as u64),
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.count.load(Ordering::Acquire) == DESTROYED
    }
}

impl Default for ReferenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for ReferenceCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceCounter").field("count", &self.count.load(Ordering::Relaxed)).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, atomic::AtomicUsize};

    #[test]
    fn test_lifecycle() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = {
            let fired = fired.clone();
            ReferenceCounter::with_on_zero(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };
        assert_eq!(counter.count(), Some(0));
        counter.reserve();
        assert!(counter.try_reserve());
        assert_eq!(counter.count(), Some(2));
        assert!(!counter.release());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(counter.release());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(counter.is_destroyed());
        assert!(!counter.try_reserve());
        assert_eq!(counter.count(), None);
    }

    #[test]
    #[should_panic(expected = "without an outstanding reservation")]
    fn test_release_at_zero_panics() {
        ReferenceCounter::new().release();
    }

    #[test]
    #[should_panic(expected = "destroyed")]
    fn test_reserve_after_destroy_panics() {
        let counter = ReferenceCounter::new();
        counter.reserve();
        counter.release();
        counter.reserve();
    }

    #[test]
    fn test_concurrent_reservations() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = {
            let fired = fired.clone();
            Arc::new(ReferenceCounter::with_on_zero(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            }))
        };
        // Hold one reference so the workers never observe zero
        counter.reserve();
        let handles = (0..8)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        assert!(counter.try_reserve());
                        counter.release();
                    }
                })
            })
            .collect::<Vec<_>>();
        handles.into_iter().for_each(|h| h.join().unwrap());
        assert_eq!(counter.count(), Some(1));
        assert!(counter.release());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
