use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// Counts objects admitted into a bounded region (usually a queue) and blocks admissions while the
/// region is at capacity. A capacity of `None` never blocks but still keeps the count.
///
/// [`Self::force_acquire`] admits regardless of capacity. It is meant for messages whose delivery must not
/// wait on the region draining, e.g. feedback traffic whose consumer is the blocked producer itself.
#[derive(Debug)]
pub struct BackpressureCounter {
    capacity: Option<usize>,
    count: Mutex<usize>,
    released: Condvar,
}

impl BackpressureCounter {
    pub fn new(capacity: Option<usize>) -> Self {
        Self { capacity: capacity.map(|c| c.max(1)), count: Mutex::new(0), released: Condvar::new() }
    }

    /// Waits at most `timeout` for room. Returns whether the object was admitted
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        let mut count = self.count.lock();
        if let Some(capacity) = self.capacity {
            while *count >= capacity {
                if self.released.wait_for(&mut count, timeout).timed_out() {
                    return false;
                }
            }
        }
        *count += 1;
        true
    }

    /// Admits one object ignoring capacity
    pub fn force_acquire(&self) {
        *self.count.lock() += 1;
    }

    pub fn release(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        drop(count);
        self.released.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        thread,
    };

    const SHORT: Duration = Duration::from_millis(5);

    #[test]
    fn test_capacity_blocks_until_release() {
        let counter = Arc::new(BackpressureCounter::new(Some(2)));
        assert!(counter.acquire_timeout(SHORT));
        assert!(counter.acquire_timeout(SHORT));
        assert!(!counter.acquire_timeout(SHORT));

        let admitted = Arc::new(AtomicBool::new(false));
        let handle = {
            let (counter, admitted) = (counter.clone(), admitted.clone());
            thread::spawn(move || {
                assert!(counter.acquire_timeout(Duration::from_secs(10)));
                admitted.store(true, Ordering::SeqCst);
            })
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!admitted.load(Ordering::SeqCst));
        counter.release();
        handle.join().unwrap();
        assert!(admitted.load(Ordering::SeqCst));
        assert!(!counter.acquire_timeout(SHORT));
    }

    #[test]
    fn test_force_acquire_ignores_capacity() {
        let counter = BackpressureCounter::new(Some(1));
        assert!(counter.acquire_timeout(SHORT));
        counter.force_acquire();
        counter.release();
        assert!(!counter.acquire_timeout(SHORT));
        counter.release();
        assert!(counter.acquire_timeout(SHORT));
    }

    #[test]
    fn test_without_capacity() {
        let counter = BackpressureCounter::new(None);
        assert!((0..1000).all(|_| counter.acquire_timeout(SHORT)));
        // Releasing more than was admitted saturates at zero
        (0..1001).for_each(|_| counter.release());
        let bounded = BackpressureCounter::new(Some(0));
        assert!(bounded.acquire_timeout(SHORT));
        assert!(!bounded.acquire_timeout(SHORT));
    }
}
