//! Worker sizing and the write-side semaphore.
//!
//! Batch extraction and packing both run on scoped worker threads pulling
//! jobs off an atomic cursor; disk writes during extraction are bounded by
//! a counting semaphore so a wide pool does not thrash the disk.

use std::thread;

use parking_lot::{Condvar, Mutex};

/// Worker thread count: hardware threads, capped.
pub(crate) fn worker_count(cap: usize) -> usize {
    let hardware = thread::available_parallelism().map_or(1, |n| n.get());
    hardware.min(cap).max(1)
}

/// Concurrent writer bound: `min(8, max(1, cores / 2))`.
pub(crate) fn writer_permits() -> usize {
    let hardware = thread::available_parallelism().map_or(1, |n| n.get());
    (hardware / 2).clamp(1, 8)
}

/// Counting semaphore over a mutex and condvar.
pub(crate) struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    pub(crate) fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    pub(crate) fn acquire(&self) -> SemaphoreGuard<'_> {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.available.wait(&mut permits);
        }
        *permits -= 1;
        SemaphoreGuard { semaphore: self }
    }

    fn release(&self) {
        let mut permits = self.permits.lock();
        *permits += 1;
        self.available.notify_one();
    }
}

pub(crate) struct SemaphoreGuard<'a> {
    semaphore: &'a Semaphore,
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn semaphore_bounds_concurrency() {
        let semaphore = Arc::new(Semaphore::new(2));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        thread::scope(|scope| {
            for _ in 0..8 {
                let semaphore = Arc::clone(&semaphore);
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                scope.spawn(move || {
                    let _guard = semaphore.acquire();
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(std::time::Duration::from_millis(5));
                    active.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn sizing_is_never_zero() {
        assert!(worker_count(16) >= 1);
        assert!((1..=8).contains(&writer_permits()));
    }
}
