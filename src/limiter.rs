//! Counting semaphore that caps how many composites run at once.
//!
//! One limiter is created per run and shared through an [`Arc`] with every
//! spawned task, so the cap holds across groups, not just within one.
//! Slots are only handed out as [`Permit`]s; dropping the permit is the only
//! way to give a slot back, which keeps every exit path of a task balanced.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{StampError, StampResult};

#[derive(Debug, Default)]
struct Slots {
    in_flight: usize,
    peak: usize,
}

#[derive(Debug)]
pub struct ConcurrencyLimiter {
    capacity: usize,
    slots: Mutex<Slots>,
    freed: Condvar,
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize) -> StampResult<Self> {
        if capacity == 0 {
            return Err(StampError::config("limiter capacity must be >= 1"));
        }
        Ok(Self {
            capacity,
            slots: Mutex::new(Slots::default()),
            freed: Condvar::new(),
        })
    }

    pub fn shared(capacity: usize) -> StampResult<Arc<Self>> {
        Self::new(capacity).map(Arc::new)
    }

    /// Block until a slot is free and take it.
    pub fn acquire(&self) -> Permit<'_> {
        let mut slots = self.slots.lock();
        while slots.in_flight >= self.capacity {
            self.freed.wait(&mut slots);
        }
        self.take(&mut slots);
        Permit { limiter: self }
    }

    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut slots = self.slots.lock();
        if slots.in_flight >= self.capacity {
            return None;
        }
        self.take(&mut slots);
        Some(Permit { limiter: self })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.slots.lock().in_flight
    }

    /// Highest number of permits held at the same time since creation.
    pub fn peak(&self) -> usize {
        self.slots.lock().peak
    }

    fn take(&self, slots: &mut Slots) {
        slots.in_flight += 1;
        slots.peak = slots.peak.max(slots.in_flight);
    }

    fn release(&self) {
        let mut slots = self.slots.lock();
        debug_assert!(slots.in_flight > 0, "limiter released more than acquired");
        slots.in_flight = slots.in_flight.saturating_sub(1);
        drop(slots);
        self.freed.notify_one();
    }
}

/// A held limiter slot, released on drop.
#[must_use = "dropping the permit releases the slot immediately"]
#[derive(Debug)]
pub struct Permit<'a> {
    limiter: &'a ConcurrencyLimiter,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            ConcurrencyLimiter::new(0),
            Err(StampError::Config(_))
        ));
    }

    #[test]
    fn permits_are_returned_on_drop() {
        let lim = ConcurrencyLimiter::new(2).unwrap();
        let a = lim.acquire();
        let b = lim.acquire();
        assert_eq!(lim.in_flight(), 2);
        assert!(lim.try_acquire().is_none());

        drop(a);
        assert_eq!(lim.in_flight(), 1);
        let c = lim.try_acquire();
        assert!(c.is_some());

        drop(b);
        drop(c);
        assert_eq!(lim.in_flight(), 0);
        assert_eq!(lim.peak(), 2);
    }

    #[test]
    fn permit_released_on_early_return() {
        fn fails(lim: &ConcurrencyLimiter) -> Result<(), &'static str> {
            let _permit = lim.acquire();
            Err("decode failed")
        }

        let lim = ConcurrencyLimiter::new(1).unwrap();
        assert!(fails(&lim).is_err());
        assert_eq!(lim.in_flight(), 0);
    }

    #[test]
    fn permit_released_on_panic() {
        let lim = ConcurrencyLimiter::new(1).unwrap();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _permit = lim.acquire();
            panic!("task blew up");
        }));
        assert!(res.is_err());
        assert_eq!(lim.in_flight(), 0);
    }

    #[test]
    fn never_exceeds_capacity_under_contention() {
        let lim = ConcurrencyLimiter::shared(3).unwrap();
        let running = AtomicUsize::new(0);
        let max_seen = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..16 {
                s.spawn(|| {
                    let _permit = lim.acquire();
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(5));
                    running.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        assert!(max_seen.load(Ordering::SeqCst) <= 3);
        assert!(lim.peak() <= 3);
        assert_eq!(lim.in_flight(), 0);
    }
}
