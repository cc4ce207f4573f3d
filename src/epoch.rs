//! Cache generations for session invalidation

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Source of raw epoch values
///
/// Values must never decrease; they may repeat when the clock resolution is
/// coarser than the call rate.
pub trait EpochClock: Send + Sync {
    fn now(&self) -> u64;
}

/// Nanoseconds elapsed since the clock was created
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl EpochClock for MonotonicClock {
    fn now(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Current cache generation.
///
/// Reads are a single atomic load. Only [`Epoch::advance`] writes, and callers
/// must serialize it.
pub struct Epoch {
    current: AtomicU64,
    clock: Box<dyn EpochClock>,
}

impl Epoch {
    pub fn new(clock: Box<dyn EpochClock>) -> Self {
        Self {
            current: AtomicU64::new(0),
            clock,
        }
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    /// Move to a strictly greater generation, spinning on the clock until it
    /// moves past the current value.
    pub(crate) fn advance(&self) -> u64 {
        let previous = self.current.load(Ordering::Acquire);
        let mut next = self.clock.now();
        while next <= previous {
            std::hint::spin_loop();
            next = self.clock.now();
        }
        self.current.store(next, Ordering::Release);
        next
    }
}

impl Default for Epoch {
    fn default() -> Self {
        Self::new(Box::new(MonotonicClock::new()))
    }
}

impl std::fmt::Debug for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Epoch")
            .field("current", &self.current())
            .finish_non_exhaustive()
    }
}
