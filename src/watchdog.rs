use std::sync::atomic::{AtomicU32, Ordering};

pub const DEFAULT_WATCHDOG_BUDGET: u32 = 10;

/// Countdown fed by decoded frames and drained by a periodic tick.
#[derive(Debug)]
pub struct Watchdog {
    budget: u32,
    counter: AtomicU32,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new(DEFAULT_WATCHDOG_BUDGET)
    }
}

impl Watchdog {
    pub fn new(budget: u32) -> Self {
        let budget = budget.max(1);
        Watchdog {
            budget,
            counter: AtomicU32::new(budget),
        }
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    pub fn remaining(&self) -> u32 {
        self.counter.load(Ordering::Acquire)
    }

    /// Reseeds the counter to the full budget.
    pub fn feed(&self) {
        self.counter.store(self.budget, Ordering::Release);
    }

    /// Decrements the counter; returns `true` exactly once when it reaches zero.
    pub fn tick(&self) -> bool {
        let previous = self
            .counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            });

        matches!(previous, Ok(1))
    }
}
