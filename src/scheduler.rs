//! Millisecond tick shared between the tick context and the control loop.
use core::cell::Cell;

use embassy_sync::blocking_mutex::CriticalSectionMutex;

/// Wrapping millisecond counter.
///
/// Reads and writes go through a critical section, so a 32-bit value is never
/// observed half-updated on a narrower core.
pub struct MillisCounter {
    ms: CriticalSectionMutex<Cell<u32>>,
}

impl Default for MillisCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl MillisCounter {
    pub const fn new() -> Self {
        Self::starting_at(0)
    }

    pub const fn starting_at(ms: u32) -> Self {
        MillisCounter {
            ms: CriticalSectionMutex::new(Cell::new(ms)),
        }
    }

    /// Called once per tick period, from the tick handler only.
    pub fn tick(&self) {
        self.ms.lock(|ms| ms.set(ms.get().wrapping_add(1)));
    }

    pub fn now(&self) -> u32 {
        self.ms.lock(|ms| ms.get())
    }

    pub fn elapsed_since(&self, then: u32) -> u32 {
        self.now().wrapping_sub(then)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_ticks() {
        let counter = MillisCounter::new();
        for _ in 0..250 {
            counter.tick();
        }
        assert_eq!(counter.now(), 250);
        assert_eq!(counter.elapsed_since(50), 200);
    }

    #[test]
    fn wraps_around() {
        let counter = MillisCounter::starting_at(u32::MAX - 1);
        let start = counter.now();
        counter.tick();
        counter.tick();
        counter.tick();
        assert_eq!(counter.now(), 1);
        assert_eq!(counter.elapsed_since(start), 3);
    }

    #[test]
    fn shared_across_threads() {
        static COUNTER: MillisCounter = MillisCounter::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| {
                    for _ in 0..1000 {
                        COUNTER.tick();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(COUNTER.now(), 4000);
    }
}
