// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `time.now_us()` / `time.after()` collaborator (spec §6), made a trait so
//! tests can drive the heartbeat and resume logic without sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::sequence::is_after;

/// Monotonic (for our purposes, wall-clock) microsecond time source.
pub trait Clock: Send + Sync {
    fn now_us(&self) -> u64;

    /// `true` if `a` is strictly after `b`, matching the wrap-around arc
    /// comparison PGM uses for sequence numbers, reused here per spec §6
    /// since deadlines are stored as 64-bit microsecond counts that never
    /// realistically wrap but the original source shares one comparison
    /// primitive for both.
    fn after(&self, a: u64, b: u64) -> bool {
        a > b
    }
}

/// Real wall-clock time, microseconds since the Unix epoch.
#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_us(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0)
    }
}

/// A settable clock for deterministic tests: `now_us()` returns whatever was
/// last stored with [`FakeClock::set`], starting at `0`.
#[derive(Default)]
pub struct FakeClock {
    now_us: AtomicU64,
}

impl FakeClock {
    #[must_use]
    pub fn new(start_us: u64) -> Self {
        Self {
            now_us: AtomicU64::new(start_us),
        }
    }

    pub fn set(&self, now_us: u64) {
        self.now_us.store(now_us, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_us: u64) {
        self.now_us.fetch_add(delta_us, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_holds_until_advanced() {
        let clock = FakeClock::new(100);
        assert_eq!(clock.now_us(), 100);
        clock.advance(50);
        assert_eq!(clock.now_us(), 150);
        clock.set(0);
        assert_eq!(clock.now_us(), 0);
    }

    #[test]
    fn system_clock_is_monotonic_enough_for_a_sleep() {
        let clock = SystemClock;
        let a = clock.now_us();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let b = clock.now_us();
        assert!(is_after(b as u32, a as u32) || b > a);
    }
}
