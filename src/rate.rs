// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Token-bucket rate controller gating outgoing window bytes.
//!
//! Adapted from the congestion-control token bucket used elsewhere in this
//! tree: tokens denominated in bytes, refilled continuously from elapsed
//! wall-clock time, capped at a configured burst capacity.

use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Send-flag bits consulted by [`RateController::check`].
pub mod send_flags {
    /// Never block; return immediately if tokens are unavailable.
    pub const DONTWAIT: u32 = 0x01;
    /// All-or-nothing: used together with `DONTWAIT` to request a single
    /// rate check covering every TPDU a call will emit.
    pub const WAITALL: u32 = 0x02;
}

struct Bucket {
    tokens: u64,
    capacity: u64,
    rate_bps: u64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        if elapsed.is_zero() || self.rate_bps == 0 {
            return;
        }
        let add = (elapsed.as_secs_f64() * self.rate_bps as f64) as u64;
        if add > 0 {
            self.tokens = (self.tokens + add).min(self.capacity);
            self.last_refill = now;
        }
    }

    fn time_until_available(&mut self, bytes: u64) -> Duration {
        self.refill();
        if self.tokens >= bytes {
            return Duration::ZERO;
        }
        if self.rate_bps == 0 {
            // Zero rate never refills; the caller must treat this as
            // "never available" rather than spin.
            return Duration::MAX;
        }
        let needed = bytes - self.tokens;
        Duration::from_secs_f64(needed as f64 / self.rate_bps as f64)
    }
}

/// Token-bucket admission control for outgoing datagrams.
///
/// `check` either consumes `bytes` worth of tokens and returns `0`, or
/// (when the caller asked for non-blocking behavior and tokens are
/// unavailable) returns `-1` without consuming anything.
pub struct RateController {
    bucket: Mutex<Bucket>,
}

impl RateController {
    #[must_use]
    pub fn new(rate_bps: u64, capacity: u64) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                capacity,
                rate_bps,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Checks (and on success consumes) `bytes` tokens.
    ///
    /// With [`send_flags::DONTWAIT`] set, returns `-1` immediately if
    /// tokens are unavailable rather than blocking. Without it, blocks the
    /// calling thread until enough tokens accrue.
    pub fn check(&self, bytes: u64, flags: u32) -> i32 {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock();
                bucket.refill();
                if bucket.tokens >= bytes {
                    bucket.tokens -= bytes;
                    return 0;
                }
                if flags & send_flags::DONTWAIT != 0 {
                    return -1;
                }
                bucket.time_until_available(bytes)
            };
            if wait == Duration::MAX {
                return -1;
            }
            thread::sleep(wait);
        }
    }

    /// Updates the configured rate without resetting accumulated tokens.
    pub fn set_rate(&self, rate_bps: u64) {
        let mut bucket = self.bucket.lock();
        bucket.refill();
        bucket.rate_bps = rate_bps;
    }

    #[must_use]
    pub fn rate(&self) -> u64 {
        self.bucket.lock().rate_bps
    }

    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.bucket.lock().capacity
    }

    #[must_use]
    pub fn tokens(&self) -> u64 {
        let mut bucket = self.bucket.lock();
        bucket.refill();
        bucket.tokens
    }
}
