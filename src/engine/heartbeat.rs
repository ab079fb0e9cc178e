// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SPM heartbeat scheduling and emission (spec §4.2).
//!
//! The heartbeat schedule is a zero-led, zero-terminated array: index `0`
//! means "ambient" and the trailing `0` marks the end of the schedule
//! (`SenderConfig::set_heartbeat_spm_schedule_us`). [`HeartbeatState::reset`]
//! is called on every successful ODATA/RDATA emission and always rewinds the
//! cursor back to index `1` — matching `pgm_reset_heartbeat_spm` in the
//! original source, which re-arms the *first* heartbeat interval rather than
//! continuing wherever the ambient timer had gotten to.

use parking_lot::Mutex;

use crate::engine::clock::Clock;
use crate::notify::Notify;

struct Inner {
    spm_sqn: u32,
    /// Index into the configured schedule; state `0` is the ambient
    /// sentinel, so the first real interval lives at index `1`.
    state: usize,
    next_heartbeat_spm: u64,
    next_poll: u64,
}

/// Per-transport SPM sequencing and heartbeat deadline tracking.
pub struct HeartbeatState {
    inner: Mutex<Inner>,
}

impl HeartbeatState {
    #[must_use]
    pub fn new(now_us: u64, ambient_interval_us: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                spm_sqn: 0,
                state: 0,
                next_heartbeat_spm: now_us + ambient_interval_us,
                next_poll: now_us + ambient_interval_us,
            }),
        }
    }

    /// Returns the next `spm_sqn` and advances the monotonic counter,
    /// matching "heartbeat SPMs are strictly monotonic in `spm_sqn`"
    /// (spec §5 ordering guarantees).
    pub fn next_spm_sqn(&self) -> u32 {
        let mut inner = self.inner.lock();
        let sqn = inner.spm_sqn;
        inner.spm_sqn = inner.spm_sqn.wrapping_add(1);
        sqn
    }

    /// Rewinds the heartbeat cursor to state `1` and reschedules
    /// `next_heartbeat_spm` from `schedule[1]`. If the new deadline
    /// precedes `next_poll`, wakes the timer thread via `notify` (spec
    /// §4.2: "if this deadline precedes `next_poll`, the engine wakes the
    /// timer thread via C7").
    ///
    /// `schedule` must be the zero-led, zero-terminated array from
    /// [`crate::config::SenderConfig::heartbeat_schedule`]; a schedule
    /// shorter than two entries (just the sentinels, no real interval)
    /// leaves the cursor parked on the terminator and reschedules nothing.
    pub fn reset(&self, schedule: &[u64], clock: &dyn Clock, notify: &Notify) {
        let mut inner = self.inner.lock();
        if schedule.len() < 2 {
            return;
        }
        inner.state = 1;
        let interval = schedule[inner.state];
        inner.state += 1;
        let now = clock.now_us();
        inner.next_heartbeat_spm = now + interval;
        if clock.after(inner.next_poll, inner.next_heartbeat_spm) {
            inner.next_poll = inner.next_heartbeat_spm;
            notify.send();
        }
    }

    #[must_use]
    pub fn next_heartbeat_spm(&self) -> u64 {
        self.inner.lock().next_heartbeat_spm
    }

    #[must_use]
    pub fn next_poll(&self) -> u64 {
        self.inner.lock().next_poll
    }
}
