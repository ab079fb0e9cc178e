// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pre-bind configuration surface for a PGM source (spec §4.1).
//!
//! Every setter here is mutually exclusive with the sender thread: once
//! [`SenderConfig::mark_bound`] has been called (by [`crate::engine::Transport::bind`]),
//! every setter fails with [`Error::InvalidArgument`] rather than silently
//! racing the running engine. Values are guarded by one `parking_lot` mutex,
//! matching the short-critical-section style used by [`crate::rate::RateController`]
//! and [`crate::txw::TransmitWindow`] rather than a lock-free structure: these
//! fields are touched once per configuration call and once per bind, never on
//! a hot path.

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Default ambient SPM interval: 30 seconds, matching common PGM deployments.
pub const DEFAULT_AMBIENT_SPM_INTERVAL_US: u64 = 30_000_000;

/// Default TXW retention window: 60 seconds.
pub const DEFAULT_TXW_RETENTION_SECS: u64 = 60;

struct Inner {
    bound: bool,
    ambient_spm_interval_us: u64,
    /// Stored with the leading `0` and trailing `0` terminator baked in, so
    /// `heartbeat_schedule()[0]` is always the ambient sentinel and the last
    /// element is always the schedule terminator (spec §4.1).
    heartbeat_spm_us: Vec<u64>,
    txw_preallocation: usize,
    txw_sqns: u32,
    txw_retention_secs: u64,
    txw_max_rate_bps: u64,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            bound: false,
            ambient_spm_interval_us: DEFAULT_AMBIENT_SPM_INTERVAL_US,
            heartbeat_spm_us: vec![0, 0],
            txw_preallocation: 0,
            txw_sqns: 0,
            txw_retention_secs: DEFAULT_TXW_RETENTION_SECS,
            txw_max_rate_bps: 0,
        }
    }
}

/// Pre-bind configuration for one [`crate::engine::Transport`].
///
/// Holds every knob named in spec §4.1. Range/zero validation happens here;
/// `Transport::bind` is responsible for rejecting a config that never set
/// the values with no sane default (`txw_sqns`, `txw_max_rate_bps`).
pub struct SenderConfig {
    inner: Mutex<Inner>,
}

impl SenderConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn guard(&self, inner: &Inner) -> Result<()> {
        if inner.bound {
            return Err(Error::invalid("transport is already bound; configuration is immutable"));
        }
        Ok(())
    }

    /// Ambient SPM interval in microseconds; must be `> 0`.
    pub fn set_ambient_spm_interval_us(&self, us: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        self.guard(&inner)?;
        if us == 0 {
            return Err(Error::invalid("ambient SPM interval must be > 0"));
        }
        inner.ambient_spm_interval_us = us;
        Ok(())
    }

    #[must_use]
    pub fn ambient_spm_interval_us(&self) -> u64 {
        self.inner.lock().ambient_spm_interval_us
    }

    /// Heartbeat SPM schedule: each entry must be `> 0`. Stored with a
    /// leading `0` slot (state `0` means "ambient") and a trailing `0`
    /// terminator that marks the end of the schedule, per spec §4.1.
    pub fn set_heartbeat_spm_schedule_us(&self, schedule: &[u64]) -> Result<()> {
        let mut inner = self.inner.lock();
        self.guard(&inner)?;
        if schedule.is_empty() || schedule.iter().any(|&us| us == 0) {
            return Err(Error::invalid("heartbeat schedule entries must all be > 0"));
        }
        let mut stored = Vec::with_capacity(schedule.len() + 2);
        stored.push(0);
        stored.extend_from_slice(schedule);
        stored.push(0);
        inner.heartbeat_spm_us = stored;
        Ok(())
    }

    /// The stored schedule, including the leading ambient sentinel and
    /// trailing terminator.
    #[must_use]
    pub fn heartbeat_schedule(&self) -> Vec<u64> {
        self.inner.lock().heartbeat_spm_us.clone()
    }

    /// TXW preallocation (number of packet buffers to pre-warm); `> 0`.
    pub fn set_txw_preallocation(&self, n: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        self.guard(&inner)?;
        if n == 0 {
            return Err(Error::invalid("txw preallocation must be > 0"));
        }
        inner.txw_preallocation = n;
        Ok(())
    }

    #[must_use]
    pub fn txw_preallocation(&self) -> usize {
        self.inner.lock().txw_preallocation
    }

    /// TXW size in sequence numbers: `0 < sqns < 2^31 - 1`.
    pub fn set_txw_sqns(&self, sqns: u32) -> Result<()> {
        let mut inner = self.inner.lock();
        self.guard(&inner)?;
        if sqns == 0 || sqns >= (1u32 << 31) - 1 {
            return Err(Error::invalid("txw sqns must satisfy 0 < sqns < 2^31 - 1"));
        }
        inner.txw_sqns = sqns;
        Ok(())
    }

    #[must_use]
    pub fn txw_sqns(&self) -> u32 {
        self.inner.lock().txw_sqns
    }

    /// TXW retention in seconds; `> 0`.
    pub fn set_txw_retention_secs(&self, secs: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        self.guard(&inner)?;
        if secs == 0 {
            return Err(Error::invalid("txw retention must be > 0 seconds"));
        }
        inner.txw_retention_secs = secs;
        Ok(())
    }

    #[must_use]
    pub fn txw_retention_secs(&self) -> u64 {
        self.inner.lock().txw_retention_secs
    }

    /// TXW maximum rate in bytes/sec; `> 0`.
    pub fn set_txw_max_rate_bps(&self, bps: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        self.guard(&inner)?;
        if bps == 0 {
            return Err(Error::invalid("txw max rate must be > 0 bytes/sec"));
        }
        inner.txw_max_rate_bps = bps;
        Ok(())
    }

    #[must_use]
    pub fn txw_max_rate_bps(&self) -> u64 {
        self.inner.lock().txw_max_rate_bps
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.inner.lock().bound
    }

    /// Latches the configuration as immutable. Called once by
    /// `Transport::bind`; every setter above fails after this point.
    pub(crate) fn mark_bound(&self) {
        self.inner.lock().bound = true;
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = SenderConfig::new();
        assert_eq!(cfg.ambient_spm_interval_us(), DEFAULT_AMBIENT_SPM_INTERVAL_US);
        assert_eq!(cfg.heartbeat_schedule(), vec![0, 0]);
        assert!(!cfg.is_bound());
    }

    #[test]
    fn zero_ambient_interval_is_rejected() {
        let cfg = SenderConfig::new();
        assert!(cfg.set_ambient_spm_interval_us(0).is_err());
    }

    #[test]
    fn heartbeat_schedule_gets_leading_and_trailing_zero() {
        let cfg = SenderConfig::new();
        cfg.set_heartbeat_spm_schedule_us(&[100, 200, 400]).expect("set");
        assert_eq!(cfg.heartbeat_schedule(), vec![0, 100, 200, 400, 0]);
    }

    #[test]
    fn heartbeat_schedule_rejects_zero_entries() {
        let cfg = SenderConfig::new();
        assert!(cfg.set_heartbeat_spm_schedule_us(&[100, 0, 400]).is_err());
    }

    #[test]
    fn txw_sqns_rejects_out_of_range() {
        let cfg = SenderConfig::new();
        assert!(cfg.set_txw_sqns(0).is_err());
        assert!(cfg.set_txw_sqns(u32::MAX).is_err());
        assert!(cfg.set_txw_sqns(32).is_ok());
        assert_eq!(cfg.txw_sqns(), 32);
    }

    #[test]
    fn setters_fail_once_bound() {
        let cfg = SenderConfig::new();
        cfg.mark_bound();
        assert!(cfg.set_ambient_spm_interval_us(1).is_err());
        assert!(cfg.set_txw_sqns(32).is_err());
        assert!(cfg.set_txw_max_rate_bps(1).is_err());
        assert!(cfg.set_txw_retention_secs(1).is_err());
        assert!(cfg.set_txw_preallocation(1).is_err());
    }

    #[test]
    fn txw_max_rate_and_retention_round_trip() {
        let cfg = SenderConfig::new();
        cfg.set_txw_max_rate_bps(1_000_000).expect("set");
        cfg.set_txw_retention_secs(120).expect("set");
        assert_eq!(cfg.txw_max_rate_bps(), 1_000_000);
        assert_eq!(cfg.txw_retention_secs(), 120);
    }
}
