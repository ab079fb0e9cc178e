// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Remote receiver record.
//!
//! The full PGM peer state machine (NAK generation, loss detection, data
//! reassembly) is the receive side and out of scope here (spec §1); this
//! crate only needs enough of a peer record to let [`on_spmr`] suppress a
//! peer's own pending SPMR when it observes our SPM reply, per spec §4.2.
//!
//! [`on_spmr`]: crate::engine::nak::on_spmr

use parking_lot::Mutex;

/// A remote receiver, as seen from the source side.
#[derive(Default)]
pub struct Peer {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    /// Deadline (microseconds) at which this peer would itself send an
    /// SPMR if it hasn't heard from us. Cleared when we observe the peer's
    /// own multicast SPMR and reply with an SPM, since that SPM answers
    /// the same need the peer's SPMR would have served.
    spmr_expiry: Option<u64>,
}

impl Peer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn spmr_expiry(&self) -> Option<u64> {
        self.inner.lock().spmr_expiry
    }

    pub fn set_spmr_expiry(&self, expiry_us: u64) {
        self.inner.lock().spmr_expiry = Some(expiry_us);
    }

    /// Clears the pending SPMR deadline. Called when we observe this
    /// peer's own multicast SPMR (spec §4.2 SPMR handling).
    pub fn clear_spmr_expiry(&self) {
        self.inner.lock().spmr_expiry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_peer_has_no_pending_spmr() {
        let peer = Peer::new();
        assert_eq!(peer.spmr_expiry(), None);
    }

    #[test]
    fn clear_spmr_expiry_suppresses_a_pending_one() {
        let peer = Peer::new();
        peer.set_spmr_expiry(1_000);
        assert_eq!(peer.spmr_expiry(), Some(1_000));
        peer.clear_spmr_expiry();
        assert_eq!(peer.spmr_expiry(), None);
    }
}
