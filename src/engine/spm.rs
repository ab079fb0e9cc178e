// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ambient/heartbeat SPM emission and bare control-packet delivery (spec
//! §4.2, §4.4).
//!
//! NCF replies are rate-limited identically to SPM in the original source
//! (both go out `pgm_sendto(rate_limited=TRUE, ...)`), so [`send_control`]
//! is shared by [`super::nak::on_nak`]'s NCF path and anything else that
//! only needs "stamp it, send it, don't touch the window".

use super::Transport;
use crate::wire::packets;

impl Transport {
    /// Builds and sends an ambient or heartbeat SPM carrying the current
    /// TXW trail/lead (spec §4.2). Rate-limited, with router-alert, like
    /// every other control packet this source originates.
    pub(crate) fn send_spm(&self) {
        let id = self.wire_identity();
        let spm_sqn = self.heartbeat.next_spm_sqn();
        let buf = packets::build_spm(&id, spm_sqn, self.txw.trail(), self.txw.lead(), &self.src_nla);
        let _ = self.send_wire(&buf, 0, false, true);
        self.counters.add_bytes_sent(buf.len() as u64);
    }

    /// Sends an already-built control packet (NCF) to the multicast group.
    /// Not rate-limited: NCF replies must reach waiting receivers promptly
    /// to suppress their NAK backoff, the same reasoning the original
    /// source applies to `pgm_send_ncf`.
    pub(crate) fn send_control(&self, buf: &[u8]) {
        let _ = self.socket.sendto(buf, self.dest, true, false);
    }
}
