// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound NAK/NNAK classification and NCF/SPM reply emission (spec §4.3,
//! §4.4).
//!
//! Grounded directly in `on_nak`/`on_nnak` and the SPMR handling from the
//! original C source: classify parity vs. selective via `OPT_PARITY`,
//! validate the NAK's address tuple against our own, reply with an NCF
//! *before* queuing a retransmit entry (so a duplicate NAK from another
//! receiver on the same multicast group sees the NCF and suppresses its
//! own repeat), then wake the repair consumer only if the push actually
//! added new work.

use crate::error::Result;
use crate::peer::Peer;
use crate::wire::packets::{self, parse_nak};
use crate::wire::Header;

use super::Transport;

impl Transport {
    /// Handles an inbound NAK: validates, replies with NCF immediately,
    /// then queues the repair(s) for the consumer thread.
    ///
    /// A parity NAK is discarded outright (after bumping counters, before
    /// any NCF or retransmit work) if this transport was not configured
    /// for on-demand parity.
    pub fn on_nak(&self, header: &Header, body: &[u8]) -> Result<()> {
        let parsed = match parse_nak(header, body, &self.src_nla, &self.grp_nla) {
            Ok(p) => p,
            Err(_) => {
                self.counters.bump_malformed_naks();
                self.counters.bump_packets_discarded();
                return Ok(());
            }
        };

        if parsed.is_parity {
            self.counters.bump_parity_naks_received();
            if !self.fec.use_ondemand_parity {
                self.counters.bump_malformed_naks();
                self.counters.bump_packets_discarded();
                return Ok(());
            }
        } else {
            self.counters.bump_selective_naks_received();
        }

        let id = self.wire_identity();
        let ncf = if parsed.sqns.len() == 1 {
            Some(packets::build_ncf_single(
                &id,
                parsed.sqns[0],
                &self.src_nla,
                &self.grp_nla,
                parsed.is_parity,
            ))
        } else {
            packets::build_ncf_list(&id, &parsed.sqns, &self.src_nla, &self.grp_nla, parsed.is_parity)
        };
        if let Some(ncf) = ncf {
            self.send_control(&ncf);
        }

        let mut pushed_any = false;
        for sqn in &parsed.sqns {
            if self
                .txw
                .retransmit_push(*sqn, parsed.is_parity, self.fec.tg_sqn_shift)
                > 0
            {
                pushed_any = true;
            }
        }
        if pushed_any {
            self.notify.send();
        }
        Ok(())
    }

    /// Handles an inbound NNAK: validated identically to a NAK but never
    /// triggers retransmission, matching "NNAK carries the same body shape
    /// as a NAK but only confirms an already-in-flight repair" (spec §4.3).
    pub fn on_nnak(&self, header: &Header, body: &[u8]) -> Result<()> {
        match parse_nak(header, body, &self.src_nla, &self.grp_nla) {
            Ok(parsed) => {
                self.counters.bump_selective_nnak_packets_received();
                self.counters
                    .add_selective_nnaks_received(1 + (parsed.sqns.len() as u64 - 1));
            }
            Err(_) => {
                self.counters.bump_nnak_errors();
            }
        }
        Ok(())
    }

    /// Handles an inbound SPMR (spec §4.2): if we are the implied source,
    /// reply immediately with an ambient SPM. If `peer` is given (we were
    /// tracking the sender of a multicast SPMR ourselves), our reply
    /// answers the same need that peer's own pending SPMR would have
    /// served, so its deadline is cleared rather than left to fire
    /// redundantly.
    pub fn on_spmr(&self, peer: Option<&Peer>) -> Result<()> {
        self.send_spm();
        if let Some(peer) = peer {
            peer.clear_spmr_expiry();
        }
        Ok(())
    }
}
