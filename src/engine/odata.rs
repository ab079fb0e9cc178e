// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Application-facing ODATA emission: `send`, `sendv`, `send_skbv` (spec
//! §4.6).
//!
//! Grounded in `pgm_transport_send`/`pgm_transport_sendv`/
//! `pgm_transport_send_skbv`: a single packet takes the fast path (no
//! `OPT_FRAGMENT`), a payload larger than `max_tsdu` is split into
//! `OPT_FRAGMENT`-tagged TPDUs sharing one `first_sqn`, and a mid-APDU
//! `EAGAIN` preserves a [`super::resume::SendResume`] so the identical call
//! resumes at the `retry_send` label instead of re-admitting already-sent
//! fragments into the window.

use std::sync::Arc;

use crate::buffer::PacketBuffer;
use crate::checksum;
use crate::error::{Error, Result};
use crate::rate::send_flags;
use crate::sequence;
use crate::wire::options::{self, OPT_FRAGMENT_LEN, OPT_HEADER_LEN, OPT_LENGTH_LEN};
use crate::wire::{DataHeader, Header, DATA_LEN, HEADER_LEN};
use crate::wire::{opt_flag, pgm_type};

use super::resume::{ResumeStep, SendResume};
use super::Transport;

/// Fragment placement for one TPDU of an in-progress APDU. Absent for a
/// single-packet (non-fragmented) send.
#[derive(Clone, Copy)]
struct FragInfo {
    first_sqn: u32,
    frag_off: u32,
    apdu_length: u32,
}

impl Transport {
    /// Sends `buf` as a single ODATA datagram if it fits in one TPDU, or as
    /// a fragmented APDU otherwise. `flags` is `send_flags::{DONTWAIT,
    /// WAITALL}` (spec §6).
    ///
    /// On [`Error::WouldBlock`] the resume state has already been saved;
    /// the next call — with the *same* `buf` and `flags` — continues from
    /// where it stopped rather than re-fragmenting from the start.
    pub fn send(&self, buf: &[u8], flags: u32) -> Result<usize> {
        if !self.is_open() {
            return Err(Error::ConnectionReset);
        }
        if let Some(resume) = self.take_resume() {
            return self.send_fragmented_from(buf, flags, Some(resume));
        }
        if buf.len() <= self.max_tsdu {
            self.send_one(buf, flags)
        } else {
            self.send_fragmented_from(buf, flags, None)
        }
    }

    /// Scatter/gather entry point (spec §4.6). `is_one_apdu` asks that every
    /// element be reassembled as fragments of a single APDU rather than sent
    /// as independent messages.
    ///
    /// The [`crate::net::Sendto`] collaborator only exposes a single
    /// contiguous buffer per call (no vectored `sendmsg`), so a multi-element
    /// `is_one_apdu` send is realized by joining the vector into one APDU
    /// and running it through the ordinary fragmentation path rather than by
    /// a true per-element zero-copy write.
    pub fn sendv(&self, iov: &[&[u8]], flags: u32, is_one_apdu: bool) -> Result<usize> {
        match iov {
            [] => Ok(0),
            [single] => self.send(single, flags),
            _ if is_one_apdu => {
                let joined: Vec<u8> = iov.concat();
                self.send(&joined, flags)
            }
            _ => {
                let mut total = 0;
                for chunk in iov {
                    total += self.send(chunk, flags)?;
                }
                Ok(total)
            }
        }
    }

    /// Zero-copy variant of [`Self::sendv`] for callers already holding
    /// window-backed buffers. Collapses to the same join-and-fragment path;
    /// see [`Self::sendv`] for why.
    pub fn send_skbv(&self, vec: &[&[u8]], flags: u32, is_one_apdu: bool) -> Result<usize> {
        self.sendv(vec, flags, is_one_apdu)
    }

    fn send_one(&self, buf: &[u8], flags: u32) -> Result<usize> {
        if buf.len() > self.max_tsdu {
            return Err(Error::too_large(format!(
                "payload of {} bytes exceeds max_tsdu {}",
                buf.len(),
                self.max_tsdu
            )));
        }
        let wire_len = (HEADER_LEN + DATA_LEN + buf.len()) as u64;
        let is_rate_limited = self.rate_precheck(wire_len, flags)?;
        let (skb, sqn) = self.build_odata(buf, None);

        match self.send_wire(&skb.to_vec(), flags, is_rate_limited, false) {
            Ok(_) => {
                self.counters.add_bytes_sent(wire_len);
                self.counters.add_data_bytes_sent(buf.len() as u64);
                self.counters.bump_data_msgs_sent();
                self.reset_heartbeat();
                Ok(buf.len())
            }
            Err(Error::WouldBlock) => {
                self.set_resume(SendResume {
                    step: ResumeStep::RetrySend,
                    skb,
                    tsdu_length: buf.len(),
                    apdu_length: buf.len(),
                    data_bytes_offset: buf.len(),
                    first_sqn: sqn,
                    vector_index: 0,
                    vector_offset: 0,
                    data_pkt_offset: 0,
                    unfolded_odata: 0,
                    is_rate_limited,
                });
                Err(Error::WouldBlock)
            }
            // Already admitted into the window: the call is reported
            // successful regardless (spec §4.6/§7 "I/O failure after TXW
            // admit ... swallowed"); a subsequent NAK/RDATA cycle covers
            // whatever the socket failed to put on the wire.
            Err(e) => {
                crate::warn!("odata send for sqn {sqn} failed after window admit: {e}");
                self.counters.add_bytes_sent(wire_len);
                self.counters.add_data_bytes_sent(buf.len() as u64);
                self.counters.bump_data_msgs_sent();
                self.reset_heartbeat();
                Ok(buf.len())
            }
        }
    }

    fn send_fragmented_from(&self, buf: &[u8], flags: u32, resume: Option<SendResume>) -> Result<usize> {
        let apdu_length = resume.as_ref().map_or(buf.len(), |r| r.apdu_length);
        let frag_capacity = self.txw.capacity().saturating_mul(self.max_tsdu_fragment);
        if apdu_length > frag_capacity {
            return Err(Error::too_large(format!(
                "apdu of {apdu_length} bytes exceeds window capacity {frag_capacity}"
            )));
        }

        let first_sqn = resume.as_ref().map_or_else(|| self.txw.next_lead(), |r| r.first_sqn);
        let mut data_bytes_offset = resume.as_ref().map_or(0, |r| r.data_bytes_offset);

        let mut bytes_sent = 0u64;
        let mut packets_sent = 0u64;
        let mut data_bytes_sent = 0u64;

        if let Some(r) = resume {
            match self.send_wire(&r.skb.to_vec(), flags, r.is_rate_limited, false) {
                Ok(_) => {
                    bytes_sent += r.skb.len() as u64;
                    packets_sent += 1;
                    data_bytes_sent += r.tsdu_length as u64;
                    data_bytes_offset += r.tsdu_length;
                }
                Err(Error::WouldBlock) => {
                    self.set_resume(SendResume {
                        step: ResumeStep::RetrySend,
                        ..r
                    });
                    return Err(Error::WouldBlock);
                }
                // Already admitted into the window on the prior call: swallow
                // and count it as sent (spec §4.6/§7).
                Err(e) => {
                    crate::warn!("odata resume send for sqn {first_sqn} failed after window admit: {e}");
                    bytes_sent += r.skb.len() as u64;
                    packets_sent += 1;
                    data_bytes_sent += r.tsdu_length as u64;
                    data_bytes_offset += r.tsdu_length;
                }
            }
        }

        let is_rate_limited = self.rate_precheck(
            remaining_wire_cost(apdu_length, data_bytes_offset, self.max_tsdu_fragment),
            flags,
        )?;

        while data_bytes_offset < apdu_length {
            let tsdu_length = (apdu_length - data_bytes_offset).min(self.max_tsdu_fragment);
            let chunk = &buf[data_bytes_offset..data_bytes_offset + tsdu_length];
            let (skb, _sqn) = self.build_odata(
                chunk,
                Some(FragInfo {
                    first_sqn,
                    frag_off: data_bytes_offset as u32,
                    apdu_length: apdu_length as u32,
                }),
            );
            let wire_len = skb.len() as u64;

            match self.send_wire(&skb.to_vec(), flags, is_rate_limited, false) {
                Ok(_) => {
                    bytes_sent += wire_len;
                    packets_sent += 1;
                    data_bytes_sent += tsdu_length as u64;
                    data_bytes_offset += tsdu_length;
                }
                Err(Error::WouldBlock) => {
                    self.set_resume(SendResume {
                        step: ResumeStep::RetrySend,
                        skb,
                        tsdu_length,
                        apdu_length,
                        data_bytes_offset,
                        first_sqn,
                        vector_index: 0,
                        vector_offset: 0,
                        data_pkt_offset: 0,
                        unfolded_odata: 0,
                        is_rate_limited,
                    });
                    if bytes_sent > 0 {
                        self.counters.add_bytes_sent(bytes_sent);
                        self.counters.add_data_bytes_sent(data_bytes_sent);
                        for _ in 0..packets_sent {
                            self.counters.bump_data_msgs_sent();
                        }
                        self.reset_heartbeat();
                    }
                    return Err(Error::WouldBlock);
                }
                // Already admitted into the window: swallow and count it as
                // sent (spec §4.6/§7 "I/O failure after TXW admit ... swallowed").
                Err(e) => {
                    crate::warn!("odata send for sqn {first_sqn} failed after window admit: {e}");
                    bytes_sent += wire_len;
                    packets_sent += 1;
                    data_bytes_sent += tsdu_length as u64;
                    data_bytes_offset += tsdu_length;
                }
            }
        }

        self.counters.add_bytes_sent(bytes_sent);
        self.counters.add_data_bytes_sent(data_bytes_sent);
        for _ in 0..packets_sent {
            self.counters.bump_data_msgs_sent();
        }
        self.reset_heartbeat();
        Ok(apdu_length)
    }

    /// Builds and admits one ODATA TPDU into the transmit window, scheduling
    /// proactive parity if this packet completes a transmission group (spec
    /// §4.6 step 8). Returns the built buffer (still owned by the caller for
    /// the immediate `sendto`, and by the window for later repair) and its
    /// assigned sequence number.
    fn build_odata(&self, tsdu: &[u8], frag: Option<FragInfo>) -> (Arc<PacketBuffer>, u32) {
        let frag_overhead = OPT_LENGTH_LEN + OPT_HEADER_LEN + OPT_FRAGMENT_LEN;
        let headroom = HEADER_LEN + DATA_LEN + if frag.is_some() { frag_overhead } else { 0 };
        let capacity = headroom + tsdu.len();
        let tentative_sqn = self.txw.next_lead();
        let data_trail = self.txw.trail();

        let skb = PacketBuffer::new(capacity, headroom, self.clock.now_us());
        skb.put(tsdu.len());
        let unfolded_odata = skb.with_bytes_mut(|body| {
            body.copy_from_slice(tsdu);
            checksum::partial(body, 0)
        });
        skb.set_saved_partial_csum(unfolded_odata);
        skb.push_head(headroom);

        let stamp = |buf: &mut [u8], sqn: u32| {
            let header = Header {
                pgm_type: pgm_type::ODATA,
                options: if frag.is_some() { opt_flag::PRESENT } else { 0 },
                checksum: 0,
                tsdu_length: tsdu.len() as u16,
                gsi: self.gsi,
                sport: self.sport,
                dport: self.dport,
            };
            header.encode_into(buf);
            let mut offset = HEADER_LEN;
            DataHeader { data_sqn: sqn, data_trail }.encode_into(&mut buf[offset..]);
            offset += DATA_LEN;
            if let Some(f) = frag {
                options::encode_opt_length(&mut buf[offset..], frag_overhead as u16);
                offset += OPT_LENGTH_LEN;
                crate::wire::options::OptFragment {
                    first_sqn: f.first_sqn,
                    frag_off: f.frag_off,
                    frag_len: f.apdu_length,
                }
                .encode_into(&mut buf[offset..]);
            }
            buf[2] = 0;
            buf[3] = 0;
            let unfolded_header = checksum::partial(&buf[..headroom], 0);
            let folded = checksum::fold(checksum::block_add(unfolded_header, unfolded_odata, headroom));
            buf[2..4].copy_from_slice(&folded.to_be_bytes());
        };

        skb.with_bytes_mut(|buf| stamp(buf, tentative_sqn));
        let assigned = self.txw.add(skb.clone());
        if assigned != tentative_sqn {
            // Another producer raced the same window; re-stamp with the sqn
            // actually assigned so the wire bytes stay self-consistent.
            skb.with_bytes_mut(|buf| stamp(buf, assigned));
        }

        if self.fec.use_proactive_parity && sequence::completes_group(assigned, self.fec.tg_sqn_shift) {
            let tg_sqn = sequence::tg_sqn(assigned, self.fec.tg_sqn_shift);
            if self.txw.retransmit_push(tg_sqn | self.fec.rs_proactive_h, true, self.fec.tg_sqn_shift) > 0 {
                self.notify.send();
            }
        }

        (skb, assigned)
    }

    /// Precheck for the `DONTWAIT|WAITALL` combination (spec §4.6): a
    /// single non-blocking rate check covering every TPDU a call will emit,
    /// so a call either admits nothing that it can't also send, or fails
    /// up front with no partial window admission. Returns whether the
    /// per-packet sends that follow should skip their own rate check.
    fn rate_precheck(&self, total_wire_bytes: u64, flags: u32) -> Result<bool> {
        if flags & send_flags::DONTWAIT != 0 && flags & send_flags::WAITALL != 0 {
            if self.rate.check(total_wire_bytes, flags) == -1 {
                return Err(Error::WouldBlock);
            }
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub(super) fn send_wire(&self, buf: &[u8], flags: u32, is_rate_limited: bool, router_alert: bool) -> Result<usize> {
        if !is_rate_limited && self.rate.check(buf.len() as u64, flags) == -1 {
            return Err(Error::WouldBlock);
        }
        let dontwait = flags & send_flags::DONTWAIT != 0;
        self.socket.sendto(buf, self.dest, router_alert, dontwait)
    }
}

fn remaining_wire_cost(apdu_length: usize, offset: usize, max_tsdu_fragment: usize) -> u64 {
    let remaining = apdu_length - offset;
    if remaining == 0 {
        return 0;
    }
    let frag_overhead = OPT_LENGTH_LEN + OPT_HEADER_LEN + OPT_FRAGMENT_LEN;
    let num_fragments = remaining.div_ceil(max_tsdu_fragment);
    (remaining + num_fragments * (HEADER_LEN + DATA_LEN + frag_overhead)) as u64
}
