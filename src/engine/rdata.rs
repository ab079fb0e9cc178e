// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The repair consumer: drains the transmit window's retransmit queue,
//! rebuilding a selective RDATA from the buffered ODATA or constructing a
//! fresh Reed-Solomon parity packet (spec §4.5).
//!
//! Runs on the timer thread, woken by [`crate::notify::Notify`] from either
//! [`super::nak::on_nak`] (selective/on-demand parity NAKs) or
//! [`super::odata`]'s proactive-parity scheduling. Each TXW accessor call
//! already takes its own share of [`crate::txw::TransmitWindow`]'s internal
//! reader/writer lock, so — as with [`super::nak`] and [`super::odata`] —
//! this module never takes a lock directly; it only sequences calls against
//! the window's own API.

use crate::checksum;
use crate::fec::Codec;
use crate::sequence;
use crate::txw::RetransmitPeek;
use crate::wire::options::{self, OptFragment, OPT_FRAGMENT_LEN, OPT_HEADER_LEN, OPT_LENGTH_LEN};
use crate::wire::packets;
use crate::wire::{opt_flag, opt_type, pgm_type, DataHeader, Header, DATA_LEN, HEADER_LEN};

use super::Transport;

impl Transport {
    /// Blocks the calling thread, servicing the retransmit queue every time
    /// a wakeup arrives, until [`Self::close`] both sets `is_open = false`
    /// and posts a final wakeup (spec §5 "Cancellation/timeout").
    pub fn run_repair_consumer(&self) {
        while self.notify.read() {
            if !self.is_open() {
                break;
            }
            self.drain_retransmit_queue();
        }
    }

    /// Services every entry currently queued, in order, without waiting for
    /// further wakeups. Exposed at `pub(crate)` so the NAK/ODATA tests in
    /// sibling modules can exercise a repair synchronously instead of
    /// spinning up a consumer thread.
    pub(crate) fn drain_retransmit_queue(&self) {
        while let Some(peek) = self.txw.retransmit_try_peek() {
            if peek.is_parity {
                if let Some(rs) = self.rs.as_ref() {
                    self.send_parity_repair(rs, &peek);
                } else {
                    crate::warn!(
                        "parity repair queued for sqn {} but no FEC codec is configured",
                        peek.sqn
                    );
                }
            } else {
                self.send_selective_repair(&peek);
            }
            // Re-enables future NAK processing for this SN regardless of
            // whether the build above actually produced a packet (spec §4.5
            // step 5).
            self.txw.retransmit_remove_head();
        }
    }

    /// Selective repair (spec §4.5 step 3): flips the buffered ODATA's type
    /// byte to RDATA, stamps the current trail, refolds the checksum from
    /// the cached unfolded payload sum, and sends it unchanged otherwise —
    /// same bytes the receiver missed the first time.
    fn send_selective_repair(&self, peek: &RetransmitPeek) {
        let Some(skb) = peek.skb.as_ref() else {
            crate::debug!(
                "selective repair for sqn {} abandoned: no longer resident in the window",
                peek.sqn
            );
            return;
        };
        let mut buf = skb.to_vec();
        let trail = self.txw.trail();
        packets::rewrite_odata_as_rdata(&mut buf, trail, peek.saved_csum);

        let wire_len = buf.len() as u64;
        let tsdu_length = u64::from(u16::from_be_bytes([buf[4], buf[5]]));
        match self.send_wire(&buf, 0, false, true) {
            Ok(_) => {
                self.counters.add_bytes_sent(wire_len);
                self.counters.add_selective_bytes_retransmitted(tsdu_length);
                self.counters.bump_selective_msgs_retransmitted();
                self.reset_heartbeat();
            }
            Err(e) => {
                crate::warn!("selective repair for sqn {} failed to send: {e}", peek.sqn);
            }
        }
    }

    /// Parity repair (spec §4.5 step 4): gathers the `k` members of the
    /// transmission group `peek.sqn` belongs to, RS-encodes the requested
    /// parity index, and sends a freshly-built RDATA carrying the result.
    ///
    /// Silently abandons the repair (after logging) if any group member has
    /// since been evicted from the window — a group that has aged out is
    /// unrecoverable by parity regardless, and the original's on-demand NAK
    /// path would see the same gap via a selective retransmit instead.
    fn send_parity_repair(&self, rs: &Codec, peek: &RetransmitPeek) {
        let tg_sqn = sequence::tg_sqn(peek.sqn, self.fec.tg_sqn_shift);
        let rs_h = (peek.rs_h as usize) % rs.parity_count();

        let mut members = Vec::with_capacity(rs.k());
        for i in 0..rs.k() as u32 {
            match self.txw.peek(tg_sqn.wrapping_add(i)) {
                Some(skb) => members.push(skb),
                None => {
                    crate::debug!(
                        "parity repair for tg_sqn {tg_sqn} abandoned: group member {} missing",
                        tg_sqn.wrapping_add(i)
                    );
                    return;
                }
            }
        }

        let wires: Vec<Vec<u8>> = members.iter().map(|m| m.to_vec()).collect();
        let headers: Vec<Header> = wires
            .iter()
            .map(|w| Header::decode(w).expect("admitted ODATA always has a valid header"))
            .collect();
        let payloads: Vec<Vec<u8>> = wires.iter().map(|w| payload_of(w)).collect();

        let base_len = payloads.iter().map(Vec::len).max().unwrap_or(0);
        let is_var_pktlen = payloads.iter().any(|p| p.len() != base_len);
        let parity_length = if is_var_pktlen { base_len + 2 } else { base_len };

        let padded: Vec<Vec<u8>> = payloads
            .iter()
            .map(|p| pad_to_parity_length(p, parity_length, is_var_pktlen))
            .collect();
        // One-time, idempotent bookkeeping: marks that this group's variable
        // lengths have already been accounted for. Padding itself is done on
        // a scratch copy rather than the shared skb (see DESIGN.md) so a
        // concurrent selective retransmit of one of these originals is
        // unaffected.
        for m in &members {
            m.mark_zero_padded();
        }

        let refs: Vec<&[u8]> = padded.iter().map(Vec::as_slice).collect();
        let parity_payload = match rs.encode(&refs, rs_h) {
            Ok(p) => p,
            Err(e) => {
                crate::error!("reed-solomon parity encode failed for tg_sqn {tg_sqn}: {e}");
                return;
            }
        };

        let any_present = headers.iter().any(|h| h.options & opt_flag::PRESENT != 0);
        let frag_shard = if any_present {
            Some(encode_parity_fragment(rs, &wires, &headers, rs_h))
        } else {
            None
        };

        let buf = self.build_parity_packet(tg_sqn, rs_h, is_var_pktlen, &frag_shard, &parity_payload);

        let wire_len = buf.len() as u64;
        match self.send_wire(&buf, 0, false, true) {
            Ok(_) => {
                self.counters.add_bytes_sent(wire_len);
                self.reset_heartbeat();
            }
            Err(e) => {
                crate::warn!("parity repair for tg_sqn {tg_sqn} failed to send: {e}");
            }
        }
    }

    /// Stamps the parity RDATA's header, `pgm_data`, optional encoded
    /// `OPT_FRAGMENT`, and payload into the transport's reusable scratch
    /// buffer (spec §5 "the parity-buffer skb is singleton and owned by the
    /// repair consumer"), then folds the checksum.
    fn build_parity_packet(
        &self,
        tg_sqn: u32,
        rs_h: usize,
        is_var_pktlen: bool,
        frag_shard: &Option<[u8; OPT_FRAGMENT_LEN]>,
        parity_payload: &[u8],
    ) -> Vec<u8> {
        let frag_block_len = OPT_LENGTH_LEN + OPT_HEADER_LEN + OPT_FRAGMENT_LEN;
        let options_len = if frag_shard.is_some() { frag_block_len } else { 0 };
        let total_len = HEADER_LEN + DATA_LEN + options_len + parity_payload.len();

        let mut scratch = self.parity_scratch.lock();
        scratch.clear();
        scratch.resize(total_len, 0);
        let buf = &mut scratch[..];

        let mut pgm_options = opt_flag::PARITY;
        if is_var_pktlen {
            pgm_options |= opt_flag::VAR_PKTLEN;
        }
        if frag_shard.is_some() {
            pgm_options |= opt_flag::PRESENT;
        }

        let header = Header {
            pgm_type: pgm_type::RDATA,
            options: pgm_options,
            checksum: 0,
            tsdu_length: parity_payload.len() as u16,
            gsi: self.gsi,
            sport: self.sport,
            dport: self.dport,
        };
        header.encode_into(buf);

        let mut offset = HEADER_LEN;
        DataHeader {
            data_sqn: tg_sqn | rs_h as u32,
            data_trail: self.txw.trail(),
        }
        .encode_into(&mut buf[offset..]);
        offset += DATA_LEN;

        if let Some(shard) = frag_shard {
            options::encode_opt_length(&mut buf[offset..], frag_block_len as u16);
            offset += OPT_LENGTH_LEN;
            buf[offset] = opt_type::ENCODED | opt_type::END;
            buf[offset + 1] = (OPT_HEADER_LEN + OPT_FRAGMENT_LEN) as u8;
            buf[offset + OPT_HEADER_LEN..offset + OPT_HEADER_LEN + OPT_FRAGMENT_LEN].copy_from_slice(shard);
            offset += OPT_HEADER_LEN + OPT_FRAGMENT_LEN;
        }

        buf[offset..].copy_from_slice(parity_payload);

        let header_region_len = total_len - parity_payload.len();
        buf[2] = 0;
        buf[3] = 0;
        let unfolded_header = checksum::partial(&buf[..header_region_len], 0);
        let unfolded_payload = checksum::partial(parity_payload, 0);
        let folded = checksum::fold(checksum::block_add(unfolded_header, unfolded_payload, header_region_len));
        buf[2..4].copy_from_slice(&folded.to_be_bytes());

        scratch.clone()
    }
}

/// Extracts the TSDU payload (the last `tsdu_length` bytes) from a complete
/// ODATA wire packet.
fn payload_of(wire: &[u8]) -> Vec<u8> {
    let tsdu_length = u16::from_be_bytes([wire[4], wire[5]]) as usize;
    wire[wire.len() - tsdu_length..].to_vec()
}

/// Zero-pads `payload` to `parity_length` and appends the original length as
/// a trailing big-endian 16-bit field when the group has mixed TSDU lengths
/// (spec §4.5 step 4 "is_var_pktlen").
fn pad_to_parity_length(payload: &[u8], parity_length: usize, is_var_pktlen: bool) -> Vec<u8> {
    if !is_var_pktlen {
        return payload.to_vec();
    }
    let mut out = vec![0u8; parity_length];
    out[..payload.len()].copy_from_slice(payload);
    out[parity_length - 2..].copy_from_slice(&(payload.len() as u16).to_be_bytes());
    out
}

/// Builds the RS-encoded `OPT_FRAGMENT` shard for a parity packet: each
/// group member contributes its own raw `OPT_FRAGMENT` content (or an
/// all-zero sentinel standing in for `OP_ENCODED_NULL` when it carries
/// none), and the parity index's encoded combination becomes the parity
/// packet's own option (spec §4.5 step 4).
fn encode_parity_fragment(rs: &Codec, wires: &[Vec<u8>], headers: &[Header], rs_h: usize) -> [u8; OPT_FRAGMENT_LEN] {
    let shards: Vec<[u8; OPT_FRAGMENT_LEN]> = wires
        .iter()
        .zip(headers)
        .map(|(wire, header)| {
            if header.options & opt_flag::PRESENT == 0 {
                return [0u8; OPT_FRAGMENT_LEN];
            }
            let opt_region = &wire[HEADER_LEN + DATA_LEN..];
            match OptFragment::decode(&opt_region[OPT_LENGTH_LEN..]) {
                Some(frag) => {
                    let mut raw = [0u8; OPT_HEADER_LEN + OPT_FRAGMENT_LEN];
                    frag.encode_into(&mut raw);
                    let mut shard = [0u8; OPT_FRAGMENT_LEN];
                    shard.copy_from_slice(&raw[OPT_HEADER_LEN..]);
                    shard
                }
                None => [0u8; OPT_FRAGMENT_LEN],
            }
        })
        .collect();

    let refs: Vec<&[u8]> = shards.iter().map(|s| s.as_slice()).collect();
    let encoded = rs
        .encode(&refs, rs_h)
        .expect("opt_fragment shards share one fixed 16-byte length by construction");
    let mut out = [0u8; OPT_FRAGMENT_LEN];
    out.copy_from_slice(&encoded);
    out
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    use super::*;
    use crate::config::SenderConfig;
    use crate::engine::clock::FakeClock;
    use crate::engine::{BindParams, FecParams};
    use crate::net::FakeSendto;
    use crate::wire::{opt_flag as flag, pgm_type as ty, Nla};

    fn test_transport(fec: FecParams) -> (Arc<Transport>, Arc<FakeSendto>) {
        let socket = Arc::new(FakeSendto::new());
        let config = SenderConfig::new();
        config.set_txw_sqns(64).expect("set");
        config.set_txw_max_rate_bps(100_000_000).expect("set");
        let transport = Transport::bind(
            config,
            BindParams {
                gsi: [1u8; 16],
                sport: 1000,
                dport: 2000,
                dest: "239.1.1.1:2000".parse().expect("addr"),
                src_nla: Nla::V4(Ipv4Addr::new(10, 0, 0, 1)),
                grp_nla: Nla::V4(Ipv4Addr::new(239, 1, 1, 1)),
                mtu: 1462,
                fec,
                socket: socket.clone() as Arc<dyn crate::net::Sendto>,
                clock: Arc::new(FakeClock::new(0)),
            },
        )
        .expect("bind");
        (transport, socket)
    }

    #[test]
    fn selective_repair_resends_identical_payload_as_rdata() {
        let (transport, socket) = test_transport(FecParams::disabled());
        transport.send(b"hello world", 0).expect("send");
        let original = socket.sent()[0].clone();
        socket.clear();

        assert_eq!(transport.txw.retransmit_push(0, false, 0), 1);
        transport.drain_retransmit_queue();

        let sent = socket.sent();
        assert_eq!(sent.len(), 1);
        let header = Header::decode(&sent[0].buf).expect("header");
        assert_eq!(header.pgm_type, ty::RDATA);
        assert_eq!(
            sent[0].buf[HEADER_LEN + DATA_LEN..],
            original.buf[HEADER_LEN + DATA_LEN..]
        );
        assert_eq!(transport.counters().source_selective_msgs_retransmitted, 1);
        assert_eq!(
            transport.counters().source_selective_bytes_retransmitted,
            u64::from(header.tsdu_length)
        );
        assert!(transport.txw.retransmit_is_empty());
    }

    #[test]
    fn selective_repair_for_evicted_sqn_is_a_no_op() {
        let (transport, socket) = test_transport(FecParams::disabled());
        assert_eq!(transport.txw.retransmit_push(999, false, 0), 0);
        transport.drain_retransmit_queue();
        assert!(socket.sent().is_empty());
    }

    #[test]
    fn parity_repair_sends_an_rdata_matching_independent_rs_encode() {
        let fec = FecParams {
            n: 4,
            k: 2,
            tg_sqn_shift: 1,
            rs_proactive_h: 0,
            use_ondemand_parity: true,
            use_proactive_parity: false,
        };
        let (transport, socket) = test_transport(fec);
        transport.send(b"aaaa", 0).expect("send sqn 0");
        transport.send(b"bbbb", 0).expect("send sqn 1");
        socket.clear();

        assert_eq!(transport.txw.retransmit_push(0 | 0, true, 1), 1);
        transport.drain_retransmit_queue();

        let sent = socket.sent();
        assert_eq!(sent.len(), 1);
        let header = Header::decode(&sent[0].buf).expect("header");
        assert_eq!(header.pgm_type, ty::RDATA);
        assert_eq!(header.options & flag::PARITY, flag::PARITY);

        let payload = &sent[0].buf[HEADER_LEN + DATA_LEN..];
        let codec = Codec::new(4, 2).expect("codec");
        let expected = codec.encode(&[b"aaaa".as_slice(), b"bbbb".as_slice()], 0).expect("encode");
        assert_eq!(payload, expected.as_slice());
    }

    #[test]
    fn parity_repair_with_mixed_lengths_sets_var_pktlen_and_pads() {
        let fec = FecParams {
            n: 4,
            k: 2,
            tg_sqn_shift: 1,
            rs_proactive_h: 0,
            use_ondemand_parity: true,
            use_proactive_parity: false,
        };
        let (transport, socket) = test_transport(fec);
        transport.send(b"a", 0).expect("send sqn 0");
        transport.send(b"bbbb", 0).expect("send sqn 1");
        socket.clear();

        assert_eq!(transport.txw.retransmit_push(1, true, 1), 1);
        transport.drain_retransmit_queue();

        let sent = socket.sent();
        assert_eq!(sent.len(), 1);
        let header = Header::decode(&sent[0].buf).expect("header");
        assert_eq!(header.options & flag::VAR_PKTLEN, flag::VAR_PKTLEN);
        assert_eq!(header.tsdu_length as usize, 4 + 2);
    }

    #[test]
    fn parity_repair_abandoned_when_a_group_member_is_missing() {
        let fec = FecParams {
            n: 4,
            k: 2,
            tg_sqn_shift: 1,
            rs_proactive_h: 0,
            use_ondemand_parity: true,
            use_proactive_parity: false,
        };
        let (transport, socket) = test_transport(fec);
        transport.send(b"aaaa", 0).expect("send sqn 0");
        // sqn 1 never sent; group is incomplete.
        socket.clear();

        assert_eq!(transport.txw.retransmit_push(0, true, 1), 1);
        transport.drain_retransmit_queue();

        assert!(socket.sent().is_empty());
        assert!(transport.txw.retransmit_is_empty());
    }
}
