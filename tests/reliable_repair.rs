// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end send-path scenarios (spec §8 "S1"-"S6"), driven entirely
//! through the public `Transport` API over a `FakeSendto`/`FakeClock` pair
//! rather than a real multicast socket.

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::too_many_lines)]

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use pgm_sender::engine::clock::FakeClock;
use pgm_sender::engine::{BindParams, FecParams, Transport};
use pgm_sender::net::FakeSendto;
use pgm_sender::peer::Peer;
use pgm_sender::wire::options::{self, OptFragment, OPT_HEADER_LEN, OPT_LENGTH_LEN};
use pgm_sender::wire::packets::{NakFixed, NAK_FIXED_LEN};
use pgm_sender::wire::{opt_flag, pgm_type, DataHeader, Header, Nla, DATA_LEN, HEADER_LEN};
use pgm_sender::SenderConfig;

fn bind(mtu: usize, fec: FecParams) -> (Arc<Transport>, Arc<FakeSendto>, Nla, Nla) {
    let socket = Arc::new(FakeSendto::new());
    let src = Nla::V4(Ipv4Addr::new(10, 0, 0, 1));
    let grp = Nla::V4(Ipv4Addr::new(239, 1, 1, 1));
    let config = SenderConfig::new();
    config.set_txw_sqns(64).expect("set txw_sqns");
    config.set_txw_max_rate_bps(100_000_000).expect("set rate");
    let transport = Transport::bind(
        config,
        BindParams {
            gsi: [7u8; 16],
            sport: 1000,
            dport: 2000,
            dest: "239.1.1.1:2000".parse().expect("dest addr"),
            src_nla: src,
            grp_nla: grp,
            mtu,
            fec,
            socket: socket.clone() as Arc<dyn pgm_sender::net::Sendto>,
            clock: Arc::new(FakeClock::new(0)),
        },
    )
    .expect("bind");
    (transport, socket, src, grp)
}

fn nak_body(sqn: u32, src: &Nla, grp: &Nla) -> Vec<u8> {
    let mut body = vec![0u8; NAK_FIXED_LEN];
    NakFixed { sqn, src_nla: *src, grp_nla: *grp }.encode_into(&mut body);
    body
}

fn nak_header(is_parity: bool) -> Header {
    Header {
        pgm_type: pgm_type::NAK,
        options: if is_parity { opt_flag::PARITY } else { 0 },
        checksum: 0,
        tsdu_length: 0,
        gsi: [0; 16],
        sport: 0,
        dport: 0,
    }
}

/// S1: a single small send produces exactly one ODATA at `data_sqn=0`,
/// `data_trail=0`, and bumps `SOURCE_DATA_BYTES_SENT` by the payload length.
#[test]
fn s1_single_small_send() {
    let (transport, socket, ..) = bind(1462, FecParams::disabled());

    let sent_len = transport.send(&[0u8; 128], 0).expect("send");
    assert_eq!(sent_len, 128);

    let recorded = socket.sent();
    assert_eq!(recorded.len(), 1);
    let header = Header::decode(&recorded[0].buf).expect("header");
    assert_eq!(header.pgm_type, pgm_type::ODATA);
    let data = DataHeader::decode(&recorded[0].buf[HEADER_LEN..]).expect("data header");
    assert_eq!(data.data_sqn, 0);
    assert_eq!(data.data_trail, 0);
    assert_eq!(transport.counters().source_data_bytes_sent, 128);
}

/// S2: a 4000-byte APDU over an MTU that caps fragments at 1400 bytes
/// splits into three ODATA TPDUs (1400, 1400, 1200), sharing one
/// `first_sqn` and `apdu_length`, at offsets 0/1400/2800.
#[test]
fn s2_fragmented_apdu() {
    let (transport, socket, ..) = bind(1462, FecParams::disabled());

    let sent_len = transport.send(&vec![0xabu8; 4000], 0).expect("send");
    assert_eq!(sent_len, 4000);

    let recorded = socket.sent();
    assert_eq!(recorded.len(), 3);

    let mut tsdu_lens = Vec::new();
    let mut frag_offs = Vec::new();
    let mut first_sqns = Vec::new();
    for pkt in &recorded {
        let header = Header::decode(&pkt.buf).expect("header");
        assert_eq!(header.pgm_type, pgm_type::ODATA);
        assert_eq!(header.options & opt_flag::PRESENT, opt_flag::PRESENT);
        tsdu_lens.push(header.tsdu_length as usize);

        let opt_region = &pkt.buf[HEADER_LEN + DATA_LEN..];
        let frag = OptFragment::decode(&opt_region[OPT_LENGTH_LEN..]).expect("opt fragment");
        frag_offs.push(frag.frag_off);
        first_sqns.push(frag.first_sqn);
        assert_eq!(frag.frag_len, 4000);
    }

    assert_eq!(tsdu_lens, vec![1400, 1400, 1200]);
    assert_eq!(frag_offs, vec![0, 1400, 2800]);
    assert!(first_sqns.iter().all(|&s| s == first_sqns[0]));
}

/// S3: after the fragmented send of S2, a selective NAK for SN=1 gets an
/// immediate NCF (`OPT_PARITY` unset) followed by exactly one RDATA with
/// the original payload, emitted by a repair consumer running on its own
/// thread the way the original splits producer and timer threads (spec §5).
#[test]
fn s3_selective_nak_ncf_rdata() {
    let (transport, socket, src, grp) = bind(1462, FecParams::disabled());
    transport.send(&vec![0xabu8; 4000], 0).expect("send");
    let original = socket.sent()[1].clone(); // sqn=1
    socket.clear();

    let consumer = {
        let transport = Arc::clone(&transport);
        std::thread::spawn(move || transport.run_repair_consumer())
    };

    transport
        .on_nak(&nak_header(false), &nak_body(1, &src, &grp))
        .expect("on_nak");

    // Let the repair consumer thread observe the wakeup and drain the
    // queue before we close the transport down.
    std::thread::sleep(Duration::from_millis(50));
    transport.close();
    consumer.join().expect("repair consumer thread");

    let recorded = socket.sent();
    assert_eq!(recorded.len(), 2, "expected one NCF and one RDATA, got {recorded:?}");

    let ncf = Header::decode(&recorded[0].buf).expect("ncf header");
    assert_eq!(ncf.pgm_type, pgm_type::NCF);
    assert_eq!(ncf.options & opt_flag::PARITY, 0);

    let rdata = Header::decode(&recorded[1].buf).expect("rdata header");
    assert_eq!(rdata.pgm_type, pgm_type::RDATA);
    assert_eq!(
        recorded[1].buf[HEADER_LEN + DATA_LEN..],
        original.buf[HEADER_LEN + DATA_LEN..]
    );
    assert_eq!(transport.counters().source_selective_naks_received, 1);
    assert_eq!(transport.counters().source_selective_msgs_retransmitted, 1);
}

/// S4: a parity NAK arrives but the transport was never configured for
/// on-demand parity — no NCF is sent, and the NAK is counted both as a
/// parity NAK and as a malformed/discarded packet.
#[test]
fn s4_parity_nak_with_ondemand_disabled() {
    let (transport, socket, src, grp) = bind(1462, FecParams::disabled());

    transport
        .on_nak(&nak_header(true), &nak_body(8, &src, &grp))
        .expect("on_nak");

    assert!(socket.sent().is_empty());
    let counters = transport.counters();
    assert_eq!(counters.source_parity_naks_received, 1);
    assert_eq!(counters.source_malformed_naks, 1);
    assert_eq!(counters.source_packets_discarded, 1);
}

/// S5: an SPMR addressed to us, with no tracked peer, gets exactly one SPM
/// reply carrying the current trail/lead.
#[test]
fn s5_spmr_while_source() {
    let (transport, socket, ..) = bind(1462, FecParams::disabled());
    transport.send(&[0u8; 64], 0).expect("send");
    socket.clear();

    transport.on_spmr(None).expect("on_spmr");

    let recorded = socket.sent();
    assert_eq!(recorded.len(), 1);
    assert_eq!(Header::decode(&recorded[0].buf).expect("header").pgm_type, pgm_type::SPM);
}

/// S5b: an SPMR tracked against a known peer clears that peer's pending
/// SPMR expiry, in addition to the same single SPM reply.
#[test]
fn s5b_spmr_clears_tracked_peer_expiry() {
    let (transport, socket, ..) = bind(1462, FecParams::disabled());
    let peer = Peer::new();
    peer.set_spmr_expiry(1_000);

    transport.on_spmr(Some(&peer)).expect("on_spmr");

    assert_eq!(socket.sent().len(), 1);
    assert_eq!(peer.spmr_expiry(), None);
}

/// S6: with `tg_sqn_shift=3` (`k=8`) and proactive parity enabled, sending
/// 8 ODATA packets in one APDU completes the first transmission group and
/// schedules its proactive parity repair; the repair consumer (driven on
/// its own thread, as it would be in production) turns that into exactly
/// one parity RDATA once woken.
#[test]
fn s6_proactive_parity_boundary() {
    let fec = FecParams {
        n: 12,
        k: 8,
        tg_sqn_shift: 3,
        rs_proactive_h: 0,
        use_ondemand_parity: false,
        use_proactive_parity: true,
    };
    let (transport, socket, ..) = bind(1462, fec);

    for _ in 0..8 {
        transport.send(b"x", 0).expect("send");
    }
    let odata_count = socket.sent().len();
    assert_eq!(odata_count, 8);

    let consumer = {
        let transport = Arc::clone(&transport);
        std::thread::spawn(move || transport.run_repair_consumer())
    };
    std::thread::sleep(Duration::from_millis(50));
    transport.close();
    consumer.join().expect("repair consumer thread");

    let recorded = socket.sent();
    assert_eq!(recorded.len(), odata_count + 1, "expected exactly one parity repair");
    let parity = Header::decode(&recorded[odata_count].buf).expect("parity header");
    assert_eq!(parity.pgm_type, pgm_type::RDATA);
    assert_eq!(parity.options & opt_flag::PARITY, opt_flag::PARITY);

    let data = DataHeader::decode(&recorded[odata_count].buf[HEADER_LEN..]).expect("data header");
    assert_eq!(data.data_sqn, fec.rs_proactive_h);
}

/// Closing the transport causes every subsequent send to fail with
/// `ConnectionReset`, and stops a blocked repair consumer thread.
#[test]
fn closing_the_transport_rejects_sends_and_stops_the_consumer() {
    let (transport, ..) = bind(1462, FecParams::disabled());
    let consumer = {
        let transport = Arc::clone(&transport);
        std::thread::spawn(move || transport.run_repair_consumer())
    };
    std::thread::sleep(Duration::from_millis(20));

    transport.close();
    consumer.join().expect("repair consumer thread");

    assert!(matches!(transport.send(b"late", 0), Err(pgm_sender::Error::ConnectionReset)));
}

/// `packets::build_ncf_single`/`build_ncf_list` round-trip through the same
/// `NakFixed` fields a real receiver would decode, exercised here via
/// `on_nak` against a multi-SN selective NAK to additionally cover the
/// `OPT_NAK_LIST` path (spec §4.4 "NCF with list").
#[test]
fn selective_nak_with_list_gets_one_ncf_and_queues_every_sqn() {
    let (transport, socket, src, grp) = bind(1462, FecParams::disabled());
    transport.send(&vec![0xabu8; 4000], 0).expect("send");
    socket.clear();

    let mut body = nak_body(0, &src, &grp);
    let extra = [1u32, 2];
    let nak_list_len = OPT_HEADER_LEN + extra.len() * 4;
    let opt_offset = body.len();
    body.resize(opt_offset + OPT_LENGTH_LEN + nak_list_len, 0);
    options::encode_opt_length(&mut body[opt_offset..], (OPT_LENGTH_LEN + nak_list_len) as u16);
    options::encode_opt_nak_list(&mut body[opt_offset + OPT_LENGTH_LEN..], &extra).expect("encode nak list");

    let mut header = nak_header(false);
    header.options |= opt_flag::PRESENT;

    transport.on_nak(&header, &body).expect("on_nak");

    let recorded = socket.sent();
    assert_eq!(recorded.len(), 1);
    assert_eq!(Header::decode(&recorded[0].buf).expect("ncf header").pgm_type, pgm_type::NCF);
    assert_eq!(transport.counters().source_selective_naks_received, 1);
}
