// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Builders and parsers for the SPM, NAK, and NCF packet shapes.
//!
//! ODATA/RDATA packets are built directly against a [`crate::buffer::PacketBuffer`]
//! by the send-path engine (the layout is simple enough not to need a
//! dedicated builder); SPM/NAK/NCF are small, fixed-shape control packets
//! and are easiest to reason about as free functions over a `Vec<u8>`.

use super::options::{self, OptFragment, OPT_HEADER_LEN, OPT_LENGTH_LEN};
use super::{afi, opt_flag, opt_type, pgm_type, DataHeader, Header, Nla, DATA_LEN, HEADER_LEN};
use crate::checksum;

/// Fixed-size NLA tuple shared by NAK and NCF bodies:
/// `afi(2) + reserved(2) + address(16)`.
const NLA_FIELD_LEN: usize = 2 + 2 + 16;

fn encode_nla(buf: &mut [u8], nla: &Nla) {
    buf[0..2].copy_from_slice(&nla.afi().to_be_bytes());
    buf[2..4].copy_from_slice(&[0, 0]);
    let mut slot = [0u8; 16];
    nla.encode_into(&mut slot);
    buf[4..20].copy_from_slice(&slot);
}

fn decode_nla(buf: &[u8]) -> Option<Nla> {
    let afi_value = u16::from_be_bytes([buf[0], buf[1]]);
    let mut slot = [0u8; 16];
    slot.copy_from_slice(&buf[4..20]);
    Nla::decode(afi_value, &slot)
}

/// `nak_sqn(4) + src_nla(20) + grp_nla(20)`.
pub const NAK_FIXED_LEN: usize = 4 + NLA_FIELD_LEN + NLA_FIELD_LEN;

/// The fixed portion of a NAK/NCF body: one sequence number plus the
/// sender's and group's network-layer addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NakFixed {
    pub sqn: u32,
    pub src_nla: Nla,
    pub grp_nla: Nla,
}

impl NakFixed {
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= NAK_FIXED_LEN);
        buf[0..4].copy_from_slice(&self.sqn.to_be_bytes());
        encode_nla(&mut buf[4..4 + NLA_FIELD_LEN], &self.src_nla);
        encode_nla(
            &mut buf[4 + NLA_FIELD_LEN..4 + 2 * NLA_FIELD_LEN],
            &self.grp_nla,
        );
    }

    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < NAK_FIXED_LEN {
            return None;
        }
        let sqn = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let src_nla = decode_nla(&buf[4..4 + NLA_FIELD_LEN])?;
        let grp_nla = decode_nla(&buf[4 + NLA_FIELD_LEN..4 + 2 * NLA_FIELD_LEN])?;
        Some(Self {
            sqn,
            src_nla,
            grp_nla,
        })
    }
}

/// Outcome of parsing an inbound NAK/NNAK packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedNak {
    pub is_parity: bool,
    /// Primary sequence number plus any additional entries from
    /// `OPT_NAK_LIST`, at most 63 entries total.
    pub sqns: Vec<u32>,
    pub src_nla: Nla,
    pub grp_nla: Nla,
}

/// Why a NAK/NNAK body failed to parse; every variant is malformed+discard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NakParseError {
    TooShort,
    BadNla,
    AddressMismatch,
    BadOptionLength,
    BadOptionOrder,
    ListTooLong,
}

/// Parses a NAK or NNAK body (the two share a wire shape; only the
/// triggered behavior differs, which the caller decides).
///
/// `our_nla`/`our_grp` are this source's unicast send address and
/// multicast group, which the NAK's `NAK_SRC_NLA`/`NAK_GRP_NLA` must match
/// bit-exactly.
pub fn parse_nak(
    header: &Header,
    body: &[u8],
    our_nla: &Nla,
    our_grp: &Nla,
) -> Result<ParsedNak, NakParseError> {
    if body.len() < NAK_FIXED_LEN {
        return Err(NakParseError::TooShort);
    }
    let fixed = NakFixed::decode(body).ok_or(NakParseError::BadNla)?;
    if &fixed.src_nla != our_nla || &fixed.grp_nla != our_grp {
        return Err(NakParseError::AddressMismatch);
    }

    let is_parity = header.options & opt_flag::PARITY != 0;
    let mut sqns = vec![fixed.sqn];

    if header.options & opt_flag::PRESENT != 0 {
        let opts = &body[NAK_FIXED_LEN..];
        let (declared_len, _total) =
            options::decode_opt_length(opts).ok_or(NakParseError::BadOptionLength)?;
        if declared_len as usize != OPT_LENGTH_LEN {
            return Err(NakParseError::BadOptionLength);
        }
        let mut offset = OPT_LENGTH_LEN;
        let mut found_list = false;
        while offset < opts.len() {
            if offset + OPT_HEADER_LEN > opts.len() {
                return Err(NakParseError::BadOptionOrder);
            }
            let opt_type_byte = opts[offset];
            let opt_len = opts[offset + 1] as usize;
            if opt_len < OPT_HEADER_LEN || offset + opt_len > opts.len() {
                return Err(NakParseError::BadOptionLength);
            }
            if !found_list && (opt_type_byte & !opt_type::END) == opt_type::NAK_LIST {
                let extra = options::decode_opt_nak_list(&opts[offset..], opt_len as u8)
                    .ok_or(NakParseError::BadOptionLength)?;
                if sqns.len() + extra.len() > 63 {
                    return Err(NakParseError::ListTooLong);
                }
                sqns.extend(extra);
                found_list = true;
            }
            if opt_type_byte & opt_type::END != 0 {
                break;
            }
            offset += opt_len;
        }
    }

    Ok(ParsedNak {
        is_parity,
        sqns,
        src_nla: fixed.src_nla,
        grp_nla: fixed.grp_nla,
    })
}

/// Common header stamp shared by every packet this crate builds.
pub struct Identity {
    pub gsi: [u8; 16],
    pub sport: u16,
    pub dport: u16,
}

fn checksum_and_finish(buf: &mut [u8]) {
    // checksum field itself must read as zero while folding.
    buf[2] = 0;
    buf[3] = 0;
    let sum = checksum::fold(checksum::partial(buf, 0));
    buf[2..4].copy_from_slice(&sum.to_be_bytes());
}

/// Builds a single-SN NCF: header + NAK-shaped body carrying `sqn` and our
/// NLA tuple. Not rate-limited by the caller's policy (per §4.4); this
/// function only produces bytes.
#[must_use]
pub fn build_ncf_single(
    id: &Identity,
    sqn: u32,
    our_nla: &Nla,
    our_grp: &Nla,
    is_parity: bool,
) -> Vec<u8> {
    let mut buf = vec![0u8; HEADER_LEN + NAK_FIXED_LEN];
    let header = Header {
        pgm_type: pgm_type::NCF,
        options: if is_parity { opt_flag::PARITY } else { 0 },
        checksum: 0,
        tsdu_length: 0,
        gsi: id.gsi,
        sport: id.sport,
        dport: id.dport,
    };
    header.encode_into(&mut buf);
    let fixed = NakFixed {
        sqn,
        src_nla: *our_nla,
        grp_nla: *our_grp,
    };
    fixed.encode_into(&mut buf[HEADER_LEN..]);
    checksum_and_finish(&mut buf);
    buf
}

/// Builds an NCF carrying a list of sequence numbers
/// (`2 <= sqns.len() <= 63`), with `OPT_LENGTH` then `OPT_NAK_LIST | OPT_END`.
#[must_use]
pub fn build_ncf_list(
    id: &Identity,
    sqns: &[u32],
    our_nla: &Nla,
    our_grp: &Nla,
    is_parity: bool,
) -> Option<Vec<u8>> {
    if sqns.len() < 2 || sqns.len() > 63 {
        return None;
    }
    let list_entries = &sqns[1..];
    let nak_list_len = OPT_HEADER_LEN + list_entries.len() * 4;
    let mut buf =
        vec![0u8; HEADER_LEN + NAK_FIXED_LEN + OPT_LENGTH_LEN + nak_list_len];

    let header = Header {
        pgm_type: pgm_type::NCF,
        options: opt_flag::PRESENT
            | opt_flag::NETWORK
            | if is_parity { opt_flag::PARITY } else { 0 },
        checksum: 0,
        tsdu_length: 0,
        gsi: id.gsi,
        sport: id.sport,
        dport: id.dport,
    };
    header.encode_into(&mut buf);

    let fixed = NakFixed {
        sqn: sqns[0],
        src_nla: *our_nla,
        grp_nla: *our_grp,
    };
    let mut offset = HEADER_LEN;
    fixed.encode_into(&mut buf[offset..]);
    offset += NAK_FIXED_LEN;

    let opt_total = (OPT_LENGTH_LEN + nak_list_len) as u16;
    options::encode_opt_length(&mut buf[offset..], opt_total);
    offset += OPT_LENGTH_LEN;

    options::encode_opt_nak_list(&mut buf[offset..], list_entries)?;

    checksum_and_finish(&mut buf);
    Some(buf)
}

/// Builds an ambient/heartbeat SPM: header + `spm_sqn/spm_trail/spm_lead`
/// plus our path NLA.
#[must_use]
pub fn build_spm(
    id: &Identity,
    spm_sqn: u32,
    trail: u32,
    lead: u32,
    our_nla: &Nla,
) -> Vec<u8> {
    const SPM_FIXED_LEN: usize = 4 + 4 + 4 + NLA_FIELD_LEN;
    let mut buf = vec![0u8; HEADER_LEN + SPM_FIXED_LEN];
    let header = Header {
        pgm_type: pgm_type::SPM,
        options: 0,
        checksum: 0,
        tsdu_length: 0,
        gsi: id.gsi,
        sport: id.sport,
        dport: id.dport,
    };
    header.encode_into(&mut buf);
    let body = &mut buf[HEADER_LEN..];
    body[0..4].copy_from_slice(&spm_sqn.to_be_bytes());
    body[4..8].copy_from_slice(&trail.to_be_bytes());
    body[8..12].copy_from_slice(&lead.to_be_bytes());
    encode_nla(&mut body[12..12 + NLA_FIELD_LEN], our_nla);
    checksum_and_finish(&mut buf);
    buf
}

/// Rewrites an already-built ODATA buffer in place into an RDATA repair,
/// per §4.5 step 3: flips the type byte, overwrites `data_trail`, and
/// refolds the header checksum from a cached unfolded payload sum when one
/// is available (avoiding a payload rescan).
pub fn rewrite_odata_as_rdata(buf: &mut [u8], new_trail: u32, saved_payload_csum: Option<u32>) {
    debug_assert!(buf.len() >= HEADER_LEN + DATA_LEN);
    buf[0] = pgm_type::RDATA;

    let mut data = DataHeader::decode(&buf[HEADER_LEN..HEADER_LEN + DATA_LEN])
        .expect("buffer has at least HEADER_LEN + DATA_LEN bytes");
    data.data_trail = new_trail;
    data.encode_into(&mut buf[HEADER_LEN..HEADER_LEN + DATA_LEN]);

    let tsdu_length = u16::from_be_bytes([buf[4], buf[5]]) as usize;
    let pgm_header_len = buf.len() - tsdu_length;
    buf[2] = 0;
    buf[3] = 0;
    let unfolded_header = checksum::partial(&buf[..pgm_header_len], 0);
    let unfolded_payload = match saved_payload_csum {
        Some(csum) => csum,
        None => checksum::partial(&buf[pgm_header_len..], 0),
    };
    let folded = checksum::fold(checksum::block_add(
        unfolded_header,
        unfolded_payload,
        pgm_header_len,
    ));
    buf[2..4].copy_from_slice(&folded.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn id() -> Identity {
        Identity {
            gsi: [1u8; 16],
            sport: 1000,
            dport: 2000,
        }
    }

    fn nlas() -> (Nla, Nla) {
        (
            Nla::V4(Ipv4Addr::new(10, 0, 0, 1)),
            Nla::V4(Ipv4Addr::new(239, 1, 1, 1)),
        )
    }

    #[test]
    fn ncf_single_round_trip_through_header_decode() {
        let (src, grp) = nlas();
        let buf = build_ncf_single(&id(), 7, &src, &grp, false);
        let header = Header::decode(&buf).expect("header");
        assert_eq!(header.pgm_type, pgm_type::NCF);
        assert_eq!(header.options & opt_flag::PARITY, 0);
        let fixed = NakFixed::decode(&buf[HEADER_LEN..]).expect("fixed");
        assert_eq!(fixed.sqn, 7);
        assert_eq!(fixed.src_nla, src);
        assert_eq!(fixed.grp_nla, grp);
    }

    #[test]
    fn ncf_single_parity_flag_propagates() {
        let (src, grp) = nlas();
        let buf = build_ncf_single(&id(), 7, &src, &grp, true);
        let header = Header::decode(&buf).expect("header");
        assert_eq!(header.options & opt_flag::PARITY, opt_flag::PARITY);
    }

    #[test]
    fn ncf_list_requires_two_to_sixtythree_entries() {
        let (src, grp) = nlas();
        assert!(build_ncf_list(&id(), &[1], &src, &grp, false).is_none());
        let too_many: Vec<u32> = (0..64).collect();
        assert!(build_ncf_list(&id(), &too_many, &src, &grp, false).is_none());
        assert!(build_ncf_list(&id(), &[1, 2, 3], &src, &grp, false).is_some());
    }

    #[test]
    fn ncf_list_checksum_is_self_consistent() {
        let (src, grp) = nlas();
        let buf = build_ncf_list(&id(), &[1, 2, 3], &src, &grp, false).expect("build");
        let mut recomputed = buf.clone();
        recomputed[2] = 0;
        recomputed[3] = 0;
        let expected = checksum::fold(checksum::partial(&recomputed, 0));
        let on_wire = u16::from_be_bytes([buf[2], buf[3]]);
        assert_eq!(on_wire, expected);
    }

    #[test]
    fn parse_nak_round_trips_against_our_own_ncf_builder_fixed_body() {
        let (src, grp) = nlas();
        let header = Header {
            pgm_type: pgm_type::NAK,
            options: 0,
            checksum: 0,
            tsdu_length: 0,
            gsi: [0; 16],
            sport: 0,
            dport: 0,
        };
        let mut body = vec![0u8; NAK_FIXED_LEN];
        NakFixed {
            sqn: 99,
            src_nla: src,
            grp_nla: grp,
        }
        .encode_into(&mut body);

        let parsed = parse_nak(&header, &body, &src, &grp).expect("parse");
        assert_eq!(parsed.sqns, vec![99]);
        assert!(!parsed.is_parity);
    }

    #[test]
    fn parse_nak_rejects_address_mismatch() {
        let (src, grp) = nlas();
        let other = Nla::V4(Ipv4Addr::new(1, 2, 3, 4));
        let header = Header {
            pgm_type: pgm_type::NAK,
            options: 0,
            checksum: 0,
            tsdu_length: 0,
            gsi: [0; 16],
            sport: 0,
            dport: 0,
        };
        let mut body = vec![0u8; NAK_FIXED_LEN];
        NakFixed {
            sqn: 1,
            src_nla: src,
            grp_nla: grp,
        }
        .encode_into(&mut body);

        assert_eq!(
            parse_nak(&header, &body, &other, &grp),
            Err(NakParseError::AddressMismatch)
        );
    }

    #[test]
    fn parse_nak_with_list_decodes_all_entries() {
        let (src, grp) = nlas();
        let header = Header {
            pgm_type: pgm_type::NAK,
            options: opt_flag::PRESENT,
            checksum: 0,
            tsdu_length: 0,
            gsi: [0; 16],
            sport: 0,
            dport: 0,
        };

        let mut body = vec![0u8; NAK_FIXED_LEN];
        NakFixed {
            sqn: 1,
            src_nla: src,
            grp_nla: grp,
        }
        .encode_into(&mut body);

        let opt_len_pos = body.len();
        body.extend_from_slice(&[0u8; OPT_LENGTH_LEN]);
        let list = [2u32, 3, 4];
        let nak_list_len = OPT_HEADER_LEN + list.len() * 4;
        body.extend_from_slice(&vec![0u8; nak_list_len]);

        options::encode_opt_length(
            &mut body[opt_len_pos..],
            (OPT_LENGTH_LEN + nak_list_len) as u16,
        );
        options::encode_opt_nak_list(&mut body[opt_len_pos + OPT_LENGTH_LEN..], &list)
            .expect("encode list");

        let parsed = parse_nak(&header, &body, &src, &grp).expect("parse");
        assert_eq!(parsed.sqns, vec![1, 2, 3, 4]);
    }

    #[test]
    fn rewrite_odata_as_rdata_flips_type_and_trail() {
        let id = id();
        let (_src, _grp) = nlas();
        let header = Header {
            pgm_type: pgm_type::ODATA,
            options: 0,
            checksum: 0,
            tsdu_length: 4,
            gsi: id.gsi,
            sport: id.sport,
            dport: id.dport,
        };
        let mut buf = vec![0u8; HEADER_LEN + DATA_LEN + 4];
        header.encode_into(&mut buf);
        DataHeader {
            data_sqn: 5,
            data_trail: 0,
        }
        .encode_into(&mut buf[HEADER_LEN..]);
        buf[HEADER_LEN + DATA_LEN..].copy_from_slice(&[9, 9, 9, 9]);

        rewrite_odata_as_rdata(&mut buf, 3, None);

        assert_eq!(buf[0], pgm_type::RDATA);
        let data = DataHeader::decode(&buf[HEADER_LEN..]).expect("data header");
        assert_eq!(data.data_trail, 3);
        assert_eq!(data.data_sqn, 5);

        let checksum_on_wire = u16::from_be_bytes([buf[2], buf[3]]);
        let mut recompute = buf.clone();
        recompute[2] = 0;
        recompute[3] = 0;
        let tsdu_length = u16::from_be_bytes([buf[4], buf[5]]) as usize;
        let pgm_header_len = buf.len() - tsdu_length;
        let unfolded_header = checksum::partial(&recompute[..pgm_header_len], 0);
        let unfolded_payload = checksum::partial(&recompute[pgm_header_len..], 0);
        let expected = checksum::fold(checksum::block_add(
            unfolded_header,
            unfolded_payload,
            pgm_header_len,
        ));
        assert_eq!(checksum_on_wire, expected);
    }

    #[test]
    fn rewrite_odata_as_rdata_uses_saved_checksum_when_given() {
        let id = id();
        let header = Header {
            pgm_type: pgm_type::ODATA,
            options: 0,
            checksum: 0,
            tsdu_length: 4,
            gsi: id.gsi,
            sport: id.sport,
            dport: id.dport,
        };
        let mut buf = vec![0u8; HEADER_LEN + DATA_LEN + 4];
        header.encode_into(&mut buf);
        DataHeader {
            data_sqn: 5,
            data_trail: 0,
        }
        .encode_into(&mut buf[HEADER_LEN..]);
        buf[HEADER_LEN + DATA_LEN..].copy_from_slice(&[1, 2, 3, 4]);

        let saved = checksum::partial(&[1, 2, 3, 4], 0);

        let mut via_saved = buf.clone();
        rewrite_odata_as_rdata(&mut via_saved, 1, Some(saved));

        let mut via_scan = buf.clone();
        rewrite_odata_as_rdata(&mut via_scan, 1, None);

        assert_eq!(via_saved, via_scan);
    }
}
