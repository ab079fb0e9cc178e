// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire encoding/decoding for PGM header, ODATA/RDATA, SPM, NAK, and NCF.
//!
//! All encode/decode routines work directly on byte slices at fixed
//! offsets, in the manual offset-walking style used elsewhere in this
//! crate's RTPS-adjacent ancestry rather than through a derive-based
//! serialization layer: PGM's bit-precise option encoding and checksum
//! interleaving don't fit a generic (de)serializer.

pub mod options;
pub mod packets;

use std::net::{Ipv4Addr, Ipv6Addr};

/// PGM packet types (`pgm_header.pgm_type`).
pub mod pgm_type {
    pub const SPM: u8 = 0x00;
    pub const ODATA: u8 = 0x04;
    pub const RDATA: u8 = 0x05;
    pub const NAK: u8 = 0x08;
    pub const NNAK: u8 = 0x09;
    pub const NCF: u8 = 0x0A;
    pub const SPMR: u8 = 0x40;
    pub const SPMR_DEST: u8 = 0x41;
}

/// `pgm_header.pgm_options` bit flags.
pub mod opt_flag {
    pub const PRESENT: u8 = 0x01;
    pub const NETWORK: u8 = 0x02;
    pub const VAR_PKTLEN: u8 = 0x40;
    pub const PARITY: u8 = 0x80;
}

/// Option type octets carried by `pgm_opt_header.opt_type`.
pub mod opt_type {
    pub const LENGTH: u8 = 0x00;
    pub const FRAGMENT: u8 = 0x01;
    pub const NAK_LIST: u8 = 0x02;
    pub const END: u8 = 0x80;
    pub const ENCODED: u8 = 0x08;
    pub const ENCODED_NULL: u8 = 0x0C;
}

/// Address-family indicator values carried in NLA fields.
pub mod afi {
    pub const IP4: u16 = 1;
    pub const IP6: u16 = 2;
}

/// Fixed PGM header length in bytes:
/// `type(1) + options(1) + checksum(2) + tsdu_length(2) + gsi(16) + sport(2) + dport(2)`.
pub const HEADER_LEN: usize = 1 + 1 + 2 + 2 + 16 + 2 + 2;

/// Length of the `pgm_data` block following the header on ODATA/RDATA
/// packets: `data_sqn(4) + data_trail(4)`.
pub const DATA_LEN: usize = 8;

/// Maximum additional sequence numbers an `OPT_NAK_LIST` may carry, per
/// the PGM erratum bounding NCF list capacity (spec §9 Open Question iii).
pub const MAX_NAK_LIST_LEN: usize = 62;

/// Network-layer address carried in NAK/NCF NLA fields. Modeled as a
/// closed two-variant enum (rather than a uniform byte array branching on
/// AFI, as the original C does) so family mismatches are a type error at
/// construction and only a comparison at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nla {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
}

impl Nla {
    #[must_use]
    pub fn afi(&self) -> u16 {
        match self {
            Self::V4(_) => afi::IP4,
            Self::V6(_) => afi::IP6,
        }
    }

    /// Encodes into a fixed 16-byte slot: IPv4 addresses are placed in the
    /// first four bytes with the remainder zeroed.
    pub fn encode_into(&self, slot: &mut [u8; 16]) {
        slot.fill(0);
        match self {
            Self::V4(addr) => slot[..4].copy_from_slice(&addr.octets()),
            Self::V6(addr) => slot.copy_from_slice(&addr.octets()),
        }
    }

    /// Decodes from an AFI tag plus a 16-byte slot. Returns `None` for an
    /// unrecognized AFI, or when an IPv4 slot has non-zero padding bytes
    /// (malformed per spec §9 Open Question ii).
    #[must_use]
    pub fn decode(afi_value: u16, slot: &[u8; 16]) -> Option<Self> {
        match afi_value {
            afi::IP4 => {
                if slot[4..].iter().any(|&b| b != 0) {
                    return None;
                }
                let mut octets = [0u8; 4];
                octets.copy_from_slice(&slot[..4]);
                Some(Self::V4(Ipv4Addr::from(octets)))
            }
            afi::IP6 => Some(Self::V6(Ipv6Addr::from(*slot))),
            _ => None,
        }
    }
}

/// Decoded fixed PGM header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub pgm_type: u8,
    pub options: u8,
    pub checksum: u16,
    pub tsdu_length: u16,
    pub gsi: [u8; 16],
    pub sport: u16,
    pub dport: u16,
}

impl Header {
    /// Encodes the fixed header fields into `buf[0..HEADER_LEN]`.
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_LEN);
        buf[0] = self.pgm_type;
        buf[1] = self.options;
        buf[2..4].copy_from_slice(&self.checksum.to_be_bytes());
        buf[4..6].copy_from_slice(&self.tsdu_length.to_be_bytes());
        buf[6..22].copy_from_slice(&self.gsi);
        buf[22..24].copy_from_slice(&self.sport.to_be_bytes());
        buf[24..26].copy_from_slice(&self.dport.to_be_bytes());
    }

    /// Decodes the fixed header fields from `buf`. Returns `None` if `buf`
    /// is shorter than [`HEADER_LEN`].
    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        let mut gsi = [0u8; 16];
        gsi.copy_from_slice(&buf[6..22]);
        Some(Self {
            pgm_type: buf[0],
            options: buf[1],
            checksum: u16::from_be_bytes([buf[2], buf[3]]),
            tsdu_length: u16::from_be_bytes([buf[4], buf[5]]),
            gsi,
            sport: u16::from_be_bytes([buf[22], buf[23]]),
            dport: u16::from_be_bytes([buf[24], buf[25]]),
        })
    }
}

/// Decoded `pgm_data` block carried by ODATA/RDATA packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    pub data_sqn: u32,
    pub data_trail: u32,
}

impl DataHeader {
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= DATA_LEN);
        buf[0..4].copy_from_slice(&self.data_sqn.to_be_bytes());
        buf[4..8].copy_from_slice(&self.data_trail.to_be_bytes());
    }

    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < DATA_LEN {
            return None;
        }
        Some(Self {
            data_sqn: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            data_trail: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }
}
