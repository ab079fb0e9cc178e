// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # pgm-sender — Pragmatic General Multicast, sender side
//!
//! A pure Rust implementation of the source (sending) half of the PGM
//! (Pragmatic General Multicast) reliable-multicast transport: ODATA
//! production, fragmentation, the transmit window, selective and parity
//! repair, SPM heartbeats, and NAK/NNAK/SPMR handling. The receive side
//! (NAK generation, loss detection, data reassembly) is out of scope; this
//! crate only tracks the minimal peer state the source needs to answer a
//! multicast SPMR (see [`peer`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pgm_sender::engine::{BindParams, FecParams, Transport};
//! use pgm_sender::engine::clock::SystemClock;
//! use pgm_sender::config::SenderConfig;
//! use pgm_sender::net::Sendto;
//! use pgm_sender::wire::Nla;
//! use std::net::Ipv4Addr;
//! use std::sync::Arc;
//!
//! # fn make_socket() -> Arc<dyn Sendto> { unimplemented!() }
//! fn main() -> pgm_sender::error::Result<()> {
//!     let config = SenderConfig::new();
//!     config.set_txw_sqns(4096)?;
//!     config.set_txw_max_rate_bps(10_000_000)?;
//!
//!     let transport = Transport::bind(
//!         config,
//!         BindParams {
//!             gsi: [0u8; 16],
//!             sport: 1000,
//!             dport: 2000,
//!             dest: "239.1.1.1:2000".parse().unwrap(),
//!             src_nla: Nla::V4(Ipv4Addr::new(10, 0, 0, 1)),
//!             grp_nla: Nla::V4(Ipv4Addr::new(239, 1, 1, 1)),
//!             mtu: 1462,
//!             fec: FecParams::disabled(),
//!             socket: make_socket(),
//!             clock: Arc::new(SystemClock),
//!         },
//!     )?;
//!
//!     transport.send(b"hello, multicast", 0)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                      Application (send/sendv)                       |
//! +---------------------------------------------------------------------+
//! |  engine::odata   ODATA production, fragmentation, resume-on-EAGAIN  |
//! |  engine::nak     NAK/NNAK classification, NCF replies, SPMR         |
//! |  engine::spm     Ambient/heartbeat SPM, bare control-packet send    |
//! |  engine::rdata   Repair consumer: selective RDATA, parity RDATA     |
//! +---------------------------------------------------------------------+
//! |  txw    Transmit window (ring + retransmit queue)                   |
//! |  fec    Systematic (n, k) Reed-Solomon over GF(2^8)                 |
//! |  rate   Token-bucket rate controller                                |
//! |  wire   PGM header/option/NAK/NCF/SPM codec                         |
//! +---------------------------------------------------------------------+
//! |  net    Sendto collaborator (real socket2 socket or test fake)      |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`engine`] — the bound [`engine::Transport`] and every send-path operation
//! - [`config`] — pre-bind [`config::SenderConfig`] (txw sizing, rate, heartbeat schedule)
//! - [`wire`] — PGM wire codec (header, options, NAK/NCF/SPM packet builders)
//! - [`txw`] — the transmit window and its retransmit queue
//! - [`fec`] — Reed-Solomon parity codec
//! - [`checksum`] — one's-complement checksum engine
//! - [`buffer`] — reference-counted packet buffer (skb)
//! - [`rate`] — token-bucket rate limiting
//! - [`sequence`] — modular sequence-number arithmetic and TG masking
//! - [`net`] — the [`net::Sendto`] collaborator and its real/fake implementations
//! - [`peer`] — minimal remote-receiver record (SPMR suppression only)
//! - [`notify`] — single-slot coalescing wakeup channel
//! - [`counters`] — cumulative per-transport counters
//! - [`error`] — the public [`error::Error`]/[`error::Result`] types
//! - [`logging`] — compile-time zero-cost logging macros

pub mod buffer;
pub mod checksum;
pub mod config;
pub mod counters;
pub mod engine;
pub mod error;
pub mod fec;
pub mod logging;
pub mod net;
pub mod notify;
pub mod peer;
pub mod rate;
pub mod sequence;
pub mod txw;
pub mod wire;

pub use config::SenderConfig;
pub use engine::{BindParams, FecParams, Transport};
pub use error::{Error, Result};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
