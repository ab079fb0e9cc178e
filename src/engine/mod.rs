// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The send-path engine: a bound PGM source transport (spec §3 "Transport
//! sender state") and the operations that run against it.
//!
//! [`Transport`] itself only holds state and the handful of accessors every
//! sibling module needs (`wire_identity`, the resume slot, the FEC codec);
//! the actual operations are split across sibling modules the way the
//! original source splits `source.c`'s functions by concern rather than by
//! struct: [`nak`] classifies inbound NAK/NNAK/SPMR, [`odata`] is the
//! application producer path, [`spm`] builds and sends heartbeats and
//! control replies, [`rdata`] is the repair consumer.

pub mod clock;
pub mod heartbeat;
mod nak;
mod odata;
mod rdata;
pub mod resume;
mod spm;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::SenderConfig;
use crate::counters::{Counters, CountersSnapshot};
use crate::error::{Error, Result};
use crate::fec::Codec;
use crate::net::Sendto;
use crate::notify::Notify;
use crate::rate::RateController;
use crate::txw::TransmitWindow;
use crate::wire::options::{OPT_FRAGMENT_LEN, OPT_HEADER_LEN, OPT_LENGTH_LEN};
use crate::wire::packets::Identity;
use crate::wire::{Nla, DATA_LEN, HEADER_LEN};

use self::clock::Clock;
use self::heartbeat::HeartbeatState;
use self::resume::SendResume;

/// Forward error correction parameters for one bound transport (spec §3
/// "FEC parameters `(n, k, tg_sqn_shift, rs_proactive_h,
/// use_ondemand_parity, use_proactive_parity)`").
#[derive(Debug, Clone, Copy)]
pub struct FecParams {
    pub n: usize,
    pub k: usize,
    pub tg_sqn_shift: u8,
    pub rs_proactive_h: u32,
    pub use_ondemand_parity: bool,
    pub use_proactive_parity: bool,
}

impl FecParams {
    /// No forward error correction: on-demand parity NAKs are discarded and
    /// no proactive parity is ever scheduled.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            n: 0,
            k: 0,
            tg_sqn_shift: 0,
            rs_proactive_h: 0,
            use_ondemand_parity: false,
            use_proactive_parity: false,
        }
    }
}

/// Arguments consumed once, at bind time, to produce a running [`Transport`].
///
/// Transport construction/binding and socket plumbing proper are named
/// external collaborators this crate doesn't specify end to end; `BindParams`
/// is the seam the host fills in after interface selection and multicast
/// group setup have already happened.
pub struct BindParams {
    pub gsi: [u8; 16],
    pub sport: u16,
    pub dport: u16,
    pub dest: SocketAddr,
    pub src_nla: Nla,
    pub grp_nla: Nla,
    pub mtu: usize,
    pub fec: FecParams,
    pub socket: Arc<dyn Sendto>,
    pub clock: Arc<dyn Clock>,
}

/// A bound PGM source transport: the send-path state machine and everything
/// it needs to build, admit, and retransmit ODATA (spec §3).
pub struct Transport {
    gsi: [u8; 16],
    sport: u16,
    dport: u16,
    dest: SocketAddr,
    src_nla: Nla,
    grp_nla: Nla,
    max_tsdu: usize,
    max_tsdu_fragment: usize,
    fec: FecParams,
    rs: Option<Codec>,
    txw: TransmitWindow,
    rate: RateController,
    notify: Notify,
    heartbeat: HeartbeatState,
    counters: Counters,
    socket: Arc<dyn Sendto>,
    clock: Arc<dyn Clock>,
    config: SenderConfig,
    is_open: AtomicBool,
    resume: Mutex<Option<SendResume>>,
    /// Reusable scratch buffer for parity packet construction (spec §5
    /// "the parity-buffer skb is singleton and owned by the repair
    /// consumer"). Unlike TXW-admitted ODATA/RDATA this buffer is never
    /// shared past the call that fills and sends it, so a plain `Vec<u8>`
    /// behind a mutex is enough; it doesn't need the head/data/tail
    /// bookkeeping [`crate::buffer::PacketBuffer`] gives TXW entries.
    parity_scratch: Mutex<Vec<u8>>,
}

impl Transport {
    /// Binds `config` into a running transport. Latches `config` immutable
    /// (`SenderConfig::mark_bound`) on success; `config` is kept so the
    /// heartbeat schedule and ambient interval can still be read live.
    pub fn bind(config: SenderConfig, params: BindParams) -> Result<Arc<Self>> {
        if config.txw_sqns() == 0 {
            return Err(Error::invalid("txw_sqns must be configured before bind"));
        }
        if config.txw_max_rate_bps() == 0 {
            return Err(Error::invalid("txw_max_rate_bps must be configured before bind"));
        }

        let rs = if params.fec.n > 0 {
            Some(Codec::new(params.fec.n, params.fec.k)?)
        } else {
            None
        };

        let frag_overhead = OPT_LENGTH_LEN + OPT_HEADER_LEN + OPT_FRAGMENT_LEN;
        let max_tsdu = params.mtu.saturating_sub(HEADER_LEN + DATA_LEN);
        let max_tsdu_fragment = params.mtu.saturating_sub(HEADER_LEN + DATA_LEN + frag_overhead);
        if max_tsdu == 0 || max_tsdu_fragment == 0 {
            return Err(Error::invalid("mtu too small to carry a PGM header"));
        }

        let now = params.clock.now_us();
        let txw = TransmitWindow::new(config.txw_sqns() as usize);
        let rate_bps = config.txw_max_rate_bps();
        let rate = RateController::new(rate_bps, rate_bps);
        let heartbeat = HeartbeatState::new(now, config.ambient_spm_interval_us());

        config.mark_bound();

        Ok(Arc::new(Self {
            gsi: params.gsi,
            sport: params.sport,
            dport: params.dport,
            dest: params.dest,
            src_nla: params.src_nla,
            grp_nla: params.grp_nla,
            max_tsdu,
            max_tsdu_fragment,
            fec: params.fec,
            rs,
            txw,
            rate,
            notify: Notify::new(),
            heartbeat,
            counters: Counters::default(),
            socket: params.socket,
            clock: params.clock,
            config,
            is_open: AtomicBool::new(true),
            resume: Mutex::new(None),
            parity_scratch: Mutex::new(Vec::new()),
        }))
    }

    /// A snapshot of every cumulative counter (spec §6).
    #[must_use]
    pub fn counters(&self) -> CountersSnapshot {
        self.counters.snapshot()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::Acquire)
    }

    /// Closes the transport. Every subsequent `send`/`sendv`/`send_skbv`
    /// fails with [`Error::ConnectionReset`]; the repair consumer's blocking
    /// [`rdata::run_repair_consumer`] loop wakes and exits (spec §5
    /// "Cancellation/timeout").
    ///
    /// [`rdata::run_repair_consumer`]: crate::engine::Transport::run_repair_consumer
    pub fn close(&self) {
        self.is_open.store(false, Ordering::Release);
        self.notify.send();
    }

    pub(crate) fn wire_identity(&self) -> Identity {
        Identity {
            gsi: self.gsi,
            sport: self.sport,
            dport: self.dport,
        }
    }

    fn take_resume(&self) -> Option<SendResume> {
        self.resume.lock().take()
    }

    fn set_resume(&self, resume: SendResume) {
        *self.resume.lock() = Some(resume);
    }

    fn reset_heartbeat(&self) {
        self.heartbeat
            .reset(&self.config.heartbeat_schedule(), self.clock.as_ref(), &self.notify);
    }
}
