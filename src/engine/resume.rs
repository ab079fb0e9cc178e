// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Explicit resume state for a mid-APDU `EAGAIN`.
//!
//! The original C source reuses the caller's stack frame via a `STATE(x)`
//! macro that aliases fields of `transport->pkt_dontwait_state` and a `goto
//! retry_send` label (spec §9 design note "macro-based resume state"). This
//! crate models the same idea as data: a snapshot the engine saves before
//! returning [`crate::error::Error::WouldBlock`], keyed by a labeled step so
//! re-entry resumes past the work already done rather than repeating it.

use std::sync::Arc;

use crate::buffer::PacketBuffer;

/// Which step of the fragmented-send loop to resume at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeStep {
    /// Resume by re-issuing `sendto` for the already-built, already
    /// TXW-admitted packet in [`SendResume::skb`] (the `retry_send` label).
    RetrySend,
}

/// Snapshot of an in-progress fragmented send, preserved across an `EAGAIN`
/// so a subsequent call with identical arguments resumes rather than
/// re-fragments and re-admits into the window (spec §3 "resume state
/// fields").
#[derive(Clone)]
pub struct SendResume {
    pub step: ResumeStep,
    pub skb: Arc<PacketBuffer>,
    pub tsdu_length: usize,
    pub apdu_length: usize,
    pub data_bytes_offset: usize,
    pub first_sqn: u32,
    pub vector_index: usize,
    pub vector_offset: usize,
    pub data_pkt_offset: usize,
    pub unfolded_odata: u32,
    pub is_rate_limited: bool,
}
