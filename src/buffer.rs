// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reference-counted packet buffer (skb) shared between the send-path
//! producer and the repair consumer.
//!
//! A [`PacketBuffer`] owns one contiguous byte region with independently
//! adjustable `head`/`data`/`tail` offsets, in the style of a kernel skbuff:
//! `head` is the start of the allocation, `data` is the start of the
//! currently-valid bytes (headroom between `head` and `data` is reserved for
//! options the caller hasn't written yet), and `tail` is the end of the
//! valid bytes. `len()` is always `tail - data`.
//!
//! Ownership follows §3 of the design: the producer exclusively owns the
//! buffer until it is hand ed to the transmit window; from that point it is
//! shared (`Arc`) with the repair consumer, which only ever mutates the
//! fields the design explicitly calls out as consumer-writable (the PGM
//! type byte, `data_trail`, and the header checksum) — never the payload.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

const NO_SEQUENCE: u32 = u32::MAX;
const NO_CSUM: u32 = u32::MAX;

struct Inner {
    storage: Vec<u8>,
    head: usize,
    data: usize,
    tail: usize,
}

/// A shared, growable packet buffer used to build ODATA/RDATA/SPM/NCF
/// wire packets.
pub struct PacketBuffer {
    inner: Mutex<Inner>,
    /// Acquisition time in microseconds (monotonic clock), stamped once at
    /// creation and never mutated.
    pub tstamp_us: u64,
    /// Sequence number once the buffer has been admitted into the transmit
    /// window. `NO_SEQUENCE` sentinel means "not yet admitted".
    sequence: AtomicU32,
    /// Cached unfolded checksum of the payload region, stashed by the
    /// producer so the repair consumer can refold the header checksum on
    /// RDATA without rescanning the payload. Explicit typed field per
    /// the design note on the original's 4-byte control-slot overlay.
    saved_partial_csum: AtomicU32,
    /// Idempotency guard for the one-time zero-pad performed by the parity
    /// builder on variable-length transmission groups.
    zero_padded: AtomicBool,
}

impl PacketBuffer {
    /// Allocates a new buffer of `capacity` bytes with `headroom` bytes
    /// reserved between `head` and the initial `data` pointer (for PGM
    /// header + options the caller has not yet written).
    #[must_use]
    pub fn new(capacity: usize, headroom: usize, tstamp_us: u64) -> Arc<Self> {
        debug_assert!(headroom <= capacity);
        Arc::new(Self {
            inner: Mutex::new(Inner {
                storage: vec![0u8; capacity],
                head: 0,
                data: headroom,
                tail: headroom,
            }),
            tstamp_us,
            sequence: AtomicU32::new(NO_SEQUENCE),
            saved_partial_csum: AtomicU32::new(NO_CSUM),
            zero_padded: AtomicBool::new(false),
        })
    }

    /// Grows the valid region by `additional` bytes at the tail, returning
    /// the offset (relative to `data`) at which the new bytes begin.
    ///
    /// Panics if the backing allocation is too small; callers size the
    /// buffer to `max_tpdu` up front so this should never trigger on the
    /// send path.
    pub fn put(&self, additional: usize) -> usize {
        let mut inner = self.inner.lock();
        let offset = inner.tail - inner.data;
        let new_tail = inner.tail + additional;
        assert!(
            new_tail <= inner.storage.len(),
            "packet buffer overflow: tail {} + {} > capacity {}",
            inner.tail,
            additional,
            inner.storage.len()
        );
        inner.tail = new_tail;
        offset
    }

    /// Moves `data` backward by `n` bytes, extending the valid region into
    /// previously reserved headroom. Used by the single-packet send path to
    /// reclaim space for the PGM header after the caller already wrote the
    /// payload at `data`.
    pub fn push_head(&self, n: usize) {
        let mut inner = self.inner.lock();
        assert!(n <= inner.data - inner.head, "insufficient headroom");
        inner.data -= n;
    }

    /// Current length of the valid region (`tail - data`).
    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.tail - inner.data
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `f` over the currently valid bytes (`data..tail`), allowing the
    /// caller to write header fields or compute checksums in place.
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut inner = self.inner.lock();
        let (data, tail) = (inner.data, inner.tail);
        f(&mut inner.storage[data..tail])
    }

    /// Copies the currently valid bytes out for handing to `sendto`.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let inner = self.inner.lock();
        inner.storage[inner.data..inner.tail].to_vec()
    }

    /// Sequence number assigned when this buffer was admitted to the
    /// transmit window, if any.
    #[must_use]
    pub fn sequence(&self) -> Option<u32> {
        match self.sequence.load(Ordering::Acquire) {
            NO_SEQUENCE => None,
            sqn => Some(sqn),
        }
    }

    /// Records the sequence number assigned at TXW admission. Called
    /// exactly once, by the producer, under the TXW write lock.
    pub fn set_sequence(&self, sqn: u32) {
        self.sequence.store(sqn, Ordering::Release);
    }

    /// The cached unfolded payload checksum, if the producer saved one.
    #[must_use]
    pub fn saved_partial_csum(&self) -> Option<u32> {
        match self.saved_partial_csum.load(Ordering::Acquire) {
            NO_CSUM => None,
            csum => Some(csum),
        }
    }

    pub fn set_saved_partial_csum(&self, csum: u32) {
        self.saved_partial_csum.store(csum, Ordering::Release);
    }

    #[must_use]
    pub fn is_zero_padded(&self) -> bool {
        self.zero_padded.load(Ordering::Acquire)
    }

    /// Marks the buffer as zero-padded, returning `true` only the first
    /// time this is called — the parity builder uses this to perform the
    /// trailing-length-byte rewrite exactly once per packet.
    pub fn mark_zero_padded(&self) -> bool {
        !self.zero_padded.swap(true, Ordering::AcqRel)
    }
}
