// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cumulative, monotonic counters exposed by a bound sender (spec §6).
//!
//! Every field is an independent `AtomicU64` bumped with `Ordering::Relaxed`:
//! counters are diagnostic, not synchronization points, so there is nothing
//! to order against.

use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! counters {
    ($($field:ident => $getter:ident),+ $(,)?) => {
        /// Snapshot of all counter values at one instant.
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct CountersSnapshot {
            $(pub $field: u64),+
        }

        /// Process-wide counters for one bound sender.
        #[derive(Default)]
        pub struct Counters {
            $($field: AtomicU64),+
        }

        impl Counters {
            $(
                #[inline]
                pub(crate) fn $getter(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )+

            #[must_use]
            pub fn snapshot(&self) -> CountersSnapshot {
                CountersSnapshot {
                    $($field: self.$field.load(Ordering::Relaxed)),+
                }
            }
        }
    };
}

counters! {
    source_bytes_sent => bump_bytes_sent,
    source_data_bytes_sent => bump_data_bytes_sent,
    source_data_msgs_sent => bump_data_msgs_sent,
    source_selective_bytes_retransmitted => bump_selective_bytes_retransmitted,
    source_selective_msgs_retransmitted => bump_selective_msgs_retransmitted,
    source_selective_naks_received => bump_selective_naks_received,
    source_parity_naks_received => bump_parity_naks_received,
    source_malformed_naks => bump_malformed_naks,
    source_packets_discarded => bump_packets_discarded,
    source_selective_nnak_packets_received => bump_selective_nnak_packets_received,
    source_selective_nnaks_received => bump_selective_nnaks_received,
    source_nnak_errors => bump_nnak_errors,
}

impl Counters {
    /// Adds `n` to `source_bytes_sent`, the one counter bumped by a byte
    /// count rather than a per-packet/per-event increment.
    pub(crate) fn add_bytes_sent(&self, n: u64) {
        self.source_bytes_sent.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_data_bytes_sent(&self, n: u64) {
        self.source_data_bytes_sent.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_selective_bytes_retransmitted(&self, n: u64) {
        self.source_selective_bytes_retransmitted
            .fetch_add(n, Ordering::Relaxed);
    }

    /// Adds `n` to the NNAK counter in one step, matching the original's
    /// `1 + list_len` per-call increment (spec §4.3).
    pub(crate) fn add_selective_nnaks_received(&self, n: u64) {
        self.source_selective_nnaks_received
            .fetch_add(n, Ordering::Relaxed);
    }
}
