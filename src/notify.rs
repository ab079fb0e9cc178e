// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Single-reader/single-writer wakeup primitive coupling producer threads
//! (application sends, inbound NAK processing) to the repair/timer
//! consumer thread.
//!
//! A bounded, capacity-1 `crossbeam` channel gives exactly the semantics
//! the send path needs: multiple coalesced wakes collapse into one pending
//! notification, and a write never blocks the producer.

use crossbeam::channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};

/// A coalescing, non-blocking wakeup channel.
pub struct Notify {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Notify {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    /// Posts a wakeup. Never blocks: if one is already pending, this is a
    /// no-op (the repair consumer will re-check the retransmit queue
    /// itself once woken, so a second wake carries no information). A
    /// disconnected channel is logged critical per the write-failure
    /// policy and otherwise ignored.
    pub fn send(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                crate::error!("notify channel disconnected; wakeup lost");
            }
        }
    }

    /// Blocks the calling (consumer) thread until a wakeup arrives,
    /// draining it. Returns `false` if the sender half has been dropped,
    /// signaling shutdown.
    pub fn read(&self) -> bool {
        self.rx.recv().is_ok()
    }

    /// Polls for a pending wakeup without blocking, draining it if present.
    #[must_use]
    pub fn try_read(&self) -> bool {
        match self.rx.try_recv() {
            Ok(()) => true,
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => false,
        }
    }
}

impl Default for Notify {
    fn default() -> Self {
        Self::new()
    }
}
