// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Minimal UDP-multicast socket plumbing for the send path.
//!
//! Socket construction mirrors the `socket2`-based pattern used by this
//! tree's RTPS UDP transport (reuse-address, explicit multicast join,
//! conversion into a plain [`std::net::UdpSocket`] for the actual I/O
//! calls) but stripped to the single bound/joined socket a PGM source
//! needs, with no SEDP/metatraffic port juggling.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::Mutex;

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::{Error, Result};

/// Collaborator interface the send-path engine writes packets through.
/// Decoupling from a concrete socket lets tests substitute an in-memory
/// fake instead of binding real multicast sockets.
pub trait Sendto: Send + Sync {
    /// Sends `buf` to `dest`.
    ///
    /// `router_alert` requests the PGM convention of setting the IP
    /// router-alert hop-by-hop option on control packets (SPM, NAK
    /// replies, RDATA); platforms that can't express it send the packet
    /// anyway rather than failing the call. `dontwait` maps a kernel
    /// `EAGAIN` to [`Error::WouldBlock`] instead of a generic I/O error,
    /// matching the engine's resume-on-EAGAIN contract.
    fn sendto(&self, buf: &[u8], dest: SocketAddr, router_alert: bool, dontwait: bool)
        -> Result<usize>;
}

/// A bound, multicast-joined UDP socket.
pub struct PgmSocket {
    socket: UdpSocket,
}

impl PgmSocket {
    /// Binds to `bind_addr` and joins `group` via `iface`.
    pub fn bind_multicast(bind_addr: SocketAddrV4, group: Ipv4Addr, iface: Ipv4Addr) -> Result<Self> {
        let raw = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        raw.set_reuse_address(true)?;
        raw.set_nonblocking(true)?;
        raw.bind(&bind_addr.into())?;
        raw.join_multicast_v4(&group, &iface)?;
        raw.set_multicast_loop_v4(true)?;
        let socket: UdpSocket = raw.into();
        crate::debug!(
            "pgm socket bound to {} joined {} via {}",
            bind_addr,
            group,
            iface
        );
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn set_multicast_ttl(&self, ttl: u32) -> Result<()> {
        Ok(self.socket.set_multicast_ttl_v4(ttl)?)
    }
}

impl Sendto for PgmSocket {
    fn sendto(
        &self,
        buf: &[u8],
        dest: SocketAddr,
        _router_alert: bool,
        dontwait: bool,
    ) -> Result<usize> {
        match self.socket.send_to(buf, dest) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock && dontwait => Err(Error::WouldBlock),
            Err(e) => {
                log::warn!("pgm sendto to {dest} failed: {e}");
                Err(Error::Io(e))
            }
        }
    }
}

/// An in-memory [`Sendto`] that records every packet instead of touching
/// the network, for unit and integration tests.
#[derive(Default)]
pub struct FakeSendto {
    sent: Mutex<Vec<FakeSend>>,
    /// When set, every `sendto` call fails with this error instead of
    /// recording the packet; used to exercise the `WouldBlock`/resume path.
    fail_with: Mutex<Option<FakeFailure>>,
}

/// A single recorded call to [`FakeSendto::sendto`].
#[derive(Debug, Clone)]
pub struct FakeSend {
    pub buf: Vec<u8>,
    pub dest: SocketAddr,
    pub router_alert: bool,
}

#[derive(Debug, Clone, Copy)]
enum FakeFailure {
    WouldBlock,
}

impl FakeSendto {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `sendto` call return `WouldBlock` until
    /// cleared with [`Self::stop_blocking`].
    pub fn block_next(&self) {
        *self.fail_with.lock().expect("fake sendto mutex poisoned") = Some(FakeFailure::WouldBlock);
    }

    pub fn stop_blocking(&self) {
        *self.fail_with.lock().expect("fake sendto mutex poisoned") = None;
    }

    #[must_use]
    pub fn sent(&self) -> Vec<FakeSend> {
        self.sent.lock().expect("fake sendto mutex poisoned").clone()
    }

    pub fn clear(&self) {
        self.sent.lock().expect("fake sendto mutex poisoned").clear();
    }
}

impl Sendto for FakeSendto {
    fn sendto(
        &self,
        buf: &[u8],
        dest: SocketAddr,
        router_alert: bool,
        dontwait: bool,
    ) -> Result<usize> {
        let blocking = self.fail_with.lock().expect("fake sendto mutex poisoned").take();
        if let Some(FakeFailure::WouldBlock) = blocking {
            return if dontwait {
                Err(Error::WouldBlock)
            } else {
                Err(Error::Io(io::Error::from(io::ErrorKind::WouldBlock)))
            };
        }
        let len = buf.len();
        self.sent
            .lock()
            .expect("fake sendto mutex poisoned")
            .push(FakeSend {
                buf: buf.to_vec(),
                dest,
                router_alert,
            });
        Ok(len)
    }
}
