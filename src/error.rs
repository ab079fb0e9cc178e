// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the PGM source transport.

use std::fmt;

/// Result type for source-transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported across the public send-path boundary.
///
/// Every variant here maps to a caller-visible failure mode; internal
/// protocol noise (malformed NAKs, discarded packets) is tallied in
/// [`crate::counters::Counters`] instead of surfacing as an error.
#[derive(Debug)]
pub enum Error {
    /// A null transport handle, an out-of-range setter value, a
    /// malformed NAK address, or invalid option encoding.
    InvalidArgument(String),

    /// A payload or APDU exceeded `max_tsdu` / the window capacity.
    MessageSize(String),

    /// Send attempted on a transport whose `is_open` flag is false.
    ConnectionReset,

    /// The socket returned `EAGAIN`; resume state has been preserved
    /// and the identical call should be retried.
    WouldBlock,

    /// A lower-level I/O failure that occurred before any admission
    /// into the transmit window (bind, socket construction).
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Self::MessageSize(msg) => write!(f, "message too large: {}", msg),
            Self::ConnectionReset => write!(f, "transport is closed"),
            Self::WouldBlock => write!(f, "operation would block"),
            Self::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn too_large(msg: impl Into<String>) -> Self {
        Self::MessageSize(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_non_empty() {
        let variants: Vec<Error> = vec![
            Error::invalid("bad range"),
            Error::too_large("apdu too big"),
            Error::ConnectionReset,
            Error::WouldBlock,
            Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom")),
        ];
        for e in variants {
            assert!(!e.to_string().is_empty());
        }
    }

    #[test]
    fn io_error_round_trips_via_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::WouldBlock, "eagain");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
