//! Pairing errors.

use std::{io, time::Duration};

/// Why a pairing attempt failed.
///
/// A rejected pairing is not an error: [`pair`](crate::PairingProtocol::pair)
/// reports it as `Ok(false)`.
#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    /// The pairing stream could not be opened.
    #[error("cannot connect to peer: {0}")]
    Connection(#[source] io::Error),

    /// The control byte was not exchanged in time.
    #[error("control byte not exchanged within {0:?}")]
    Timeout(Duration),

    /// Reading or writing the control byte failed.
    #[error("control byte exchange failed: {0}")]
    Io(#[from] io::Error),
}

impl PairingError {
    /// Whether the peer could not be reached at all.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Whether the stream opened but the control exchange broke down.
    pub fn is_communication_failure(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Io(_))
    }
}
