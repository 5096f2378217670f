//! Control byte codec.
//!
//! After a pairing stream opens, the responder writes exactly one byte: ACK
//! (`0x06`) if it registered the stream, NAK (`0x15`) otherwise. Every read and
//! write is bounded by a timeout.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::PairingError;

/// Single-byte pairing verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlByte {
    /// Stream registered, ready to exchange artifacts.
    Ack = 0x06,
    /// Stream refused.
    Nak = 0x15,
}

impl ControlByte {
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Decode a byte, returning `None` for anything but ACK or NAK.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x06 => Some(Self::Ack),
            0x15 => Some(Self::Nak),
            _ => None,
        }
    }
}

/// Read one control byte within `timeout`.
///
/// Returns `Ok(None)` if the peer sent a byte that is neither ACK nor NAK.
pub async fn read_control<S>(
    stream: &mut S,
    timeout: Duration,
) -> Result<Option<ControlByte>, PairingError>
where
    S: AsyncRead + Unpin,
{
    let byte = tokio::time::timeout(timeout, stream.read_u8())
        .await
        .map_err(|_| PairingError::Timeout(timeout))??;

    let control = ControlByte::from_byte(byte);
    trace!(byte, ?control, "read control byte");
    Ok(control)
}

/// Write and flush one control byte within `timeout`.
pub async fn write_control<S>(
    stream: &mut S,
    control: ControlByte,
    timeout: Duration,
) -> Result<(), PairingError>
where
    S: AsyncWrite + Unpin,
{
    tokio::time::timeout(timeout, async {
        stream.write_u8(control.as_byte()).await?;
        stream.flush().await
    })
    .await
    .map_err(|_| PairingError::Timeout(timeout))??;

    trace!(?control, "wrote control byte");
    Ok(())
}

/// Shut the stream down and drop it.
///
/// Best effort: a shutdown that fails or does not finish within `timeout` is
/// ignored and the stream is dropped anyway.
pub async fn close_stream<S>(mut stream: S, timeout: Duration)
where
    S: AsyncWrite + Unpin,
{
    match tokio::time::timeout(timeout, stream.shutdown()).await {
        Ok(Ok(())) => trace!("pairing stream closed"),
        Ok(Err(error)) => trace!(%error, "error closing pairing stream"),
        Err(_) => trace!(?timeout, "timed out closing pairing stream"),
    }
}
