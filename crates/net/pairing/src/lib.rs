//! Pairing handshake for gossip artifact streams.
//!
//! Before two peers exchange artifacts, the initiator opens a stream on the
//! pairing sub-protocol and the responder answers with a single control byte
//! saying whether it registered the stream. Paired streams are recorded in a
//! [`StreamStore`] and handed to an [`ArtifactProcessor`] on their own task.
//!
//! # Protocol
//!
//! - Path: `"{protocol}/pair"` (see [`PairingConfig::pair_protocol`])
//! - Wire: exactly one byte from responder to initiator, [`ControlByte::Ack`]
//!   (`0x06`) or [`ControlByte::Nak`] (`0x15`)

pub mod config;
pub mod control;
mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
mod metrics;
mod protocol;
pub mod store;
pub mod transport;

pub use config::{DEFAULT_CONTROL_TIMEOUT, DEFAULT_PROTOCOL, PairingArgs, PairingConfig};
pub use control::ControlByte;
pub use error::PairingError;
pub use protocol::{InboundOutcome, PairingProtocol};
pub use store::{Direction, MemoryStreamStore, StreamId, StreamRegistration, StreamStore};
pub use transport::{
    AddressBook, ArtifactProcessor, InboundHandler, PairStream, PairedStream, Transport,
};
