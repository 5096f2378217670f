//! Pairing handshake.
//!
//! # Flow
//!
//! 1. **Initiator opens** a stream on `"{protocol}/pair"`.
//! 2. **Responder registers** the stream as inbound and answers with ACK, or
//!    NAK if the registration is refused.
//! 3. **Initiator reads** the control byte and, on ACK, registers the stream
//!    as outbound.
//!
//! Both sides hand a paired stream to the [`ArtifactProcessor`] on a task of
//! its own. Every other terminal state closes the stream.

use std::{
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};

use futures::{FutureExt, future::BoxFuture};
use tracing::{debug, warn};
use vertex_net_rings::{NetPeerId, RoutingTable};
use vertex_tasks::TaskExecutor;

use crate::{
    ArtifactProcessor, ControlByte, Direction, PairedStream, PairingConfig, PairingError,
    StreamRegistration, StreamStore,
    control::{close_stream, read_control, write_control},
    metrics::{Outcome, PairingMetrics},
    transport::{AddressBook, InboundHandler, Transport},
};

/// How the responder side of a handshake ended.
#[derive(Debug)]
pub enum InboundOutcome {
    /// ACK sent and the stream handed to the artifact processor.
    Paired,
    /// Registration refused; NAK sent (best effort) and the stream closed.
    Rejected,
    /// ACK could not be sent; registration undone and the stream closed.
    Failed(PairingError),
}

impl InboundOutcome {
    pub fn is_paired(&self) -> bool {
        matches!(self, Self::Paired)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected)
    }
}

/// Runs both sides of the pairing handshake.
pub struct PairingProtocol<Id: NetPeerId, T: Transport<Id>> {
    config: PairingConfig,

    /// `"{protocol}/pair"`, cached.
    pair_protocol: String,

    transport: Arc<T>,

    /// Pruned when a peer cannot be reached.
    table: Arc<dyn RoutingTable<Id>>,

    streams: Arc<dyn StreamStore<Id>>,

    addresses: Arc<dyn AddressBook<Id>>,

    processor: Arc<dyn ArtifactProcessor<Id, T::Stream>>,

    executor: TaskExecutor,

    metrics: PairingMetrics,
}

impl<Id: NetPeerId, T: Transport<Id>> fmt::Debug for PairingProtocol<Id, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairingProtocol")
            .field("pair_protocol", &self.pair_protocol)
            .field("control_timeout", &self.config.control_timeout)
            .finish_non_exhaustive()
    }
}

impl<Id: NetPeerId, T: Transport<Id>> PairingProtocol<Id, T> {
    pub fn new(
        config: PairingConfig,
        transport: Arc<T>,
        table: Arc<dyn RoutingTable<Id>>,
        streams: Arc<dyn StreamStore<Id>>,
        addresses: Arc<dyn AddressBook<Id>>,
        processor: Arc<dyn ArtifactProcessor<Id, T::Stream>>,
        executor: TaskExecutor,
    ) -> Arc<Self> {
        let pair_protocol = config.pair_protocol();
        Arc::new(Self {
            config,
            pair_protocol,
            transport,
            table,
            streams,
            addresses,
            processor,
            executor,
            metrics: PairingMetrics::default(),
        })
    }

    pub fn config(&self) -> &PairingConfig {
        &self.config
    }

    /// Protocol the handshake runs on.
    pub fn pair_protocol(&self) -> &str {
        &self.pair_protocol
    }

    fn control_timeout(&self) -> Duration {
        self.config.control_timeout
    }

    /// Install the responder as the transport's handler for the pairing
    /// protocol.
    ///
    /// The handler holds a weak reference; once the protocol is dropped,
    /// inbound streams are dropped unanswered.
    pub fn register(self: &Arc<Self>) {
        let protocol: Weak<Self> = Arc::downgrade(self);
        let handler: InboundHandler<Id, T::Stream> =
            Arc::new(move |peer: Id, stream: T::Stream| -> BoxFuture<'static, ()> {
                let protocol = protocol.clone();
                async move {
                    if let Some(protocol) = protocol.upgrade() {
                        protocol.handle_inbound(peer, stream).await;
                    }
                }
                .boxed()
            });

        self.transport.set_stream_handler(&self.pair_protocol, handler);
        debug!(protocol = %self.pair_protocol, "registered pairing handler");
    }

    /// Ask `peer` to pair.
    ///
    /// Returns `Ok(true)` once the stream is registered and handed to the
    /// artifact processor, and `Ok(false)` if either side refused. Errors are
    /// reserved for connection and communication failures. A peer that cannot
    /// be reached loses its cached addresses and is dropped from the routing
    /// table; a peer that fails mid-handshake stays.
    pub async fn pair(&self, peer: &Id) -> Result<bool, PairingError> {
        debug!(?peer, "requesting to pair");

        let mut stream = match self.transport.open_stream(peer, &self.pair_protocol).await {
            Ok(stream) => stream,
            Err(error) => {
                let addrs = self.addresses.addrs(peer);
                debug!(?peer, ?addrs, %error, "cannot connect to peer");
                self.addresses.clear_addrs(peer);
                self.table.remove(peer);
                self.metrics.record(Direction::Outbound, Outcome::Failed);
                return Err(PairingError::Connection(error));
            }
        };

        let control = match read_control(&mut stream, self.control_timeout()).await {
            Ok(control) => control,
            Err(error) => {
                warn!(?peer, %error, "cannot receive control byte from peer");
                close_stream(stream, self.control_timeout()).await;
                self.metrics.record(Direction::Outbound, Outcome::Failed);
                return Err(error);
            }
        };

        let registration = StreamRegistration::new(Direction::Outbound);
        if control == Some(ControlByte::Ack) && self.streams.add(peer.clone(), registration) {
            debug!(?peer, stream = registration.id.get(), "ready to exchange artifacts");
            self.hand_off(peer.clone(), stream, registration);
            self.metrics.record(Direction::Outbound, Outcome::Paired);
            return Ok(true);
        }

        debug!(?peer, ?control, "cannot pair with peer");
        close_stream(stream, self.control_timeout()).await;
        self.metrics.record(Direction::Outbound, Outcome::Rejected);
        Ok(false)
    }

    /// Answer a pairing request arriving on `stream` from `peer`.
    pub async fn handle_inbound(&self, peer: Id, mut stream: T::Stream) -> InboundOutcome {
        debug!(?peer, "received request to pair");

        let registration = StreamRegistration::new(Direction::Inbound);
        if !self.streams.add(peer.clone(), registration) {
            debug!(?peer, "cannot pair, stream store refused registration");
            if let Err(error) =
                write_control(&mut stream, ControlByte::Nak, self.control_timeout()).await
            {
                warn!(?peer, %error, "cannot send NAK to peer");
            }
            close_stream(stream, self.control_timeout()).await;
            self.metrics.record(Direction::Inbound, Outcome::Rejected);
            return InboundOutcome::Rejected;
        }

        if let Err(error) =
            write_control(&mut stream, ControlByte::Ack, self.control_timeout()).await
        {
            warn!(?peer, %error, "cannot send ACK to peer");
            self.streams.remove(&peer);
            close_stream(stream, self.control_timeout()).await;
            self.metrics.record(Direction::Inbound, Outcome::Failed);
            return InboundOutcome::Failed(error);
        }

        debug!(?peer, stream = registration.id.get(), "ready to exchange artifacts");
        self.hand_off(peer, stream, registration);
        self.metrics.record(Direction::Inbound, Outcome::Paired);
        InboundOutcome::Paired
    }

    /// Move a paired stream onto its own artifact task.
    fn hand_off(&self, peer: Id, stream: T::Stream, registration: StreamRegistration) {
        let processor = self.processor.clone();
        let paired = PairedStream {
            peer,
            stream,
            registration,
        };
        self.executor.spawn("pairing_artifacts", async move {
            processor.process(paired).await;
        });
    }
}
