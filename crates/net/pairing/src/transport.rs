//! Seams between the pairing protocol and the surrounding node.

use std::{io, sync::Arc};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};
use vertex_net_rings::NetPeerId;

use crate::StreamRegistration;

/// Bidirectional byte stream carrying one pairing.
pub trait PairStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> PairStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Callback invoked by the transport for each inbound stream on a protocol.
pub type InboundHandler<Id, S> = Arc<dyn Fn(Id, S) -> BoxFuture<'static, ()> + Send + Sync>;

/// Opens and accepts protocol streams.
#[async_trait]
pub trait Transport<Id: NetPeerId>: Send + Sync + 'static {
    type Stream: PairStream;

    /// Open a stream to `peer` speaking `protocol`.
    async fn open_stream(&self, peer: &Id, protocol: &str) -> io::Result<Self::Stream>;

    /// Route inbound streams for `protocol` to `handler`, replacing any
    /// previous handler.
    fn set_stream_handler(&self, protocol: &str, handler: InboundHandler<Id, Self::Stream>);
}

/// Cached dial addresses of known peers.
pub trait AddressBook<Id: NetPeerId>: Send + Sync + 'static {
    /// Addresses currently cached for the peer.
    fn addrs(&self, peer: &Id) -> Vec<String>;

    /// Forget every cached address of the peer.
    fn clear_addrs(&self, peer: &Id);
}

/// A stream that completed the pairing handshake.
#[derive(Debug)]
pub struct PairedStream<Id, S> {
    pub peer: Id,
    pub stream: S,
    pub registration: StreamRegistration,
}

/// Consumes paired streams to exchange artifacts.
///
/// Each paired stream is handed over on its own task; `process` may run for
/// as long as the stream lives.
#[async_trait]
pub trait ArtifactProcessor<Id: NetPeerId, S: PairStream>: Send + Sync + 'static {
    async fn process(&self, paired: PairedStream<Id, S>);
}

#[async_trait]
impl<Id, S, A> ArtifactProcessor<Id, S> for Arc<A>
where
    Id: NetPeerId,
    S: PairStream,
    A: ArtifactProcessor<Id, S> + ?Sized,
{
    async fn process(&self, paired: PairedStream<Id, S>) {
        (**self).process(paired).await
    }
}
