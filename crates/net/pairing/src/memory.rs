//! In-process transport for tests and simulation.
//!
//! Every node of a [`MemoryNetwork`] gets a [`MemoryTransport`]. Opening a
//! stream creates a [`DuplexStream`] pair and runs the remote node's handler
//! for the protocol on its own task.

use std::{collections::HashMap, fmt, io, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::io::DuplexStream;
use tracing::trace;
use vertex_net_rings::NetPeerId;
use vertex_tasks::TaskExecutor;

use crate::transport::{AddressBook, InboundHandler, Transport};

/// Buffer size of each in-memory stream direction.
pub const MEMORY_STREAM_BUFFER: usize = 64 * 1024;

type Handlers<Id> = HashMap<String, InboundHandler<Id, DuplexStream>>;

/// Registry of reachable in-memory nodes and their protocol handlers.
pub struct MemoryNetwork<Id> {
    nodes: RwLock<HashMap<Id, Handlers<Id>>>,
}

impl<Id: NetPeerId> fmt::Debug for MemoryNetwork<Id> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryNetwork")
            .field("nodes", &self.nodes.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<Id: NetPeerId> MemoryNetwork<Id> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            nodes: RwLock::new(HashMap::new()),
        })
    }

    /// Join the network as `local`, making the node reachable.
    pub fn transport(self: &Arc<Self>, local: Id, executor: TaskExecutor) -> MemoryTransport<Id> {
        self.nodes.write().entry(local.clone()).or_default();
        MemoryTransport {
            local,
            network: self.clone(),
            executor,
        }
    }

    /// Make a node unreachable and drop its handlers.
    pub fn disconnect(&self, node: &Id) {
        self.nodes.write().remove(node);
    }

    pub fn is_reachable(&self, node: &Id) -> bool {
        self.nodes.read().contains_key(node)
    }

    fn handler(&self, node: &Id, protocol: &str) -> io::Result<InboundHandler<Id, DuplexStream>> {
        let nodes = self.nodes.read();
        let handlers = nodes.get(node).ok_or_else(|| {
            io::Error::new(io::ErrorKind::ConnectionRefused, format!("{node:?} is not reachable"))
        })?;
        handlers.get(protocol).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::Unsupported,
                format!("{node:?} does not speak {protocol}"),
            )
        })
    }

    fn set_handler(&self, node: &Id, protocol: &str, handler: InboundHandler<Id, DuplexStream>) {
        self.nodes
            .write()
            .entry(node.clone())
            .or_default()
            .insert(protocol.to_string(), handler);
    }
}

/// One node's view of a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryTransport<Id> {
    local: Id,
    network: Arc<MemoryNetwork<Id>>,
    executor: TaskExecutor,
}

impl<Id: NetPeerId> fmt::Debug for MemoryTransport<Id> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("local", &self.local)
            .finish_non_exhaustive()
    }
}

impl<Id: NetPeerId> MemoryTransport<Id> {
    pub fn local(&self) -> &Id {
        &self.local
    }

    pub fn network(&self) -> &Arc<MemoryNetwork<Id>> {
        &self.network
    }
}

#[async_trait]
impl<Id: NetPeerId> Transport<Id> for MemoryTransport<Id> {
    type Stream = DuplexStream;

    async fn open_stream(&self, peer: &Id, protocol: &str) -> io::Result<DuplexStream> {
        let handler = self.network.handler(peer, protocol)?;

        let (local, remote) = tokio::io::duplex(MEMORY_STREAM_BUFFER);
        trace!(from = ?self.local, to = ?peer, %protocol, "opened in-memory stream");
        self.executor
            .spawn("memory_inbound", handler(self.local.clone(), remote));
        Ok(local)
    }

    fn set_stream_handler(&self, protocol: &str, handler: InboundHandler<Id, DuplexStream>) {
        self.network.set_handler(&self.local, protocol, handler);
    }
}

/// Address book backed by a map.
#[derive(Debug)]
pub struct MemoryAddressBook<Id> {
    addrs: RwLock<HashMap<Id, Vec<String>>>,
}

impl<Id: NetPeerId> Default for MemoryAddressBook<Id> {
    fn default() -> Self {
        Self {
            addrs: RwLock::new(HashMap::new()),
        }
    }
}

impl<Id: NetPeerId> MemoryAddressBook<Id> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_addr(&self, peer: Id, addr: impl Into<String>) {
        self.addrs.write().entry(peer).or_default().push(addr.into());
    }
}

impl<Id: NetPeerId> AddressBook<Id> for MemoryAddressBook<Id> {
    fn addrs(&self, peer: &Id) -> Vec<String> {
        self.addrs.read().get(peer).cloned().unwrap_or_default()
    }

    fn clear_addrs(&self, peer: &Id) {
        self.addrs.write().remove(peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{FutureExt, future::BoxFuture};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        sync::mpsc,
    };

    const PROTOCOL: &str = "/test/echo";

    #[tokio::test]
    async fn test_stream_reaches_remote_handler() {
        let network = MemoryNetwork::new();
        let executor = TaskExecutor::current();
        let alice = network.transport("alice", executor.clone());
        let bob = network.transport("bob", executor);

        let (tx, mut rx) = mpsc::unbounded_channel();
        bob.set_stream_handler(
            PROTOCOL,
            Arc::new(move |peer: &'static str, mut stream: DuplexStream| -> BoxFuture<'static, ()> {
                let tx = tx.clone();
                async move {
                    let byte = stream.read_u8().await.expect("byte arrives");
                    let _ = tx.send((peer, byte));
                }
                .boxed()
            }),
        );

        let mut stream = alice.open_stream(&"bob", PROTOCOL).await.expect("bob reachable");
        stream.write_u8(7).await.expect("write succeeds");

        assert_eq!(rx.recv().await, Some(("alice", 7)));
    }

    #[tokio::test]
    async fn test_unreachable_and_unsupported() {
        let network = MemoryNetwork::new();
        let executor = TaskExecutor::current();
        let alice = network.transport("alice", executor.clone());
        let _bob = network.transport("bob", executor);

        let error = alice.open_stream(&"carol", PROTOCOL).await.expect_err("carol unknown");
        assert_eq!(error.kind(), io::ErrorKind::ConnectionRefused);

        let error = alice.open_stream(&"bob", PROTOCOL).await.expect_err("no handler");
        assert_eq!(error.kind(), io::ErrorKind::Unsupported);

        network.disconnect(&"bob");
        assert!(!network.is_reachable(&"bob"));
        let error = alice.open_stream(&"bob", PROTOCOL).await.expect_err("bob gone");
        assert_eq!(error.kind(), io::ErrorKind::ConnectionRefused);
    }

    #[test]
    fn test_address_book() {
        let book = MemoryAddressBook::new();
        book.add_addr("a", "/memory/1");
        book.add_addr("a", "/memory/2");

        assert_eq!(book.addrs(&"a"), vec!["/memory/1", "/memory/2"]);
        book.clear_addrs(&"a");
        assert!(book.addrs(&"a").is_empty());
    }
}
