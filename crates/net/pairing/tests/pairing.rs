//! Pairing handshake between in-memory nodes.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{FutureExt, future::BoxFuture};
use parking_lot::Mutex;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, DuplexStream},
    sync::mpsc,
};
use vertex_net_pairing::{
    AddressBook, ArtifactProcessor, Direction, InboundOutcome, MemoryStreamStore, PairedStream,
    PairingConfig, PairingError, PairingProtocol, StreamRegistration, StreamStore, Transport,
    memory::{MemoryAddressBook, MemoryNetwork, MemoryTransport},
};
use vertex_net_rings::{ProbeError, RoutingTable};
use vertex_tasks::TaskExecutor;

type PeerId = &'static str;

/// Routing table that only records removals.
#[derive(Debug, Default)]
struct MockTable {
    removed: Mutex<Vec<PeerId>>,
}

impl MockTable {
    fn removed(&self) -> Vec<PeerId> {
        self.removed.lock().clone()
    }
}

#[async_trait]
impl RoutingTable<PeerId> for MockTable {
    async fn add(&self, _peer: PeerId) -> Result<bool, ProbeError> {
        Ok(true)
    }

    fn remove(&self, peer: &PeerId) {
        self.removed.lock().push(peer);
    }

    fn recommend(&self, _count: usize, _exclude: &[PeerId]) -> Vec<PeerId> {
        Vec::new()
    }

    fn size(&self) -> usize {
        0
    }

    fn shutdown(&self) {}
}

/// Forwards paired streams to the test.
#[derive(Debug)]
struct ChannelProcessor {
    tx: mpsc::UnboundedSender<PairedStream<PeerId, DuplexStream>>,
}

#[async_trait]
impl ArtifactProcessor<PeerId, DuplexStream> for ChannelProcessor {
    async fn process(&self, paired: PairedStream<PeerId, DuplexStream>) {
        let _ = self.tx.send(paired);
    }
}

struct Node {
    protocol: Arc<PairingProtocol<PeerId, MemoryTransport<PeerId>>>,
    transport: Arc<MemoryTransport<PeerId>>,
    store: Arc<MemoryStreamStore<PeerId>>,
    table: Arc<MockTable>,
    addresses: Arc<MemoryAddressBook<PeerId>>,
    paired: mpsc::UnboundedReceiver<PairedStream<PeerId, DuplexStream>>,
}

impl Node {
    fn new(network: &Arc<MemoryNetwork<PeerId>>, id: PeerId, config: PairingConfig) -> Self {
        let executor = TaskExecutor::current();
        let transport = Arc::new(network.transport(id, executor.clone()));
        let store = Arc::new(MemoryStreamStore::new());
        let table = Arc::new(MockTable::default());
        let addresses = Arc::new(MemoryAddressBook::new());
        let (tx, paired) = mpsc::unbounded_channel();

        let protocol = PairingProtocol::new(
            config,
            transport.clone(),
            table.clone(),
            store.clone(),
            addresses.clone(),
            Arc::new(ChannelProcessor { tx }),
            executor,
        );
        protocol.register();

        Self {
            protocol,
            transport,
            store,
            table,
            addresses,
            paired,
        }
    }

    async fn next_paired(&mut self) -> PairedStream<PeerId, DuplexStream> {
        tokio::time::timeout(Duration::from_secs(5), self.paired.recv())
            .await
            .expect("stream handed to artifact processor")
            .expect("processor channel open")
    }
}

fn config() -> PairingConfig {
    PairingConfig::default()
        .with_protocol("/test/gossip/1.0.0")
        .with_control_timeout(Duration::from_secs(2))
}

/// Let spawned handler and artifact tasks run.
async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_pair_success_registers_both_sides() {
    let network = MemoryNetwork::new();
    let mut alice = Node::new(&network, "alice", config());
    let mut bob = Node::new(&network, "bob", config());

    assert!(alice.protocol.pair(&"bob").await.expect("pairing succeeds"));

    assert_eq!(alice.store.direction_of(&"bob"), Some(Direction::Outbound));
    assert_eq!(bob.store.direction_of(&"alice"), Some(Direction::Inbound));

    let mut outbound = alice.next_paired().await;
    let mut inbound = bob.next_paired().await;
    assert_eq!(outbound.peer, "bob");
    assert_eq!(outbound.registration.direction, Direction::Outbound);
    assert_eq!(inbound.peer, "alice");
    assert_eq!(inbound.registration.direction, Direction::Inbound);

    // The handed-off streams are the two ends of one connection
    outbound.stream.write_all(b"artifact").await.expect("write succeeds");
    let mut buf = [0u8; 8];
    inbound.stream.read_exact(&mut buf).await.expect("read succeeds");
    assert_eq!(&buf, b"artifact");

    assert!(alice.table.removed().is_empty());
}

#[tokio::test]
async fn test_responder_store_conflict_sends_nak() {
    let network = MemoryNetwork::new();
    let mut alice = Node::new(&network, "alice", config());
    let mut bob = Node::new(&network, "bob", config());

    // Bob already holds a stream for alice
    let existing = StreamRegistration::new(Direction::Outbound);
    assert!(bob.store.add("alice", existing));

    let paired = alice.protocol.pair(&"bob").await.expect("rejection is not an error");
    assert!(!paired);
    settle().await;

    assert!(!alice.store.contains(&"bob"));
    assert_eq!(bob.store.get(&"alice"), Some(existing));
    assert!(alice.paired.try_recv().is_err());
    assert!(bob.paired.try_recv().is_err());
    assert!(alice.table.removed().is_empty());
}

#[tokio::test]
async fn test_responder_capacity_sends_nak() {
    let network = MemoryNetwork::new();
    let alice = Node::new(&network, "alice", config());
    let carol = Node::new(&network, "carol", config());

    let executor = TaskExecutor::current();
    let transport = Arc::new(network.transport("bob", executor.clone()));
    let store = Arc::new(MemoryStreamStore::new().with_max_inbound(1));
    let (tx, _paired) = mpsc::unbounded_channel();
    let bob = PairingProtocol::new(
        config(),
        transport,
        Arc::new(MockTable::default()),
        store.clone(),
        Arc::new(MemoryAddressBook::new()),
        Arc::new(ChannelProcessor { tx }),
        executor,
    );
    bob.register();

    assert!(alice.protocol.pair(&"bob").await.expect("first pairing succeeds"));
    assert!(!carol.protocol.pair(&"bob").await.expect("rejection is not an error"));
    assert_eq!(store.inbound_count(), 1);
    assert!(store.contains(&"alice"));
}

#[tokio::test(start_paused = true)]
async fn test_control_byte_timeout_keeps_peer() {
    let network = MemoryNetwork::new();
    let alice = Node::new(&network, "alice", config());
    let bob = network.transport("bob", TaskExecutor::current());

    // Bob accepts the stream but never answers; report when alice hangs up
    let (eof_tx, mut eof_rx) = mpsc::unbounded_channel();
    bob.set_stream_handler(
        alice.protocol.pair_protocol(),
        Arc::new(move |_peer: PeerId, mut stream: DuplexStream| -> BoxFuture<'static, ()> {
            let eof_tx = eof_tx.clone();
            async move {
                let mut rest = Vec::new();
                let read = stream.read_to_end(&mut rest).await;
                let _ = eof_tx.send(read.map(|_| rest.len()).ok());
            }
            .boxed()
        }),
    );

    let error = alice.protocol.pair(&"bob").await.expect_err("no control byte");
    assert!(matches!(error, PairingError::Timeout(timeout) if timeout == Duration::from_secs(2)));
    assert!(error.is_communication_failure());

    // Stream closed, peer kept
    assert_eq!(eof_rx.recv().await, Some(Some(0)));
    assert!(alice.table.removed().is_empty());
    assert!(!alice.store.contains(&"bob"));
}

#[tokio::test]
async fn test_connection_failure_prunes_peer() {
    let network = MemoryNetwork::new();
    let alice = Node::new(&network, "alice", config());
    alice.addresses.add_addr("carol", "/memory/carol");

    let error = alice.protocol.pair(&"carol").await.expect_err("carol unreachable");
    assert!(error.is_connection_failure());

    assert_eq!(alice.table.removed(), vec!["carol"]);
    assert!(alice.addresses.addrs(&"carol").is_empty());
    assert!(alice.store.is_empty());
}

#[tokio::test]
async fn test_unknown_control_byte_is_rejection() {
    let network = MemoryNetwork::new();
    let alice = Node::new(&network, "alice", config());
    let bob = network.transport("bob", TaskExecutor::current());
    bob.set_stream_handler(
        alice.protocol.pair_protocol(),
        Arc::new(|_peer: PeerId, mut stream: DuplexStream| -> BoxFuture<'static, ()> {
            async move {
                let _ = stream.write_u8(0x42).await;
            }
            .boxed()
        }),
    );

    assert!(!alice.protocol.pair(&"bob").await.expect("rejection is not an error"));
    assert!(!alice.store.contains(&"bob"));
}

#[tokio::test]
async fn test_initiator_store_conflict_closes_stream() {
    let network = MemoryNetwork::new();
    let mut alice = Node::new(&network, "alice", config());
    let mut bob = Node::new(&network, "bob", config());

    assert!(alice.store.add("bob", StreamRegistration::new(Direction::Inbound)));

    let paired = alice.protocol.pair(&"bob").await.expect("rejection is not an error");
    assert!(!paired);
    assert!(alice.paired.try_recv().is_err());

    // Bob had already acknowledged, so his artifact task sees the stream end
    let mut inbound = bob.next_paired().await;
    let mut rest = Vec::new();
    inbound
        .stream
        .read_to_end(&mut rest)
        .await
        .expect("clean close");
    assert!(rest.is_empty());
}

#[tokio::test]
async fn test_ack_failure_undoes_registration() {
    let network = MemoryNetwork::new();
    let mut bob = Node::new(&network, "bob", config());

    let (initiator, responder) = tokio::io::duplex(64);
    drop(initiator);

    let outcome = bob.protocol.handle_inbound("alice", responder).await;
    assert!(matches!(outcome, InboundOutcome::Failed(PairingError::Io(_))));
    assert!(!bob.store.contains(&"alice"));

    settle().await;
    assert!(bob.paired.try_recv().is_err());
}

#[tokio::test]
async fn test_nak_failure_still_rejects() {
    let network = MemoryNetwork::new();
    let mut bob = Node::new(&network, "bob", config());
    let existing = StreamRegistration::new(Direction::Outbound);
    assert!(bob.store.add("alice", existing));

    let (initiator, responder) = tokio::io::duplex(64);
    drop(initiator);

    let outcome = bob.protocol.handle_inbound("alice", responder).await;
    assert!(outcome.is_rejected());
    // The earlier registration is untouched
    assert_eq!(bob.store.direction_of(&"alice"), Some(Direction::Outbound));

    settle().await;
    assert!(bob.paired.try_recv().is_err());
}

#[tokio::test]
async fn test_handle_inbound_outcomes() {
    let network = MemoryNetwork::new();
    let mut bob = Node::new(&network, "bob", config());

    let (mut initiator, responder) = tokio::io::duplex(64);
    let outcome = bob.protocol.handle_inbound("alice", responder).await;
    assert!(outcome.is_paired());
    assert_eq!(initiator.read_u8().await.expect("control byte"), 0x06);
    assert_eq!(bob.next_paired().await.peer, "alice");

    let (mut initiator, responder) = tokio::io::duplex(64);
    let outcome = bob.protocol.handle_inbound("alice", responder).await;
    assert!(outcome.is_rejected());

    let mut wire = Vec::new();
    initiator.read_to_end(&mut wire).await.expect("stream closed");
    assert_eq!(wire, vec![0x15]);
}

#[tokio::test]
async fn test_dropped_protocol_leaves_streams_unanswered() {
    let network = MemoryNetwork::new();
    let alice = Node::new(&network, "alice", config());
    let Node {
        protocol, transport, ..
    } = Node::new(&network, "bob", config());
    drop(protocol);

    // The handler is still routed but its protocol is gone
    let error = alice.protocol.pair(&"bob").await.expect_err("stream dropped");
    assert!(matches!(error, PairingError::Io(_)));
    assert_eq!(transport.local(), &"bob");
}
