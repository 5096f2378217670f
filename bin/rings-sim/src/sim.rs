//! In-process overlay simulation.
//!
//! Node 0 admits every other node into its latency-ring routing table using a
//! synthetic probe, then pairs with a recommended fanout each round over the
//! in-memory transport. Paired streams exchange one artifact (the sender's
//! id) and close.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use futures::future::join_all;
use rand::{Rng, seq::IteratorRandom};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tracing::{debug, info, warn};
use vertex_net_pairing::{
    ArtifactProcessor, MemoryStreamStore, PairedStream, PairingConfig, PairingProtocol,
    memory::{MemoryAddressBook, MemoryNetwork, MemoryTransport},
};
use vertex_net_rings::{LatencyProbe, ProbeError, RingsConfig, RingsRoutingTable, RoutingTable};
use vertex_tasks::{Shutdown, ShutdownSignal, TaskExecutor};

use crate::cli::{Cli, SimArgs};

/// Synthetic probes slower than this fail.
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

type PeerId = u32;

type SimTable = RingsRoutingTable<PeerId, Arc<SyntheticProbe>>;

/// Latency probe answering from a fixed table of base latencies with jitter.
#[derive(Debug)]
struct SyntheticProbe {
    latencies: HashMap<PeerId, Duration>,
    network: Arc<MemoryNetwork<PeerId>>,
}

#[async_trait]
impl LatencyProbe<PeerId> for SyntheticProbe {
    async fn probe(&self, peer: &PeerId) -> Result<Duration, ProbeError> {
        if !self.network.is_reachable(peer) {
            return Err(ProbeError::Unreachable(format!("node {peer} left the network")));
        }
        let base = self
            .latencies
            .get(peer)
            .copied()
            .ok_or_else(|| ProbeError::Unreachable(format!("node {peer} is unknown")))?;

        let jitter = rand::rng().random_range(0.9..1.1);
        let latency = base.mul_f64(jitter);
        if latency > PROBE_TIMEOUT {
            tokio::time::sleep(PROBE_TIMEOUT).await;
            return Err(ProbeError::Timeout(PROBE_TIMEOUT));
        }

        tokio::time::sleep(latency).await;
        Ok(latency)
    }
}

/// Swaps node ids over each paired stream.
#[derive(Debug)]
struct ExchangeProcessor {
    local: PeerId,
    shutdown: ShutdownSignal,
    exchanged: AtomicUsize,
}

#[async_trait]
impl ArtifactProcessor<PeerId, DuplexStream> for ExchangeProcessor {
    async fn process(&self, paired: PairedStream<PeerId, DuplexStream>) {
        let PairedStream {
            peer,
            mut stream,
            registration,
        } = paired;
        let mut shutdown = self.shutdown.clone();

        let exchange = async {
            stream.write_u32(self.local).await?;
            stream.flush().await?;
            stream.read_u32().await
        };

        tokio::select! {
            _ = shutdown.wait() => {
                debug!(local = self.local, peer, "artifact exchange interrupted by shutdown");
            }
            result = exchange => match result {
                Ok(remote) => {
                    self.exchanged.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        local = self.local,
                        peer,
                        remote,
                        direction = %registration.direction,
                        "exchanged artifact"
                    );
                }
                Err(error) => debug!(local = self.local, peer, %error, "artifact exchange failed"),
            }
        }
    }
}

/// One simulated node.
struct SimNode {
    table: Arc<SimTable>,
    streams: Arc<MemoryStreamStore<PeerId>>,
    addresses: Arc<MemoryAddressBook<PeerId>>,
    pairing: Arc<PairingProtocol<PeerId, MemoryTransport<PeerId>>>,
    processor: Arc<ExchangeProcessor>,
}

impl SimNode {
    fn new(
        id: PeerId,
        network: &Arc<MemoryNetwork<PeerId>>,
        probe: &Arc<SyntheticProbe>,
        rings: &RingsConfig,
        pairing: &PairingConfig,
        shutdown: &Shutdown,
        executor: &TaskExecutor,
    ) -> Result<Self> {
        let table = RingsRoutingTable::new(rings.clone(), probe.clone())
            .wrap_err("invalid latency ring configuration")?;
        let streams = Arc::new(MemoryStreamStore::new());
        let addresses = Arc::new(MemoryAddressBook::new());
        let processor = Arc::new(ExchangeProcessor {
            local: id,
            shutdown: shutdown.signal(),
            exchanged: AtomicUsize::new(0),
        });

        let pairing = PairingProtocol::new(
            pairing.clone(),
            Arc::new(network.transport(id, executor.clone())),
            table.clone(),
            streams.clone(),
            addresses.clone(),
            processor.clone(),
            executor.clone(),
        );
        pairing.register();

        Ok(Self {
            table,
            streams,
            addresses,
            pairing,
            processor,
        })
    }
}

/// Tally of one pairing round.
#[derive(Debug, Default)]
struct RoundOutcome {
    paired: usize,
    rejected: usize,
    failed: usize,
}

/// Run the simulation described by `cli`.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let rings = RingsConfig::from(&cli.rings);
    rings.validate().wrap_err("invalid latency ring configuration")?;
    let pairing = PairingConfig::from(&cli.pairing);
    let SimArgs {
        peers,
        fanout,
        rounds,
        offline,
        max_latency_ms,
    } = cli.sim;

    let executor = TaskExecutor::current();
    let network = MemoryNetwork::new();
    let shutdown = Shutdown::new();

    let latencies: HashMap<PeerId, Duration> = {
        let mut rng = rand::rng();
        (1..=peers)
            .map(|peer| (peer, Duration::from_millis(rng.random_range(1..=max_latency_ms.max(1)))))
            .collect()
    };
    let probe = Arc::new(SyntheticProbe {
        latencies,
        network: network.clone(),
    });

    let mut nodes = Vec::with_capacity(peers as usize + 1);
    for id in 0..=peers {
        nodes.push(SimNode::new(id, &network, &probe, &rings, &pairing, &shutdown, &executor)?);
    }
    let Some(local) = nodes.first() else {
        return Ok(());
    };
    info!(
        peers,
        fanout,
        rounds,
        protocol = %pairing.pair_protocol(),
        "simulated overlay ready"
    );

    // Admit every remote node
    for peer in 1..=peers {
        local.addresses.add_addr(peer, format!("/memory/{peer}"));
    }
    let admissions = join_all((1..=peers).map(|peer| local.table.add(peer))).await;
    let admitted = admissions.iter().filter(|result| result.is_ok()).count();
    info!(admitted, rejected = admissions.len() - admitted, "admitted peers");

    let refresh = local.table.spawn_refresh_loop(&executor);
    local.table.refresh_now().await;
    local.table.log_status();

    // Some admitted nodes disappear; pairing with them prunes the table
    let departed: Vec<PeerId> = (1..=peers).choose_multiple(&mut rand::rng(), offline as usize);
    for peer in &departed {
        network.disconnect(peer);
    }
    if !departed.is_empty() {
        info!(?departed, "nodes left the network");
    }

    for round in 1..=rounds {
        let exclude = local.streams.peers();
        let selected = local.table.recommend(fanout, &exclude);
        if selected.is_empty() {
            info!(round, "no eligible peers left to pair with");
            break;
        }

        let results = join_all(selected.iter().map(|peer| local.pairing.pair(peer))).await;
        let mut outcome = RoundOutcome::default();
        for (peer, result) in selected.iter().zip(results) {
            match result {
                Ok(true) => outcome.paired += 1,
                Ok(false) => outcome.rejected += 1,
                Err(error) => {
                    warn!(peer, %error, "pairing failed");
                    outcome.failed += 1;
                }
            }
        }

        info!(
            round,
            selected = selected.len(),
            paired = outcome.paired,
            rejected = outcome.rejected,
            failed = outcome.failed,
            table_size = local.table.size(),
            "pairing round complete"
        );

        local.table.refresh_now().await;
        local.table.log_status();
    }

    // Let in-flight artifact exchanges finish before stopping
    tokio::time::sleep(Duration::from_millis(50)).await;
    let exchanged: usize = nodes
        .iter()
        .map(|node| node.processor.exchanged.load(Ordering::Relaxed))
        .sum();

    info!(
        table_size = local.table.size(),
        outbound = local.streams.outbound_count(),
        exchanged,
        "simulation finished"
    );

    for node in &nodes {
        node.table.shutdown();
    }
    shutdown.fire();
    if let Some(refresh) = refresh {
        refresh.await.wrap_err("refresh loop panicked")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_probe_reports_departed_nodes() {
        let network = MemoryNetwork::new();
        let _node = network.transport(1, TaskExecutor::current());
        let probe = SyntheticProbe {
            latencies: HashMap::from([(1, Duration::from_millis(20))]),
            network: network.clone(),
        };

        let latency = probe.probe(&1).await.expect("reachable");
        assert!(latency >= Duration::from_millis(18) && latency <= Duration::from_millis(22));

        network.disconnect(&1);
        assert!(matches!(probe.probe(&1).await, Err(ProbeError::Unreachable(_))));
        assert!(matches!(probe.probe(&2).await, Err(ProbeError::Unreachable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probe_times_out() {
        let network = MemoryNetwork::new();
        let _node = network.transport(1, TaskExecutor::current());
        let probe = SyntheticProbe {
            latencies: HashMap::from([(1, Duration::from_secs(5))]),
            network,
        };

        assert!(matches!(probe.probe(&1).await, Err(ProbeError::Timeout(_))));
    }
}
