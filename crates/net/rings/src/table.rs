//! Latency-ring routing table.

use std::{
    collections::HashSet,
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, trace, warn};
use vertex_tasks::{Shutdown, TaskExecutor};

use crate::{
    NetPeerId,
    config::{RingsConfig, RingsConfigError, ring_index, ring_quotas},
    estimator::{EwmaLatencyEstimator, LatencyEstimator},
    metrics::RingsMetrics,
    probe::{LatencyProbe, ProbeError},
    ring::Ring,
};

/// Peer selection surface used by fanout selection and connection management.
#[async_trait]
pub trait RoutingTable<Id: NetPeerId>: Send + Sync + 'static {
    /// Probe and admit a peer.
    ///
    /// Returns `Ok(true)` if the peer was inserted, `Ok(false)` if it was
    /// already known, and the probe error if the peer could not be measured.
    async fn add(&self, peer: Id) -> Result<bool, ProbeError>;

    /// Forget a peer. Removing an unknown peer is a no-op.
    fn remove(&self, peer: &Id);

    /// Pick up to `count` distinct peers, none of them in `exclude`.
    fn recommend(&self, count: usize, exclude: &[Id]) -> Vec<Id>;

    /// Number of known peers.
    fn size(&self) -> usize;

    /// Stop background maintenance. Safe to call more than once.
    fn shutdown(&self);
}

/// Membership and ring cache, guarded together by one lock.
struct TableState<Id> {
    /// Authoritative set of known peers.
    peers: HashSet<Id>,
    /// Peers bucketed by latency band, rebuilt from `peers` on refresh.
    rings: Vec<Ring<Id>>,
}

/// Routing table that buckets peers into latency rings.
///
/// Peers are admitted after a successful latency probe and bucketed by their
/// smoothed latency each refresh cycle. Recommendations spread across rings so
/// fanout mixes near and far peers.
///
/// The table lock is never held across a probe.
pub struct RingsRoutingTable<Id, P, E = EwmaLatencyEstimator<Id>> {
    config: RingsConfig,

    /// Lower latency bound of each ring.
    boundaries: Vec<Duration>,

    probe: P,

    estimator: E,

    state: RwLock<TableState<Id>>,

    /// Stops the refresh loop.
    shutdown: Shutdown,

    /// Set once the refresh loop has been spawned.
    refreshing: AtomicBool,

    metrics: RingsMetrics,
}

impl<Id: NetPeerId, P, E> fmt::Debug for RingsRoutingTable<Id, P, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("RingsRoutingTable")
            .field("boundaries", &self.boundaries)
            .field("peers", &state.peers.len())
            .field(
                "ring_sizes",
                &state.rings.iter().map(Ring::len).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl<Id: NetPeerId, P: LatencyProbe<Id>> RingsRoutingTable<Id, P> {
    /// Create a table using the default EWMA estimator.
    pub fn new(config: RingsConfig, probe: P) -> Result<Arc<Self>, RingsConfigError> {
        Self::with_estimator(config, probe, EwmaLatencyEstimator::new())
    }
}

impl<Id, P, E> RingsRoutingTable<Id, P, E>
where
    Id: NetPeerId,
    P: LatencyProbe<Id>,
    E: LatencyEstimator<Id>,
{
    /// Create a table with a custom latency estimator.
    pub fn with_estimator(
        config: RingsConfig,
        probe: P,
        estimator: E,
    ) -> Result<Arc<Self>, RingsConfigError> {
        config.validate()?;
        let boundaries = config.latency_boundaries();
        let rings = boundaries.iter().map(|_| Ring::new()).collect();

        Ok(Arc::new(Self {
            config,
            boundaries,
            probe,
            estimator,
            state: RwLock::new(TableState {
                peers: HashSet::new(),
                rings,
            }),
            shutdown: Shutdown::new(),
            refreshing: AtomicBool::new(false),
            metrics: RingsMetrics::default(),
        }))
    }

    pub fn config(&self) -> &RingsConfig {
        &self.config
    }

    /// Lower latency bound of each ring.
    pub fn boundaries(&self) -> &[Duration] {
        &self.boundaries
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    /// Whether the peer is known.
    pub fn contains(&self, peer: &Id) -> bool {
        self.state.read().peers.contains(peer)
    }

    /// Ring currently holding the peer, if it has been bucketed.
    pub fn ring_of(&self, peer: &Id) -> Option<usize> {
        self.state
            .read()
            .rings
            .iter()
            .position(|ring| ring.contains(peer))
    }

    /// Whether [`shutdown`](RoutingTable::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_fired()
    }

    /// Spawn the periodic refresh loop.
    ///
    /// Every `sample_period` the loop re-probes a random sample of peers and
    /// rebuilds the rings. It stops when the table is shut down or dropped;
    /// the shutdown signal is raced against the whole loop, so a pending wait
    /// or probe does not delay it.
    ///
    /// A table runs at most one loop. Returns `None` if the loop was already
    /// spawned.
    pub fn spawn_refresh_loop(
        self: &Arc<Self>,
        executor: &TaskExecutor,
    ) -> Option<JoinHandle<()>> {
        if self.refreshing.swap(true, Ordering::AcqRel) {
            debug!("refresh loop already running");
            return None;
        }

        let table: Weak<Self> = Arc::downgrade(self);
        let period = self.config.sample_period;

        let signal = self.shutdown.signal();
        let handle = executor.spawn_until_shutdown("rings_refresh", signal, async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                trace!("refresh loop woken by timer");

                let Some(table) = table.upgrade() else {
                    debug!("routing table dropped, stopping refresh loop");
                    break;
                };
                table.refresh_now().await;
                table.log_status();
            }
        });
        Some(handle)
    }

    /// Run one refresh cycle: re-probe a sample of peers, then rebuild rings.
    pub async fn refresh_now(&self) {
        self.refresh_latency().await;
        self.populate_rings();
        self.metrics.refresh_cycles_total.increment(1);
    }

    /// Re-probe a random sample of known peers.
    ///
    /// Failed probes are logged and skipped; a peer that was admitted stays
    /// known until it is removed explicitly.
    async fn refresh_latency(&self) {
        let sample = {
            let state = self.state.read();
            let mut peers: Vec<Id> = state.peers.iter().cloned().collect();
            peers.shuffle(&mut rand::rng());
            peers.truncate(self.config.sample_size);
            peers
        };
        trace!(sampled = sample.len(), "refreshing peer latencies");

        for peer in sample {
            match self.probe.probe(&peer).await {
                Ok(latency) => self.record_latency(&peer, latency),
                Err(error) => {
                    warn!(?peer, %error, "error probing latency of peer");
                    self.metrics.refresh_probe_failures_total.increment(1);
                }
            }
        }
    }

    fn record_latency(&self, peer: &Id, latency: Duration) {
        let state = self.state.write();
        // The peer may have been removed while its probe was in flight
        if state.peers.contains(peer) {
            self.estimator.record(peer, latency);
            trace!(?peer, ?latency, "recorded peer latency");
        }
    }

    /// Rebuild every ring from the current estimates and swap them in.
    fn populate_rings(&self) {
        let sizes: Vec<usize> = {
            let mut state = self.state.write();

            let mut rings: Vec<Ring<Id>> = self.boundaries.iter().map(|_| Ring::new()).collect();
            for peer in &state.peers {
                let index = ring_index(&self.boundaries, self.estimator.estimate(peer));
                if let Some(ring) = rings.get_mut(index) {
                    ring.add(peer.clone());
                }
            }

            state.rings = rings;
            state.rings.iter().map(Ring::len).collect()
        };

        self.metrics.set_ring_sizes(&sizes);
    }

    /// Number of peers in each ring, lowest latency first.
    pub fn ring_sizes(&self) -> Vec<usize> {
        self.state.read().rings.iter().map(Ring::len).collect()
    }

    /// Snapshot of table statistics.
    pub fn stats(&self) -> RingsStats {
        let state = self.state.read();
        RingsStats {
            peers: state.peers.len(),
            ring_sizes: state.rings.iter().map(Ring::len).collect(),
        }
    }

    /// Log ring populations as `ring:count` pairs.
    pub fn log_status(&self) {
        let stats = self.stats();

        let mut rings = String::new();
        for (index, (size, bound)) in stats.ring_sizes.iter().zip(&self.boundaries).enumerate() {
            if !rings.is_empty() {
                rings.push(' ');
            }
            rings.push_str(&format!("{index}(>={bound:?}):{size}"));
        }

        let bucketed: usize = stats.ring_sizes.iter().sum();
        info!(
            peers = stats.peers,
            bucketed,
            rings = %rings,
            "latency rings"
        );
    }
}

#[async_trait]
impl<Id, P, E> RoutingTable<Id> for RingsRoutingTable<Id, P, E>
where
    Id: NetPeerId,
    P: LatencyProbe<Id>,
    E: LatencyEstimator<Id>,
{
    async fn add(&self, peer: Id) -> Result<bool, ProbeError> {
        if self.contains(&peer) {
            trace!(?peer, "peer already known");
            return Ok(false);
        }

        // Probe without holding the lock
        let latency = match self.probe.probe(&peer).await {
            Ok(latency) => latency,
            Err(error) => {
                warn!(?peer, %error, "error probing peer, not admitted");
                self.metrics.add_probe_failures_total.increment(1);
                return Err(error);
            }
        };

        let (inserted, size) = {
            let mut state = self.state.write();
            self.estimator.record(&peer, latency);
            let inserted = state.peers.insert(peer.clone());
            (inserted, state.peers.len())
        };

        if inserted {
            self.metrics.set_peers(size);
            debug!(?peer, ?latency, size, "peer admitted to routing table");
        }
        Ok(inserted)
    }

    fn remove(&self, peer: &Id) {
        let (removed, size) = {
            let mut state = self.state.write();
            let removed = state.peers.remove(peer);
            for ring in state.rings.iter_mut() {
                ring.remove(peer);
            }
            if removed {
                self.estimator.forget(peer);
            }
            (removed, state.peers.len())
        };

        if removed {
            self.metrics.set_peers(size);
            debug!(?peer, size, "peer removed from routing table");
        }
    }

    fn recommend(&self, count: usize, exclude: &[Id]) -> Vec<Id> {
        if count == 0 {
            return Vec::new();
        }

        let mut exclude: HashSet<Id> = exclude.iter().cloned().collect();
        let state = self.state.read();

        let mut recommended = Vec::with_capacity(count.min(state.peers.len()));
        for (ring, quota) in state.rings.iter().zip(ring_quotas(count, state.rings.len())) {
            if quota == 0 {
                continue;
            }
            for peer in ring.recommend(quota, &exclude) {
                exclude.insert(peer.clone());
                recommended.push(peer);
            }
        }

        // Under-populated rings leave gaps; fill them from the whole table
        let shortfall = count.saturating_sub(recommended.len());
        if shortfall > 0 {
            recommended.extend(sample_peers(&state.peers, shortfall, &exclude));
        }

        trace!(
            requested = count,
            recommended = recommended.len(),
            "recommended peers"
        );
        recommended
    }

    fn size(&self) -> usize {
        self.state.read().peers.len()
    }

    fn shutdown(&self) {
        if self.shutdown.fire() {
            debug!("routing table shutting down");
        }
    }
}

/// Uniform random sample of up to `count` peers not in `exclude`.
fn sample_peers<Id: NetPeerId>(
    peers: &HashSet<Id>,
    count: usize,
    exclude: &HashSet<Id>,
) -> Vec<Id> {
    let mut eligible: Vec<&Id> = peers.iter().filter(|peer| !exclude.contains(*peer)).collect();
    let amount = count.min(eligible.len());
    let (chosen, _) = eligible.partial_shuffle(&mut rand::rng(), amount);
    chosen.iter().map(|peer| (*peer).clone()).collect()
}

/// Statistics about the table state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingsStats {
    /// Number of known peers.
    pub peers: usize,
    /// Number of peers in each ring, lowest latency first.
    pub ring_sizes: Vec<usize>,
}
