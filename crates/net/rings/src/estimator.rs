//! Smoothed latency estimates.

use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::RwLock;

use crate::NetPeerId;

/// Weight of a new sample in the moving average.
pub const DEFAULT_EWMA_SMOOTHING: f64 = 0.1;

/// Keeps a smoothed latency estimate per peer.
pub trait LatencyEstimator<Id: NetPeerId>: Send + Sync + 'static {
    /// Fold a new round-trip measurement into the peer's estimate.
    fn record(&self, peer: &Id, latency: Duration);

    /// Current estimate, or the estimator's default for unknown peers.
    fn estimate(&self, peer: &Id) -> Duration;

    /// Drop everything known about the peer.
    fn forget(&self, peer: &Id);
}

impl<Id: NetPeerId, E: LatencyEstimator<Id> + ?Sized> LatencyEstimator<Id> for Arc<E> {
    fn record(&self, peer: &Id, latency: Duration) {
        (**self).record(peer, latency)
    }

    fn estimate(&self, peer: &Id) -> Duration {
        (**self).estimate(peer)
    }

    fn forget(&self, peer: &Id) {
        (**self).forget(peer)
    }
}

/// Exponentially weighted moving average of observed latencies.
///
/// The first sample for a peer is taken as-is; later samples are blended in
/// with weight `smoothing`. Unknown peers estimate to zero.
#[derive(Debug)]
pub struct EwmaLatencyEstimator<Id> {
    smoothing: f64,
    estimates: RwLock<HashMap<Id, Duration>>,
}

impl<Id: NetPeerId> Default for EwmaLatencyEstimator<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: NetPeerId> EwmaLatencyEstimator<Id> {
    pub fn new() -> Self {
        Self::with_smoothing(DEFAULT_EWMA_SMOOTHING)
    }

    /// Create an estimator with a custom sample weight, clamped to `(0, 1]`.
    pub fn with_smoothing(smoothing: f64) -> Self {
        let smoothing = if smoothing.is_finite() && smoothing > 0.0 {
            smoothing.min(1.0)
        } else {
            DEFAULT_EWMA_SMOOTHING
        };
        Self {
            smoothing,
            estimates: RwLock::new(HashMap::new()),
        }
    }

    pub fn smoothing(&self) -> f64 {
        self.smoothing
    }

    /// Number of peers with an estimate.
    pub fn len(&self) -> usize {
        self.estimates.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.estimates.read().is_empty()
    }
}

impl<Id: NetPeerId> LatencyEstimator<Id> for EwmaLatencyEstimator<Id> {
    fn record(&self, peer: &Id, latency: Duration) {
        let smoothing = self.smoothing;
        self.estimates
            .write()
            .entry(peer.clone())
            .and_modify(|current| {
                let next = (1.0 - smoothing) * current.as_secs_f64()
                    + smoothing * latency.as_secs_f64();
                *current = Duration::try_from_secs_f64(next).unwrap_or(latency);
            })
            .or_insert(latency);
    }

    fn estimate(&self, peer: &Id) -> Duration {
        self.estimates
            .read()
            .get(peer)
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    fn forget(&self, peer: &Id) {
        self.estimates.write().remove(peer);
    }
}
