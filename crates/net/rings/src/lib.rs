//! Latency-ring routing table for gossip fanout selection.
//!
//! Peers are admitted after a successful latency probe and bucketed into
//! rings whose latency bands grow geometrically (see [`config`]). A periodic
//! refresh re-probes a random sample of peers, folds the results into a
//! smoothed [`LatencyEstimator`] and rebuilds the rings. Recommendations
//! spread across every ring, so fanout mixes near and far peers instead of
//! clustering on the fastest ones.
//!
//! The table is transport-agnostic: measurements come from a
//! [`LatencyProbe`] supplied by the caller.

use std::{fmt::Debug, hash::Hash};

pub mod args;
pub mod config;
pub mod estimator;
mod metrics;
pub mod probe;
pub mod ring;
pub mod table;

pub use args::RingsArgs;
pub use config::{RingsConfig, RingsConfigError, ring_index, ring_quotas};
pub use estimator::{DEFAULT_EWMA_SMOOTHING, EwmaLatencyEstimator, LatencyEstimator};
pub use probe::{LatencyProbe, ProbeError};
pub use ring::Ring;
pub use table::{RingsRoutingTable, RingsStats, RoutingTable};

/// Blanket-implemented for any type usable as a peer identifier.
pub trait NetPeerId: Clone + Eq + Hash + Send + Sync + Debug + 'static {}

impl<T> NetPeerId for T where T: Clone + Eq + Hash + Send + Sync + Debug + 'static {}
