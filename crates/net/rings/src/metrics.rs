//! Routing table metrics.

use metrics::{Counter, Gauge};

/// Routing table metrics.
#[derive(Clone, Debug)]
pub(crate) struct RingsMetrics {
    /// Number of known peers
    pub(crate) peers: Gauge,
    /// Peers turned away because their admission probe failed
    pub(crate) add_probe_failures_total: Counter,
    /// Refresh probes that failed (peer kept)
    pub(crate) refresh_probe_failures_total: Counter,
    /// Completed refresh cycles
    pub(crate) refresh_cycles_total: Counter,
}

impl Default for RingsMetrics {
    fn default() -> Self {
        Self {
            peers: metrics::gauge!("rings.peers"),
            add_probe_failures_total: metrics::counter!(
                "rings.probe.failures_total",
                "phase" => "add"
            ),
            refresh_probe_failures_total: metrics::counter!(
                "rings.probe.failures_total",
                "phase" => "refresh"
            ),
            refresh_cycles_total: metrics::counter!("rings.refresh.cycles_total"),
        }
    }
}

impl RingsMetrics {
    /// Publish the current table size.
    pub(crate) fn set_peers(&self, count: usize) {
        self.peers.set(count as f64);
    }

    /// Publish per-ring population after a repopulation pass.
    pub(crate) fn set_ring_sizes(&self, sizes: &[usize]) {
        for (ring, size) in sizes.iter().enumerate() {
            metrics::gauge!("rings.ring.peers", "ring" => ring.to_string()).set(*size as f64);
        }
    }
}
