//! Latency ring configuration.
//!
//! # Ring Boundaries
//!
//! Ring `i` holds peers whose smoothed latency falls in
//! `[boundary[i], boundary[i + 1])`; the last ring is open-ended. The first
//! boundary is always zero and the rest grow geometrically:
//!
//! ```text
//! boundary[0] = 0
//! boundary[i] = base_latency * growth_factor^(i - 1)    for i >= 1
//! ```
//!
//! With the defaults (8 rings, 8ms, factor 2) the bands are
//! `0, 8ms, 16ms, 32ms, 64ms, 128ms, 256ms, 512ms+`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};

/// Default number of latency rings.
pub const DEFAULT_RING_COUNT: usize = 8;

/// Default lower bound of the second ring.
pub const DEFAULT_BASE_LATENCY: Duration = Duration::from_millis(8);

/// Default ratio between consecutive ring boundaries.
pub const DEFAULT_GROWTH_FACTOR: f64 = 2.0;

/// Default number of peers re-probed per refresh cycle.
pub const DEFAULT_SAMPLE_SIZE: usize = 16;

/// Default interval between refresh cycles.
pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_secs(30);

/// Errors raised when a [`RingsConfig`] cannot produce a usable table.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RingsConfigError {
    #[error("ring count must be at least 1")]
    NoRings,

    #[error("latency growth factor must be finite and greater than 1, got {0}")]
    InvalidGrowthFactor(f64),

    #[error("base latency must be non-zero when more than one ring is configured")]
    ZeroBaseLatency,

    #[error("sample period must be non-zero")]
    ZeroSamplePeriod,

    /// Boundaries stop increasing because they no longer fit in a `Duration`.
    #[error("latency boundary of ring {ring} overflows")]
    BoundaryOverflow { ring: usize },
}

/// Configuration for a latency-ring routing table.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RingsConfig {
    /// Number of latency rings (buckets).
    pub ring_count: usize,

    /// Lower latency bound of ring 1.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "base-latency-ms")]
    pub base_latency: Duration,

    /// Ratio between consecutive ring boundaries.
    pub growth_factor: f64,

    /// Maximum number of peers re-probed per refresh cycle.
    pub sample_size: usize,

    /// Interval between refresh cycles.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "sample-period-ms")]
    pub sample_period: Duration,
}

impl Default for RingsConfig {
    fn default() -> Self {
        Self {
            ring_count: DEFAULT_RING_COUNT,
            base_latency: DEFAULT_BASE_LATENCY,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            sample_size: DEFAULT_SAMPLE_SIZE,
            sample_period: DEFAULT_SAMPLE_PERIOD,
        }
    }
}

impl RingsConfig {
    /// Set the number of rings.
    pub fn with_ring_count(mut self, count: usize) -> Self {
        self.ring_count = count;
        self
    }

    /// Set the lower bound of ring 1.
    pub fn with_base_latency(mut self, latency: Duration) -> Self {
        self.base_latency = latency;
        self
    }

    /// Set the boundary growth factor.
    pub fn with_growth_factor(mut self, factor: f64) -> Self {
        self.growth_factor = factor;
        self
    }

    /// Set the number of peers re-probed per refresh cycle.
    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = size;
        self
    }

    /// Set the interval between refresh cycles.
    pub fn with_sample_period(mut self, period: Duration) -> Self {
        self.sample_period = period;
        self
    }

    /// Check that the configuration yields strictly increasing boundaries.
    pub fn validate(&self) -> Result<(), RingsConfigError> {
        if self.ring_count == 0 {
            return Err(RingsConfigError::NoRings);
        }
        if !self.growth_factor.is_finite() || self.growth_factor <= 1.0 {
            return Err(RingsConfigError::InvalidGrowthFactor(self.growth_factor));
        }
        if self.ring_count > 1 && self.base_latency.is_zero() {
            return Err(RingsConfigError::ZeroBaseLatency);
        }
        if self.sample_period.is_zero() {
            return Err(RingsConfigError::ZeroSamplePeriod);
        }

        let boundaries = self.latency_boundaries();
        for (ring, pair) in boundaries.windows(2).enumerate() {
            if let [lower, upper] = pair
                && lower >= upper
            {
                return Err(RingsConfigError::BoundaryOverflow { ring: ring + 1 });
            }
        }
        Ok(())
    }

    /// Lower latency bound of every ring, in ring order.
    ///
    /// Boundaries that would not fit in a `Duration` saturate at
    /// `Duration::MAX`; [`validate`](Self::validate) rejects such configs.
    pub fn latency_boundaries(&self) -> Vec<Duration> {
        let mut boundaries = Vec::with_capacity(self.ring_count.max(1));
        boundaries.push(Duration::ZERO);

        let mut bound = self.base_latency;
        for _ in 1..self.ring_count {
            boundaries.push(bound);
            bound = Duration::try_from_secs_f64(bound.as_secs_f64() * self.growth_factor)
                .unwrap_or(Duration::MAX);
        }
        boundaries
    }
}

/// Index of the ring whose band contains `latency`.
///
/// `boundaries` must start at zero and be sorted, as produced by
/// [`RingsConfig::latency_boundaries`].
pub fn ring_index(boundaries: &[Duration], latency: Duration) -> usize {
    boundaries
        .partition_point(|bound| *bound <= latency)
        .saturating_sub(1)
}

/// Split `count` recommendation slots round-robin across `ring_count` rings.
///
/// Ring `i` receives one slot per full round, so the first `count % ring_count`
/// rings get one extra. With fewer slots than rings only the lowest-latency
/// rings are asked.
pub fn ring_quotas(count: usize, ring_count: usize) -> Vec<usize> {
    if ring_count == 0 {
        return Vec::new();
    }
    let base = count / ring_count;
    let extra = count % ring_count;
    (0..ring_count)
        .map(|ring| base + usize::from(ring < extra))
        .collect()
}
